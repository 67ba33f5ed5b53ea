use flowsheet::canvas::{Canvas, LinkError};
use flowsheet::editor::history::EditorHistory;
use flowsheet::editor::operations;
use flowsheet::editor::state::EditorState;
use flowsheet::model::{Direction, NodeId, Point};

fn node_by_label(canvas: &Canvas, label: &str) -> NodeId {
    canvas
        .nodes()
        .find(|(_, n)| n.entity.label == label)
        .map(|(id, _)| id)
        .expect("node present")
}

/// Build two connected nodes through the normal editing path.
fn connected_pair(state: &mut EditorState) -> (NodeId, NodeId) {
    let cmd = operations::add_node(&mut state.canvas, "source", Point::new(0.0, 0.0), 0, 1, 0);
    state.apply(cmd);
    let cmd = operations::add_node(&mut state.canvas, "sink", Point::new(200.0, 0.0), 1, 0, 0);
    state.apply(cmd);
    let a = node_by_label(&state.canvas, "source");
    let b = node_by_label(&state.canvas, "sink");
    let out = state.canvas.node(a).expect("resident").outputs()[0];
    let inp = state.canvas.node(b).expect("resident").inputs()[0];
    state.begin_connection(out);
    assert_eq!(state.complete_connection(inp), Ok(true));
    (a, b)
}

#[test]
fn connection_symmetry_holds_and_clears() {
    let mut state = EditorState::new(10);
    let (a, b) = connected_pair(&mut state);
    let out = state.canvas.node(a).expect("resident").outputs()[0];
    let inp = state.canvas.node(b).expect("resident").inputs()[0];

    let (connector_id, connector) = state
        .canvas
        .active_connectors()
        .next()
        .expect("one active connector");
    assert_eq!(connector.origin(), out);
    assert_eq!(connector.target(), inp);
    let h_out = state.canvas.handle(out).expect("resident");
    let h_in = state.canvas.handle(inp).expect("resident");
    assert!(h_out.is_connected());
    assert!(h_in.is_connected());
    assert_eq!(h_out.conjugate(), Some(inp));
    assert_eq!(h_in.conjugate(), Some(out));
    assert_eq!(h_out.connector(), Some(connector_id));
    assert_eq!(h_in.connector(), Some(connector_id));

    state.apply(operations::disconnect(connector_id));
    let h_out = state.canvas.handle(out).expect("resident");
    let h_in = state.canvas.handle(inp).expect("resident");
    assert!(!h_out.is_connected());
    assert!(!h_in.is_connected());
    assert_eq!(h_out.conjugate(), None);
    assert_eq!(h_out.connector(), None);
    assert_eq!(state.canvas.active_connectors().count(), 0);
}

#[test]
fn invalid_connection_requests_are_rejected_without_state() {
    let mut canvas = Canvas::new();
    let mut history = EditorHistory::new(10);
    let cmd = operations::add_node(&mut canvas, "a", Point::default(), 1, 2, 1);
    history.apply(&mut canvas, cmd);
    let cmd = operations::add_node(&mut canvas, "b", Point::default(), 1, 0, 1);
    history.apply(&mut canvas, cmd);
    let a = node_by_label(&canvas, "a");
    let b = node_by_label(&canvas, "b");
    let a_out = canvas.node(a).expect("resident").outputs()[0];
    let a_out2 = canvas.node(a).expect("resident").outputs()[1];
    let a_in = canvas.node(a).expect("resident").inputs()[0];
    let b_in = canvas.node(b).expect("resident").inputs()[0];
    let b_par = canvas.node(b).expect("resident").parameters()[0];

    assert_eq!(
        operations::connect(&mut canvas, a_out, b_par).err(),
        Some(LinkError::ParameterPort)
    );
    assert_eq!(
        operations::connect(&mut canvas, a_out, a_in).err(),
        Some(LinkError::SameParent)
    );
    assert_eq!(
        operations::connect(&mut canvas, a_in, b_in).err(),
        Some(LinkError::DirectionMismatch)
    );
    // No partial state was created by the rejections.
    assert_eq!(canvas.connectors().count(), 0);

    let cmd = operations::connect(&mut canvas, a_out, b_in).expect("valid");
    history.apply(&mut canvas, cmd);
    assert_eq!(
        operations::connect(&mut canvas, a_out2, b_in).err(),
        Some(LinkError::AlreadyConnected)
    );
}

#[test]
fn origin_attributes_overwrite_target_on_connect() {
    let mut state = EditorState::new(10);
    let cmd = operations::add_node(&mut state.canvas, "a", Point::default(), 0, 1, 0);
    state.apply(cmd);
    let cmd = operations::add_node(&mut state.canvas, "b", Point::default(), 1, 0, 0);
    state.apply(cmd);
    let a = node_by_label(&state.canvas, "a");
    let b = node_by_label(&state.canvas, "b");
    let out = state.canvas.node(a).expect("resident").outputs()[0];
    let inp = state.canvas.node(b).expect("resident").inputs()[0];

    let cat = state.canvas.categories.find_or_create("water");
    let mut entity = state.canvas.handle(out).expect("resident").entity.clone();
    entity.units = "m3/h".to_string();
    entity.category = Some(cat);
    entity.value = Some("7.5".to_string());
    let cmd = operations::update_handle(&state.canvas, out, entity).expect("resident");
    state.apply(cmd);

    state.begin_connection(inp);
    assert_eq!(state.complete_connection(out), Ok(true));

    let target = state.canvas.handle(inp).expect("resident");
    assert_eq!(target.entity.units, "m3/h");
    assert_eq!(target.entity.category, Some(cat));
    assert_eq!(target.entity.value.as_deref(), Some("7.5"));
}

#[test]
fn origin_edits_propagate_while_connected() {
    let mut state = EditorState::new(10);
    let (a, b) = connected_pair(&mut state);
    let out = state.canvas.node(a).expect("resident").outputs()[0];
    let inp = state.canvas.node(b).expect("resident").inputs()[0];

    let cat = state.canvas.categories.find_or_create("steam");
    let mut entity = state.canvas.handle(out).expect("resident").entity.clone();
    entity.label = "overhead vapour".to_string();
    entity.category = Some(cat);
    let cmd = operations::update_handle(&state.canvas, out, entity).expect("resident");
    state.apply(cmd);

    let target = state.canvas.handle(inp).expect("resident");
    assert_eq!(target.entity.label, "overhead vapour");
    assert_eq!(target.entity.category, Some(cat));

    // Undo rolls the propagation back too.
    assert!(state.undo());
    let target = state.canvas.handle(inp).expect("resident");
    assert_ne!(target.entity.label, "overhead vapour");
}

#[test]
fn connector_symbols_are_reused_after_cleanup() {
    let mut canvas = Canvas::new();
    // Depth 1 so that every apply evicts the previous command.
    let mut history = EditorHistory::new(1);

    let mut pairs = Vec::new();
    for i in 0..3 {
        let out_cmd = operations::add_node(
            &mut canvas,
            &format!("src{}", i),
            Point::default(),
            0,
            1,
            0,
        );
        let in_cmd = operations::add_node(
            &mut canvas,
            &format!("dst{}", i),
            Point::default(),
            1,
            0,
            0,
        );
        history.apply(&mut canvas, out_cmd);
        history.apply(&mut canvas, in_cmd);
        let src = node_by_label(&canvas, &format!("src{}", i));
        let dst = node_by_label(&canvas, &format!("dst{}", i));
        pairs.push((
            canvas.node(src).expect("resident").outputs()[0],
            canvas.node(dst).expect("resident").inputs()[0],
        ));
    }

    let mut connectors = Vec::new();
    for &(out, inp) in &pairs {
        let cmd = operations::connect(&mut canvas, out, inp).expect("valid");
        history.apply(&mut canvas, cmd);
        connectors.push(
            canvas
                .handle(out)
                .expect("resident")
                .connector()
                .expect("locked"),
        );
    }
    let symbols: Vec<String> = connectors
        .iter()
        .map(|c| canvas.connector(*c).expect("resident").symbol.clone())
        .collect();
    assert_eq!(symbols, ["s0", "s1", "s2"]);

    // Disconnect s1 and push one more command so the disconnect is evicted
    // and the hidden connector physically destroyed.
    history.apply(&mut canvas, operations::disconnect(connectors[1]));
    history.apply(
        &mut canvas,
        operations::move_entities(Vec::new(), Vec::new(), 0.0, 0.0),
    );
    assert!(canvas.connector(connectors[1]).is_none());

    // The freed suffix is reused: the next allocation is s1, not s3.
    let cmd = operations::connect(&mut canvas, pairs[1].0, pairs[1].1).expect("valid");
    history.apply(&mut canvas, cmd);
    let fresh = canvas
        .handle(pairs[1].0)
        .expect("resident")
        .connector()
        .expect("locked");
    assert_eq!(canvas.connector(fresh).expect("resident").symbol, "s1");
}

#[test]
fn stream_removal_severs_and_undo_restores() {
    let mut state = EditorState::new(10);
    let cmd = operations::add_node(&mut state.canvas, "absorber", Point::default(), 1, 0, 0);
    state.apply(cmd);
    let node = node_by_label(&state.canvas, "absorber");
    let inp = state.canvas.node(node).expect("resident").inputs()[0];

    let cmd = operations::add_stream(
        &mut state.canvas,
        "feed",
        Direction::Output,
        Point::new(-100.0, 0.0),
    );
    state.apply(cmd);
    let (stream_id, stream) = state.canvas.active_streams().next().expect("one stream");
    let stream_handle = stream.handle();

    state.begin_connection(stream_handle);
    assert_eq!(state.complete_connection(inp), Ok(true));
    assert_eq!(state.canvas.active_connectors().count(), 1);

    state.apply(operations::remove_streams(&[stream_id]));
    assert_eq!(state.canvas.active_streams().count(), 0);
    assert_eq!(state.canvas.active_connectors().count(), 0);
    assert!(!state.canvas.handle(inp).expect("resident").is_connected());

    assert!(state.undo());
    assert_eq!(state.canvas.active_streams().count(), 1);
    assert_eq!(state.canvas.active_connectors().count(), 1);
    assert_eq!(
        state.canvas.handle(inp).expect("resident").conjugate(),
        Some(stream_handle)
    );
    assert_eq!(
        state
            .canvas
            .handle(stream_handle)
            .expect("resident")
            .conjugate(),
        Some(inp)
    );
}
