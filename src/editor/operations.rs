//! High-level editing operations.
//!
//! Each function prepares one undoable [`EditorCommand`] against the canvas.
//! Creation operations physically insert hidden entities through the canvas
//! factories and return the command that will make them visible; removal and
//! connection operations only capture references. Nothing becomes visible
//! (or invisible) until the command is run through
//! [`EditorHistory::apply`](super::history::EditorHistory::apply), so a
//! prepared command that is never applied leaves no visible trace.

use indexmap::IndexMap;
use tracing::warn;

use super::commands::{CommandKind, EditorCommand};
use super::selection::EditorSelection;
use crate::canvas::{Canvas, LinkError};
use crate::model::{
    ConnectorId, Direction, Entity, HandleId, NodeId, Point, StreamId,
};

/// Nominal node body size used for default handle placement.
pub const NODE_WIDTH: f64 = 120.0;
pub const NODE_HEIGHT: f64 = 80.0;
const HANDLE_SPACING: f64 = 20.0;

fn into_command(mut commands: Vec<EditorCommand>) -> EditorCommand {
    if commands.len() == 1 {
        commands.remove(0)
    } else {
        EditorCommand::new(CommandKind::Batch(commands))
    }
}

/// Create a node with the given numbers of default-placed ports.
///
/// Inputs sit on the left edge, outputs on the right, parameters along the
/// bottom. The node and all its ports appear as one undo step.
pub fn add_node(
    canvas: &mut Canvas,
    label: &str,
    position: Point,
    inputs: u32,
    outputs: u32,
    parameters: u32,
) -> EditorCommand {
    let node = canvas.insert_node(label, position);
    let mut commands = vec![EditorCommand::new(CommandKind::CreateNode { node })];
    for i in 0..inputs {
        push_handle(
            canvas,
            &mut commands,
            node,
            Direction::Input,
            Point::new(0.0, f64::from(i + 1) * HANDLE_SPACING),
        );
    }
    for i in 0..outputs {
        push_handle(
            canvas,
            &mut commands,
            node,
            Direction::Output,
            Point::new(NODE_WIDTH, f64::from(i + 1) * HANDLE_SPACING),
        );
    }
    for i in 0..parameters {
        push_handle(
            canvas,
            &mut commands,
            node,
            Direction::Parameter,
            Point::new(f64::from(i + 1) * HANDLE_SPACING, NODE_HEIGHT),
        );
    }
    into_command(commands)
}

fn push_handle(
    canvas: &mut Canvas,
    commands: &mut Vec<EditorCommand>,
    node: NodeId,
    direction: Direction,
    position: Point,
) {
    if let Some(handle) = canvas.insert_handle(node, direction, position) {
        commands.push(EditorCommand::new(CommandKind::CreateHandle { handle }));
    }
}

/// Create a boundary stream (source when `direction` is `Output`, sink when
/// `Input`).
pub fn add_stream(
    canvas: &mut Canvas,
    label: &str,
    direction: Direction,
    position: Point,
) -> EditorCommand {
    let stream = canvas.insert_stream(label, direction, position);
    EditorCommand::new(CommandKind::CreateStream { stream })
}

/// Add one port to an existing node. Returns `None` if the node reference is
/// stale.
pub fn add_handle(
    canvas: &mut Canvas,
    node: NodeId,
    direction: Direction,
    position: Point,
) -> Option<EditorCommand> {
    let handle = canvas.insert_handle(node, direction, position)?;
    Some(EditorCommand::new(CommandKind::CreateHandle { handle }))
}

/// Remove a port, severing its connection if it has one.
pub fn remove_handle(handle: HandleId) -> EditorCommand {
    EditorCommand::new(CommandKind::RemoveHandle {
        handle,
        severed: None,
    })
}

/// Remove nodes together with every connection touching them.
///
/// Disconnects run before the node removals, so undo re-locks connections
/// onto an already-restored graph. A connector between two of the removed
/// nodes is only disconnected once.
pub fn remove_nodes(canvas: &Canvas, nodes: &[NodeId]) -> EditorCommand {
    let mut commands = Vec::new();
    let mut severed: Vec<ConnectorId> = Vec::new();
    for &node_id in nodes {
        let Some(node) = canvas.node(node_id) else {
            continue;
        };
        for handle_id in node.handles() {
            if let Some(link) = canvas.handle(handle_id).and_then(|h| h.link()) {
                if !severed.contains(&link.connector) {
                    severed.push(link.connector);
                    commands.push(EditorCommand::new(CommandKind::Disconnect {
                        connector: link.connector,
                    }));
                }
            }
        }
    }
    for &node_id in nodes {
        if canvas.node(node_id).is_some() {
            commands.push(EditorCommand::new(CommandKind::RemoveNode { node: node_id }));
        }
    }
    into_command(commands)
}

/// Remove streams. Severing the stream's connection is part of the stream
/// removal itself, so no separate disconnects are needed.
pub fn remove_streams(streams: &[StreamId]) -> EditorCommand {
    let commands = streams
        .iter()
        .map(|&stream| {
            EditorCommand::new(CommandKind::RemoveStream {
                stream,
                severed: None,
            })
        })
        .collect();
    into_command(commands)
}

/// Validate and prepare a connection between two ports.
///
/// Argument order does not matter; the rejection reasons are those of
/// [`Canvas::link`]. On success the returned command locks both endpoints
/// when applied.
pub fn connect(
    canvas: &mut Canvas,
    a: HandleId,
    b: HandleId,
) -> Result<EditorCommand, LinkError> {
    let connector = canvas.link(a, b, false)?;
    Ok(EditorCommand::new(CommandKind::Connect { connector }))
}

/// Disconnect an existing connector.
pub fn disconnect(connector: ConnectorId) -> EditorCommand {
    EditorCommand::new(CommandKind::Disconnect { connector })
}

/// Translate nodes and streams by a delta.
pub fn move_entities(
    nodes: Vec<NodeId>,
    streams: Vec<StreamId>,
    dx: f64,
    dy: f64,
) -> EditorCommand {
    EditorCommand::new(CommandKind::MoveEntities {
        nodes,
        streams,
        dx,
        dy,
    })
}

/// Replace a node's equation list. Returns `None` if the node reference is
/// stale.
pub fn edit_equations(
    canvas: &Canvas,
    node: NodeId,
    equations: Vec<String>,
) -> Option<EditorCommand> {
    let previous = canvas.node(node)?.equations.clone();
    Some(EditorCommand::new(CommandKind::EditEquations {
        node,
        previous,
        next: equations,
    }))
}

/// Replace a port's attributes. The symbol is allocator-owned and kept as
/// is; origin-side category/label changes propagate to a connected target
/// when the command runs.
pub fn update_handle(
    canvas: &Canvas,
    handle: HandleId,
    mut entity: Entity,
) -> Option<EditorCommand> {
    let previous = canvas.handle(handle)?.entity.clone();
    entity.symbol = previous.symbol.clone();
    Some(EditorCommand::new(CommandKind::UpdateHandle {
        handle,
        previous: Box::new(previous),
        next: Box::new(entity),
    }))
}

/// Duplicate the selected nodes and streams, offset by a delta.
///
/// Clones keep their attribute values and per-node port symbols but get
/// fresh identities (and node symbols). Connections are reconstructed only
/// between clones whose originals were both selected; a connection crossing
/// the selection boundary leaves the clone's port free. The whole paste is
/// one undo step.
pub fn duplicate(
    canvas: &mut Canvas,
    selection: &EditorSelection,
    dx: f64,
    dy: f64,
) -> EditorCommand {
    let mut commands = Vec::new();
    let mut remap: IndexMap<HandleId, HandleId> = IndexMap::new();

    for &node_id in &selection.nodes {
        let Some(original) = canvas.node(node_id) else {
            continue;
        };
        if !original.is_active() {
            continue;
        }
        let entity = original.entity.clone();
        let position = original.position.translated(dx, dy);
        let equations = original.equations.clone();
        let ports: Vec<(HandleId, Direction, Point, Entity)> = original
            .handles()
            .filter_map(|h| {
                canvas
                    .handle(h)
                    .filter(|x| x.is_active())
                    .map(|x| (h, x.direction, x.position, x.entity.clone()))
            })
            .collect();

        let clone_id = canvas.insert_node(&entity.label, position);
        if let Some(clone) = canvas.node_mut(clone_id) {
            clone.equations = equations;
            clone.entity.copy_shared_from(&entity);
        }
        commands.push(EditorCommand::new(CommandKind::CreateNode { node: clone_id }));
        for (old_id, direction, port_position, port_entity) in ports {
            let Some(new_id) = canvas.insert_handle(clone_id, direction, port_position) else {
                continue;
            };
            if let Some(h) = canvas.handle_mut(new_id) {
                h.entity = port_entity;
            }
            commands.push(EditorCommand::new(CommandKind::CreateHandle { handle: new_id }));
            remap.insert(old_id, new_id);
        }
    }

    for &stream_id in &selection.streams {
        let Some(original) = canvas.stream(stream_id) else {
            continue;
        };
        if !original.is_active() {
            continue;
        }
        let label = original.label.clone();
        let position = original.position.translated(dx, dy);
        let old_handle = original.handle();
        let Some(old_port) = canvas.handle(old_handle) else {
            continue;
        };
        let direction = old_port.direction;
        let port_entity = old_port.entity.clone();

        let clone_id = canvas.insert_stream(&label, direction, position);
        let Some(clone) = canvas.stream(clone_id) else {
            continue;
        };
        let new_handle = clone.handle();
        if let Some(h) = canvas.handle_mut(new_handle) {
            h.entity = port_entity;
        }
        commands.push(EditorCommand::new(CommandKind::CreateStream { stream: clone_id }));
        remap.insert(old_handle, new_handle);
    }

    // Reconstruct internal connectivity: take an arbitrary remaining pair;
    // if the original's conjugate was also cloned, link the two clones,
    // otherwise the connection crossed the selection boundary and is
    // dropped.
    while let Some((old_handle, new_handle)) = remap.shift_remove_index(0) {
        let Some(link) = canvas.handle(old_handle).and_then(|h| h.link()) else {
            continue;
        };
        let Some(new_conjugate) = remap.shift_remove(&link.conjugate) else {
            continue;
        };
        match canvas.link(new_handle, new_conjugate, true) {
            Ok(connector) => {
                commands.push(EditorCommand::new(CommandKind::Connect { connector }));
            }
            Err(err) => warn!(%err, "skipping duplicated connection"),
        }
    }

    into_command(commands)
}
