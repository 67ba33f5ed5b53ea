//! Reversible editing commands.
//!
//! Each [`EditorCommand`] captures enough state to replay one mutation in
//! both directions. Execution never re-runs business logic: `execute`/`redo`
//! apply the forward state transition, `undo` the reverse, and every phase
//! re-checks the current lifecycle state first, so replaying an already
//! applied transition is a no-op rather than an error.
//!
//! Destruction is deferred: `cleanup` runs only when a command is evicted
//! from bounded history, and only destroys entities that are hidden at that
//! moment. An entity that is active again is still in use by a more recent
//! state and is left for a later eviction.
//!
//! Commands hold generation-checked references. When a referenced entity is
//! destroyed out of sequence (say its owning node was deleted by an
//! unrelated command), the reference stops resolving, the command latches
//! its obsolescence flag and every further operation on it becomes a silent
//! no-op.

use tracing::warn;

use crate::canvas::Canvas;
use crate::model::{ConnectorId, Entity, HandleId, Lifecycle, NodeId, StreamId};

/// The forward/backward payload of an [`EditorCommand`].
#[derive(Debug, Clone)]
pub enum CommandKind {
    /// Make a freshly inserted node visible.
    CreateNode { node: NodeId },
    /// Logically remove a node, keeping it resident for undo.
    RemoveNode { node: NodeId },
    /// Make a freshly inserted stream (and its handle) visible.
    CreateStream { stream: StreamId },
    /// Logically remove a stream, severing its connection if it has one.
    RemoveStream {
        stream: StreamId,
        /// Connector severed by the forward transition, re-locked on undo.
        severed: Option<ConnectorId>,
    },
    /// Make a freshly inserted handle visible.
    CreateHandle { handle: HandleId },
    /// Logically remove a handle, severing its connection if it has one.
    RemoveHandle {
        handle: HandleId,
        severed: Option<ConnectorId>,
    },
    /// Lock both endpoints of a prepared connector and show it.
    Connect { connector: ConnectorId },
    /// Free both endpoints of a connector and hide it.
    Disconnect { connector: ConnectorId },
    /// Translate nodes and streams by a delta.
    MoveEntities {
        nodes: Vec<NodeId>,
        streams: Vec<StreamId>,
        dx: f64,
        dy: f64,
    },
    /// Replace a node's equation list.
    EditEquations {
        node: NodeId,
        previous: Vec<String>,
        next: Vec<String>,
    },
    /// Replace a handle's attributes, propagating origin-side changes to a
    /// connected target.
    UpdateHandle {
        handle: HandleId,
        previous: Box<Entity>,
        next: Box<Entity>,
    },
    /// Ordered group applied as one unit: forward order for execute/redo,
    /// reverse order for undo.
    Batch(Vec<EditorCommand>),
}

/// One reversible mutation against the canvas.
#[derive(Debug, Clone)]
pub struct EditorCommand {
    kind: CommandKind,
    obsolete: bool,
}

impl EditorCommand {
    pub fn new(kind: CommandKind) -> Self {
        Self {
            kind,
            obsolete: false,
        }
    }

    pub fn kind(&self) -> &CommandKind {
        &self.kind
    }

    pub fn is_obsolete(&self) -> bool {
        self.obsolete
    }

    /// Latch the obsolescence flag. For a batch, fans out to every member.
    pub fn set_obsolete(&mut self) {
        self.obsolete = true;
        if let CommandKind::Batch(commands) = &mut self.kind {
            for command in commands {
                command.set_obsolete();
            }
        }
    }

    /// Short name for log lines.
    pub fn label(&self) -> &'static str {
        match &self.kind {
            CommandKind::CreateNode { .. } => "create-node",
            CommandKind::RemoveNode { .. } => "remove-node",
            CommandKind::CreateStream { .. } => "create-stream",
            CommandKind::RemoveStream { .. } => "remove-stream",
            CommandKind::CreateHandle { .. } => "create-handle",
            CommandKind::RemoveHandle { .. } => "remove-handle",
            CommandKind::Connect { .. } => "connect",
            CommandKind::Disconnect { .. } => "disconnect",
            CommandKind::MoveEntities { .. } => "move",
            CommandKind::EditEquations { .. } => "edit-equations",
            CommandKind::UpdateHandle { .. } => "update-handle",
            CommandKind::Batch(_) => "batch",
        }
    }

    /// Apply the forward mutation for the first time.
    pub fn execute(&mut self, canvas: &mut Canvas) {
        self.forward(canvas);
    }

    /// Re-apply the forward mutation. Identical to `execute` for every
    /// command kind here; kept as a separate entry point so callers can
    /// distinguish first execution from replay.
    pub fn redo(&mut self, canvas: &mut Canvas) {
        self.forward(canvas);
    }

    /// Apply the reverse mutation. Safe to call when the affected entity is
    /// already in the target state.
    pub fn undo(&mut self, canvas: &mut Canvas) {
        if self.obsolete {
            return;
        }
        let mut stale = false;
        match &mut self.kind {
            CommandKind::CreateNode { node } => {
                stale = !canvas.set_node_lifecycle(*node, Lifecycle::Hidden);
            }
            CommandKind::RemoveNode { node } => {
                stale = !canvas.set_node_lifecycle(*node, Lifecycle::Active);
            }
            CommandKind::CreateStream { stream } => {
                stale = !canvas.set_stream_lifecycle(*stream, Lifecycle::Hidden);
            }
            CommandKind::RemoveStream { stream, severed } => {
                if canvas.set_stream_lifecycle(*stream, Lifecycle::Active) {
                    if let Some(connector) = severed {
                        canvas.lock_connector(*connector);
                    }
                } else {
                    stale = true;
                }
            }
            CommandKind::CreateHandle { handle } => {
                stale = !canvas.set_handle_lifecycle(*handle, Lifecycle::Hidden);
            }
            CommandKind::RemoveHandle { handle, severed } => {
                if canvas.set_handle_lifecycle(*handle, Lifecycle::Active) {
                    if let Some(connector) = severed {
                        canvas.lock_connector(*connector);
                    }
                } else {
                    stale = true;
                }
            }
            CommandKind::Connect { connector } => {
                stale = !canvas.free_connector(*connector);
            }
            CommandKind::Disconnect { connector } => {
                stale = !canvas.lock_connector(*connector);
            }
            CommandKind::MoveEntities {
                nodes,
                streams,
                dx,
                dy,
            } => {
                translate(canvas, nodes, streams, -*dx, -*dy);
            }
            CommandKind::EditEquations { node, previous, .. } => {
                match canvas.node_mut(*node) {
                    Some(n) => n.equations = previous.clone(),
                    None => stale = true,
                }
            }
            CommandKind::UpdateHandle {
                handle, previous, ..
            } => {
                stale = !apply_handle_entity(canvas, *handle, previous);
            }
            CommandKind::Batch(commands) => {
                for command in commands.iter_mut().rev() {
                    command.undo(canvas);
                }
            }
        }
        if stale {
            self.latch_obsolete();
        }
    }

    /// Destroy entities this command is responsible for, provided they are
    /// hidden right now. Called only when the command is evicted from
    /// history; active entities are left alone for a later eviction.
    pub fn cleanup(&mut self, canvas: &mut Canvas) {
        if self.obsolete {
            return;
        }
        match &mut self.kind {
            CommandKind::CreateNode { node } | CommandKind::RemoveNode { node } => {
                if canvas.node(*node).is_some_and(|n| !n.is_active()) {
                    canvas.destroy_node(*node);
                }
            }
            CommandKind::CreateStream { stream } => {
                if canvas.stream(*stream).is_some_and(|s| !s.is_active()) {
                    canvas.destroy_stream(*stream);
                }
            }
            CommandKind::RemoveStream { stream, severed } => {
                if canvas.stream(*stream).is_some_and(|s| !s.is_active()) {
                    canvas.destroy_stream(*stream);
                }
                if let Some(connector) = severed {
                    if canvas.connector(*connector).is_some_and(|c| !c.is_active()) {
                        canvas.destroy_connector(*connector);
                    }
                }
            }
            CommandKind::CreateHandle { handle } => {
                if canvas.handle(*handle).is_some_and(|h| !h.is_active()) {
                    canvas.destroy_handle(*handle);
                }
            }
            CommandKind::RemoveHandle { handle, severed } => {
                if canvas.handle(*handle).is_some_and(|h| !h.is_active()) {
                    canvas.destroy_handle(*handle);
                }
                if let Some(connector) = severed {
                    if canvas.connector(*connector).is_some_and(|c| !c.is_active()) {
                        canvas.destroy_connector(*connector);
                    }
                }
            }
            CommandKind::Connect { connector } | CommandKind::Disconnect { connector } => {
                if canvas.connector(*connector).is_some_and(|c| !c.is_active()) {
                    canvas.destroy_connector(*connector);
                }
            }
            CommandKind::MoveEntities { .. }
            | CommandKind::EditEquations { .. }
            | CommandKind::UpdateHandle { .. } => {}
            CommandKind::Batch(commands) => {
                for command in commands {
                    command.cleanup(canvas);
                }
            }
        }
    }

    fn forward(&mut self, canvas: &mut Canvas) {
        if self.obsolete {
            return;
        }
        let mut stale = false;
        match &mut self.kind {
            CommandKind::CreateNode { node } => {
                stale = !canvas.set_node_lifecycle(*node, Lifecycle::Active);
            }
            CommandKind::RemoveNode { node } => {
                stale = !canvas.set_node_lifecycle(*node, Lifecycle::Hidden);
            }
            CommandKind::CreateStream { stream } => {
                stale = !canvas.set_stream_lifecycle(*stream, Lifecycle::Active);
            }
            CommandKind::RemoveStream { stream, severed } => {
                let state = canvas
                    .stream(*stream)
                    .map(|s| (s.lifecycle(), s.handle()));
                match state {
                    None => stale = true,
                    Some((Lifecycle::Active, handle)) => {
                        let link = canvas.handle(handle).and_then(|h| h.link());
                        if let Some(link) = link {
                            canvas.free_connector(link.connector);
                            *severed = Some(link.connector);
                        }
                        canvas.set_stream_lifecycle(*stream, Lifecycle::Hidden);
                    }
                    Some(_) => {}
                }
            }
            CommandKind::CreateHandle { handle } => {
                stale = !canvas.set_handle_lifecycle(*handle, Lifecycle::Active);
            }
            CommandKind::RemoveHandle { handle, severed } => {
                let state = canvas.handle(*handle).map(|h| (h.lifecycle(), h.link()));
                match state {
                    None => stale = true,
                    Some((Lifecycle::Active, link)) => {
                        if let Some(link) = link {
                            canvas.free_connector(link.connector);
                            *severed = Some(link.connector);
                        }
                        canvas.set_handle_lifecycle(*handle, Lifecycle::Hidden);
                    }
                    Some(_) => {}
                }
            }
            CommandKind::Connect { connector } => {
                stale = !canvas.lock_connector(*connector);
            }
            CommandKind::Disconnect { connector } => {
                stale = !canvas.free_connector(*connector);
            }
            CommandKind::MoveEntities {
                nodes,
                streams,
                dx,
                dy,
            } => {
                translate(canvas, nodes, streams, *dx, *dy);
            }
            CommandKind::EditEquations { node, next, .. } => match canvas.node_mut(*node) {
                Some(n) => n.equations = next.clone(),
                None => stale = true,
            },
            CommandKind::UpdateHandle { handle, next, .. } => {
                stale = !apply_handle_entity(canvas, *handle, next);
            }
            CommandKind::Batch(commands) => {
                for command in commands {
                    command.forward(canvas);
                }
            }
        }
        if stale {
            self.latch_obsolete();
        }
    }

    fn latch_obsolete(&mut self) {
        if !self.obsolete {
            warn!(
                command = self.label(),
                "referenced entity no longer resolves, command is now inert"
            );
            self.obsolete = true;
        }
    }
}

/// Shift resident nodes and streams by a delta, skipping stale references.
fn translate(canvas: &mut Canvas, nodes: &[NodeId], streams: &[StreamId], dx: f64, dy: f64) {
    for &node in nodes {
        if let Some(n) = canvas.node_mut(node) {
            n.position = n.position.translated(dx, dy);
        }
    }
    for &stream in streams {
        if let Some(s) = canvas.stream_mut(stream) {
            s.position = s.position.translated(dx, dy);
        }
    }
}

/// Swap in a handle's attributes, then push origin-side category/label to a
/// connected target. Propagation is one-way: the target never writes back.
fn apply_handle_entity(canvas: &mut Canvas, handle: HandleId, entity: &Entity) -> bool {
    match canvas.handle_mut(handle) {
        Some(h) => h.entity = entity.clone(),
        None => return false,
    }
    let link = canvas.handle(handle).and_then(|h| h.link());
    if let Some(link) = link {
        let is_origin = canvas
            .connector(link.connector)
            .is_some_and(|c| c.origin() == handle);
        if is_origin {
            let (category, label) = (entity.category, entity.label.clone());
            if let Some(target) = canvas.handle_mut(link.conjugate) {
                target.entity.category = category;
                target.entity.label = label;
            }
        }
    }
    true
}
