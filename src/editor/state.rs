//! Editor session state.
//!
//! [`EditorState`] bundles the canvas with its history, selection and the
//! transient drag-to-connect gesture. UI layers drive everything through
//! this aggregate and never touch lifecycle flags directly.

use super::commands::EditorCommand;
use super::history::EditorHistory;
use super::operations;
use super::selection::EditorSelection;
use crate::canvas::{Canvas, LinkError};
use crate::model::HandleId;

/// An in-progress drag-to-connect gesture.
///
/// This is the only operation with an explicit abort path. No command exists
/// until the connection validates, so an aborted gesture leaves no history
/// footprint.
#[derive(Debug, Clone, Copy)]
pub struct PendingConnection {
    /// The port the gesture started from.
    pub origin: HandleId,
}

impl PendingConnection {
    pub fn start(origin: HandleId) -> Self {
        Self { origin }
    }

    /// Validate the gesture against a target port and build the connect
    /// command for it.
    pub fn finish(self, canvas: &mut Canvas, target: HandleId) -> Result<EditorCommand, LinkError> {
        operations::connect(canvas, self.origin, target)
    }
}

/// Everything a single editing session owns.
#[derive(Debug)]
pub struct EditorState {
    pub canvas: Canvas,
    pub history: EditorHistory,
    pub selection: EditorSelection,
    pub pending: Option<PendingConnection>,
}

impl EditorState {
    pub fn new(max_undo_depth: usize) -> Self {
        Self {
            canvas: Canvas::new(),
            history: EditorHistory::new(max_undo_depth),
            selection: EditorSelection::new(),
            pending: None,
        }
    }

    /// Execute a command and record it in history.
    pub fn apply(&mut self, command: EditorCommand) {
        self.history.apply(&mut self.canvas, command);
        self.selection.prune(&self.canvas);
    }

    /// Undo one step. Returns false (for a benign user notification) if the
    /// history is empty.
    pub fn undo(&mut self) -> bool {
        let undone = self.history.undo(&mut self.canvas);
        self.selection.prune(&self.canvas);
        undone
    }

    /// Redo one step. Returns false if there is nothing to redo.
    pub fn redo(&mut self) -> bool {
        let redone = self.history.redo(&mut self.canvas);
        self.selection.prune(&self.canvas);
        redone
    }

    /// Start a drag-to-connect gesture from a port.
    pub fn begin_connection(&mut self, origin: HandleId) {
        self.pending = Some(PendingConnection::start(origin));
    }

    /// Finish the pending gesture on a target port. Returns `Ok(false)` if
    /// no gesture was in progress, `Ok(true)` if the connection was made.
    pub fn complete_connection(&mut self, target: HandleId) -> Result<bool, LinkError> {
        let Some(pending) = self.pending.take() else {
            return Ok(false);
        };
        let command = pending.finish(&mut self.canvas, target)?;
        self.apply(command);
        Ok(true)
    }

    /// Abort the pending gesture (release outside a valid target).
    pub fn cancel_connection(&mut self) {
        self.pending = None;
    }

    /// Clear the whole document: tear down all history deterministically,
    /// then start from an empty canvas.
    pub fn clear_document(&mut self) {
        self.history.wipe(&mut self.canvas);
        self.canvas = Canvas::new();
        self.selection.clear();
        self.pending = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Direction, Point};

    #[test]
    fn test_cancelled_gesture_has_no_history_footprint() {
        let mut state = EditorState::new(10);
        let cmd = operations::add_node(&mut state.canvas, "a", Point::default(), 0, 1, 0);
        state.apply(cmd);
        let (_, node) = state.canvas.active_nodes().next().expect("one node");
        let out = node.outputs()[0];

        state.begin_connection(out);
        assert!(state.pending.is_some());
        state.cancel_connection();
        assert!(state.pending.is_none());
        assert_eq!(state.history.undo_depth(), 1);
    }

    #[test]
    fn test_complete_connection_applies_one_command() {
        let mut state = EditorState::new(10);
        let a = operations::add_node(&mut state.canvas, "a", Point::default(), 0, 1, 0);
        let b = operations::add_node(&mut state.canvas, "b", Point::default(), 1, 0, 0);
        state.apply(a);
        state.apply(b);
        let ids: Vec<_> = state.canvas.active_nodes().map(|(id, _)| id).collect();
        let out = state.canvas.node(ids[0]).expect("resident").outputs()[0];
        let inp = state.canvas.node(ids[1]).expect("resident").inputs()[0];

        state.begin_connection(out);
        assert_eq!(state.complete_connection(inp), Ok(true));
        assert_eq!(state.canvas.active_connectors().count(), 1);
        assert_eq!(state.history.undo_depth(), 3);

        // Finishing again without a pending gesture does nothing.
        assert_eq!(state.complete_connection(inp), Ok(false));
    }

    #[test]
    fn test_invalid_target_rejected_without_state() {
        let mut state = EditorState::new(10);
        let a = operations::add_node(&mut state.canvas, "a", Point::default(), 0, 2, 0);
        state.apply(a);
        let (_, node) = state.canvas.active_nodes().next().expect("one node");
        let out0 = node.outputs()[0];
        let out1 = node.outputs()[1];

        state.begin_connection(out0);
        assert_eq!(
            state.complete_connection(out1),
            Err(LinkError::SameParent)
        );
        assert_eq!(state.canvas.connectors().count(), 0);
        assert_eq!(state.history.undo_depth(), 1);
    }

    #[test]
    fn test_clear_document_resets_everything() {
        let mut state = EditorState::new(10);
        let cmd = operations::add_node(&mut state.canvas, "a", Point::default(), 1, 1, 0);
        state.apply(cmd);
        let cmd = operations::add_stream(
            &mut state.canvas,
            "feed",
            Direction::Output,
            Point::default(),
        );
        state.apply(cmd);

        state.clear_document();
        assert_eq!(state.canvas.nodes().count(), 0);
        assert_eq!(state.canvas.streams().count(), 0);
        assert!(!state.history.can_undo());
        assert!(!state.history.can_redo());
    }
}
