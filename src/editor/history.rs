//! Bounded undo/redo history.
//!
//! The history defers irreversible destruction to eviction time: undoing a
//! command leaves its entities resident (hidden) so a redo can bring them
//! back, and only a command falling off the bounded stack cleans up what it
//! hid. Applying a new command invalidates the whole redo stack, whose
//! entities are no longer reachable by any future redo and are cleaned up
//! immediately.

use tracing::debug;

use super::commands::EditorCommand;
use crate::canvas::Canvas;

/// Undo/redo stacks with bounded retention.
///
/// Both stacks are ordered most-recent-last. Only one command is ever in
/// flight: `apply`, `undo` and `redo` run synchronously to completion.
#[derive(Debug, Clone)]
pub struct EditorHistory {
    undo_stack: Vec<EditorCommand>,
    redo_stack: Vec<EditorCommand>,
    max_depth: usize,
}

impl EditorHistory {
    /// Create a history retaining at most `max_depth` undo steps.
    pub fn new(max_depth: usize) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            max_depth: max_depth.max(1),
        }
    }

    /// Execute a command and record it.
    ///
    /// Discards the entire redo stack first (cleaning up each command), then
    /// evicts the oldest undo entries until the new command fits within the
    /// retention bound.
    pub fn apply(&mut self, canvas: &mut Canvas, mut command: EditorCommand) {
        for mut discarded in self.redo_stack.drain(..) {
            discarded.cleanup(canvas);
        }
        while self.undo_stack.len() >= self.max_depth {
            let mut evicted = self.undo_stack.remove(0);
            evicted.cleanup(canvas);
        }
        command.execute(canvas);
        self.undo_stack.push(command);
    }

    /// Undo the most recent command. Returns false if there is nothing to
    /// undo; callers surface that as a benign notification.
    pub fn undo(&mut self, canvas: &mut Canvas) -> bool {
        match self.undo_stack.pop() {
            Some(mut command) => {
                command.undo(canvas);
                self.redo_stack.push(command);
                true
            }
            None => {
                debug!("undo requested on empty history");
                false
            }
        }
    }

    /// Redo the most recently undone command. Returns false if there is
    /// nothing to redo.
    pub fn redo(&mut self, canvas: &mut Canvas) -> bool {
        match self.redo_stack.pop() {
            Some(mut command) => {
                command.redo(canvas);
                self.undo_stack.push(command);
                true
            }
            None => {
                debug!("redo requested on empty history");
                false
            }
        }
    }

    /// Drain both stacks, cleaning up every command. Used when the whole
    /// document is cleared; already-obsolete commands are simply inert.
    pub fn wipe(&mut self, canvas: &mut Canvas) {
        for mut command in self.redo_stack.drain(..) {
            command.cleanup(canvas);
        }
        for mut command in self.undo_stack.drain(..) {
            command.cleanup(canvas);
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Number of undo steps currently retained.
    pub fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }

    /// Number of redo steps currently retained.
    pub fn redo_depth(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }
}
