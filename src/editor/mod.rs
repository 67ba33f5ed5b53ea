//! The reversible graph-edit engine.
//!
//! This module provides everything needed to edit a flowsheet interactively:
//!
//! - **Commands**: each mutation is one [`EditorCommand`] with
//!   execute/undo/redo and deferred cleanup
//! - **History**: bounded undo/redo stacks with redo invalidation and
//!   eviction-time destruction
//! - **Operations**: constructors for node/stream/port creation and removal,
//!   connection, movement, equation and attribute edits
//! - **Duplication**: structural copy/paste with internal-connection remap
//! - **Selection**: toggle and rectangle selection of nodes and streams
//! - **Session state**: canvas + history + selection + the drag-to-connect
//!   gesture in one aggregate

pub mod commands;
pub mod history;
pub mod operations;
pub mod selection;
pub mod state;

pub use commands::{CommandKind, EditorCommand};
pub use history::EditorHistory;
pub use operations::{
    add_handle, add_node, add_stream, connect, disconnect, duplicate, edit_equations,
    move_entities, remove_handle, remove_nodes, remove_streams, update_handle,
};
pub use selection::{EditorSelection, SelectionRect};
pub use state::{EditorState, PendingConnection};
