//! Graph-edit engine for process flowsheet models.
//!
//! This crate provides the core of an interactive schematic editor: a
//! connectivity model of nodes, typed ports, connectors and boundary
//! streams, plus the reversible-command subsystem that edits it with
//! bounded undo/redo and deferred cleanup of removed entities.
//!
//! Rendering, UI event handling and script generation are external
//! collaborators that drive the public operations in [`editor`].

pub mod canvas;
pub mod color;
pub mod editor;
pub mod model;
pub mod snapshot;
