//! # Workspace layer
//!
//! Outer glue for the weft tooling server: loads project descriptors,
//! watches the file system, drives the projection compiler on document
//! changes, and wires the version cache and publishers into the snapshot
//! state machine.

pub mod compiler;
pub mod descriptor;
pub mod system;
pub mod watcher;

pub use compiler::*;
pub use descriptor::*;
pub use system::*;
pub use watcher::*;
