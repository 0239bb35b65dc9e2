//! # Snapshot State Machine
//!
//! Immutable, versioned project and document state for the weft tooling
//! server. Every mutation flows through one serialized dispatcher and
//! produces a new immutable snapshot; listeners observe a strict total
//! order of changes. Readers hold snapshots and never need a lock.

pub mod document_state;
pub mod error;
pub mod host_document;
pub mod machine;
pub mod project_state;
pub mod snapshot;
pub mod versions;

pub use document_state::*;
pub use error::*;
pub use host_document::*;
pub use machine::*;
pub use project_state::*;
pub use snapshot::*;
pub use versions::*;
