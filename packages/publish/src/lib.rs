//! # Incremental Publisher
//!
//! Decides what subset of freshly generated projection text must be sent
//! to the notification channel, and in what shape: a replace-all on
//! first contact, a minimal edit script afterwards, a bare version bump
//! when nothing changed, or nothing at all.
//!
//! Diagnostics publishing lives here too; it is a separate consumer with
//! its own debounce and its own close-eviction policy.

pub mod diagnostics;
pub mod diff;
pub mod error;
pub mod publisher;

pub use diagnostics::*;
pub use diff::*;
pub use error::*;
pub use publisher::*;
