//! # Mapping Engine
//!
//! Pure functions translating positions and ranges between an authored
//! `.weft` document and its generated projections (script and markup).
//!
//! A projection carries an ordered mapping table of
//! `(original span, generated span)` pairs. Everything in this crate is
//! side-effect-free: lookups that find no mapping return `None` and the
//! caller degrades to coarser behavior.

pub mod classify;
pub mod document;
pub mod engine;

pub use classify::*;
pub use document::*;
pub use engine::*;
