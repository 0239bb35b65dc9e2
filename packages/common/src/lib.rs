pub mod error;
pub mod span;
pub mod text;

pub use error::*;
pub use span::*;
pub use text::*;
