use std::path::PathBuf;

use thiserror::Error;

use crate::project_state::ProjectKey;

/// Errors surfaced by the snapshot state machine. These indicate caller
/// contract breaches, not recoverable runtime conditions.
#[derive(Error, Debug)]
pub enum StateError {
    #[error("unknown project: {0:?}")]
    UnknownProject(ProjectKey),

    #[error("unknown document: {0}")]
    UnknownDocument(PathBuf),

    #[error("state dispatcher is gone")]
    DispatcherGone,

    #[error("text load failed: {0}")]
    TextLoad(#[from] weft_common::CommonError),
}

pub type StateResult<T> = Result<T, StateError>;
