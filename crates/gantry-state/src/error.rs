//! State-layer error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("host port {new} conflicts with existing reservation {existing}")]
    HostPortConflict { new: String, existing: String },
}

pub type StateResult<T> = Result<T, StateError>;
