//! Errors the HTTP layer needs to classify.
//!
//! Everything else travels as `anyhow::Error` and becomes a 500. Handlers
//! recover a [`JournalError`] by downcasting.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{dependency} unreachable after {attempts} attempts")]
    Unreachable { dependency: String, attempts: u32 },
}
