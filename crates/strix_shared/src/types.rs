//! Error results that can be returned from the engine

use thiserror::Error;

/// Serious errors. Parse errors are not represented here; those are reported
/// through the error sink side channel and never halt processing.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    IO(#[from] std::io::Error),

    #[error("byte source failure: {0}")]
    ByteSource(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("token sink rejected token: {0}")]
    Sink(String),

    #[error("there was a problem: {0}")]
    Generic(String),
}

/// Result that can be returned which holds either T or an Error
pub type Result<T> = std::result::Result<T, anyhow::Error>;
