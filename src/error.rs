//! Core error taxonomy for the JavaScript execution subsystem.
//!
//! Each kind maps to exactly one HTTP status in the API layer (see
//! `crate::http::error`); callers outside the core only need to match on
//! the enum variant, never parse the message.

use thiserror::Error;

/// Errors that can occur while building or invoking an [`crate::isolate::Isolate`].
#[derive(Error, Debug, Clone)]
pub enum EngineError {
    /// Source failed to parse, instantiate, or evaluate its top-level.
    #[error("compile error: {0}")]
    Compile(String),

    /// The module has no callable default export.
    #[error("contract error: {0}")]
    Contract(String),

    /// User code threw synchronously, or the returned promise rejected.
    #[error("runtime error: {0}")]
    Runtime(String),

    /// The fulfillment value could not be serialized to JSON.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The isolate's worker thread is gone (construction failed or it was evicted).
    #[error("isolate unavailable: {0}")]
    Unavailable(String),
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Fatal error initializing the process-wide JS engine. Aborts the process.
#[derive(Error, Debug)]
#[error("engine init error: {0}")]
pub struct EngineInitError(pub String);
