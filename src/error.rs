//! # Error Types
//!
//! Every operation returns [`Result<T, CipherError>`](CipherError). Errors are
//! fatal to the call that raised them; nothing is retried internally.

use thiserror::Error;

/// The error type for all cipher stream operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CipherError {
    /// A required buffer was missing or empty, or arguments did not agree
    /// with each other (e.g. padding requested for a stream mode).
    #[error("Invalid arguments: {0}")]
    InvalidArgs(String),

    /// Output buffer too small, byte-count overflow, or data that is not
    /// block aligned for a mode that takes no padding.
    #[error("Bad length: {0}")]
    BadLength(String),

    /// PKCS#7 padding did not verify.
    ///
    /// Deliberately carries no detail: callers are expected to report a
    /// generic decryption failure.
    #[error("Padding verification failed")]
    NotValid,

    /// Internal invariant violation or misuse of the context lifecycle
    /// (reuse after do-final, synchronous call during an async operation).
    #[error("Bad state: {0}")]
    BadState(String),

    /// The requested mode or feature is compiled out or unavailable.
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// The engine collaborator failed in a way none of the other kinds describe.
    #[error("Engine error: {0}")]
    Engine(String),
}

impl From<&'static str> for CipherError {
    fn from(msg: &'static str) -> Self {
        CipherError::BadState(msg.to_string())
    }
}
