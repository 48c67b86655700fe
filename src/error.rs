//! Crate-wide error type.
//!
//! Every row of the admin error table (unknown verb, no known leader, apply
//! timeout, forwarding I/O failure, ...) maps to one variant here. The admin
//! line protocol only ever renders the `Display` text of a `StoreError` back
//! to the client, so the variants intentionally stay close to the plain-text
//! wire vocabulary rather than leaking `openraft` error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not leader")]
    NotLeader,

    #[error("no known leader")]
    NoKnownLeader,

    #[error("key not found")]
    NotFound,

    #[error("malformed request")]
    Malformed,

    #[error("apply failed: {0}")]
    Apply(String),

    #[error("membership change failed: {0}")]
    Membership(String),

    #[error("forwarding failed: {0}")]
    Forward(String),

    #[error("forwarding timed out")]
    ForwardTimeout,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;
