//! Crate-level errors.
//!
//! Every failure aborts verification. Callers that need to tell a policy
//! violation from a malformed reference state inspect [`Error::kind`].

use serde::Serialize;

use crate::engine::TestError;
use crate::schema::SchemaError;

/// Coarse classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Reference state is malformed, missing a field, or of the wrong type.
    Schema,
    /// A hex string violates the `0x` + lowercase-hex grammar.
    Format,
    /// An event's (PCR, type) combination has no registered test.
    Dispatch,
    /// A value or digest differs from what the policy expects.
    FieldMismatch,
    /// A delayed-binding slot was read before it was bound.
    UnboundSlot,
    /// An event does not have the structure the test works on.
    Shape,
    /// Two policies were registered under one name.
    DuplicatePolicy,
    /// No policy is registered under the requested name.
    UnknownPolicy,
}

/// Errors surfaced by policy lookup, compilation and validation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Reference state failed its schema.
    #[error("reference state rejected: {0}")]
    Schema(#[from] SchemaError),

    /// The event log failed the compiled test.
    #[error("attestation failed: {0}")]
    Validation(#[from] TestError),

    /// A policy name was registered twice.
    #[error("policy {name:?} is already registered")]
    DuplicatePolicy {
        /// The contested name.
        name: String,
    },

    /// Lookup of an unregistered policy.
    #[error("no policy named {name:?}")]
    UnknownPolicy {
        /// The requested name.
        name: String,
    },
}

impl Error {
    /// Classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Schema(e) if e.is_format() => ErrorKind::Format,
            Self::Schema(_) => ErrorKind::Schema,
            Self::Validation(e) => e.kind().class(),
            Self::DuplicatePolicy { .. } => ErrorKind::DuplicatePolicy,
            Self::UnknownPolicy { .. } => ErrorKind::UnknownPolicy,
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, Error>;
