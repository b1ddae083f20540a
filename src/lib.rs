//! Measured-boot attestation policies.
//!
//! Checks a parsed TPM measured-boot event log against an administrator's
//! reference state. Policies compile reference state into a [`engine::Test`]
//! tree; the tree is walked over the event log once and either accepts it or
//! reports the first violation with its location.
//!
//! See `DESIGN.md` for the architecture.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod digest;
pub mod engine;
pub mod error;
pub mod event;
pub mod logging;
pub mod policy;
pub mod refstate;
pub mod report;
pub mod schema;

pub use error::{Error, ErrorKind};
