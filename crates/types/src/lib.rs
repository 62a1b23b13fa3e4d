#![forbid(unsafe_code)]

//! Core data structures and error types for the L-Core attestation engine.
//!
//! Everything that crosses a crate boundary lives here: the entity model for
//! attestations, grants, and provider schemas; the strict request payload
//! decoders used by the router; the error taxonomy; and the environment-driven
//! configuration. Keeping these in the base crate lets the crypto, storage,
//! engine, and node crates agree on one vocabulary without depending on each
//! other.

pub mod config;
pub mod entity;
pub mod error;
pub mod request;

pub use entity::InputIndex;
pub use error::{ErrorCode, RequestError};

/// Default page size for discovery queries.
pub const DEFAULT_QUERY_LIMIT: u64 = 50;

/// Default cap on a decoded request payload, in bytes.
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 100 * 1024;

/// Default cap on any single string field inside a payload, in bytes.
pub const DEFAULT_MAX_STRING_LENGTH: usize = 10 * 1024;
