#![forbid(unsafe_code)]

//! Cryptographic primitives for the L-Core attestation engine.
//!
//! Everything here is deterministic given its inputs, with one deliberate
//! exception: [`envelope::seal`] consumes operating-system randomness for the
//! ephemeral key and nonce of an outgoing envelope. That randomness flows
//! only into outputs, never into stored state or branching, so replaying the
//! engine yields byte-identical state even though output ciphertexts differ.

pub mod canonical;
pub mod did;
pub mod encoding;
pub mod envelope;
pub mod hash;
pub mod jws;

pub use lcore_types::error::CryptoError;
