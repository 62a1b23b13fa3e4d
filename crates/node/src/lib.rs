#![forbid(unsafe_code)]

//! Rollup guest plumbing for the L-Core attestation engine: the request
//! router, the HTTP client for the host's `/finish`-`/notice`-`/report`-
//! `/voucher` surface, and the voucher ABI helper.

pub mod rollup;
pub mod router;
pub mod voucher;
