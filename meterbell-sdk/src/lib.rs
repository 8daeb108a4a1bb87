//! Shared types for meterbell.
//!
//! Everything that crosses a process boundary lives here: the entitlement
//! snapshot consumed by the evaluator, the rule configuration it reads, the
//! notification payloads it writes, and the signature scheme of the ingest
//! API. The optional `client` feature adds a typed HTTP client.

#![forbid(unsafe_code)]

pub mod objects;
pub mod signature;

#[cfg(feature = "client")]
pub mod client;
