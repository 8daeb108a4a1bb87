//! HTTP API.

pub mod extractors;
pub mod ingest;
