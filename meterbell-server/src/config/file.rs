//! TOML file configuration structures.
//!
//! These structs directly map to the `meterbell.toml` file format.

use meterbell_core::events::DEFAULT_CHANNEL_BUFFER;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub ingest: IngestConfig,
    #[serde(default)]
    pub consumer: ConsumerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

/// Server configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The address and port to listen on (e.g., "0.0.0.0:8080").
    #[serde(default = "default_listen_addr")]
    pub listen: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

/// Snapshot ingest configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Secret shared with snapshot producers for signing request bodies.
    pub secret: String,
}

/// Snapshot consumer configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerConfig {
    /// Capacity of the snapshot queue between the API and the consumer.
    #[serde(default = "default_channel_buffer")]
    pub channel_buffer: usize,
    /// Redeliveries of a snapshot after storage failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            channel_buffer: default_channel_buffer(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_channel_buffer() -> usize {
    DEFAULT_CHANNEL_BUFFER
}

fn default_max_retries() -> u32 {
    5
}

/// Database configuration section.
///
/// The connection URL itself comes from `DATABASE_URL`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
        }
    }
}

fn default_max_connections() -> u32 {
    10
}
