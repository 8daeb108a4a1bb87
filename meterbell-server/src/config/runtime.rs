//! Runtime configuration, built from the file configuration after validation.

use std::net::SocketAddr;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen: SocketAddr,
}

/// Ingest API settings.
#[derive(Clone)]
pub struct IngestConfig {
    secret: Box<[u8]>,
}

impl IngestConfig {
    pub fn new(secret: Box<[u8]>) -> Self {
        Self { secret }
    }

    pub fn secret_bytes(&self) -> &[u8] {
        &self.secret
    }
}

impl std::fmt::Debug for IngestConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestConfig")
            .field("secret", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ConsumerConfig {
    pub channel_buffer: usize,
    pub max_retries: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct DatabaseConfig {
    pub max_connections: u32,
}
