//! Persistence backends for the dispatch store

pub mod memory;
pub mod postgres;

use std::time::Duration;

/// Database connection configuration.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connection_timeout: Duration,
}

impl DatabaseConfig {
    pub fn new(url: String, max_connections: u32, connection_timeout: Duration) -> Self {
        Self {
            url,
            max_connections,
            connection_timeout,
        }
    }
}
