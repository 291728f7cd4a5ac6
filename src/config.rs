//! Server configuration loaded from the environment
//!
//! Values come from environment variables, optionally seeded from a `.env`
//! file. `CHARTER_DATABASE_URL` is the only required setting.

use anyhow::Context;
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    pub db_connect_timeout: Duration,
    pub bind_address: SocketAddr,
    pub reaper_enabled: bool,
    pub reaper_silence: Duration,
    pub reaper_interval: Duration,
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("CHARTER_DATABASE_URL")
            .context("CHARTER_DATABASE_URL must be set")?;

        let db_max_connections = env_parse("CHARTER_DB_MAX_CONNECTIONS", 10)?;
        let db_connect_timeout =
            Duration::from_secs(env_parse("CHARTER_DB_CONNECT_TIMEOUT_SECS", 5)?);

        let bind_address: SocketAddr = std::env::var("CHARTER_BIND_ADDRESS")
            .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
            .parse()
            .context("CHARTER_BIND_ADDRESS is not a valid socket address")?;

        // The reaper stays off unless explicitly enabled; contracts do not
        // expire on their own.
        let reaper_enabled = env_parse("CHARTER_REAPER_ENABLED", false)?;
        let reaper_silence = Duration::from_secs(env_parse("CHARTER_REAPER_SILENCE_SECS", 300)?);
        let reaper_interval = Duration::from_secs(env_parse("CHARTER_REAPER_INTERVAL_SECS", 30)?);

        Ok(Self {
            database_url,
            db_max_connections,
            db_connect_timeout,
            bind_address,
            reaper_enabled,
            reaper_silence,
            reaper_interval,
        })
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> anyhow::Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(value) => value
            .parse()
            .with_context(|| format!("{} has an invalid value: {}", name, value)),
        Err(_) => Ok(default),
    }
}
