use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::import::EngineOptions;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub data_dir: PathBuf,
    pub host: String,
    pub port: u16,
    pub engine: EngineOptions,
}

impl Config {
    /// Reads the process environment, after `.env` has been loaded.
    pub fn from_env() -> Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let data_dir = PathBuf::from(env::var("DATA_DIR").context("DATA_DIR must be set")?);

        let host = env::var("QUARRY_HOST").unwrap_or("0.0.0.0".to_string());
        let port = match env::var("QUARRY_PORT") {
            Ok(port) => port
                .parse()
                .with_context(|| format!("QUARRY_PORT is not a valid port: {port}"))?,
            Err(_) => 8000,
        };

        let mut engine = EngineOptions::default();
        if let Ok(ms) = env::var("QUARRY_CANCEL_POLL_MS") {
            let ms: u64 = ms
                .parse()
                .with_context(|| format!("QUARRY_CANCEL_POLL_MS is not a number: {ms}"))?;
            engine.cancel_poll_interval = Duration::from_millis(ms);
        }

        Ok(Config {
            database_url,
            data_dir,
            host,
            port,
            engine,
        })
    }

    pub fn upload_dir(&self) -> PathBuf {
        self.data_dir.join("uploads")
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
