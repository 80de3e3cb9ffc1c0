use crate::error::AppError;
use config::{Config as Cfg, File};
use serde::Deserialize;

/// Settings shared by every service in the workspace. Service-specific
/// settings live in each service's own config module; this only carries
/// what the common bootstrap needs.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// HTTP listen port. Port 0 asks the OS for a free port, which the
    /// test harnesses rely on.
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    8080
}

impl Config {
    /// Load from an optional `configuration` file, overridden by `APP__*`
    /// environment variables. `.env` is read first for local development.
    pub fn load() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let config = Cfg::builder()
            .add_source(File::with_name("configuration").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        Ok(config.try_deserialize()?)
    }
}
