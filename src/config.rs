//! Server configuration: an embedded default TOML, an optional
//! `config/local.toml`, then `CANVAS_`-prefixed environment variables,
//! highest priority last — the same three-source layering this codebase's
//! other binaries use. `PORT` and `CORS_ORIGINS` are additionally read as
//! plain, unprefixed env vars on top of the layered config, since callers
//! expect them undecorated.

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use canvas_media::MediaConfig;

use crate::middleware::rate_limit::RateLimitSettings;

/// Embedded default configuration, compiled into the binary.
const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanvasServerConfig {
    pub server: ServerSettings,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub rate_limit: RateLimitSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            cors_origins: Vec::new(),
        }
    }
}

/// Where persisted state lives on disk: the sqlite file and the media
/// directories are siblings of it unless `MediaConfig` overrides them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub database_path: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            database_path: "database/canvas.db".to_string(),
        }
    }
}

/// Load configuration from the embedded default, `config/local.toml`, and
/// `CANVAS_`-prefixed environment variables, then apply the `PORT` /
/// `CORS_ORIGINS` compatibility overrides.
pub fn load() -> Result<CanvasServerConfig> {
    let built = Config::builder()
        .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
        .add_source(File::with_name("config/local").required(false))
        .add_source(
            Environment::with_prefix("CANVAS")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .context("failed to build configuration")?;

    let mut config: CanvasServerConfig =
        built.try_deserialize().context("failed to deserialize configuration")?;

    if let Ok(port) = std::env::var("PORT") {
        config.server.port = port.parse().context("PORT must be a valid u16")?;
    }
    if let Ok(origins) = std::env::var("CORS_ORIGINS") {
        config.server.cors_origins = origins.split(',').map(|s| s.trim().to_string()).collect();
    }

    Ok(config)
}
