use std::{fs, path::Path};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    #[serde(default)]
    pub server: Server,
    #[serde(default)]
    pub auth: Auth,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Server {
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for Server {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            port: default_port(),
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Auth {
    pub admin_token: Option<String>,
    pub sub_token: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: String,
    #[serde(default)]
    pub reject_duplicate_links: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            reject_duplicate_links: false,
        }
    }
}

fn default_store_path() -> String {
    "nodes.json".to_string()
}

impl Config {
    /// Overlay `ADMIN_TOKEN`, `SUB_TOKEN`, `DATA_FILE` and `PORT`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup("ADMIN_TOKEN") {
            self.auth.admin_token = Some(token);
        }
        if let Some(token) = lookup("SUB_TOKEN") {
            self.auth.sub_token = Some(token);
        }
        if let Some(path) = lookup("DATA_FILE").filter(|p| !p.trim().is_empty()) {
            self.store.path = path;
        }
        if let Some(port) = lookup("PORT") {
            self.server.port = port
                .trim()
                .parse()
                .with_context(|| format!("invalid PORT value `{port}`"))?;
        }
        Ok(())
    }
}

pub fn parse_config(text: &str) -> Result<Config> {
    let config: Config = toml::from_str(text)?;
    Ok(config)
}

/// Read the config file if present, then apply environment overrides.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    let mut config = if path.exists() {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        parse_config(&text)
            .with_context(|| format!("failed to parse config file {}", path.display()))?
    } else {
        warn!(path = %path.display(), "config file not found, using defaults");
        Config::default()
    };
    config.apply_env(|key| std::env::var(key).ok())?;
    Ok(config)
}
