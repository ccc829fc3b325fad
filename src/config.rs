// Copyright 2025 Memophor Labs
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};

pub struct AppConfig {
    pub listen_addr: SocketAddr,
    pub config_api: ConfigApiConfig,
    pub redis_url: Option<String>,
    pub log_json: bool,
}

/// Connection settings for the data set config API.
#[derive(Debug, Clone)]
pub struct ConfigApiConfig {
    pub base_url: String,
    pub bearer_token: String,
    pub timeout: Duration,
    /// Total time allowed for retries of one request.
    pub max_elapsed: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let listen_addr: SocketAddr = env::var("DATASTORE_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
            .parse()
            .context("invalid DATASTORE_ADDR")?;

        let config_api = ConfigApiConfig {
            base_url: env::var("DATASTORE_CONFIG_API_URL")
                .unwrap_or_else(|_| "http://localhost:3204".to_string()),
            bearer_token: env::var("DATASTORE_CONFIG_API_TOKEN").unwrap_or_default(),
            timeout: parse_duration("DATASTORE_CONFIG_API_TIMEOUT_SECONDS", 5)?,
            max_elapsed: parse_duration("DATASTORE_CONFIG_API_MAX_ELAPSED_SECONDS", 5)?,
        };

        let redis_url = env::var("DATASTORE_REDIS_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());

        let log_json = parse_bool("DATASTORE_LOG_JSON", false)?;

        Ok(Self {
            listen_addr,
            config_api,
            redis_url,
            log_json,
        })
    }

    pub fn listen_addr(&self) -> SocketAddr {
        self.listen_addr
    }
}

fn parse_duration(env_key: &str, default_secs: u64) -> Result<Duration> {
    let raw = env::var(env_key).unwrap_or_else(|_| default_secs.to_string());
    let secs: u64 = raw
        .parse()
        .with_context(|| format!("{env_key} must be an integer number of seconds"))?;

    Ok(Duration::from_secs(secs))
}

fn parse_bool(env_key: &str, default: bool) -> Result<bool> {
    match env::var(env_key) {
        Ok(raw) => raw
            .trim()
            .to_lowercase()
            .parse()
            .with_context(|| format!("{env_key} must be true or false")),
        Err(_) => Ok(default),
    }
}
