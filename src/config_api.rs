// Copyright 2025 Memophor Labs
// SPDX-License-Identifier: Apache-2.0

//! Client for the data set configuration API.
//!
//! Metadata is fetched per request and never cached here. Transient
//! upstream failures (connection errors, 502, 503) are retried with
//! exponential backoff inside a bounded time budget.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::time::Instant;

use crate::config::ConfigApiConfig;
use crate::model::DataSetMetadata;

const USER_AGENT: &str = "Performance-Platform-Client/1.0";
const INITIAL_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("config API request failed: {0}")]
    Request(String),
    #[error("config API returned unexpected status {0}")]
    Status(StatusCode),
    #[error("failed to parse config API response: {0}")]
    Decode(String),
}

/// Source of data set metadata.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConfigSource: Send + Sync {
    async fn data_set(&self, name: &str) -> Result<DataSetMetadata, ConfigError>;
    async fn data_type(&self, group: &str, data_type: &str)
        -> Result<DataSetMetadata, ConfigError>;
    async fn list_data_sets(&self) -> Result<Vec<DataSetMetadata>, ConfigError>;
}

/// HTTP implementation of [`ConfigSource`].
#[derive(Clone)]
pub struct HttpConfigSource {
    base_url: String,
    bearer_token: String,
    max_elapsed: Duration,
    client: Client,
}

impl HttpConfigSource {
    pub fn try_new(config: ConfigApiConfig) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ConfigError::Request(format!("failed to build client: {e}")))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            bearer_token: config.bearer_token,
            max_elapsed: config.max_elapsed,
            client,
        })
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.bearer_token)
            .header(reqwest::header::ACCEPT, "application/json")
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        what: &str,
        request: RequestBuilder,
    ) -> Result<T, ConfigError> {
        let response = self.send_with_backoff(request).await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(ConfigError::NotFound(what.to_string()));
        }

        if !status.is_success() {
            tracing::error!(%status, what, "config API returned an error");
            return Err(ConfigError::Status(status));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ConfigError::Decode(e.to_string()))
    }

    async fn send_with_backoff(&self, request: RequestBuilder) -> Result<Response, ConfigError> {
        let started = Instant::now();
        let mut delay = INITIAL_BACKOFF;

        loop {
            let attempt = request
                .try_clone()
                .ok_or_else(|| ConfigError::Request("request cannot be retried".to_string()))?;

            let failure = match attempt.send().await {
                Ok(response) if !is_retryable(response.status()) => return Ok(response),
                Ok(response) => ConfigError::Status(response.status()),
                Err(e) => ConfigError::Request(e.to_string()),
            };

            if started.elapsed() + delay > self.max_elapsed {
                return Err(failure);
            }

            tracing::debug!(error = %failure, delay_ms = delay.as_millis() as u64, "retrying config API request");
            tokio::time::sleep(delay).await;
            delay *= 2;
        }
    }
}

fn is_retryable(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE
    )
}

#[async_trait]
impl ConfigSource for HttpConfigSource {
    async fn data_set(&self, name: &str) -> Result<DataSetMetadata, ConfigError> {
        let request = self.get(&format!("/data-sets/{name}"));
        self.fetch(&format!("data_set {name}"), request).await
    }

    async fn data_type(
        &self,
        group: &str,
        data_type: &str,
    ) -> Result<DataSetMetadata, ConfigError> {
        let what = format!("data_set for {group}/{data_type}");
        let request = self
            .get("/data-sets")
            .query(&[("data-group", group), ("data-type", data_type)]);

        let matches: Vec<DataSetMetadata> = self.fetch(&what, request).await?;
        matches
            .into_iter()
            .next()
            .ok_or(ConfigError::NotFound(what))
    }

    async fn list_data_sets(&self) -> Result<Vec<DataSetMetadata>, ConfigError> {
        let request = self.get("/data-sets");
        self.fetch("data_sets", request).await
    }
}
