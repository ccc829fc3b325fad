// Copyright 2025 Memophor Labs
// SPDX-License-Identifier: Apache-2.0

//! Prometheus metrics for the datastore.
//!
//! Tracks write traffic, batch outcomes, storage health and config API latency.

use prometheus::{Histogram, HistogramOpts, IntCounter, IntGauge, Opts, Registry};
use std::sync::Arc;

use crate::error::AppError;

fn metric_error(e: prometheus::Error) -> AppError {
    AppError::Internal(anyhow::anyhow!("Failed to create metric: {}", e))
}

/// Metrics collector for the datastore
#[derive(Clone)]
pub struct Metrics {
    pub registry: Arc<Registry>,

    // Write metrics
    pub write_requests: IntCounter,
    pub rejected_batches: IntCounter,
    pub records_stored: IntCounter,
    pub storage_failures: IntCounter,

    // Freshness
    pub stale_data_sets: IntGauge,

    // Config API
    pub config_fetch_latency: Histogram,
}

impl Metrics {
    pub fn new() -> Result<Self, AppError> {
        let registry = Registry::new();

        let write_requests = IntCounter::with_opts(Opts::new(
            "datastore_write_requests_total",
            "Total number of POST and PUT requests against data sets",
        ))
        .map_err(metric_error)?;

        let rejected_batches = IntCounter::with_opts(Opts::new(
            "datastore_rejected_batches_total",
            "Total number of batches rejected by validation",
        ))
        .map_err(metric_error)?;

        let records_stored = IntCounter::with_opts(Opts::new(
            "datastore_records_stored_total",
            "Total number of records written to storage",
        ))
        .map_err(metric_error)?;

        let storage_failures = IntCounter::with_opts(Opts::new(
            "datastore_storage_failures_total",
            "Total number of storage operations that resulted in an error",
        ))
        .map_err(metric_error)?;

        let stale_data_sets = IntGauge::with_opts(Opts::new(
            "datastore_stale_data_sets",
            "Published data sets out of date at the last freshness check",
        ))
        .map_err(metric_error)?;

        let config_fetch_latency = Histogram::with_opts(
            HistogramOpts::new(
                "datastore_config_fetch_latency_seconds",
                "Duration of config API lookups in seconds",
            )
            .buckets(vec![
                0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.0, 5.0,
            ]),
        )
        .map_err(metric_error)?;

        registry
            .register(Box::new(write_requests.clone()))
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to register metric: {}", e)))?;
        registry
            .register(Box::new(rejected_batches.clone()))
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to register metric: {}", e)))?;
        registry
            .register(Box::new(records_stored.clone()))
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to register metric: {}", e)))?;
        registry
            .register(Box::new(storage_failures.clone()))
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to register metric: {}", e)))?;
        registry
            .register(Box::new(stale_data_sets.clone()))
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to register metric: {}", e)))?;
        registry
            .register(Box::new(config_fetch_latency.clone()))
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to register metric: {}", e)))?;

        Ok(Self {
            registry: Arc::new(registry),
            write_requests,
            rejected_batches,
            records_stored,
            storage_failures,
            stale_data_sets,
            config_fetch_latency,
        })
    }

    pub fn record_write_request(&self) {
        self.write_requests.inc();
    }

    pub fn record_rejected_batch(&self) {
        self.rejected_batches.inc();
    }

    pub fn record_stored(&self, count: usize) {
        self.records_stored.inc_by(count as u64);
    }

    pub fn record_storage_failure(&self) {
        self.storage_failures.inc();
    }

    pub fn update_stale_data_sets(&self, count: usize) {
        self.stale_data_sets.set(count as i64);
    }

    /// Observe latency for a config API lookup in seconds
    pub fn record_config_fetch(&self, seconds: f64) {
        self.config_fetch_latency.observe(seconds);
    }

    /// Export metrics in Prometheus format
    pub fn export(&self) -> Result<String, AppError> {
        use prometheus::Encoder;

        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to encode metrics: {}", e)))?;

        String::from_utf8(buffer).map_err(|e| {
            AppError::Internal(anyhow::anyhow!(
                "Failed to convert metrics to string: {}",
                e
            ))
        })
    }
}
