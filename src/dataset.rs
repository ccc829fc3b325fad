// Copyright 2025 Memophor Labs
// SPDX-License-Identifier: Apache-2.0

//! Data set facade: configuration plus a storage handle.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;

use crate::error::RecordError;
use crate::model::DataSetMetadata;
use crate::pipeline::{finalize, RecordPipeline};
use crate::query::QueryArgs;
use crate::record::Record;
use crate::staleness::StalenessResult;
use crate::store::{Store, StoreError};

const REALTIME_CACHE_SECONDS: u32 = 120;
const DEFAULT_CACHE_SECONDS: u32 = 1800;

#[derive(Debug, Error)]
pub enum AppendError {
    #[error("{} record validation error(s)", .0.len())]
    Invalid(Vec<RecordError>),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone)]
pub struct DataSet {
    metadata: DataSetMetadata,
    store: Arc<dyn Store>,
}

impl DataSet {
    pub fn new(metadata: DataSetMetadata, store: Arc<dyn Store>) -> Self {
        Self { metadata, store }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn is_queryable(&self) -> bool {
        self.metadata.queryable
    }

    pub fn is_published(&self) -> bool {
        self.metadata.published
    }

    pub fn allow_raw_queries(&self) -> bool {
        self.metadata.allow_raw_queries
    }

    pub fn bearer_token(&self) -> &str {
        &self.metadata.bearer_token
    }

    pub fn capped_size(&self) -> i64 {
        self.metadata.capped_size
    }

    /// Seconds clients may cache read responses for.
    pub fn cache_duration(&self) -> u32 {
        if self.metadata.realtime {
            REALTIME_CACHE_SECONDS
        } else {
            DEFAULT_CACHE_SECONDS
        }
    }

    pub async fn is_stale(&self) -> Result<StalenessResult, StoreError> {
        let last_updated = self.store.last_updated(self.name()).await?;
        Ok(StalenessResult::evaluate(
            self.metadata.max_expected_age,
            last_updated,
            Utc::now(),
        ))
    }

    /// Validate and store a batch. Nothing is written unless every record
    /// in the batch is valid. Returns the number of records written.
    pub async fn append(&self, mut records: Vec<Record>) -> Result<usize, AppendError> {
        self.create_if_necessary().await?;

        let errors = RecordPipeline::new(&self.metadata).prepare(&mut records);
        if !errors.is_empty() {
            tracing::debug!(data_set = self.name(), errors = errors.len(), "rejected batch");
            return Err(AppendError::Invalid(errors));
        }

        finalize(&mut records, Utc::now());

        for record in &records {
            self.store.save_record(self.name(), record).await?;
        }

        Ok(records.len())
    }

    /// Remove every record from the data set.
    pub async fn empty(&self) -> Result<(), StoreError> {
        self.create_if_necessary().await?;
        self.store.empty(self.name()).await
    }

    /// Query execution is not implemented; validated queries return no data.
    pub async fn execute(&self, query: &QueryArgs) -> Result<Vec<serde_json::Value>, StoreError> {
        tracing::debug!(data_set = self.name(), args = query.len(), "executing query");
        Ok(Vec::new())
    }

    async fn create_if_necessary(&self) -> Result<(), StoreError> {
        if self.store.exists(self.name()).await? {
            return Ok(());
        }

        tracing::info!(data_set = self.name(), capped_size = self.capped_size(), "creating collection");
        self.store.create(self.name(), self.capped_size()).await
    }
}
