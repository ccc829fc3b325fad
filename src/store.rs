// Copyright 2025 Memophor Labs
// SPDX-License-Identifier: Apache-2.0

//! Storage seam for data sets, plus an in-process implementation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::record::Record;
use crate::validation::{ID_FIELD, UPDATED_AT_FIELD};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0}")]
    Backend(String),
    #[error("failed to serialize record: {0}")]
    Serialization(String),
}

/// Operations the datastore needs from its document store. Each data set
/// maps to one named collection.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Store: Send + Sync {
    /// Creating a collection that already exists leaves it untouched.
    async fn create(&self, name: &str, capped_size: i64) -> Result<(), StoreError>;
    async fn exists(&self, name: &str) -> Result<bool, StoreError>;
    async fn empty(&self, name: &str) -> Result<(), StoreError>;
    async fn alive(&self) -> bool;
    async fn last_updated(&self, name: &str) -> Result<Option<DateTime<Utc>>, StoreError>;
    async fn save_record(&self, name: &str, record: &Record) -> Result<(), StoreError>;
}

/// Keeps every collection in memory. Used for local runs and tests.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<HashMap<String, Collection>>>,
}

#[derive(Clone, Default)]
struct Collection {
    capped_size: i64,
    keyed: HashMap<String, Record>,
    unkeyed: Vec<Record>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records currently held for `name`.
    pub async fn count(&self, name: &str) -> usize {
        let guard = self.inner.read().await;
        guard
            .get(name)
            .map(|collection| collection.keyed.len() + collection.unkeyed.len())
            .unwrap_or(0)
    }

    /// Snapshot of the records held for `name`, keyed records first.
    pub async fn records(&self, name: &str) -> Vec<Record> {
        let guard = self.inner.read().await;
        guard
            .get(name)
            .map(|collection| {
                collection
                    .keyed
                    .values()
                    .chain(collection.unkeyed.iter())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub async fn capped_size(&self, name: &str) -> Option<i64> {
        let guard = self.inner.read().await;
        guard.get(name).map(|collection| collection.capped_size)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create(&self, name: &str, capped_size: i64) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        if guard.contains_key(name) {
            return Ok(());
        }
        guard.insert(
            name.to_string(),
            Collection {
                capped_size,
                ..Collection::default()
            },
        );
        tracing::debug!(name, capped_size, "created collection");
        Ok(())
    }

    async fn exists(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.inner.read().await.contains_key(name))
    }

    async fn empty(&self, name: &str) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        if let Some(collection) = guard.get_mut(name) {
            collection.keyed.clear();
            collection.unkeyed.clear();
        }
        Ok(())
    }

    async fn alive(&self) -> bool {
        true
    }

    async fn last_updated(&self, name: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        let guard = self.inner.read().await;
        let Some(collection) = guard.get(name) else {
            return Ok(None);
        };

        Ok(collection
            .keyed
            .values()
            .chain(collection.unkeyed.iter())
            .filter_map(|record| record.get(UPDATED_AT_FIELD).and_then(|v| v.as_instant()))
            .max())
    }

    async fn save_record(&self, name: &str, record: &Record) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        let collection = guard
            .get_mut(name)
            .ok_or_else(|| StoreError::Backend(format!("collection {name} does not exist")))?;

        match record.get(ID_FIELD).and_then(|id| id.as_str()) {
            Some(id) => {
                collection.keyed.insert(id.to_string(), record.clone());
            }
            None => collection.unkeyed.push(record.clone()),
        }

        Ok(())
    }
}
