// Copyright 2025 Memophor Labs
// SPDX-License-Identifier: Apache-2.0

//! Redis-backed [`Store`].
//!
//! Layout per data set:
//! - `datastore:collection:<name>` hash marking the collection, holds `capped_size`
//! - `datastore:records:<name>` hash of JSON records keyed by `_id` or a sequence number
//! - `datastore:seq:<name>` counter for records without an `_id`
//! - `datastore:updated_at:<name>` RFC 3339 time of the latest write

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;

use crate::record::{format_instant, Record};
use crate::store::{Store, StoreError};
use crate::validation::{ID_FIELD, UPDATED_AT_FIELD};

const KEY_PREFIX: &str = "datastore";

#[derive(Clone)]
pub struct RedisStore {
    client: redis::Client,
}

impl RedisStore {
    pub fn new(redis_url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| StoreError::Backend(format!("Failed to create Redis client: {e}")))?;

        Ok(Self { client })
    }

    async fn connection(&self) -> Result<MultiplexedConnection, StoreError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| StoreError::Backend(format!("Redis connection failed: {e}")))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map_err(|e| StoreError::Backend(format!("Redis PING failed: {e}")))?;

        Ok(())
    }
}

fn collection_key(name: &str) -> String {
    format!("{KEY_PREFIX}:collection:{name}")
}

fn records_key(name: &str) -> String {
    format!("{KEY_PREFIX}:records:{name}")
}

fn sequence_key(name: &str) -> String {
    format!("{KEY_PREFIX}:seq:{name}")
}

fn updated_at_key(name: &str) -> String {
    format!("{KEY_PREFIX}:updated_at:{name}")
}

fn command_failed(command: &'static str) -> impl Fn(redis::RedisError) -> StoreError {
    move |e| StoreError::Backend(format!("Redis {command} failed: {e}"))
}

#[async_trait]
impl Store for RedisStore {
    async fn create(&self, name: &str, capped_size: i64) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        let created: bool = conn
            .hset_nx(collection_key(name), "capped_size", capped_size)
            .await
            .map_err(command_failed("HSETNX"))?;

        if created {
            tracing::debug!(name, capped_size, "created redis collection");
        } else {
            tracing::debug!(name, "redis collection already exists");
        }
        Ok(())
    }

    async fn exists(&self, name: &str) -> Result<bool, StoreError> {
        let mut conn = self.connection().await?;
        conn.exists(collection_key(name))
            .await
            .map_err(command_failed("EXISTS"))
    }

    async fn empty(&self, name: &str) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        let keys = vec![records_key(name), sequence_key(name), updated_at_key(name)];
        let deleted: usize = conn.del(&keys[..]).await.map_err(command_failed("DEL"))?;

        tracing::debug!(name, deleted, "emptied redis collection");
        Ok(())
    }

    async fn alive(&self) -> bool {
        match self.ping().await {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(error = %err, "redis health check failed");
                false
            }
        }
    }

    async fn last_updated(&self, name: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = conn
            .get(updated_at_key(name))
            .await
            .map_err(command_failed("GET"))?;

        raw.map(|value| {
            DateTime::parse_from_rfc3339(&value)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| StoreError::Serialization(format!("bad last update for {name}: {e}")))
        })
        .transpose()
    }

    async fn save_record(&self, name: &str, record: &Record) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;

        let exists: bool = conn
            .exists(collection_key(name))
            .await
            .map_err(command_failed("EXISTS"))?;
        if !exists {
            return Err(StoreError::Backend(format!("collection {name} does not exist")));
        }

        let field = match record.get(ID_FIELD).and_then(|id| id.as_str()) {
            Some(id) => format!("id:{id}"),
            None => {
                let seq: u64 = conn
                    .incr(sequence_key(name), 1)
                    .await
                    .map_err(command_failed("INCR"))?;
                format!("seq:{seq}")
            }
        };

        let json = serde_json::to_string(record)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        conn.hset::<_, _, _, ()>(records_key(name), field, json)
            .await
            .map_err(command_failed("HSET"))?;

        if let Some(updated_at) = record.get(UPDATED_AT_FIELD).and_then(|v| v.as_instant()) {
            conn.set::<_, _, ()>(updated_at_key(name), format_instant(&updated_at))
                .await
                .map_err(command_failed("SET"))?;
        }

        Ok(())
    }
}
