// Copyright 2025 Memophor Labs
// SPDX-License-Identifier: Apache-2.0

//! Freshness checks for data sets.
//!
//! A data set is stale when its most recent write is older than the
//! `max_age_expected` configured for it. Data sets with no expectation, or
//! that have never been written to, are never stale.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;

use crate::dataset::DataSet;
use crate::model::{ApiResponse, DataSetMetadata};
use crate::record::format_instant;
use crate::store::{Store, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StalenessResult {
    pub max_expected_age: Option<i64>,
    pub last_updated: Option<DateTime<Utc>>,
    pub seconds_out_of_date: i64,
}

impl StalenessResult {
    pub fn evaluate(
        max_expected_age: Option<i64>,
        last_updated: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        let seconds_out_of_date = match (max_expected_age, last_updated) {
            (Some(max_age), Some(last)) => (now - last).num_seconds().saturating_sub(max_age),
            _ => 0,
        };

        Self {
            max_expected_age,
            last_updated,
            seconds_out_of_date,
        }
    }

    pub fn is_stale(&self) -> bool {
        self.seconds_out_of_date > 0
    }
}

/// One published data set that is out of date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaleDataSet {
    pub name: String,
    pub seconds_out_of_date: i64,
    pub last_updated: DateTime<Utc>,
    pub max_age_expected: i64,
}

impl StaleDataSet {
    fn from_result(name: String, result: StalenessResult) -> Option<Self> {
        if !result.is_stale() {
            return None;
        }

        Some(Self {
            name,
            seconds_out_of_date: result.seconds_out_of_date,
            last_updated: result.last_updated?,
            max_age_expected: result.max_expected_age?,
        })
    }

    pub fn detail(&self) -> String {
        format!(
            "name: {}, seconds-out-of-date: {}, last-updated: {}, max-age-expected: {}",
            self.name,
            self.seconds_out_of_date,
            format_instant(&self.last_updated),
            self.max_age_expected
        )
    }
}

/// Aggregate result across all data sets, failures sorted by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StalenessReport {
    pub failures: Vec<StaleDataSet>,
}

impl StalenessReport {
    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn message(&self) -> String {
        match self.failures.len() {
            0 => "All data-sets are in date".to_string(),
            1 => "1 data-set is out of date".to_string(),
            n => format!("{n} data-sets are out of date"),
        }
    }

    pub fn to_response(&self) -> ApiResponse {
        if self.is_ok() {
            return ApiResponse::ok();
        }

        ApiResponse::with_details(
            "not okay",
            Some(self.message()),
            self.failures.iter().map(StaleDataSet::detail).collect(),
        )
    }
}

/// Check every data set concurrently, one task each. Only data sets that
/// are both stale and published count as failures.
pub async fn check_data_sets(
    store: Arc<dyn Store>,
    data_sets: Vec<DataSetMetadata>,
) -> Result<StalenessReport, StoreError> {
    let tasks = data_sets.into_iter().map(|metadata| {
        let data_set = DataSet::new(metadata, store.clone());
        tokio::spawn(async move { check_data_set(data_set).await })
    });

    let mut failures = Vec::new();
    for joined in join_all(tasks).await {
        let outcome = joined.map_err(|e| StoreError::Backend(format!("staleness check aborted: {e}")))?;
        if let Some(failure) = outcome? {
            failures.push(failure);
        }
    }

    failures.sort_by(|a, b| a.name.cmp(&b.name));

    Ok(StalenessReport { failures })
}

async fn check_data_set(data_set: DataSet) -> Result<Option<StaleDataSet>, StoreError> {
    let result = data_set.is_stale().await.map_err(|err| {
        tracing::error!(data_set = data_set.name(), error = %err, "failed to read last update");
        err
    })?;

    if !data_set.is_published() {
        return Ok(None);
    }

    let failure = StaleDataSet::from_result(data_set.name().to_string(), result);
    if let Some(stale) = &failure {
        tracing::info!(
            data_set = %stale.name,
            seconds_out_of_date = stale.seconds_out_of_date,
            "data set is out of date"
        );
    }

    Ok(failure)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, MockStore};
    use crate::record::Record;
    use chrono::Duration;
    use serde_json::json;

    fn thirty_days_ago(now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::days(30)
    }

    #[test]
    fn not_appropriate_without_max_age() {
        let now = Utc::now();
        let result = StalenessResult::evaluate(None, Some(thirty_days_ago(now)), now);
        assert_eq!(result.seconds_out_of_date, 0);
        assert!(!result.is_stale());
    }

    #[test]
    fn not_appropriate_without_last_updated() {
        let result = StalenessResult::evaluate(Some(60), None, Utc::now());
        assert!(!result.is_stale());
    }

    #[test]
    fn stale_when_older_than_max_age() {
        let now = Utc::now();
        let result = StalenessResult::evaluate(Some(8400), Some(thirty_days_ago(now)), now);
        assert_eq!(result.seconds_out_of_date, 2_592_000 - 8400);
        assert!(result.is_stale());
    }

    #[test]
    fn fresh_when_within_max_age() {
        let now = Utc::now();
        let result = StalenessResult::evaluate(Some(3600), Some(now - Duration::minutes(5)), now);
        assert!(result.seconds_out_of_date < 0);
        assert!(!result.is_stale());
    }

    #[test]
    fn exactly_at_max_age_is_not_stale() {
        let now = Utc::now();
        let result = StalenessResult::evaluate(Some(60), Some(now - Duration::seconds(60)), now);
        assert_eq!(result.seconds_out_of_date, 0);
        assert!(!result.is_stale());
    }

    #[test]
    fn extreme_max_age_saturates() {
        let now = Utc::now();
        let result = StalenessResult::evaluate(Some(i64::MIN), Some(now - Duration::seconds(10)), now);
        assert_eq!(result.seconds_out_of_date, i64::MAX);
        assert!(result.is_stale());

        let result = StalenessResult::evaluate(Some(i64::MAX), Some(now - Duration::seconds(10)), now);
        assert!(!result.is_stale());
    }

    fn metadata(name: &str, published: bool, max_age: Option<i64>) -> DataSetMetadata {
        DataSetMetadata {
            name: name.to_string(),
            published,
            max_expected_age: max_age,
            ..DataSetMetadata::default()
        }
    }

    async fn seeded_store(entries: &[(&str, DateTime<Utc>)]) -> MemoryStore {
        let store = MemoryStore::new();
        for (name, updated_at) in entries {
            store.create(name, 0).await.unwrap();
            let mut record = Record::new();
            record.insert("_updated_at", *updated_at);
            store.save_record(name, &record).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn no_data_sets_is_ok() {
        let report = check_data_sets(Arc::new(MemoryStore::new()), Vec::new()).await.unwrap();
        assert!(report.is_ok());
        assert_eq!(serde_json::to_value(report.to_response()).unwrap(), json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn one_stale_published_data_set() {
        let now = Utc::now();
        let store = seeded_store(&[("the-stale-one", thirty_days_ago(now)), ("fresh", now)]).await;

        let report = check_data_sets(
            Arc::new(store),
            vec![
                metadata("fresh", true, Some(8400)),
                metadata("the-stale-one", true, Some(8400)),
            ],
        )
        .await
        .unwrap();

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].name, "the-stale-one");
        assert!(report.failures[0].seconds_out_of_date >= 2_592_000 - 8400);

        let response = report.to_response();
        assert_eq!(response.status, "not okay");
        assert_eq!(response.message.as_deref(), Some("1 data-set is out of date"));
        assert_eq!(response.errors.len(), 1);
        assert!(response.errors[0]
            .detail
            .starts_with("name: the-stale-one, seconds-out-of-date: "));
        assert!(response.errors[0].detail.ends_with("max-age-expected: 8400"));
    }

    #[tokio::test]
    async fn unpublished_and_unconfigured_data_sets_are_ignored() {
        let now = Utc::now();
        let long_ago = thirty_days_ago(now);
        let store = seeded_store(&[("draft", long_ago), ("no-expectation", long_ago)]).await;

        let report = check_data_sets(
            Arc::new(store),
            vec![
                metadata("draft", false, Some(60)),
                metadata("no-expectation", true, None),
                metadata("never-written", true, Some(60)),
            ],
        )
        .await
        .unwrap();

        assert!(report.is_ok());
    }

    #[tokio::test]
    async fn failures_are_sorted_by_name() {
        let long_ago = thirty_days_ago(Utc::now());
        let store = seeded_store(&[("zebra", long_ago), ("aardvark", long_ago), ("mole", long_ago)]).await;

        let report = check_data_sets(
            Arc::new(store),
            vec![
                metadata("zebra", true, Some(8400)),
                metadata("mole", true, Some(8400)),
                metadata("aardvark", true, Some(8400)),
            ],
        )
        .await
        .unwrap();

        let names: Vec<&str> = report.failures.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["aardvark", "mole", "zebra"]);
        assert_eq!(report.message(), "3 data-sets are out of date");
    }

    #[tokio::test]
    async fn storage_failure_fails_the_report() {
        let mut store = MockStore::new();
        store
            .expect_last_updated()
            .returning(|_| Err(StoreError::Backend("connection refused".into())));

        let err = check_data_sets(Arc::new(store), vec![metadata("ds", true, Some(60))])
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "connection refused");
    }
}
