// Copyright 2025 Memophor Labs
// SPDX-License-Identifier: Apache-2.0

//! Ingest pipeline applied to a batch before anything is persisted.
//!
//! Stages run in a fixed order and every stage runs even when an earlier
//! one reported problems, so a client sees all errors for a batch at once:
//!
//! 1. schema validation
//! 2. automatic `_id` generation
//! 3. `_timestamp` normalization
//! 4. per-record key/value validation
//!
//! Only a batch with no errors is enriched with period buckets and
//! `_updated_at` by [`finalize`].

use chrono::{DateTime, Utc};

use crate::auto_id::apply_auto_id;
use crate::error::RecordError;
use crate::model::DataSetMetadata;
use crate::period::Period;
use crate::record::Record;
use crate::schema;
use crate::timestamp::normalize_timestamp;
use crate::validation::{validate_record, TIMESTAMP_FIELD, UPDATED_AT_FIELD};

pub struct RecordPipeline<'a> {
    metadata: &'a DataSetMetadata,
}

impl<'a> RecordPipeline<'a> {
    pub fn new(metadata: &'a DataSetMetadata) -> Self {
        Self { metadata }
    }

    /// Run every validation stage, returning all errors found.
    pub fn prepare(&self, records: &mut [Record]) -> Vec<RecordError> {
        let mut errors = Vec::new();

        self.validate_against_schema(records, &mut errors);
        self.process_auto_ids(records, &mut errors);
        self.parse_timestamps(records, &mut errors);
        self.validate_records(records, &mut errors);

        errors
    }

    pub fn validate_against_schema(&self, records: &[Record], errors: &mut Vec<RecordError>) {
        schema::validate_records(
            &self.metadata.name,
            self.metadata.schema.as_ref(),
            records,
            errors,
        );
    }

    pub fn process_auto_ids(&self, records: &mut [Record], errors: &mut Vec<RecordError>) {
        let auto_ids = &self.metadata.auto_ids;
        if auto_ids.is_empty() || records.is_empty() {
            return;
        }

        for record in records.iter_mut() {
            if let Err(err) = apply_auto_id(record, auto_ids) {
                errors.push(err);
            }
        }
    }

    pub fn parse_timestamps(&self, records: &mut [Record], errors: &mut Vec<RecordError>) {
        for record in records.iter_mut() {
            if let Err(err) = normalize_timestamp(record) {
                errors.push(err);
            }
        }
    }

    pub fn validate_records(&self, records: &[Record], errors: &mut Vec<RecordError>) {
        for record in records {
            if let Err(err) = validate_record(record) {
                errors.push(err);
            }
        }
    }
}

/// Add period bucket fields derived from `_timestamp`, if present.
pub fn add_period_data(record: &mut Record) {
    let Some(timestamp) = record.get(TIMESTAMP_FIELD).and_then(|v| v.as_instant()) else {
        return;
    };

    for period in Period::ALL {
        record.insert(period.field_name(), period.value(timestamp));
    }
}

/// Enrich a validated batch just before it is written.
pub fn finalize(records: &mut [Record], now: DateTime<Utc>) {
    for record in records.iter_mut() {
        add_period_data(record);
        record.insert(UPDATED_AT_FIELD, now);
    }
}
