// Copyright 2025 Memophor Labs
// SPDX-License-Identifier: Apache-2.0

//! JSON Schema validation of inbound records.
//!
//! Schemas are draft-04 documents attached to the data set configuration.
//! `format` keywords are advisory: `_timestamp` format is enforced by the
//! timestamp normalizer instead.

use jsonschema::{Draft, JSONSchema};

use crate::error::RecordError;
use crate::record::Record;

pub struct SchemaValidator {
    compiled: JSONSchema,
}

impl SchemaValidator {
    /// Compile `schema`. `data_set` only appears in the error message.
    pub fn compile(data_set: &str, schema: &serde_json::Value) -> Result<Self, RecordError> {
        let compiled = JSONSchema::options()
            .with_draft(Draft::Draft4)
            .should_validate_formats(false)
            .compile(schema)
            .map_err(|err| RecordError::InvalidSchema {
                name: data_set.to_string(),
                reason: err.to_string(),
            })?;

        Ok(Self { compiled })
    }

    /// Every failure for one record, in the order the validator reports them.
    pub fn validate(&self, record: &Record) -> Vec<RecordError> {
        let instance = record.to_json();
        let errors = match self.compiled.validate(&instance) {
            Ok(()) => Vec::new(),
            Err(errors) => errors
                .map(|err| RecordError::Schema(err.to_string()))
                .collect(),
        };
        errors
    }
}

/// Validate a batch against an optional schema, appending to `errors`.
pub fn validate_records(
    data_set: &str,
    schema: Option<&serde_json::Value>,
    records: &[Record],
    errors: &mut Vec<RecordError>,
) {
    let Some(schema) = schema else {
        return;
    };

    let validator = match SchemaValidator::compile(data_set, schema) {
        Ok(validator) => validator,
        Err(err) => {
            tracing::warn!(data_set, error = %err, "data set schema failed to compile");
            errors.push(err);
            return;
        }
    };

    for record in records {
        errors.extend(validator.validate(record));
    }
}
