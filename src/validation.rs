// Copyright 2025 Memophor Labs
// SPDX-License-Identifier: Apache-2.0

//! Field-level rules for record keys and values.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::RecordError;
use crate::record::{FieldValue, Record};

pub const ID_FIELD: &str = "_id";
pub const TIMESTAMP_FIELD: &str = "_timestamp";
pub const UPDATED_AT_FIELD: &str = "_updated_at";

fn valid_key() -> &'static Regex {
    static VALID_KEY: OnceLock<Regex> = OnceLock::new();
    VALID_KEY.get_or_init(|| Regex::new(r"^[a-z_][a-z0-9_]+$").expect("valid key pattern"))
}

pub fn is_valid_key(key: &str) -> bool {
    valid_key().is_match(&key.to_lowercase())
}

/// Like [`is_valid_key`] but without case folding. Query filters name stored
/// fields exactly.
pub fn is_lowercase_key(key: &str) -> bool {
    valid_key().is_match(key)
}

pub fn is_internal_key(key: &str) -> bool {
    key.starts_with('_')
}

/// Internal keys the API itself understands.
pub fn is_reserved_key(key: &str) -> bool {
    matches!(key, ID_FIELD | TIMESTAMP_FIELD)
}

pub fn is_valid_value(value: &FieldValue) -> bool {
    !matches!(value, FieldValue::Unsupported(_))
}

pub fn is_valid_id(value: &FieldValue) -> bool {
    match value {
        FieldValue::String(id) => !id.is_empty() && !id.chars().any(char::is_whitespace),
        _ => false,
    }
}

/// Check every key of a record, stopping at the first problem.
pub fn validate_record(record: &Record) -> Result<(), RecordError> {
    for (key, value) in record.iter() {
        if !is_valid_key(key) {
            return Err(RecordError::InvalidKey(key.clone()));
        }

        if is_internal_key(key) && !is_reserved_key(key) {
            return Err(RecordError::UnrecognisedInternalField(key.clone()));
        }

        if !is_valid_value(value) {
            return Err(RecordError::InvalidValue(key.clone()));
        }

        if key == TIMESTAMP_FIELD && value.as_instant().is_none() {
            return Err(RecordError::TimestampNotNormalized);
        }

        if key == ID_FIELD && !is_valid_id(value) {
            return Err(RecordError::InvalidId);
        }
    }

    Ok(())
}
