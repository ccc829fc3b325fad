// Copyright 2025 Memophor Labs
// SPDX-License-Identifier: Apache-2.0

//! Deterministic `_id` generation from configured record fields.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::error::RecordError;
use crate::record::Record;
use crate::validation::ID_FIELD;

/// Derive the id for `record` from the named fields.
pub fn generate_id(record: &Record, auto_ids: &[String]) -> Result<String, RecordError> {
    let missing: Vec<String> = auto_ids
        .iter()
        .filter(|field| !record.contains_key(field))
        .cloned()
        .collect();

    if !missing.is_empty() {
        return Err(RecordError::MissingIdFields(missing));
    }

    let joined = auto_ids
        .iter()
        .filter_map(|field| record.get(field))
        .map(|value| value.id_component())
        .collect::<Vec<_>>()
        .join(".");

    Ok(BASE64.encode(joined.as_bytes()))
}

/// Set `_id` on the record when auto ids are configured, overwriting any
/// id the client supplied.
pub fn apply_auto_id(record: &mut Record, auto_ids: &[String]) -> Result<(), RecordError> {
    if auto_ids.is_empty() {
        return Ok(());
    }

    let id = generate_id(record, auto_ids)?;
    record.insert(ID_FIELD, id);
    Ok(())
}
