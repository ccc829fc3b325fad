// Copyright 2025 Memophor Labs
// SPDX-License-Identifier: Apache-2.0

//! `_timestamp` parsing.

use std::sync::OnceLock;

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;

use crate::error::RecordError;
use crate::record::{FieldValue, Record};
use crate::validation::TIMESTAMP_FIELD;

// Layouts accepted after RFC3339, in order. `%.f` also matches when there is
// no fractional part.
const NAIVE_LAYOUT: &str = "%Y-%m-%dT%H:%M:%S%.f";
const SPACED_OFFSET_LAYOUT: &str = "%Y-%m-%dT%H:%M:%S%.f %:z";

// chrono is lenient about separators, letter case and offset colons, so each
// layout is matched on its exact shape first.
const DATE_TIME: &str = r"\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:[0-5]\d(\.\d+)?";

struct Shapes {
    rfc3339: Regex,
    naive: Regex,
    spaced_offset: Regex,
}

fn shapes() -> &'static Shapes {
    static SHAPES: OnceLock<Shapes> = OnceLock::new();
    SHAPES.get_or_init(|| Shapes {
        rfc3339: Regex::new(&format!(r"^{DATE_TIME}(Z|[+-]\d{{2}}:\d{{2}})$"))
            .expect("rfc3339 pattern"),
        naive: Regex::new(&format!("^{DATE_TIME}$")).expect("naive pattern"),
        spaced_offset: Regex::new(&format!(r"^{DATE_TIME} [+-]\d{{2}}:\d{{2}}$"))
            .expect("spaced offset pattern"),
    })
}

/// Parse an ISO8601-ish datetime string into UTC.
pub fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let shapes = shapes();

    if shapes.rfc3339.is_match(raw) {
        return DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|parsed| parsed.with_timezone(&Utc));
    }

    if shapes.naive.is_match(raw) {
        return NaiveDateTime::parse_from_str(raw, NAIVE_LAYOUT)
            .ok()
            .map(|naive| naive.and_utc());
    }

    if shapes.spaced_offset.is_match(raw) {
        return DateTime::parse_from_str(raw, SPACED_OFFSET_LAYOUT)
            .ok()
            .map(|parsed| parsed.with_timezone(&Utc));
    }

    None
}

/// Replace a record's `_timestamp` with a parsed instant. The raw value is
/// left in place when it cannot be parsed.
pub fn normalize_timestamp(record: &mut Record) -> Result<(), RecordError> {
    let parsed = match record.get(TIMESTAMP_FIELD) {
        None => return Ok(()),
        Some(FieldValue::Instant(_)) => return Ok(()),
        Some(FieldValue::String(raw)) => parse_datetime(raw),
        Some(_) => None,
    };

    match parsed {
        Some(instant) => {
            record.insert(TIMESTAMP_FIELD, instant);
            Ok(())
        }
        None => Err(RecordError::InvalidTimestamp),
    }
}
