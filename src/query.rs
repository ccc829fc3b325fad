// Copyright 2025 Memophor Labs
// SPDX-License-Identifier: Apache-2.0

//! Validation of read query arguments.
//!
//! Checks run in a fixed order and the first failure is reported. Data
//! sets that do not allow raw queries get extra checks that keep reads
//! aligned to whole days, weeks and months.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use regex::Regex;
use thiserror::Error;

use crate::period::Period;
use crate::timestamp::parse_datetime;
use crate::validation::{is_internal_key, is_lowercase_key, is_valid_key};

const MINIMUM_SPAN_DAYS: i64 = 7;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct QueryError(pub String);

impl QueryError {
    fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Multi-valued query string arguments, in request order per name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryArgs(BTreeMap<String, Vec<String>>);

impl QueryArgs {
    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.0.get(name).map(Vec::as_slice)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn first(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|values| values.first()).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for QueryArgs {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut args = BTreeMap::<String, Vec<String>>::new();
        for (name, value) in iter {
            args.entry(name.into()).or_default().push(value.into());
        }
        Self(args)
    }
}

pub fn validate_request_args(args: &QueryArgs, allow_raw_queries: bool) -> Result<(), QueryError> {
    validate_datetime(args, "start_at")?;
    validate_datetime(args, "end_at")?;
    validate_filter_by(args)?;
    validate_sort_by(args)?;
    validate_positive_integer(args, "limit")?;
    validate_group_by(args)?;
    validate_collect(args)?;
    validate_duration(args)?;
    validate_positive_integer(args, "duration")?;
    validate_period(args)?;

    if allow_raw_queries {
        return Ok(());
    }

    validate_midnight(args, "start_at")?;
    validate_midnight(args, "end_at")?;
    validate_timespan(args)?;
    validate_period_start(args, "start_at")?;
    validate_period_start(args, "end_at")
}

fn datetime_shape() -> &'static Regex {
    static SHAPE: OnceLock<Regex> = OnceLock::new();
    SHAPE.get_or_init(|| {
        Regex::new(r"\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}").expect("datetime shape pattern")
    })
}

fn validate_datetime(args: &QueryArgs, name: &str) -> Result<(), QueryError> {
    let Some(values) = args.get(name) else {
        return Ok(());
    };

    if values.iter().any(|v| !datetime_shape().is_match(v)) {
        return Err(QueryError::new(format!("{name} is not a valid datetime")));
    }
    Ok(())
}

fn validate_filter_by(args: &QueryArgs) -> Result<(), QueryError> {
    let Some(values) = args.get("filter_by") else {
        return Ok(());
    };

    for value in values {
        let valid = match value.split_once(':') {
            Some((key, _)) => is_lowercase_key(key) && !value.starts_with('$'),
            None => false,
        };
        if !valid {
            return Err(QueryError::new(format!("filter_by is not valid <{value}>")));
        }
    }
    Ok(())
}

fn validate_sort_by(args: &QueryArgs) -> Result<(), QueryError> {
    let Some(values) = args.get("sort_by") else {
        return Ok(());
    };

    if values.len() > 1 {
        return Err(QueryError::new("can only sort by one field"));
    }

    if args.contains("period") && !args.contains("group_by") {
        return Err(QueryError::new(
            "Cannot sort for period queries without group_by. Period queries are always sorted by time.",
        ));
    }

    let mut parts = values[0].split(':');
    let (Some(key), Some(direction)) = (parts.next(), parts.next()) else {
        return Err(QueryError::new(
            "sort_by must be a field name and sort direction separated by a colon (:) eg 'authority:ascending'",
        ));
    };

    if !matches!(direction, "ascending" | "descending") {
        return Err(QueryError::new(format!(
            "Unrecognised sort direction '{direction}'. Supported directions include: ascending, descending"
        )));
    }

    if !is_valid_key(key) {
        return Err(QueryError::new(format!("Invalid key <{key}>")));
    }
    Ok(())
}

fn validate_positive_integer(args: &QueryArgs, name: &str) -> Result<(), QueryError> {
    let Some(values) = args.get(name) else {
        return Ok(());
    };

    if values.len() > 1 {
        return Err(QueryError::new(format!("Can only have a single value for {name}")));
    }

    let value: i64 = values[0]
        .parse()
        .map_err(|_| QueryError::new(format!("expected integer for {name} but was {}", values[0])))?;

    if value < 0 {
        return Err(QueryError::new(format!("{name} must be a positive integer")));
    }
    Ok(())
}

fn validate_group_by(args: &QueryArgs) -> Result<(), QueryError> {
    let Some(values) = args.get("group_by") else {
        return Ok(());
    };

    if values.len() > 1 {
        return Err(QueryError::new("Can only have a single value for <group_by>"));
    }

    let key = &values[0];
    if !is_valid_key(key) {
        return Err(QueryError::new("Cannot group by an invalid field name"));
    }
    if is_internal_key(key) {
        return Err(QueryError::new(
            "Cannot group by internal fields, internal fields start with an underscore",
        ));
    }
    Ok(())
}

fn validate_collect(args: &QueryArgs) -> Result<(), QueryError> {
    let Some(values) = args.get("collect") else {
        return Ok(());
    };

    let group_by = args.get("group_by");
    if group_by.is_none() && !args.contains("period") {
        return Err(QueryError::new(
            "collect can only be used with either period or group_by",
        ));
    }

    for value in values {
        let key = if value.contains(':') {
            let parts: Vec<&str> = value.split(':').collect();
            let [key, method] = parts[..] else {
                return Err(QueryError::new(format!("Badly formatted collect <{value}>")));
            };
            if !matches!(method, "sum" | "mean" | "count" | "set") {
                return Err(QueryError::new(format!("Unknown collect method {method}")));
            }
            key
        } else {
            value.as_str()
        };

        if !is_valid_key(key) {
            return Err(QueryError::new(format!("collect isn't a valid key <{key}>")));
        }
        if is_internal_key(key) {
            return Err(QueryError::new("Cannot collect on an internal field"));
        }
        if let Some([group_key]) = group_by {
            if group_key == key {
                return Err(QueryError::new(
                    "Cannot collect on the same field being used for group_by",
                ));
            }
        }
    }
    Ok(())
}

fn validate_duration(args: &QueryArgs) -> Result<(), QueryError> {
    let duration = args.get("duration");
    let start_at = args.contains("start_at");
    let end_at = args.contains("end_at");

    if duration.is_some() && start_at && end_at {
        return Err(QueryError::new(
            "Absolute and relative time cannot be requested at the same time - either ask for 'start_at' and 'end_at', or ask for 'start_at'/'end_at' with 'duration'",
        ));
    }

    if start_at && duration.is_none() && !end_at {
        return Err(QueryError::new("Use of 'start_at' requires 'end_at' or 'duration'"));
    }

    if end_at && duration.is_none() && !start_at {
        return Err(QueryError::new("Use of 'end_at' requires 'start_at' or 'duration'"));
    }

    let Some(values) = duration else {
        return Ok(());
    };

    if !args.contains("period") {
        return Err(QueryError::new(
            "If 'duration' is requested (for relative time), 'period' is required - please add a period (like 'day', 'month' etc)",
        ));
    }
    if values.len() > 1 {
        return Err(QueryError::new(format!(
            "duration should be a single argument but received {}",
            values.len()
        )));
    }
    if values[0] == "0" {
        return Err(QueryError::new("duration must be positive"));
    }
    Ok(())
}

fn validate_period(args: &QueryArgs) -> Result<(), QueryError> {
    let Some(values) = args.get("period") else {
        return Ok(());
    };

    if values.len() > 1 {
        return Err(QueryError::new("Can only define a single period"));
    }

    if args.contains("limit") && !args.contains("group_by") {
        return Err(QueryError::new(
            "A period query can only be limited if it also has a group_by clause",
        ));
    }

    values[0].parse::<Period>().map(|_| ()).map_err(QueryError)
}

/// Parse the first value of a datetime argument. Shape was checked earlier,
/// but the value may still not be a real instant.
fn instant(args: &QueryArgs, name: &str) -> Result<Option<DateTime<Utc>>, QueryError> {
    match args.first(name) {
        None => Ok(None),
        Some(raw) => parse_datetime(raw)
            .map(Some)
            .ok_or_else(|| QueryError::new(format!("{name} is not a valid datetime"))),
    }
}

fn validate_midnight(args: &QueryArgs, name: &str) -> Result<(), QueryError> {
    match instant(args, name)? {
        Some(t) if t.num_seconds_from_midnight() != 0 || t.nanosecond() != 0 => {
            Err(QueryError::new(format!("{name} must be midnight")))
        }
        _ => Ok(()),
    }
}

fn validate_timespan(args: &QueryArgs) -> Result<(), QueryError> {
    let (Some(start), Some(end)) = (instant(args, "start_at")?, instant(args, "end_at")?) else {
        return Ok(());
    };

    if (end - start).num_days() < MINIMUM_SPAN_DAYS {
        return Err(QueryError::new(format!(
            "The minimum time span for a query is {MINIMUM_SPAN_DAYS} days"
        )));
    }
    Ok(())
}

fn validate_period_start(args: &QueryArgs, name: &str) -> Result<(), QueryError> {
    let Some(t) = instant(args, name)? else {
        return Ok(());
    };

    match args.first("period").and_then(|p| p.parse::<Period>().ok()) {
        Some(Period::Week) if t.weekday() != Weekday::Mon => {
            Err(QueryError::new(format!("{name} must be a monday")))
        }
        Some(Period::Month) if t.day() != 1 => {
            Err(QueryError::new(format!("{name} must be the first day of a month")))
        }
        _ => Ok(()),
    }
}
