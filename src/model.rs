// Copyright 2025 Memophor Labs
// SPDX-License-Identifier: Apache-2.0

//! Data models shared between the config API, the core and HTTP responses.

use serde::{Deserialize, Deserializer, Serialize};

// The config API sends `null` for fields it has no value for.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Data set configuration as served by the config API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataSetMetadata {
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub data_group: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub data_type: String,
    #[serde(default, rename = "raw_queries_allowed", deserialize_with = "null_as_default")]
    pub allow_raw_queries: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub bearer_token: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub upload_format: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub upload_filters: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub auto_ids: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub queryable: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub realtime: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub capped_size: i64,
    /// Seconds; absent means freshness is not checked.
    #[serde(default, rename = "max_age_expected")]
    pub max_expected_age: Option<i64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub published: bool,
    #[serde(default)]
    pub schema: Option<serde_json::Value>,
}

/// Error entry, shaped after jsonapi.org error objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub detail: String,
}

/// Envelope used by every status and write response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ErrorInfo>,
}

impl ApiResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            message: None,
            errors: Vec::new(),
        }
    }

    pub fn ok_with_message<T: Into<String>>(message: T) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::ok()
        }
    }

    /// An error response. The message is only set when there is exactly one
    /// error to report.
    pub fn error(details: Vec<String>) -> Self {
        Self::with_details("error", None, details)
    }

    pub fn with_details(status: &str, message: Option<String>, details: Vec<String>) -> Self {
        let message = message.or_else(|| match details.as_slice() {
            [only] => Some(only.clone()),
            _ => None,
        });

        Self {
            status: status.to_string(),
            message,
            errors: details
                .into_iter()
                .map(|detail| ErrorInfo { detail })
                .collect(),
        }
    }
}

/// Body returned by read requests.
#[derive(Debug, Clone, Serialize)]
pub struct DataResponse {
    pub data: Vec<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}
