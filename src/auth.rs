// Copyright 2025 Memophor Labs
// SPDX-License-Identifier: Apache-2.0

//! Bearer token checks for write requests.
//!
//! Every data set carries its own token in the config API. Writers must
//! present it as `Authorization: Bearer <token>`.

use crate::dataset::DataSet;
use crate::error::AppError;

const BEARER_PREFIX: &str = "Bearer ";

/// Extract bearer token from Authorization header
pub fn extract_bearer_token(auth_header: Option<&str>) -> Option<String> {
    auth_header
        .and_then(|h| h.strip_prefix(BEARER_PREFIX))
        .map(|t| t.to_string())
}

/// Check the request's Authorization header against the data set's token.
///
/// A data set without a token rejects every writer.
pub fn validate_authorization(auth_header: Option<&str>, data_set: &DataSet) -> Result<(), AppError> {
    let Some(header) = auth_header.filter(|h| !h.is_empty()) else {
        return Err(AppError::unauthorized(
            "Expected header of form: Authorization: Bearer token",
        ));
    };

    let token = extract_bearer_token(Some(header)).unwrap_or_default();
    let expected = data_set.bearer_token();

    if expected.is_empty() || token != expected {
        tracing::warn!(data_set = data_set.name(), "rejected write with invalid bearer token");
        return Err(AppError::unauthorized(format!(
            "Unauthorized: Invalid bearer token '{}' for '{}'",
            token,
            data_set.name()
        )));
    }

    Ok(())
}
