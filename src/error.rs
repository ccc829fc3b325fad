// Copyright 2025 Memophor Labs
// SPDX-License-Identifier: Apache-2.0

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::config_api::ConfigError;
use crate::model::ApiResponse;
use crate::store::StoreError;

/// Problems found while validating a batch of records. These are collected
/// rather than returned early, and reported to the client together.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("{0}")]
    Schema(String),
    #[error("schema for {name} is invalid: {reason}")]
    InvalidSchema { name: String, reason: String },
    #[error("The following required id fields are missing: {}", .0.join(", "))]
    MissingIdFields(Vec<String>),
    #[error("_timestamp is not a valid timestamp, it must be ISO8601")]
    InvalidTimestamp,
    #[error("{0} is not a valid key")]
    InvalidKey(String),
    #[error("{0} is not a recognised internal field")]
    UnrecognisedInternalField(String),
    #[error("{0} has an invalid value")]
    InvalidValue(String),
    #[error("_timestamp is not a valid datetime object")]
    TimestampNotNormalized,
    #[error("id is not a valid ID")]
    InvalidId,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{}", .0.join("; "))]
    Validation(Vec<String>),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    MethodNotAllowed(String),
    #[error("{0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn bad_request<T: Into<String>>(message: T) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn not_found<T: Into<String>>(message: T) -> Self {
        Self::NotFound(message.into())
    }

    pub fn unauthorized<T: Into<String>>(message: T) -> Self {
        Self::Unauthorized(message.into())
    }

    fn details(&self) -> Vec<String> {
        match self {
            AppError::Validation(errors) => errors.clone(),
            other => vec![other.to_string()],
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::Internal(err.into())
    }
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NotFound(_) => AppError::NotFound("data_set not found".to_string()),
            other => AppError::Internal(other.into()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::BadRequest(_) | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            AppError::Internal(ref err) => {
                tracing::error!(error = %err, "request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = ApiResponse::error(self.details());

        if status == StatusCode::UNAUTHORIZED {
            return (status, [(header::WWW_AUTHENTICATE, "bearer")], Json(body)).into_response();
        }

        (status, Json(body)).into_response()
    }
}
