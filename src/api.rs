// Copyright 2025 Memophor Labs
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! HTTP API handlers for the datastore.
//!
//! - `GET /_status` - Storage health check
//! - `GET /_status/data-sets` - Freshness of every data set
//! - `GET|OPTIONS /data/:data_group/:data_type` - Read a data set
//! - `POST /data/:data_group/:data_type` - Append records
//! - `PUT /data/:data_group/:data_type` - Empty a data set
//! - `GET /metrics` - Prometheus metrics export
//!
//! Write endpoints require the data set's bearer token.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use tokio::time::Instant;

use crate::auth::validate_authorization;
use crate::config_api::ConfigSource;
use crate::dataset::{AppendError, DataSet};
use crate::error::AppError;
use crate::metrics::Metrics;
use crate::model::{ApiResponse, DataResponse, DataSetMetadata};
use crate::query::{validate_request_args, QueryArgs};
use crate::record::records_from_json;
use crate::staleness::check_data_sets;
use crate::store::Store;

const UNPUBLISHED_WARNING: &str =
    "Warning: This data-set is unpublished. \nData may be subject to change or be inaccurate.";

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub config: Arc<dyn ConfigSource>,
    pub metrics: Metrics,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/_status", get(status).fallback(method_not_allowed))
        .route(
            "/_status/data-sets",
            get(data_set_status).fallback(method_not_allowed),
        )
        .route(
            "/data/:data_group/:data_type",
            get(read_data)
                .options(read_data)
                .post(create_data)
                .put(update_data)
                .fallback(method_not_allowed),
        )
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Storage health check
pub async fn status(State(state): State<AppState>) -> Response {
    let cache_control = [(header::CACHE_CONTROL, "none")];

    if state.store.alive().await {
        return (
            cache_control,
            Json(ApiResponse::ok_with_message("database seems fine")),
        )
            .into_response();
    }

    tracing::error!("storage health check failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        cache_control,
        Json(ApiResponse::error(vec![
            "cannot connect to database".to_string(),
        ])),
    )
        .into_response()
}

/// Freshness of every configured data set
pub async fn data_set_status(State(state): State<AppState>) -> Result<Response, AppError> {
    let start = Instant::now();
    let listed = state.config.list_data_sets().await;
    state.metrics.record_config_fetch(start.elapsed().as_secs_f64());

    let report = check_data_sets(state.store.clone(), listed?).await.map_err(|err| {
        state.metrics.record_storage_failure();
        AppError::from(err)
    })?;

    state.metrics.update_stale_data_sets(report.failures.len());

    Ok((
        [(header::CACHE_CONTROL, "none")],
        Json(report.to_response()),
    )
        .into_response())
}

/// Metrics endpoint
pub async fn metrics(State(state): State<AppState>) -> Result<String, AppError> {
    state.metrics.export()
}

pub async fn method_not_allowed(method: Method, uri: Uri) -> AppError {
    AppError::MethodNotAllowed(format!("Method {method} not allowed for <{uri}>"))
}

/// Read a data set. Also answers CORS preflight requests.
pub async fn read_data(
    State(state): State<AppState>,
    method: Method,
    Path((data_group, data_type)): Path<(String, String)>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Response, AppError> {
    let data_set = load_data_set(&state, &data_group, &data_type).await?;

    if !data_set.is_queryable() {
        return Err(AppError::not_found(format!(
            "data_set {} not found",
            data_set.name()
        )));
    }

    if method == Method::OPTIONS {
        return Ok((
            StatusCode::OK,
            [
                (header::ACCESS_CONTROL_MAX_AGE, "86400"),
                (
                    header::ACCESS_CONTROL_ALLOW_HEADERS,
                    "Cache-Control, GOVUK-Request-Id, Request-Id",
                ),
            ],
        )
            .into_response());
    }

    let args: QueryArgs = pairs.into_iter().collect();
    validate_request_args(&args, data_set.allow_raw_queries())
        .map_err(|err| AppError::bad_request(err.to_string()))?;

    let data = data_set.execute(&args).await?;

    if !data_set.is_published() {
        let body = DataResponse {
            data,
            warning: Some(UNPUBLISHED_WARNING.to_string()),
        };
        return Ok(([(header::CACHE_CONTROL, "no-cache")], Json(body)).into_response());
    }

    let cache_control = HeaderValue::from_str(&format!(
        "max-age={}, must-revalidate",
        data_set.cache_duration()
    ))
    .map_err(|e| AppError::Internal(anyhow::anyhow!("invalid cache header: {}", e)))?;

    Ok((
        [(header::CACHE_CONTROL, cache_control)],
        Json(DataResponse {
            data,
            warning: None,
        }),
    )
        .into_response())
}

/// Append records to a data set
pub async fn create_data(
    State(state): State<AppState>,
    Path((data_group, data_type)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ApiResponse>, AppError> {
    state.metrics.record_write_request();

    let data_set = load_data_set(&state, &data_group, &data_type).await?;
    validate_authorization(authorization(&headers), &data_set)?;

    let records = records_from_json(parse_body(&body)?)
        .map_err(|err| AppError::bad_request(err.to_string()))?;

    match data_set.append(records).await {
        Ok(written) => {
            state.metrics.record_stored(written);
            tracing::info!(data_set = data_set.name(), written, "appended records");
            Ok(Json(ApiResponse::ok()))
        }
        Err(AppendError::Invalid(errors)) => {
            state.metrics.record_rejected_batch();
            Err(AppError::Validation(
                errors.iter().map(ToString::to_string).collect(),
            ))
        }
        Err(AppendError::Store(err)) => {
            state.metrics.record_storage_failure();
            Err(err.into())
        }
    }
}

/// Empty a data set. Only an empty JSON list is accepted as the body.
pub async fn update_data(
    State(state): State<AppState>,
    Path((data_group, data_type)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ApiResponse>, AppError> {
    state.metrics.record_write_request();

    let data_set = load_data_set(&state, &data_group, &data_type).await?;
    validate_authorization(authorization(&headers), &data_set)?;

    let is_empty_list = matches!(parse_body(&body)?, serde_json::Value::Array(items) if items.is_empty());
    if !is_empty_list {
        return Err(AppError::bad_request(
            "Not implemented: you can only pass an empty JSON list",
        ));
    }

    data_set.empty().await.map_err(|err| {
        state.metrics.record_storage_failure();
        AppError::from(err)
    })?;

    tracing::info!(data_set = data_set.name(), "emptied data set");
    Ok(Json(ApiResponse::ok_with_message(format!(
        "{} now contains 0 records",
        data_set.name()
    ))))
}

async fn load_data_set(
    state: &AppState,
    data_group: &str,
    data_type: &str,
) -> Result<DataSet, AppError> {
    let metadata = fetch_metadata(state, data_group, data_type).await?;
    Ok(DataSet::new(metadata, state.store.clone()))
}

async fn fetch_metadata(
    state: &AppState,
    data_group: &str,
    data_type: &str,
) -> Result<DataSetMetadata, AppError> {
    let start = Instant::now();
    let result = state.config.data_type(data_group, data_type).await;
    state.metrics.record_config_fetch(start.elapsed().as_secs_f64());

    result.map_err(|err| {
        tracing::debug!(data_group, data_type, error = %err, "data set lookup failed");
        AppError::from(err)
    })
}

fn authorization(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
}

fn parse_body(body: &[u8]) -> Result<serde_json::Value, AppError> {
    if body.is_empty() {
        return Err(AppError::bad_request(
            "Expected JSON request body but received 0 bytes",
        ));
    }

    serde_json::from_slice(body)
        .map_err(|e| AppError::bad_request(format!("Error parsing JSON: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_api::{ConfigError, MockConfigSource};
    use crate::store::{MemoryStore, MockStore, StoreError};
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn metadata() -> DataSetMetadata {
        DataSetMetadata {
            name: "the-dataset".into(),
            data_group: "a-data-group".into(),
            data_type: "a-data-type".into(),
            bearer_token: "the-bearer-token".into(),
            queryable: true,
            published: true,
            ..DataSetMetadata::default()
        }
    }

    fn config_returning(metadata: DataSetMetadata) -> MockConfigSource {
        let mut config = MockConfigSource::new();
        config
            .expect_data_type()
            .returning(move |_, _| Ok(metadata.clone()));
        config
    }

    fn app(store: Arc<dyn Store>, config: MockConfigSource) -> (Router, Metrics) {
        let metrics = Metrics::new().unwrap();
        let router = router(AppState {
            store,
            config: Arc::new(config),
            metrics: metrics.clone(),
        });
        (router, metrics)
    }

    async fn send(router: Router, request: Request<Body>) -> (StatusCode, HeaderMap, Value) {
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::String(
                String::from_utf8_lossy(&bytes).into_owned(),
            ))
        };
        (status, headers, body)
    }

    fn write(method: &str, token: Option<&str>, body: &str) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri("/data/a-data-group/a-data-type")
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn status_reports_healthy_storage() {
        let (router, _) = app(Arc::new(MemoryStore::new()), MockConfigSource::new());
        let (status, headers, body) = send(router, get("/_status")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CACHE_CONTROL], "none");
        assert_eq!(body, json!({"status": "ok", "message": "database seems fine"}));
    }

    #[tokio::test]
    async fn status_reports_unreachable_storage() {
        let mut store = MockStore::new();
        store.expect_alive().returning(|| false);

        let (router, _) = app(Arc::new(store), MockConfigSource::new());
        let (status, _, body) = send(router, get("/_status")).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "cannot connect to database");
    }

    #[tokio::test]
    async fn status_rejects_other_methods() {
        let (router, _) = app(Arc::new(MemoryStore::new()), MockConfigSource::new());
        let request = Request::builder()
            .method("POST")
            .uri("/_status")
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = send(router, request).await;

        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(body["message"], "Method POST not allowed for </_status>");
    }

    #[tokio::test]
    async fn data_set_status_with_nothing_configured() {
        let mut config = MockConfigSource::new();
        config.expect_list_data_sets().returning(|| Ok(Vec::new()));

        let (router, _) = app(Arc::new(MemoryStore::new()), config);
        let (status, _, body) = send(router, get("/_status/data-sets")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn data_set_status_lists_stale_data_sets() {
        let store = MemoryStore::new();
        let mut config = MockConfigSource::new();
        config.expect_list_data_sets().returning(|| {
            Ok(vec![DataSetMetadata {
                name: "stale".into(),
                published: true,
                max_expected_age: Some(60),
                ..DataSetMetadata::default()
            }])
        });

        let stale = DataSet::new(
            DataSetMetadata {
                name: "stale".into(),
                ..DataSetMetadata::default()
            },
            Arc::new(store.clone()),
        );
        stale.append(Vec::new()).await.unwrap();
        let mut record = crate::record::Record::new();
        record.insert("_updated_at", chrono::Utc::now() - chrono::Duration::days(1));
        store.save_record("stale", &record).await.unwrap();

        let (router, metrics) = app(Arc::new(store), config);
        let (status, _, body) = send(router, get("/_status/data-sets")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "not okay");
        assert_eq!(body["message"], "1 data-set is out of date");
        assert_eq!(metrics.stale_data_sets.get(), 1);
    }

    #[tokio::test]
    async fn data_set_status_fails_when_config_is_unavailable() {
        let mut config = MockConfigSource::new();
        config
            .expect_list_data_sets()
            .returning(|| Err(ConfigError::Request("connection refused".into())));

        let (router, _) = app(Arc::new(MemoryStore::new()), config);
        let (status, _, _) = send(router, get("/_status/data-sets")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn unknown_data_set_is_not_found() {
        let mut config = MockConfigSource::new();
        config
            .expect_data_type()
            .returning(|_, _| Err(ConfigError::NotFound("data_set".into())));

        let (router, _) = app(Arc::new(MemoryStore::new()), config);
        let (status, _, body) = send(router, get("/data/a-data-group/a-data-type")).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "data_set not found");
    }

    #[tokio::test]
    async fn non_queryable_data_set_is_not_found() {
        let config = config_returning(DataSetMetadata {
            queryable: false,
            ..metadata()
        });

        let (router, _) = app(Arc::new(MemoryStore::new()), config);
        let (status, _, body) = send(router, get("/data/a-data-group/a-data-type")).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "data_set the-dataset not found");
    }

    #[tokio::test]
    async fn options_returns_cors_headers() {
        let (router, _) = app(Arc::new(MemoryStore::new()), config_returning(metadata()));
        let request = Request::builder()
            .method("OPTIONS")
            .uri("/data/a-data-group/a-data-type")
            .body(Body::empty())
            .unwrap();
        let (status, headers, _) = send(router, request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::ACCESS_CONTROL_MAX_AGE], "86400");
        assert_eq!(
            headers[header::ACCESS_CONTROL_ALLOW_HEADERS],
            "Cache-Control, GOVUK-Request-Id, Request-Id"
        );
    }

    #[tokio::test]
    async fn published_read_is_cacheable() {
        let (router, _) = app(Arc::new(MemoryStore::new()), config_returning(metadata()));
        let (status, headers, body) = send(router, get("/data/a-data-group/a-data-type")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CACHE_CONTROL], "max-age=1800, must-revalidate");
        assert_eq!(body, json!({"data": []}));
    }

    #[tokio::test]
    async fn unpublished_read_carries_a_warning() {
        let config = config_returning(DataSetMetadata {
            published: false,
            ..metadata()
        });

        let (router, _) = app(Arc::new(MemoryStore::new()), config);
        let (status, headers, body) = send(router, get("/data/a-data-group/a-data-type")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CACHE_CONTROL], "no-cache");
        assert!(body["warning"]
            .as_str()
            .unwrap()
            .starts_with("Warning: This data-set is unpublished."));
    }

    #[tokio::test]
    async fn invalid_query_is_rejected() {
        let (router, _) = app(Arc::new(MemoryStore::new()), config_returning(metadata()));
        let (status, _, body) =
            send(router, get("/data/a-data-group/a-data-type?period=fortnight")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Period value not recognised fortnight");
    }

    #[tokio::test]
    async fn write_without_authorization_is_challenged() {
        let (router, _) = app(Arc::new(MemoryStore::new()), config_returning(metadata()));
        let (status, headers, body) = send(router, write("POST", None, "{}")).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(headers[header::WWW_AUTHENTICATE], "bearer");
        assert_eq!(
            body["message"],
            "Expected header of form: Authorization: Bearer token"
        );
    }

    #[tokio::test]
    async fn write_with_wrong_token_is_rejected() {
        let (router, _) = app(Arc::new(MemoryStore::new()), config_returning(metadata()));
        let (status, _, body) = send(router, write("POST", Some("nope"), "{}")).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(
            body["message"],
            "Unauthorized: Invalid bearer token 'nope' for 'the-dataset'"
        );
    }

    #[tokio::test]
    async fn write_requires_a_body() {
        let (router, _) = app(Arc::new(MemoryStore::new()), config_returning(metadata()));
        let (status, _, body) = send(router, write("POST", Some("the-bearer-token"), "")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["message"],
            "Expected JSON request body but received 0 bytes"
        );
    }

    #[tokio::test]
    async fn write_rejects_malformed_json() {
        let (router, _) = app(Arc::new(MemoryStore::new()), config_returning(metadata()));
        let (status, _, body) =
            send(router, write("POST", Some("the-bearer-token"), "{not json")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"]
            .as_str()
            .unwrap()
            .starts_with("Error parsing JSON: "));
    }

    #[tokio::test]
    async fn valid_batch_is_stored() {
        let store = MemoryStore::new();
        let (router, metrics) = app(Arc::new(store.clone()), config_returning(metadata()));
        let (status, _, body) = send(
            router,
            write(
                "POST",
                Some("the-bearer-token"),
                r#"[{"animal": "parrot", "status": "pining"}, {"animal": "cat"}]"#,
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "ok"}));
        assert_eq!(store.count("the-dataset").await, 2);
        assert_eq!(metrics.records_stored.get(), 2);
        assert_eq!(metrics.write_requests.get(), 1);
    }

    #[tokio::test]
    async fn invalid_batch_lists_every_error() {
        let store = MemoryStore::new();
        let (router, metrics) = app(Arc::new(store.clone()), config_returning(metadata()));
        let (status, _, body) = send(
            router,
            write(
                "POST",
                Some("the-bearer-token"),
                r#"[{"_animal": "parrot"}, {"with-dash": 1}]"#,
            ),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["errors"],
            json!([
                {"detail": "_animal is not a recognised internal field"},
                {"detail": "with-dash is not a valid key"}
            ])
        );
        assert_eq!(store.count("the-dataset").await, 0);
        assert_eq!(metrics.rejected_batches.get(), 1);
    }

    #[tokio::test]
    async fn storage_failure_is_a_server_error() {
        let mut store = MockStore::new();
        store.expect_exists().returning(|_| Ok(true));
        store
            .expect_save_record()
            .returning(|_, _| Err(StoreError::Backend("disk full".into())));

        let (router, metrics) = app(Arc::new(store), config_returning(metadata()));
        let (status, _, _) = send(
            router,
            write("POST", Some("the-bearer-token"), r#"{"animal": "parrot"}"#),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(metrics.storage_failures.get(), 1);
    }

    #[tokio::test]
    async fn put_with_records_is_not_implemented() {
        let (router, _) = app(Arc::new(MemoryStore::new()), config_returning(metadata()));
        let (status, _, body) = send(
            router,
            write("PUT", Some("the-bearer-token"), r#"[{"animal": "parrot"}]"#),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["message"],
            "Not implemented: you can only pass an empty JSON list"
        );
    }

    #[tokio::test]
    async fn put_with_empty_list_empties_the_data_set() {
        let store = MemoryStore::new();
        let data_set = DataSet::new(metadata(), Arc::new(store.clone()));
        data_set
            .append(records_from_json(json!({"animal": "parrot"})).unwrap())
            .await
            .unwrap();

        let (router, _) = app(Arc::new(store.clone()), config_returning(metadata()));
        let (status, _, body) = send(router, write("PUT", Some("the-bearer-token"), "[]")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({"status": "ok", "message": "the-dataset now contains 0 records"})
        );
        assert_eq!(store.count("the-dataset").await, 0);
    }

    #[tokio::test]
    async fn metrics_are_exported() {
        let (router, _) = app(Arc::new(MemoryStore::new()), MockConfigSource::new());
        let response = router.oneshot(get("/metrics")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("datastore_write_requests_total"));
    }
}
