//! HTTP façade over the segmented store.
//!
//! One route, `/db/{key}`: GET reads the newest value, POST appends one.
//! Anything else on the route is a 400, matching what clients of the
//! original deployment expect (including the `{"error 404":"Not found"}`
//! miss body).

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;

use kvstack_store::Store;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
}

/// Build the façade router over a store.
pub fn router(store: Arc<Store>) -> Router {
    Router::new()
        .route(
            "/db/{key}",
            get(get_value).post(put_value).fallback(bad_request),
        )
        .with_state(AppState { store })
}

#[derive(Debug, Serialize)]
struct ValueResponse {
    key: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct PutRequest {
    value: String,
}

async fn get_value(State(state): State<AppState>, Path(key): Path<String>) -> Response {
    match state.store.get(&key).await {
        Ok(value) => (StatusCode::OK, Json(ValueResponse { key, value })).into_response(),
        Err(err) if err.is_not_found() => (
            StatusCode::NOT_FOUND,
            Json(json!({"error 404": "Not found"})),
        )
            .into_response(),
        Err(err) => {
            error!(%key, error = %err, "get failed");
            internal_error()
        }
    }
}

async fn put_value(
    State(state): State<AppState>,
    Path(key): Path<String>,
    body: Bytes,
) -> Response {
    let Ok(request) = serde_json::from_slice::<PutRequest>(&body) else {
        return bad_request().await;
    };

    match state.store.put(&key, &request.value).await {
        Ok(()) => StatusCode::CREATED.into_response(),
        Err(err) if err.is_invalid_input() => bad_request().await,
        Err(err) => {
            error!(%key, error = %err, "put failed");
            internal_error()
        }
    }
}

async fn bad_request() -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({"error": "bad request"}))).into_response()
}

fn internal_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": "internal server error"})),
    )
        .into_response()
}
