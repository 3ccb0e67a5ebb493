//! Sample application server.
//!
//! Serves `/health` (which can be forced to fail through an environment
//! variable, so balancer failover is easy to demonstrate) and
//! `/api/v1/some-data`, which delegates reads to the storage façade. On
//! startup the binary stamps the current date into the store under a
//! configurable key.

use std::collections::HashMap;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use tracing::warn;

/// When set to `"true"`, `/health` reports failure. Lets a deployment
/// simulate a sick instance without killing it.
pub const HEALTH_FAILURE_ENV: &str = "CONF_HEALTH_FAILURE";

#[derive(Clone)]
pub struct AppState {
    pub client: reqwest::Client,
    pub db_url: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/some-data", get(some_data))
        .with_state(state)
}

async fn health() -> Response {
    let failing = std::env::var(HEALTH_FAILURE_ENV).is_ok_and(|v| v == "true");
    if failing {
        (StatusCode::INTERNAL_SERVER_ERROR, "FAILURE").into_response()
    } else {
        (StatusCode::OK, "OK").into_response()
    }
}

async fn some_data(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let Some(key) = params.get("key").filter(|key| !key.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "Key required").into_response();
    };

    let url = format!("{}/db/{key}", state.db_url);
    let resp = match state.client.get(&url).send().await {
        Ok(resp) => resp,
        Err(err) => {
            warn!(%url, error = %err, "datastore unreachable");
            return (StatusCode::SERVICE_UNAVAILABLE, "Service is not available").into_response();
        }
    };

    if resp.status() == StatusCode::NOT_FOUND {
        return StatusCode::NOT_FOUND.into_response();
    }

    match resp.json::<HashMap<String, String>>().await {
        Ok(data) => (StatusCode::OK, Json(data)).into_response(),
        Err(err) => {
            warn!(%url, error = %err, "undecodable datastore response");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error while decoding response",
            )
                .into_response()
        }
    }
}

/// Stamp today's date into the store under `key`. Called once at startup;
/// a failure here means the stack is not wired up and the server should
/// not come up pretending otherwise.
pub async fn save_current_date(
    client: &reqwest::Client,
    db_url: &str,
    key: &str,
) -> reqwest::Result<()> {
    let today = chrono::Local::now().format("%Y-%m-%d").to_string();
    client
        .post(format!("{db_url}/db/{key}"))
        .json(&serde_json::json!({"value": today}))
        .send()
        .await?
        .error_for_status()?;
    Ok(())
}
