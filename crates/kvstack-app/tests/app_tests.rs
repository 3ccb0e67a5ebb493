//! Integration tests for the application server against a stub datastore.

use std::time::Duration;

use axum::extract::Path;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use tokio::net::TcpListener;

use kvstack_app::AppState;

async fn spawn(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

/// A stand-in for the storage façade: knows one key.
fn stub_db() -> Router {
    Router::new().route(
        "/db/{key}",
        get(|Path(key): Path<String>| async move {
            if key == "known" {
                Json(serde_json::json!({"key": "known", "value": "stored"})).into_response()
            } else {
                StatusCode::NOT_FOUND.into_response()
            }
        })
        .post(|| async { StatusCode::CREATED }),
    )
}

fn test_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(1))
        .build()
        .unwrap()
}

async fn spawn_app(db_url: String) -> String {
    let state = AppState {
        client: test_client(),
        db_url,
    };
    spawn(kvstack_app::router(state)).await
}

#[tokio::test]
async fn test_health_toggles_with_env() {
    let app = spawn_app("http://unused".to_string()).await;

    let resp = reqwest::get(format!("{app}/health")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.text().await.unwrap(), "OK");

    std::env::set_var(kvstack_app::HEALTH_FAILURE_ENV, "true");
    let resp = reqwest::get(format!("{app}/health")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(resp.text().await.unwrap(), "FAILURE");
    std::env::remove_var(kvstack_app::HEALTH_FAILURE_ENV);
}

#[tokio::test]
async fn test_some_data_passthrough() {
    let db = spawn(stub_db()).await;
    let app = spawn_app(db).await;

    let resp = reqwest::get(format!("{app}/api/v1/some-data?key=known"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body, serde_json::json!({"key": "known", "value": "stored"}));
}

#[tokio::test]
async fn test_some_data_requires_key() {
    let db = spawn(stub_db()).await;
    let app = spawn_app(db).await;

    for uri in ["/api/v1/some-data", "/api/v1/some-data?key="] {
        let resp = reqwest::get(format!("{app}{uri}")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "uri: {uri}");
        assert_eq!(resp.text().await.unwrap(), "Key required");
    }
}

#[tokio::test]
async fn test_some_data_propagates_404() {
    let db = spawn(stub_db()).await;
    let app = spawn_app(db).await;

    let resp = reqwest::get(format!("{app}/api/v1/some-data?key=absent"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_some_data_unreachable_datastore_is_503() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let app = spawn_app(dead).await;
    let resp = reqwest::get(format!("{app}/api/v1/some-data?key=any"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(resp.text().await.unwrap(), "Service is not available");
}

#[tokio::test]
async fn test_save_current_date_posts_to_store() {
    let db = spawn(stub_db()).await;
    kvstack_app::save_current_date(&test_client(), &db, "current-date")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_save_current_date_fails_without_store() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    assert!(
        kvstack_app::save_current_date(&test_client(), &dead, "current-date")
            .await
            .is_err()
    );
}
