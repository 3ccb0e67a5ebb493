//! Request forwarding with per-backend byte accounting.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::Stream;
use tracing::{error, info, warn};

use crate::pool::BackendPool;

/// Everything a forwarding worker needs; cheap to clone per request.
#[derive(Clone)]
pub struct ProxyContext {
    pub pool: Arc<BackendPool>,
    /// Carries the per-request timeout; shared with the health monitor.
    pub client: reqwest::Client,
    pub scheme: &'static str,
    pub trace: bool,
}

/// Catch-all handler: select the least-loaded healthy backend, stream the
/// exchange through, and account the response bytes. No retries; any
/// failure turns into a 503 for this one request.
pub async fn forward(State(ctx): State<ProxyContext>, req: Request) -> Response {
    let Some(backend) = ctx.pool.pick_least_loaded() else {
        warn!("no available servers");
        return (StatusCode::SERVICE_UNAVAILABLE, "no available servers").into_response();
    };

    match proxy_to(&ctx, &backend, req).await {
        Ok(response) => response,
        Err(err) => {
            error!(%backend, error = %err, "failed to get response from backend");
            (StatusCode::SERVICE_UNAVAILABLE, "Service unavailable\n").into_response()
        }
    }
}

async fn proxy_to(
    ctx: &ProxyContext,
    backend: &str,
    req: Request,
) -> Result<Response, reqwest::Error> {
    let (parts, body) = req.into_parts();
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let url = format!("{}://{}{}", ctx.scheme, backend, path_and_query);

    // The host header must name the backend, not this proxy; the client
    // fills it in from the rewritten URL.
    let mut headers = parts.headers;
    headers.remove(header::HOST);

    let upstream = ctx
        .client
        .request(parts.method, &url)
        .headers(headers)
        .body(reqwest::Body::wrap_stream(body.into_data_stream()))
        .send()
        .await?;

    let status = upstream.status();
    info!(%status, %url, "fwd");

    let upstream_headers = upstream.headers().clone();
    let counted = CountingStream {
        inner: Box::pin(upstream.bytes_stream()),
        pool: Arc::clone(&ctx.pool),
        backend: backend.to_string(),
        served: 0,
    };

    let mut response = Response::new(Body::from_stream(counted));
    *response.status_mut() = status;
    for (name, value) in upstream_headers.iter() {
        response.headers_mut().append(name, value.clone());
    }
    if ctx.trace {
        if let Ok(value) = HeaderValue::from_str(backend) {
            response.headers_mut().insert("lb-from", value);
        }
    }
    Ok(response)
}

/// Passes the upstream body through while tallying the bytes the client
/// actually receives. The total is folded into the ledger on drop, which
/// covers both normal completion and a client hanging up mid-body; a
/// request that never produced a body leaves the ledger untouched until
/// then.
struct CountingStream {
    inner: Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>,
    pool: Arc<BackendPool>,
    backend: String,
    served: u64,
}

impl Stream for CountingStream {
    type Item = Result<Bytes, reqwest::Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let polled = self.inner.as_mut().poll_next(cx);
        if let Poll::Ready(Some(Ok(chunk))) = &polled {
            self.served += chunk.len() as u64;
        }
        polled
    }
}

impl Drop for CountingStream {
    fn drop(&mut self) {
        self.pool.record_bytes(&self.backend, self.served);
    }
}
