//! Active health checking: one periodic probe task per backend.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;
use tracing::info;

use crate::pool::BackendPool;

/// Probes every configured backend's `GET /health` on a fixed interval and
/// flips its pool slot after each probe. A 2xx within the client timeout
/// counts as healthy; anything else (non-2xx, connect error, timeout)
/// marks the backend unhealthy until the next probe. No hysteresis.
pub struct HealthMonitor {
    pool: Arc<BackendPool>,
    client: reqwest::Client,
    scheme: &'static str,
    interval: Duration,
}

impl HealthMonitor {
    /// `client` should carry the per-request timeout; probes share it with
    /// forwarding.
    pub fn new(pool: Arc<BackendPool>, client: reqwest::Client, scheme: &'static str) -> Self {
        Self {
            pool,
            client,
            scheme,
            interval: Duration::from_secs(10),
        }
    }

    /// Override the probe interval (tests use a short one).
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Launch one probe loop per backend. Tasks run for the process
    /// lifetime; the first tick fires immediately.
    pub fn spawn(self) {
        for (index, backend) in self.pool.backends().iter().enumerate() {
            let pool = Arc::clone(&self.pool);
            let client = self.client.clone();
            let scheme = self.scheme;
            let backend = backend.clone();
            let period = self.interval;

            tokio::spawn(async move {
                let mut ticker = interval(period);
                loop {
                    ticker.tick().await;
                    let healthy = probe(&client, scheme, &backend).await;
                    pool.set_health(index, healthy);
                    info!(%backend, healthy, "health probe");
                }
            });
        }
    }
}

async fn probe(client: &reqwest::Client, scheme: &str, backend: &str) -> bool {
    let url = format!("{scheme}://{backend}/health");
    match client.get(&url).send().await {
        Ok(resp) => resp.status().is_success(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_probe_unreachable_backend() {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(200))
            .build()
            .unwrap();
        // A listener that is bound and immediately dropped gives a port
        // with nothing behind it.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        assert!(!probe(&client, "http", &addr.to_string()).await);
    }
}
