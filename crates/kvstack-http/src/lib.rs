//! Serving glue shared by every kvstack binary: a server runner with
//! signal-driven graceful shutdown, and the tracing subscriber setup.

use std::fmt;

use axum::Router;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Which signal ended the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    SigInt,
    SigTerm,
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SigInt => write!(f, "SIGINT"),
            Self::SigTerm => write!(f, "SIGTERM"),
        }
    }
}

/// Resolves when the process receives SIGINT (Ctrl+C) or, on Unix,
/// SIGTERM.
pub async fn shutdown_signal() -> ShutdownSignal {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
        ShutdownSignal::SigInt
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
        ShutdownSignal::SigTerm
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<ShutdownSignal>();

    tokio::select! {
        signal = ctrl_c => signal,
        signal = terminate => signal,
    }
}

/// Bind `0.0.0.0:{port}` and serve the router until a termination signal
/// arrives, letting in-flight requests complete.
pub async fn serve(router: Router, port: u16) -> std::io::Result<()> {
    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr).await?;
    info!(%addr, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let signal = shutdown_signal().await;
            info!(%signal, "shutting down");
        })
        .await?;

    info!("server stopped");
    Ok(())
}

/// Install the process-wide tracing subscriber. `RUST_LOG` overrides the
/// `info` default.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shutdown_signal_display() {
        assert_eq!(ShutdownSignal::SigInt.to_string(), "SIGINT");
        assert_eq!(ShutdownSignal::SigTerm.to_string(), "SIGTERM");
    }
}
