//! gpu-admission-webhook - Kubernetes mutating admission webhook server.
//!
//! This is the main entry point that:
//! - Initializes structured logging
//! - Parses the command line
//! - Starts the health server and the TLS webhook server
//! - Coordinates bounded graceful shutdown on SIGINT/SIGTERM

use std::sync::Arc;
use std::time::Duration;

use axum_server::Handle;
use clap::Parser;
use tokio::signal;
use tracing::{error, info};

use gpu_admission_webhook::config::Config;
use gpu_admission_webhook::health::{run_health_server, HealthState};
use gpu_admission_webhook::webhook::{run_webhook_server, ReviewCodec, WebhookContext};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("gpu_admission_webhook=info".parse()?),
        )
        .json()
        .init();

    let config = Config::parse();
    info!(
        port = config.port,
        mutation = ?config.mutation,
        decode_failure_policy = ?config.decode_failure_policy,
        "starting gpu-admission-webhook"
    );

    let health_state = Arc::new(HealthState::new());

    // The codec and the mutation strategy are constructed once here and
    // owned by the handler context; requests only ever read them.
    let ctx = Arc::new(WebhookContext::new(
        ReviewCodec,
        config.mutation.mutator(),
        config.decode_failure_policy,
        health_state.clone(),
    ));

    // Start health server immediately (probes should work while starting up)
    let mut health_task = {
        let health_state = health_state.clone();
        let port = config.health_port;
        tokio::spawn(async move {
            if let Err(e) = run_health_server(health_state, port).await {
                error!("health server error: {}", e);
            }
        })
    };

    // Start webhook server; the handle is kept here so the signal arm can
    // trigger its graceful shutdown.
    let handle = Handle::new();
    let mut server_task = {
        let handle = handle.clone();
        let server_config = config.clone();
        tokio::spawn(async move { run_webhook_server(&server_config, ctx, handle).await })
    };

    health_state.set_ready(true).await;

    tokio::select! {
        result = &mut server_task => {
            match result {
                Ok(Ok(())) => info!("webhook server stopped"),
                Ok(Err(e)) => {
                    error!("webhook server error: {}", e);
                    return Err(e.into());
                }
                Err(e) => {
                    error!("webhook server task panicked: {}", e);
                    return Err(e.into());
                }
            }
        }
        result = &mut health_task => {
            if let Err(e) = result {
                error!("health server task panicked: {}", e);
            }
        }
        // Handle graceful shutdown on SIGTERM or SIGINT
        _ = shutdown_signal() => {
            info!("received shutdown signal, shutting down webhook server gracefully...");

            // Stop advertising readiness so new admission traffic drains off
            health_state.set_ready(false).await;

            handle.graceful_shutdown(Some(Duration::from_secs(config.shutdown_grace_secs)));
            match server_task.await {
                Ok(Ok(())) => info!("in-flight requests drained"),
                Ok(Err(e)) => error!("webhook server error during shutdown: {}", e),
                Err(e) => error!("webhook server task panicked: {}", e),
            }
        }
    }

    info!("webhook stopped");
    Ok(())
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
///
/// Note: Signal handler setup failures are fatal - the server cannot shut
/// down gracefully without them. Using expect() here is intentional.
#[allow(clippy::expect_used)]
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
