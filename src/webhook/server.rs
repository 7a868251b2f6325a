//! Webhook server lifecycle.
//!
//! Owns the TLS listening socket, registers the admission handler on the
//! mutate and validate paths, and serves until graceful shutdown drains it.
//! TLS material that fails to load aborts startup; serving without a valid
//! certificate is not an option.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::post;
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use thiserror::Error;
use tracing::info;

use crate::config::Config;
use crate::webhook::handler::{self, WebhookContext};

/// Errors that can occur when running the webhook server
#[derive(Error, Debug)]
pub enum WebhookServerError {
    /// The TLS key pair failed to load
    #[error("could not load TLS key pair: {0}")]
    TlsConfig(#[source] std::io::Error),

    /// The server failed to bind or serve
    #[error("webhook server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// Create the webhook router.
///
/// Both paths share one handler; the mutation strategy in the context
/// decides whether a patch comes back.
pub fn webhook_router(ctx: Arc<WebhookContext>) -> Router {
    Router::new()
        .route("/mutate", post(handler::serve))
        .route("/validate", post(handler::serve))
        .with_state(ctx)
}

/// Run the webhook server with TLS.
///
/// Binds `0.0.0.0:<port>` with the PEM key pair from the configured paths.
/// The handle is the shutdown side-channel: `main` calls
/// `graceful_shutdown` on its clone and this function returns once
/// in-flight requests have drained or the grace period lapses.
pub async fn run_webhook_server(
    config: &Config,
    ctx: Arc<WebhookContext>,
    handle: Handle,
) -> Result<(), WebhookServerError> {
    let tls = RustlsConfig::from_pem_file(&config.tls_cert_file, &config.tls_key_file)
        .await
        .map_err(WebhookServerError::TlsConfig)?;

    let app = webhook_router(ctx);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!(port = config.port, "webhook server listening with TLS");

    axum_server::bind_rustls(addr, tls)
        .handle(handle)
        .serve(app.into_make_service())
        .await
        .map_err(WebhookServerError::Serve)
}
