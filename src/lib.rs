//! gpu-admission-webhook library crate
//!
//! This module exports the webhook server, the admission envelope codec,
//! the mutation strategies, and the health server.

pub mod config;
pub mod health;
pub mod webhook;

pub use config::{Config, DecodeFailurePolicy, MutationStrategy};
pub use health::HealthState;
pub use webhook::{run_webhook_server, ReviewCodec, WebhookContext, WebhookServerError};
