//! Mutating admission webhook.
//!
//! The API server POSTs an AdmissionReview envelope over TLS; the handler
//! validates the transport, decodes the pod under review, asks the mutation
//! strategy for a patch, and answers with a review envelope carrying the
//! decision.

pub mod codec;
pub mod handler;
pub mod mutation;
mod server;

pub use codec::ReviewCodec;
pub use handler::WebhookContext;
pub use mutation::{AllowAllMutator, GpuLimitMutator, Mutate};
pub use server::{run_webhook_server, webhook_router, WebhookServerError};
