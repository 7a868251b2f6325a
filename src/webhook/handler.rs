//! Admission decision handler.
//!
//! Orchestrates one HTTP exchange: transport validation, envelope decode,
//! patch construction, response encode. Every failure is mapped locally to
//! an HTTP status and, where the protocol expects it, a decision-level
//! status message; nothing propagates far enough to take the server down.

use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::{debug, error, info, warn};

use crate::config::DecodeFailurePolicy;
use crate::health::HealthState;
use crate::webhook::codec::{AdmissionResponse, CodecError, ReviewCodec};
use crate::webhook::mutation::Mutate;

/// The only media type the webhook accepts.
pub const EXPECTED_CONTENT_TYPE: &str = "application/json";

/// Immutable per-process state shared by all admission requests.
///
/// Nothing here is mutated per request; concurrent handlers only read it,
/// apart from the metrics counters which are internally atomic.
pub struct WebhookContext {
    codec: ReviewCodec,
    mutator: Box<dyn Mutate>,
    decode_failure: DecodeFailurePolicy,
    health: Arc<HealthState>,
}

impl WebhookContext {
    pub fn new(
        codec: ReviewCodec,
        mutator: Box<dyn Mutate>,
        decode_failure: DecodeFailurePolicy,
        health: Arc<HealthState>,
    ) -> Self {
        Self {
            codec,
            mutator,
            decode_failure,
            health,
        }
    }
}

/// Admission handler, shared by the mutate and validate routes.
pub async fn serve(
    State(ctx): State<Arc<WebhookContext>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let started = Instant::now();
    let (response, outcome) = admit(&ctx, &headers, &body);
    ctx.health
        .metrics
        .record_review(outcome, started.elapsed().as_secs_f64());
    response
}

/// Run one request through the decision sequence.
///
/// Returns the response plus an outcome label for the metrics family.
fn admit(ctx: &WebhookContext, headers: &HeaderMap, body: &Bytes) -> (Response, &'static str) {
    if body.is_empty() {
        warn!("empty body");
        return (
            plain(StatusCode::BAD_REQUEST, "empty body".to_string()),
            "empty_body",
        );
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if content_type != EXPECTED_CONTENT_TYPE {
        warn!(content_type, "unsupported media type");
        return (
            plain(
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                "invalid Content-Type, expect `application/json`".to_string(),
            ),
            "media_type",
        );
    }

    let request = match ctx.codec.decode_request(body) {
        Ok(request) => request,
        Err(err) => {
            // The request never decoded, so there is no identifier to echo.
            return (decode_failure_response(ctx, String::new(), &err), "decode_error");
        }
    };
    let uid = request.uid.clone();
    debug!(
        uid = %uid,
        operation = ?request.operation,
        namespace = ?request.namespace,
        name = ?request.name,
        "processing admission request"
    );

    let pod = match ctx.codec.decode_pod(&request) {
        Ok(pod) => pod,
        Err(err) => return (decode_failure_response(ctx, uid, &err), "decode_error"),
    };

    let patch = match ctx.mutator.mutate(&pod) {
        Ok(patch) => patch,
        Err(err) => {
            error!(uid = %uid, error = %err, "could not build patch");
            return (
                plain(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("could not build patch: {err}"),
                ),
                "internal_error",
            );
        }
    };
    let patched = !patch.0.is_empty();

    let response = match AdmissionResponse::allowed(uid.clone()).with_patch(&patch) {
        Ok(response) => response,
        Err(err) => {
            error!(uid = %uid, error = %err, "could not encode patch");
            return (
                plain(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("could not encode patch: {err}"),
                ),
                "internal_error",
            );
        }
    };

    let bytes = match ctx.codec.encode_response(response) {
        Ok(bytes) => bytes,
        Err(err) => {
            error!(uid = %uid, error = %err, "could not encode response");
            return (
                plain(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("could not encode response: {err}"),
                ),
                "internal_error",
            );
        }
    };

    info!(uid = %uid, patched, "admission request allowed");
    (review(bytes), "allowed")
}

/// Report a decode failure per the configured policy: embedded in a
/// well-formed review envelope, or as a transport-level server error.
fn decode_failure_response(ctx: &WebhookContext, uid: String, err: &CodecError) -> Response {
    warn!(uid = %uid, error = %err, "could not decode admission request");
    match ctx.decode_failure {
        DecodeFailurePolicy::Status => plain(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("could not decode request: {err}"),
        ),
        DecodeFailurePolicy::Review => {
            let response = AdmissionResponse::denied(uid, err.to_string());
            match ctx.codec.encode_response(response) {
                Ok(bytes) => review(bytes),
                Err(encode_err) => {
                    error!(error = %encode_err, "could not encode failure response");
                    plain(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        format!("could not encode response: {encode_err}"),
                    )
                }
            }
        }
    }
}

fn plain(status: StatusCode, message: String) -> Response {
    (status, message).into_response()
}

fn review(bytes: Vec<u8>) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, EXPECTED_CONTENT_TYPE)],
        bytes,
    )
        .into_response()
}
