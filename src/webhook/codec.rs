//! AdmissionReview envelope codec.
//!
//! Models the admission.k8s.io review envelope with serde and provides the
//! decode/encode entry points used by the decision handler. Envelope decode
//! failures, embedded-object decode failures, and encode failures are kept
//! as distinct error variants because the handler reports them differently.

use k8s_openapi::api::core::v1::Pod;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

/// apiVersion stamped on every response envelope.
pub const API_VERSION: &str = "admission.k8s.io/v1";
/// kind stamped on every response envelope.
pub const KIND: &str = "AdmissionReview";

/// Error type for envelope codec operations
#[derive(Error, Debug)]
pub enum CodecError {
    /// The bytes are not a valid AdmissionReview envelope
    #[error("could not decode admission review: {0}")]
    DecodeReview(#[source] serde_json::Error),

    /// The envelope parsed but carries no request member
    #[error("admission review has no request")]
    MissingRequest,

    /// The embedded object is not a valid Pod
    #[error("could not decode pod object: {0}")]
    DecodeObject(#[source] serde_json::Error),

    /// A response envelope failed to serialize
    #[error("could not encode admission review: {0}")]
    EncodeReview(#[source] serde_json::Error),

    /// A patch failed to serialize while being attached to a response
    #[error("could not encode patch: {0}")]
    EncodePatch(#[source] serde_json::Error),
}

impl CodecError {
    /// Whether this failure is in understanding the caller's payload, as
    /// opposed to producing our own.
    pub fn is_decode(&self) -> bool {
        matches!(
            self,
            CodecError::DecodeReview(_) | CodecError::MissingRequest | CodecError::DecodeObject(_)
        )
    }
}

/// The versioned wrapper carried on the wire in both directions.
///
/// Requests are decoded leniently: the API server always sends
/// `apiVersion`/`kind`, but their absence is tolerated and defaulted.
/// Responses always serialize both.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionReview {
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_kind")]
    pub kind: String,
    /// Present on the inbound side of the exchange.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<AdmissionRequest>,
    /// Present on the outbound side of the exchange.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<AdmissionResponse>,
}

fn default_api_version() -> String {
    API_VERSION.to_string()
}

fn default_kind() -> String {
    KIND.to_string()
}

/// Group/version/kind metadata for the object under review.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct GroupVersionKind {
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub kind: String,
}

/// The inbound half of the envelope.
///
/// `uid` and `object` are required; everything else the API server sends is
/// optional here and unknown fields are ignored.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionRequest {
    /// Correlation identifier, echoed unchanged in the response.
    pub uid: String,
    /// Type metadata of the object under review.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<GroupVersionKind>,
    /// The serialized target object, decoded into a Pod on demand.
    pub object: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// The outbound half of the envelope.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionResponse {
    /// Correlation identifier copied from the request, or empty when the
    /// request never decoded.
    pub uid: String,
    pub allowed: bool,
    /// Failure detail when decode or processing failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    /// Base64 of a JSON array of RFC 6902 operations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch_type: Option<PatchType>,
}

/// Patch operation language tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub enum PatchType {
    #[serde(rename = "JSONPatch")]
    JsonPatch,
}

/// Structured failure result carried inside a response.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Status {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl AdmissionResponse {
    /// An allow decision for the given correlation identifier.
    pub fn allowed(uid: String) -> Self {
        Self {
            uid,
            allowed: true,
            status: None,
            patch: None,
            patch_type: None,
        }
    }

    /// A deny decision carrying a failure message.
    pub fn denied(uid: String, message: impl Into<String>) -> Self {
        Self {
            uid,
            allowed: false,
            status: Some(Status {
                message: Some(message.into()),
            }),
            patch: None,
            patch_type: None,
        }
    }

    /// Attach a JSON Patch, base64-encoded per the admission contract.
    /// An empty patch leaves the response untouched.
    pub fn with_patch(mut self, patch: &json_patch::Patch) -> Result<Self, CodecError> {
        if patch.0.is_empty() {
            return Ok(self);
        }
        let raw = serde_json::to_vec(patch).map_err(CodecError::EncodePatch)?;
        self.patch = Some(STANDARD.encode(raw));
        self.patch_type = Some(PatchType::JsonPatch);
        Ok(self)
    }
}

/// Encodes and decodes AdmissionReview envelopes.
///
/// Constructed once at startup and owned by the decision handler context,
/// so the serialization machinery is explicit state rather than a process
/// global.
#[derive(Clone, Copy, Debug, Default)]
pub struct ReviewCodec;

impl ReviewCodec {
    /// Decode the inbound envelope and pull out its request.
    pub fn decode_request(&self, body: &[u8]) -> Result<AdmissionRequest, CodecError> {
        let review: AdmissionReview =
            serde_json::from_slice(body).map_err(CodecError::DecodeReview)?;
        review.request.ok_or(CodecError::MissingRequest)
    }

    /// Decode the raw object embedded in a request into a Pod.
    pub fn decode_pod(&self, request: &AdmissionRequest) -> Result<Pod, CodecError> {
        serde_json::from_value(request.object.clone()).map_err(CodecError::DecodeObject)
    }

    /// Wrap a response in a fresh envelope and serialize it.
    pub fn encode_response(&self, response: AdmissionResponse) -> Result<Vec<u8>, CodecError> {
        let review = AdmissionReview {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            request: None,
            response: Some(response),
        };
        serde_json::to_vec(&review).map_err(CodecError::EncodeReview)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn codec() -> ReviewCodec {
        ReviewCodec
    }

    #[test]
    fn test_decode_minimal_request() {
        let body = br#"{"request":{"uid":"abc","object":{"spec":{"containers":[{"name":"build"}]}}}}"#;
        let request = codec().decode_request(body).unwrap();
        assert_eq!(request.uid, "abc");
        assert!(request.kind.is_none());
        assert!(request.operation.is_none());
    }

    #[test]
    fn test_decode_tolerates_full_envelope() {
        let body = serde_json::to_vec(&json!({
            "apiVersion": "admission.k8s.io/v1",
            "kind": "AdmissionReview",
            "request": {
                "uid": "9f2a",
                "kind": {"group": "", "version": "v1", "kind": "Pod"},
                "operation": "CREATE",
                "namespace": "default",
                "name": "demo",
                "object": {"spec": {"containers": [{"name": "app"}]}},
                "dryRun": false
            }
        }))
        .unwrap();
        let request = codec().decode_request(&body).unwrap();
        assert_eq!(request.uid, "9f2a");
        assert_eq!(request.kind.unwrap().kind, "Pod");
        assert_eq!(request.namespace.as_deref(), Some("default"));
    }

    #[test]
    fn test_decode_rejects_malformed_json() {
        let err = codec().decode_request(b"{not json").unwrap_err();
        assert!(matches!(err, CodecError::DecodeReview(_)));
        assert!(err.is_decode());
    }

    #[test]
    fn test_decode_rejects_missing_request() {
        let err = codec().decode_request(b"{}").unwrap_err();
        assert!(matches!(err, CodecError::MissingRequest));
    }

    #[test]
    fn test_decode_rejects_missing_uid() {
        let body = br#"{"request":{"object":{}}}"#;
        let err = codec().decode_request(body).unwrap_err();
        assert!(matches!(err, CodecError::DecodeReview(_)));
    }

    #[test]
    fn test_decode_rejects_missing_object() {
        let body = br#"{"request":{"uid":"abc"}}"#;
        let err = codec().decode_request(body).unwrap_err();
        assert!(matches!(err, CodecError::DecodeReview(_)));
    }

    #[test]
    fn test_decode_pod_from_request() {
        let body = br#"{"request":{"uid":"abc","object":{"spec":{"containers":[{"name":"build"},{"name":"sidecar"}]}}}}"#;
        let request = codec().decode_request(body).unwrap();
        let pod = codec().decode_pod(&request).unwrap();
        let containers = pod.spec.unwrap().containers;
        assert_eq!(containers.len(), 2);
        assert_eq!(containers[0].name, "build");
    }

    #[test]
    fn test_decode_pod_failure_is_distinct() {
        let body = br#"{"request":{"uid":"abc","object":{"spec":{"containers":[{}]}}}}"#;
        let request = codec().decode_request(body).unwrap();
        let err = codec().decode_pod(&request).unwrap_err();
        assert!(matches!(err, CodecError::DecodeObject(_)));
        assert!(err.is_decode());
    }

    #[test]
    fn test_encode_allow_response() {
        let bytes = codec()
            .encode_response(AdmissionResponse::allowed("abc".to_string()))
            .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["apiVersion"], "admission.k8s.io/v1");
        assert_eq!(value["kind"], "AdmissionReview");
        assert_eq!(value["response"]["uid"], "abc");
        assert_eq!(value["response"]["allowed"], true);
        assert!(value["response"].get("patch").is_none());
        assert!(value["response"].get("status").is_none());
    }

    #[test]
    fn test_encode_denied_response_carries_message() {
        let bytes = codec()
            .encode_response(AdmissionResponse::denied(String::new(), "boom"))
            .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["response"]["uid"], "");
        assert_eq!(value["response"]["allowed"], false);
        assert_eq!(value["response"]["status"]["message"], "boom");
    }

    #[test]
    fn test_with_patch_sets_type_and_base64() {
        use json_patch::{Patch, PatchOperation, ReplaceOperation};
        use jsonptr::PointerBuf;

        let patch = Patch(vec![PatchOperation::Replace(ReplaceOperation {
            path: PointerBuf::from_tokens(["spec", "containers"]),
            value: json!([]),
        })]);
        let response = AdmissionResponse::allowed("abc".to_string())
            .with_patch(&patch)
            .unwrap();
        assert_eq!(response.patch_type, Some(PatchType::JsonPatch));

        let decoded = STANDARD.decode(response.patch.unwrap()).unwrap();
        let ops: serde_json::Value = serde_json::from_slice(&decoded).unwrap();
        assert_eq!(ops[0]["op"], "replace");
        assert_eq!(ops[0]["path"], "/spec/containers");
    }

    #[test]
    fn test_with_empty_patch_is_noop() {
        let response = AdmissionResponse::allowed("abc".to_string())
            .with_patch(&json_patch::Patch(Vec::new()))
            .unwrap();
        assert!(response.patch.is_none());
        assert!(response.patch_type.is_none());
    }

    #[test]
    fn test_response_round_trip_preserves_fields() {
        let original = json!({
            "apiVersion": "admission.k8s.io/v1",
            "kind": "AdmissionReview",
            "response": {
                "uid": "u-1",
                "allowed": true,
                "patch": "W10=",
                "patchType": "JSONPatch"
            }
        });
        let review: AdmissionReview = serde_json::from_value(original.clone()).unwrap();
        let response = review.response.unwrap();
        let encoded = codec().encode_response(response).unwrap();
        let round_tripped: serde_json::Value = serde_json::from_slice(&encoded).unwrap();
        assert_eq!(round_tripped, original);
    }
}
