//! Patch construction strategies.
//!
//! A strategy inspects a decoded Pod and produces the JSON Patch expressing
//! the desired mutation, or an empty patch to admit the pod unchanged.
//! Strategies never deny; deny decisions belong to the decision handler.

use std::collections::BTreeMap;

use json_patch::{Patch, PatchOperation, ReplaceOperation};
use jsonptr::PointerBuf;
use k8s_openapi::api::core::v1::{Pod, ResourceRequirements};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use thiserror::Error;

/// Container name the GPU strategy targets.
pub const TARGET_CONTAINER: &str = "build";
/// Resource key injected into the target container's limits.
pub const GPU_RESOURCE: &str = "nvidia.com/gpu";
/// Quantity assigned to the injected resource key.
pub const GPU_QUANTITY: &str = "1";

/// Error type for patch construction
#[derive(Error, Debug)]
pub enum MutationError {
    /// The mutated containers failed to serialize
    #[error("could not serialize mutated containers: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A mutation strategy applied to every admitted pod.
pub trait Mutate: Send + Sync {
    /// Compute the patch for one pod. The cumulative application of the
    /// returned operations to the original object must yield exactly the
    /// intended mutated object. An empty patch admits without mutation.
    fn mutate(&self, pod: &Pod) -> Result<Patch, MutationError>;
}

/// Sets a fixed resource limit on a fixed target container.
///
/// Emits a single `replace` of the whole `/spec/containers` array. The API
/// server diff-applies that one operation against the live object, so the
/// array granularity must not be narrowed to per-element patches.
pub struct GpuLimitMutator {
    pub container: String,
    pub resource: String,
    pub quantity: String,
}

impl Default for GpuLimitMutator {
    fn default() -> Self {
        Self {
            container: TARGET_CONTAINER.to_string(),
            resource: GPU_RESOURCE.to_string(),
            quantity: GPU_QUANTITY.to_string(),
        }
    }
}

impl Mutate for GpuLimitMutator {
    fn mutate(&self, pod: &Pod) -> Result<Patch, MutationError> {
        let Some(spec) = pod.spec.as_ref() else {
            return Ok(Patch(Vec::new()));
        };
        let mut containers = spec.containers.clone();
        let Some(target) = containers.iter_mut().find(|c| c.name == self.container) else {
            return Ok(Patch(Vec::new()));
        };

        target
            .resources
            .get_or_insert_with(ResourceRequirements::default)
            .limits
            .get_or_insert_with(BTreeMap::new)
            .insert(self.resource.clone(), Quantity(self.quantity.clone()));

        let value = serde_json::to_value(&containers)?;
        Ok(Patch(vec![PatchOperation::Replace(ReplaceOperation {
            path: PointerBuf::from_tokens(["spec", "containers"]),
            value,
        })]))
    }
}

/// Admits every pod unchanged.
pub struct AllowAllMutator;

impl Mutate for AllowAllMutator {
    fn mutate(&self, _pod: &Pod) -> Result<Patch, MutationError> {
        Ok(Patch(Vec::new()))
    }
}
