//! Kubernetes client utilities for PVC inspection and resizing

use anyhow::{Context, Result};
use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use kube::api::{Api, Patch, PatchParams};
use kube::Client;

use volgres_models::quantity;

use crate::error::PatchError;

/// Get a Kubernetes client
pub async fn get_k8s_client() -> Result<Client> {
    Client::try_default()
        .await
        .context("Failed to create Kubernetes client")
}

/// Current provisioned size of a PVC in bytes.
///
/// Prefers `status.capacity` (what the storage platform has actually
/// committed); falls back to `spec.resources.requests` for a PVC whose
/// expansion is still in flight.
pub async fn current_pvc_size(
    client: &Client,
    namespace: &str,
    pvc_name: &str,
) -> Result<u64, PatchError> {
    let pvcs: Api<PersistentVolumeClaim> = Api::namespaced(client.clone(), namespace);

    let pvc = match pvcs.get(pvc_name).await {
        Ok(pvc) => pvc,
        Err(kube::Error::Api(response)) if response.code == 404 => {
            return Err(PatchError::NotFound(pvc_name.to_string()));
        }
        Err(e) => return Err(PatchError::Api(e)),
    };

    let quantity = pvc
        .status
        .as_ref()
        .and_then(|s| s.capacity.as_ref())
        .and_then(|c| c.get("storage"))
        .or_else(|| {
            pvc.spec
                .as_ref()
                .and_then(|s| s.resources.as_ref())
                .and_then(|r| r.requests.as_ref())
                .and_then(|r| r.get("storage"))
        })
        .ok_or_else(|| PatchError::MissingStorage {
            pvc: pvc_name.to_string(),
        })?;

    quantity::parse_bytes(&quantity.0).map_err(|_| PatchError::InvalidQuantity {
        pvc: pvc_name.to_string(),
        value: quantity.0.clone(),
    })
}

/// Set a PVC's requested storage size.
///
/// A merge patch on `spec.resources.requests.storage`: idempotent and
/// fire-and-forget; the physical expansion is observed by the sampler on
/// a later pass.
pub async fn patch_pvc_storage(
    client: &Client,
    namespace: &str,
    pvc_name: &str,
    new_size_bytes: u64,
) -> Result<(), PatchError> {
    let pvcs: Api<PersistentVolumeClaim> = Api::namespaced(client.clone(), namespace);

    let patch = serde_json::json!({
        "spec": {
            "resources": {
                "requests": {
                    "storage": quantity::format_bytes(new_size_bytes)
                }
            }
        }
    });

    match pvcs
        .patch(pvc_name, &PatchParams::default(), &Patch::Merge(&patch))
        .await
    {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(response)) if response.code == 404 => {
            Err(PatchError::NotFound(pvc_name.to_string()))
        }
        Err(e) => Err(PatchError::Api(e)),
    }
}
