//! Job mutation webhook handler
//!
//! Handles `AdmissionReview` requests for `batch/v1` Jobs, translating the
//! TTL defaulting decision into an admission response: a JSON patch when the
//! Job was mutated, an unchanged allow when there was nothing to do, and a
//! denial when the configured selector cannot be parsed.

use std::sync::Arc;

use axum::{extract::State, Json};
use k8s_openapi::api::batch::v1::Job;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview};
use kube::core::DynamicObject;
use tracing::{debug, error, info};

use crate::mutate::Outcome;

use super::WebhookState;

/// Handle a mutating admission review for Jobs
///
/// Admission protocol errors (a review without a request, a malformed
/// review) are reported inside the response envelope rather than as HTTP
/// errors, so the API server can surface them against the admitted object.
pub async fn mutate_handler(
    State(state): State<Arc<WebhookState>>,
    Json(body): Json<AdmissionReview<Job>>,
) -> Json<AdmissionReview<DynamicObject>> {
    let req: AdmissionRequest<Job> = match body.try_into() {
        Ok(req) => req,
        Err(e) => {
            error!(error = %e, "failed to parse admission request");
            return Json(AdmissionResponse::invalid(e.to_string()).into_review());
        }
    };

    let response = mutate_job(&state, &req);
    Json(response.into_review())
}

/// Process a single Job mutation request
fn mutate_job(state: &WebhookState, request: &AdmissionRequest<Job>) -> AdmissionResponse {
    let uid = request.uid.clone();

    let job = match &request.object {
        Some(job) => job,
        None => {
            debug!(uid = %uid, "no job object in request, allowing unchanged");
            return AdmissionResponse::from(request);
        }
    };

    let mut mutated = job.clone();
    match state.defaulter.default_ttl(&mut mutated) {
        Ok(Outcome::Patched) => {
            let patch_ops = build_patch_operations(job, &mutated);

            info!(
                uid = %uid,
                job = ?job.metadata.name,
                namespace = ?job.metadata.namespace,
                patch_ops = patch_ops.len(),
                "applying TTL patch to job"
            );

            match AdmissionResponse::from(request).with_patch(json_patch::Patch(patch_ops)) {
                Ok(response) => response,
                Err(e) => {
                    error!(uid = %uid, error = %e, "failed to serialize patch");
                    AdmissionResponse::from(request)
                        .deny(format!("patch serialization error: {e}"))
                }
            }
        }
        Ok(outcome) => {
            debug!(uid = %uid, ?outcome, "allowing job unchanged");
            AdmissionResponse::from(request)
        }
        Err(e) => {
            error!(uid = %uid, error = %e, "denying admission request");
            AdmissionResponse::from(request).deny(e.to_string())
        }
    }
}

/// Build the JSON patch operations that carry the defaulted TTL
///
/// The operation kind depends on what the original object had: `replace`
/// when a TTL was present, `add` otherwise, with the spec object itself
/// added first in the unusual case of a Job submitted without one.
fn build_patch_operations(original: &Job, mutated: &Job) -> Vec<json_patch::PatchOperation> {
    use json_patch::{AddOperation, PatchOperation, ReplaceOperation};
    use jsonptr::PointerBuf;

    let mut ops = Vec::new();

    let Some(ttl) = mutated.spec.as_ref().and_then(|s| s.ttl_seconds_after_finished) else {
        return ops;
    };
    let ttl_path = PointerBuf::from_tokens(["spec", "ttlSecondsAfterFinished"]);
    let ttl_value = serde_json::Value::from(ttl);

    match original.spec.as_ref() {
        None => {
            ops.push(PatchOperation::Add(AddOperation {
                path: PointerBuf::from_tokens(["spec"]),
                value: serde_json::json!({}),
            }));
            ops.push(PatchOperation::Add(AddOperation {
                path: ttl_path,
                value: ttl_value,
            }));
        }
        Some(spec) if spec.ttl_seconds_after_finished.is_some() => {
            ops.push(PatchOperation::Replace(ReplaceOperation {
                path: ttl_path,
                value: ttl_value,
            }));
        }
        Some(_) => {
            ops.push(PatchOperation::Add(AddOperation {
                path: ttl_path,
                value: ttl_value,
            }));
        }
    }

    ops
}
