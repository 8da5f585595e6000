//! AdmissionReview request handling.
//!
//! Decodes the review the API server posts, runs the kind's [`Defaulter`] or
//! [`Validator`], and builds the response. Transport (TLS, routing) lives in
//! the `webhook` binary.

use super::{Defaulter, FieldErrorList, Validator};
use crate::crd::{BesuNetwork, NearNode, PolkadotNode};
use base64::Engine;
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// API version of admission reviews.
pub const ADMISSION_API_VERSION: &str = "admission.k8s.io/v1";

/// Kubernetes AdmissionReview envelope.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionReview {
    /// `admission.k8s.io/v1`.
    #[serde(default)]
    pub api_version: String,
    /// `AdmissionReview`.
    #[serde(default)]
    pub kind: String,
    /// Set on requests from the API server.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<AdmissionRequest>,
    /// Set on our answers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<AdmissionResponse>,
}

impl AdmissionReview {
    /// Wrap a response into a review envelope.
    pub fn from_response(response: AdmissionResponse) -> Self {
        Self {
            api_version: ADMISSION_API_VERSION.to_string(),
            kind: "AdmissionReview".to_string(),
            request: None,
            response: Some(response),
        }
    }
}

/// The admission request.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionRequest {
    /// Request UID, echoed in the response.
    pub uid: String,
    /// `CREATE`, `UPDATE`, `DELETE` or `CONNECT`.
    #[serde(default)]
    pub operation: String,
    /// Object name, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Object namespace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Incoming object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<serde_json::Value>,
    /// Stored object, on updates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_object: Option<serde_json::Value>,
}

/// The admission response.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionResponse {
    /// UID of the request being answered.
    pub uid: String,
    /// Whether the request is admitted.
    pub allowed: bool,
    /// Reason for a denial.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<AdmissionStatus>,
    /// Base64 encoded JSON patch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch: Option<String>,
    /// Always `JSONPatch` when a patch is set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch_type: Option<String>,
}

/// Status of a denied request.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AdmissionStatus {
    /// HTTP-like status code.
    pub code: u16,
    /// Human-readable message.
    pub message: String,
    /// Machine-readable reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Per-field causes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<StatusDetails>,
}

/// Details of a denial.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StatusDetails {
    /// Name of the rejected object.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// API group of the rejected object.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    /// Kind of the rejected object.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// One entry per field error.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub causes: Vec<StatusCause>,
}

/// One field-scoped cause.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StatusCause {
    /// `FieldValueInvalid`, `FieldValueRequired`, ...
    #[serde(rename = "reason")]
    pub cause_type: String,
    /// Error text without the field path.
    pub message: String,
    /// Offending field path.
    pub field: String,
}

impl AdmissionResponse {
    /// Admit unchanged.
    pub fn allow(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            allowed: true,
            ..Default::default()
        }
    }

    /// Reject with a plain message, for requests that cannot be decoded.
    pub fn bad_request(uid: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            allowed: false,
            status: Some(AdmissionStatus {
                code: 400,
                message: message.into(),
                reason: Some("BadRequest".to_string()),
                details: None,
            }),
            ..Default::default()
        }
    }

    /// Reject with field errors, rendered the way the API server renders
    /// its own validation failures.
    pub fn invalid<K: Resource<DynamicType = ()>>(
        uid: impl Into<String>,
        name: &str,
        errors: &FieldErrorList,
    ) -> Self {
        let kind = K::kind(&());
        let group = K::group(&());
        let causes = errors
            .iter()
            .map(|err| StatusCause {
                cause_type: err.error_type.cause_type().to_string(),
                message: err.body(),
                field: err.field.clone(),
            })
            .collect();

        Self {
            uid: uid.into(),
            allowed: false,
            status: Some(AdmissionStatus {
                code: 422,
                message: format!("{}.{} {:?} is invalid: {}", kind, group, name, errors),
                reason: Some("Invalid".to_string()),
                details: Some(StatusDetails {
                    name: Some(name.to_string()),
                    group: Some(group.to_string()),
                    kind: Some(kind.to_string()),
                    causes,
                }),
            }),
            ..Default::default()
        }
    }

    /// Admit with a JSON patch.
    pub fn with_patch(uid: impl Into<String>, patch: &serde_json::Value) -> Self {
        let encoded = base64::engine::general_purpose::STANDARD.encode(patch.to_string());
        Self {
            uid: uid.into(),
            allowed: true,
            patch: Some(encoded),
            patch_type: Some("JSONPatch".to_string()),
            ..Default::default()
        }
    }
}

fn decode<K: DeserializeOwned>(value: Option<&serde_json::Value>) -> Result<K, String> {
    let value = value.ok_or_else(|| "request carries no object".to_string())?;
    K::deserialize(value).map_err(|e| format!("failed to decode object: {}", e))
}

fn object_name(req: &AdmissionRequest) -> String {
    req.name
        .clone()
        .or_else(|| {
            req.object
                .as_ref()
                .and_then(|o| o.pointer("/metadata/name"))
                .and_then(|n| n.as_str())
                .map(str::to_string)
        })
        .unwrap_or_default()
}

/// Default the incoming object and answer with a patch replacing its spec.
pub fn mutate<K>(req: &AdmissionRequest) -> AdmissionResponse
where
    K: Resource<DynamicType = ()> + Defaulter + Serialize + DeserializeOwned,
{
    let mut obj: K = match decode(req.object.as_ref()) {
        Ok(obj) => obj,
        Err(message) => {
            tracing::warn!(uid = %req.uid, kind = %K::kind(&()), %message, "Rejecting undecodable object");
            return AdmissionResponse::bad_request(&req.uid, message);
        }
    };

    obj.default_spec();

    let spec = match serde_json::to_value(&obj) {
        Ok(mut value) => value["spec"].take(),
        Err(e) => return AdmissionResponse::bad_request(&req.uid, e.to_string()),
    };
    let patch = serde_json::json!([{ "op": "replace", "path": "/spec", "value": spec }]);

    tracing::info!(uid = %req.uid, kind = %K::kind(&()), name = %object_name(req), "Defaulted object");
    AdmissionResponse::with_patch(&req.uid, &patch)
}

/// Validate the incoming object against the operation being performed.
pub fn validate<K>(req: &AdmissionRequest) -> AdmissionResponse
where
    K: Resource<DynamicType = ()> + Validator + DeserializeOwned,
{
    let name = object_name(req);

    let errors = match req.operation.as_str() {
        "CREATE" => decode::<K>(req.object.as_ref()).map(|obj| obj.validate_create()),
        "UPDATE" => decode::<K>(req.object.as_ref()).and_then(|obj| {
            decode::<K>(req.old_object.as_ref()).map(|old| obj.validate_update(&old))
        }),
        _ => Ok(FieldErrorList::new()),
    };

    match errors {
        Ok(errors) if errors.is_empty() => {
            tracing::debug!(uid = %req.uid, kind = %K::kind(&()), name = %name, "Admitted");
            AdmissionResponse::allow(&req.uid)
        }
        Ok(errors) => {
            tracing::info!(
                uid = %req.uid,
                kind = %K::kind(&()),
                name = %name,
                errors = %errors,
                "Denied invalid object"
            );
            AdmissionResponse::invalid::<K>(&req.uid, &name, &errors)
        }
        Err(message) => {
            tracing::warn!(uid = %req.uid, kind = %K::kind(&()), %message, "Rejecting undecodable object");
            AdmissionResponse::bad_request(&req.uid, message)
        }
    }
}

/// Route a review by webhook path.
///
/// Returns `None` for paths no webhook is registered on.
pub fn dispatch(path: &str, review: &AdmissionReview) -> Option<AdmissionReview> {
    let handler: fn(&AdmissionRequest) -> AdmissionResponse = match path {
        "/mutate-polkadotnode" => mutate::<PolkadotNode>,
        "/validate-polkadotnode" => validate::<PolkadotNode>,
        "/mutate-nearnode" => mutate::<NearNode>,
        "/validate-nearnode" => validate::<NearNode>,
        "/mutate-besunetwork" => mutate::<BesuNetwork>,
        "/validate-besunetwork" => validate::<BesuNetwork>,
        _ => return None,
    };

    let response = match &review.request {
        Some(req) => handler(req),
        None => AdmissionResponse::bad_request("", "AdmissionReview missing request"),
    };
    Some(AdmissionReview::from_response(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(operation: &str, object: serde_json::Value) -> AdmissionRequest {
        AdmissionRequest {
            uid: "uid-1".into(),
            operation: operation.into(),
            object: Some(object),
            ..Default::default()
        }
    }

    fn polkadot(resources: serde_json::Value) -> serde_json::Value {
        json!({
            "apiVersion": "chainkeeper.io/v1alpha1",
            "kind": "PolkadotNode",
            "metadata": {"name": "dot", "namespace": "default"},
            "spec": {"network": "kusama", "resources": resources}
        })
    }

    #[test]
    fn mutate_returns_a_spec_patch() {
        let response = mutate::<PolkadotNode>(&request("CREATE", polkadot(json!({}))));
        assert!(response.allowed);
        assert_eq!(response.patch_type.as_deref(), Some("JSONPatch"));

        let raw = base64::engine::general_purpose::STANDARD
            .decode(response.patch.unwrap())
            .unwrap();
        let patch: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(patch[0]["op"], "replace");
        assert_eq!(patch[0]["path"], "/spec");
        assert_eq!(patch[0]["value"]["p2pPort"], 30333);
        assert_eq!(patch[0]["value"]["resources"]["cpu"], "4");
    }

    #[test]
    fn validate_denies_with_causes() {
        let response = validate::<PolkadotNode>(&request(
            "CREATE",
            polkadot(json!({"cpu": "2", "cpuLimit": "1"})),
        ));
        assert!(!response.allowed);

        let status = response.status.unwrap();
        assert_eq!(status.code, 422);
        assert_eq!(status.reason.as_deref(), Some("Invalid"));
        assert_eq!(
            status.message,
            "PolkadotNode.chainkeeper.io \"dot\" is invalid: spec.resources.cpuLimit: Invalid value: \"1\": must be greater than or equal to cpu 2"
        );
        let causes = status.details.unwrap().causes;
        assert_eq!(causes.len(), 1);
        assert_eq!(causes[0].field, "spec.resources.cpuLimit");
        assert_eq!(causes[0].cause_type, "FieldValueInvalid");
    }

    #[test]
    fn validate_update_needs_the_old_object() {
        let mut req = request("UPDATE", polkadot(json!({})));
        let response = validate::<PolkadotNode>(&req);
        assert_eq!(response.status.unwrap().code, 400);

        req.old_object = req.object.clone();
        assert!(validate::<PolkadotNode>(&req).allowed);
    }

    #[test]
    fn deletes_are_always_admitted() {
        let req = AdmissionRequest {
            uid: "uid-2".into(),
            operation: "DELETE".into(),
            ..Default::default()
        };
        assert!(validate::<NearNode>(&req).allowed);
    }

    #[test]
    fn dispatch_routes_by_path() {
        let review = AdmissionReview {
            request: Some(request("CREATE", polkadot(json!({})))),
            ..Default::default()
        };

        let answer = dispatch("/validate-polkadotnode", &review).unwrap();
        assert_eq!(answer.api_version, ADMISSION_API_VERSION);
        let response = answer.response.unwrap();
        assert_eq!(response.uid, "uid-1");
        assert!(response.allowed);

        assert!(dispatch("/validate-secret", &review).is_none());
    }
}
