//! Integration tests for the admission pipeline.
//!
//! These tests drive AdmissionReviews through the webhook router the same
//! way the API server does, without a running cluster.

use base64::Engine;
use chainkeeper_operator::admission::{dispatch, AdmissionReview, Defaulter};
use chainkeeper_operator::crd::PolkadotNode;
use serde_json::{json, Value};

fn review(operation: &str, object: Value, old_object: Option<Value>) -> AdmissionReview {
    serde_json::from_value(json!({
        "apiVersion": "admission.k8s.io/v1",
        "kind": "AdmissionReview",
        "request": {
            "uid": "705ab4f5-6393-11e8-b7cc-42010a800002",
            "operation": operation,
            "name": "node-1",
            "namespace": "chains",
            "object": object,
            "oldObject": old_object,
        }
    }))
    .unwrap()
}

fn polkadot(resources: Value) -> Value {
    json!({
        "apiVersion": "chainkeeper.io/v1alpha1",
        "kind": "PolkadotNode",
        "metadata": {"name": "node-1", "namespace": "chains"},
        "spec": {"network": "polkadot", "resources": resources}
    })
}

fn answer(path: &str, review: &AdmissionReview) -> Value {
    let answer = dispatch(path, review).expect("registered path");
    serde_json::to_value(answer).unwrap()
}

#[test]
fn test_equal_memory_request_and_limit_is_rejected() {
    let resources = json!({"cpu": "1", "cpuLimit": "2", "memory": "1Gi", "memoryLimit": "1Gi"});
    let out = answer("/validate-polkadotnode", &review("CREATE", polkadot(resources), None));

    let response = &out["response"];
    assert_eq!(response["uid"], "705ab4f5-6393-11e8-b7cc-42010a800002");
    assert_eq!(response["allowed"], false);
    assert_eq!(response["status"]["code"], 422);

    let causes = response["status"]["details"]["causes"].as_array().unwrap();
    assert_eq!(causes.len(), 1);
    assert_eq!(causes[0]["field"], "spec.resources.memoryLimit");
    assert!(causes[0]["message"]
        .as_str()
        .unwrap()
        .ends_with("must be greater than memory 1Gi"));
}

#[test]
fn test_cpu_limit_below_request_is_rejected() {
    let resources = json!({"cpu": "2", "cpuLimit": "1"});
    let out = answer("/validate-polkadotnode", &review("CREATE", polkadot(resources), None));

    let causes = out["response"]["status"]["details"]["causes"].as_array().unwrap();
    assert_eq!(causes.len(), 1);
    assert_eq!(causes[0]["field"], "spec.resources.cpuLimit");
    assert!(causes[0]["message"]
        .as_str()
        .unwrap()
        .ends_with("must be greater than or equal to cpu 2"));
}

#[test]
fn test_equal_cpu_request_and_limit_is_allowed() {
    let resources = json!({"cpu": "2", "cpuLimit": "2", "memory": "1Gi", "memoryLimit": "2Gi"});
    let out = answer("/validate-polkadotnode", &review("CREATE", polkadot(resources), None));
    assert_eq!(out["response"]["allowed"], true);
}

#[test]
fn test_update_to_equal_memory_is_rejected() {
    let old = polkadot(json!({"memory": "1Gi", "memoryLimit": "2Gi"}));
    let new = polkadot(json!({"memory": "1Gi", "memoryLimit": "1Gi"}));
    let out = answer("/validate-polkadotnode", &review("UPDATE", new, Some(old)));

    assert_eq!(out["response"]["allowed"], false);
    let message = out["response"]["status"]["message"].as_str().unwrap();
    assert!(message.contains("spec.resources.memoryLimit"));
}

#[test]
fn test_network_change_is_rejected() {
    let old = polkadot(json!({}));
    let mut new = old.clone();
    new["spec"]["network"] = json!("kusama");
    let out = answer("/validate-polkadotnode", &review("UPDATE", new, Some(old)));

    let causes = out["response"]["status"]["details"]["causes"].as_array().unwrap();
    assert_eq!(causes[0]["field"], "spec.network");
}

#[test]
fn test_delete_is_always_allowed() {
    let out = answer(
        "/validate-polkadotnode",
        &review("DELETE", polkadot(json!({"cpu": "2", "cpuLimit": "1"})), None),
    );
    assert_eq!(out["response"]["allowed"], true);
}

#[test]
fn test_mutation_patch_carries_defaults_and_is_stable() {
    let out = answer("/mutate-polkadotnode", &review("CREATE", polkadot(json!({})), None));
    let response = &out["response"];
    assert_eq!(response["allowed"], true);
    assert_eq!(response["patchType"], "JSONPatch");

    let decoded = base64::engine::general_purpose::STANDARD
        .decode(response["patch"].as_str().unwrap())
        .unwrap();
    let patch: Value = serde_json::from_slice(&decoded).unwrap();
    let spec = &patch[0]["value"];
    assert_eq!(patch[0]["path"], "/spec");
    assert_eq!(spec["p2pPort"], 30333);
    assert_eq!(spec["resources"]["memoryLimit"], "16Gi");

    // Defaulting what the webhook already defaulted changes nothing.
    let mut node: PolkadotNode =
        serde_json::from_value(json!({"metadata": {"name": "node-1"}, "spec": spec, "apiVersion": "chainkeeper.io/v1alpha1", "kind": "PolkadotNode"}))
            .unwrap();
    let before = node.clone();
    node.default_spec();
    assert_eq!(node, before);
}

#[test]
fn test_besu_network_reports_every_node_error() {
    let network = json!({
        "apiVersion": "chainkeeper.io/v1alpha1",
        "kind": "BesuNetwork",
        "metadata": {"name": "goerli", "namespace": "chains"},
        "spec": {
            "join": "goerli",
            "nodes": [
                {"name": "a", "miner": true},
                {"name": "a"}
            ]
        }
    });
    let out = answer("/validate-besunetwork", &review("CREATE", network, None));

    let fields: Vec<&str> = out["response"]["status"]["details"]["causes"]
        .as_array()
        .unwrap()
        .iter()
        .map(|cause| cause["field"].as_str().unwrap())
        .collect();
    assert!(fields.contains(&"spec.nodes[0].minerAccount"));
    assert!(fields.contains(&"spec.nodes[1].name"));
}

#[test]
fn test_unknown_path_is_not_routed() {
    let review = review("CREATE", polkadot(json!({})), None);
    assert!(dispatch("/validate-secret", &review).is_none());
}
