//! NearNode Custom Resource Definition.
//!
//! Declares one NEAR core client instance, plus its defaulting and admission rules.

use super::{ChainNode, ResourceDefaults, Resources};
use crate::admission::resources::{validate_resources, validate_resources_update};
use crate::admission::{Defaulter, FieldError, FieldErrorList, FieldPath, Validator};
use crate::clients::{ClientFamily, NodeClient};
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// NearNode is the Schema for the nearnodes API.
#[derive(CustomResource, Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "chainkeeper.io",
    version = "v1alpha1",
    kind = "NearNode",
    plural = "nearnodes",
    shortname = "nn",
    namespaced,
    printcolumn = r#"{"name":"Network", "type":"string", "jsonPath":".spec.network"}"#,
    printcolumn = r#"{"name":"Archive", "type":"boolean", "jsonPath":".spec.archive"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct NearNodeSpec {
    /// NEAR network (mainnet, testnet, betanet). Immutable.
    pub network: String,

    /// Keep the full history instead of garbage-collecting old epochs. Immutable.
    #[serde(default)]
    pub archive: bool,

    /// Minimum number of peers before syncing starts.
    #[serde(default)]
    pub min_peers: u32,

    /// P2P listening host.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub p2p_host: String,

    /// P2P listening port.
    #[serde(default)]
    pub p2p_port: u16,

    /// Enable the JSON-RPC server.
    #[serde(default = "super::default_true")]
    pub rpc: bool,

    /// JSON-RPC listening host.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub rpc_host: String,

    /// JSON-RPC listening port.
    #[serde(default)]
    pub rpc_port: u16,

    /// Prometheus exporter host.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub prometheus_host: String,

    /// Prometheus exporter port.
    #[serde(default)]
    pub prometheus_port: u16,

    /// Telemetry endpoint.
    #[serde(default, rename = "telemetryURL", skip_serializing_if = "String::is_empty")]
    pub telemetry_url: String,

    /// Boot nodes, `<public key>@<host>:<port>`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bootnodes: Vec<String>,

    /// Compute and storage resources.
    #[serde(default)]
    pub resources: Resources,
}

impl Default for NearNodeSpec {
    fn default() -> Self {
        Self {
            network: String::new(),
            archive: false,
            min_peers: 0,
            p2p_host: String::new(),
            p2p_port: 0,
            rpc: true,
            rpc_host: String::new(),
            rpc_port: 0,
            prometheus_host: String::new(),
            prometheus_port: 0,
            telemetry_url: String::new(),
            bootnodes: Vec::new(),
            resources: Resources::default(),
        }
    }
}

/// Default resources of a NEAR node.
pub const DEFAULT_RESOURCES: ResourceDefaults = ResourceDefaults {
    cpu: "4",
    cpu_limit: "8",
    memory: "12Gi",
    memory_limit: "24Gi",
    storage: "250Gi",
};

/// Storage requested by archival nodes when unset.
pub const DEFAULT_ARCHIVAL_STORAGE: &str = "4Ti";
/// Default minimum peers.
pub const DEFAULT_MIN_PEERS: u32 = 5;
/// Default host for every listener.
pub const DEFAULT_HOST: &str = "0.0.0.0";
/// Default P2P port.
pub const DEFAULT_P2P_PORT: u16 = 24567;
/// Default JSON-RPC port.
pub const DEFAULT_RPC_PORT: u16 = 3030;
/// Default Prometheus port.
pub const DEFAULT_PROMETHEUS_PORT: u16 = 9615;

impl Defaulter for NearNode {
    fn default_spec(&mut self) {
        tracing::debug!(name = %self.name_any(), "Defaulting NearNode");
        let spec = &mut self.spec;

        if spec.archive && spec.resources.storage.is_empty() {
            spec.resources.storage = DEFAULT_ARCHIVAL_STORAGE.to_string();
        }
        spec.resources.apply_defaults(&DEFAULT_RESOURCES);

        if spec.min_peers == 0 {
            spec.min_peers = DEFAULT_MIN_PEERS;
        }
        if spec.p2p_host.is_empty() {
            spec.p2p_host = DEFAULT_HOST.to_string();
        }
        if spec.p2p_port == 0 {
            spec.p2p_port = DEFAULT_P2P_PORT;
        }
        if spec.rpc {
            if spec.rpc_host.is_empty() {
                spec.rpc_host = DEFAULT_HOST.to_string();
            }
            if spec.rpc_port == 0 {
                spec.rpc_port = DEFAULT_RPC_PORT;
            }
            if spec.prometheus_host.is_empty() {
                spec.prometheus_host = DEFAULT_HOST.to_string();
            }
            if spec.prometheus_port == 0 {
                spec.prometheus_port = DEFAULT_PROMETHEUS_PORT;
            }
        }
    }
}

impl Validator for NearNode {
    fn validate_create(&self) -> FieldErrorList {
        tracing::debug!(name = %self.name_any(), "Validating NearNode create");
        validate_resources(
            &self.spec.resources,
            &FieldPath::new("spec").child("resources"),
        )
    }

    fn validate_update(&self, old: &Self) -> FieldErrorList {
        tracing::debug!(name = %self.name_any(), "Validating NearNode update");
        let spec_path = FieldPath::new("spec");
        let mut errors = self.validate_create();

        if old.spec.network != self.spec.network {
            errors.push(FieldError::invalid(
                &spec_path.child("network"),
                &self.spec.network,
                "field is immutable",
            ));
        }

        if old.spec.archive != self.spec.archive {
            errors.push(FieldError::invalid(
                &spec_path.child("archive"),
                self.spec.archive.to_string(),
                "field is immutable",
            ));
        }

        errors.extend(validate_resources_update(
            &old.spec.resources,
            &self.spec.resources,
            &spec_path.child("resources"),
        ));

        errors
    }
}

impl ChainNode for NearNode {
    const FAMILY: ClientFamily = ClientFamily::Near;

    fn resources(&self) -> &Resources {
        &self.spec.resources
    }

    fn client(&self) -> NodeClient<'_> {
        NodeClient::Near(self)
    }
}
