//! PolkadotNode Custom Resource Definition.
//!
//! Declares one Parity Polkadot client instance, plus its defaulting and
//! admission rules.

use super::{ChainNode, LoggingVerbosity, ResourceDefaults, Resources};
use crate::admission::resources::{validate_resources, validate_resources_update};
use crate::admission::{Defaulter, FieldError, FieldErrorList, FieldPath, Validator};
use crate::clients::{ClientFamily, NodeClient};
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// PolkadotNode is the Schema for the polkadotnodes API.
///
/// # Example
///
/// ```yaml
/// apiVersion: chainkeeper.io/v1alpha1
/// kind: PolkadotNode
/// metadata:
///   name: kusama-archive
/// spec:
///   network: kusama
///   pruning: false
///   rpc: true
///   resources:
///     storage: 500Gi
/// ```
#[derive(CustomResource, Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "chainkeeper.io",
    version = "v1alpha1",
    kind = "PolkadotNode",
    plural = "polkadotnodes",
    shortname = "pdn",
    namespaced,
    derive = "PartialEq",
    printcolumn = r#"{"name":"Network", "type":"string", "jsonPath":".spec.network"}"#,
    printcolumn = r#"{"name":"Validator", "type":"boolean", "jsonPath":".spec.validator"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct PolkadotNodeSpec {
    /// Chain to join (polkadot, kusama, westend, ...). Immutable.
    pub network: String,

    /// P2P listening port.
    #[serde(default)]
    pub p2p_port: u16,

    /// Blockchain synchronization mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_mode: Option<PolkadotSyncMode>,

    /// Logging verbosity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingVerbosity>,

    /// Run as a block-producing validator.
    #[serde(default)]
    pub validator: bool,

    /// Prune old state. `false` keeps the full archive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pruning: Option<bool>,

    /// Number of recent blocks to keep state for when pruning.
    #[serde(default)]
    pub retained_blocks: u32,

    /// Report to a telemetry server.
    #[serde(default = "super::default_true")]
    pub telemetry: bool,

    /// Telemetry server URL.
    #[serde(default, rename = "telemetryURL", skip_serializing_if = "String::is_empty")]
    pub telemetry_url: String,

    /// Expose Prometheus metrics.
    #[serde(default)]
    pub prometheus: bool,

    /// Prometheus exporter port.
    #[serde(default)]
    pub prometheus_port: u16,

    /// Enable the HTTP JSON-RPC server.
    #[serde(default)]
    pub rpc: bool,

    /// HTTP JSON-RPC port.
    #[serde(default)]
    pub rpc_port: u16,

    /// Enable the websocket JSON-RPC server.
    #[serde(default)]
    pub ws: bool,

    /// Websocket JSON-RPC port.
    #[serde(default)]
    pub ws_port: u16,

    /// Browser origins allowed to call RPC and websocket servers.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cors_domains: Vec<String>,

    /// Compute and storage resources.
    #[serde(default)]
    pub resources: Resources,
}

/// Polkadot synchronization mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum PolkadotSyncMode {
    /// Download and execute every block.
    Full,
    /// Download headers and state, then execute from there.
    Fast,
}

impl fmt::Display for PolkadotSyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolkadotSyncMode::Full => f.write_str("full"),
            PolkadotSyncMode::Fast => f.write_str("fast"),
        }
    }
}

impl Default for PolkadotNodeSpec {
    fn default() -> Self {
        Self {
            network: String::new(),
            p2p_port: 0,
            sync_mode: None,
            logging: None,
            validator: false,
            pruning: None,
            retained_blocks: 0,
            telemetry: true,
            telemetry_url: String::new(),
            prometheus: false,
            prometheus_port: 0,
            rpc: false,
            rpc_port: 0,
            ws: false,
            ws_port: 0,
            cors_domains: Vec::new(),
            resources: Resources::default(),
        }
    }
}

/// Default resources of a Polkadot node.
pub const DEFAULT_RESOURCES: ResourceDefaults = ResourceDefaults {
    cpu: "4",
    cpu_limit: "8",
    memory: "8Gi",
    memory_limit: "16Gi",
    storage: "80Gi",
};

/// Default P2P port.
pub const DEFAULT_P2P_PORT: u16 = 30333;
/// Default HTTP JSON-RPC port.
pub const DEFAULT_RPC_PORT: u16 = 9933;
/// Default websocket JSON-RPC port.
pub const DEFAULT_WS_PORT: u16 = 9944;
/// Default Prometheus port.
pub const DEFAULT_PROMETHEUS_PORT: u16 = 9615;
/// Default synchronization mode.
pub const DEFAULT_SYNC_MODE: PolkadotSyncMode = PolkadotSyncMode::Full;
/// Default logging verbosity.
pub const DEFAULT_LOGGING: LoggingVerbosity = LoggingVerbosity::Info;

impl Defaulter for PolkadotNode {
    fn default_spec(&mut self) {
        tracing::debug!(name = %self.name_any(), "Defaulting PolkadotNode");
        let spec = &mut self.spec;

        spec.resources.apply_defaults(&DEFAULT_RESOURCES);

        if spec.p2p_port == 0 {
            spec.p2p_port = DEFAULT_P2P_PORT;
        }
        if spec.sync_mode.is_none() {
            spec.sync_mode = Some(DEFAULT_SYNC_MODE);
        }
        if spec.logging.is_none() {
            spec.logging = Some(DEFAULT_LOGGING);
        }
        if spec.rpc && spec.rpc_port == 0 {
            spec.rpc_port = DEFAULT_RPC_PORT;
        }
        if spec.ws && spec.ws_port == 0 {
            spec.ws_port = DEFAULT_WS_PORT;
        }
        if spec.prometheus && spec.prometheus_port == 0 {
            spec.prometheus_port = DEFAULT_PROMETHEUS_PORT;
        }
        if (spec.rpc || spec.ws) && spec.cors_domains.is_empty() {
            spec.cors_domains = vec!["all".to_string()];
        }
    }
}

impl PolkadotNode {
    fn validate(&self) -> FieldErrorList {
        let spec_path = FieldPath::new("spec");
        let mut errors = validate_resources(&self.spec.resources, &spec_path.child("resources"));

        if self.spec.validator && self.spec.pruning == Some(true) {
            errors.push(FieldError::invalid(
                &spec_path.child("pruning"),
                "true",
                "must be false if node is validator",
            ));
        }

        errors
    }
}

impl Validator for PolkadotNode {
    fn validate_create(&self) -> FieldErrorList {
        tracing::debug!(name = %self.name_any(), "Validating PolkadotNode create");
        self.validate()
    }

    fn validate_update(&self, old: &Self) -> FieldErrorList {
        tracing::debug!(name = %self.name_any(), "Validating PolkadotNode update");
        let spec_path = FieldPath::new("spec");
        let mut errors = self.validate();

        if old.spec.network != self.spec.network {
            errors.push(FieldError::invalid(
                &spec_path.child("network"),
                &self.spec.network,
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

impl ChainNode for PolkadotNode {
    const FAMILY: ClientFamily = ClientFamily::Polkadot;

    fn resources(&self) -> &Resources {
        &self.spec.resources
    }

    fn client(&self) -> NodeClient<'_> {
        NodeClient::Polkadot(self)
    }
}
