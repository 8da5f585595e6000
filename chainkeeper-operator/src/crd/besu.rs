//! BesuNetwork Custom Resource Definition.
//!
//! A BesuNetwork fans out to one workload per declared node. Each node is
//! reconciled as `<network>-<node>`; nodes dropped from the list have their
//! workloads removed.

use super::{LoggingVerbosity, ResourceDefaults, Resources};
use crate::admission::resources::{validate_resources, validate_resources_update};
use crate::admission::{Defaulter, FieldError, FieldErrorList, FieldPath, Validator};
use kube::{CustomResource, ResourceExt};
use once_cell::sync::Lazy;
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// BesuNetwork is the Schema for the besunetworks API.
///
/// # Example
///
/// ```yaml
/// apiVersion: chainkeeper.io/v1alpha1
/// kind: BesuNetwork
/// metadata:
///   name: goerli
/// spec:
///   join: goerli
///   nodes:
///     - name: rpc
///       rpc: true
///       rpcAPI: [eth, net, web3]
///     - name: miner
///       miner: true
///       minerAccount: "0xfe3b557e8fb62b89f4916b721be55ceb828dbd73"
/// ```
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "chainkeeper.io",
    version = "v1alpha1",
    kind = "BesuNetwork",
    plural = "besunetworks",
    shortname = "besu",
    namespaced,
    printcolumn = r#"{"name":"Join", "type":"string", "jsonPath":".spec.join"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct BesuNetworkSpec {
    /// Public network to join (mainnet, goerli, ...). Immutable.
    pub join: String,

    /// Nodes of this network.
    #[serde(default)]
    pub nodes: Vec<BesuNodeSpec>,
}

/// One Besu node of a network.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BesuNodeSpec {
    /// Node name, unique within the network.
    pub name: String,

    /// Blockchain synchronization mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_mode: Option<BesuSyncMode>,

    /// Logging verbosity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingVerbosity>,

    /// Mine blocks.
    #[serde(default)]
    pub miner: bool,

    /// Account credited with mining rewards. Required for miners.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub miner_account: String,

    /// Enable the HTTP JSON-RPC server.
    #[serde(default)]
    pub rpc: bool,

    /// HTTP JSON-RPC port.
    #[serde(default)]
    pub rpc_port: u16,

    /// HTTP JSON-RPC listening host.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub rpc_host: String,

    /// APIs served over HTTP JSON-RPC.
    #[serde(default, rename = "rpcAPI", skip_serializing_if = "Vec::is_empty")]
    pub rpc_api: Vec<RpcApi>,

    /// Enable the websocket JSON-RPC server.
    #[serde(default)]
    pub ws: bool,

    /// Websocket JSON-RPC port.
    #[serde(default)]
    pub ws_port: u16,

    /// Websocket JSON-RPC listening host.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ws_host: String,

    /// APIs served over websocket JSON-RPC.
    #[serde(default, rename = "wsAPI", skip_serializing_if = "Vec::is_empty")]
    pub ws_api: Vec<RpcApi>,

    /// Host names allowed to reach the RPC servers.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hosts: Vec<String>,

    /// Browser origins allowed to call the RPC servers.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cors_domains: Vec<String>,

    /// Compute and storage resources.
    #[serde(default)]
    pub resources: Resources,
}

/// Besu synchronization mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum BesuSyncMode {
    /// Fast synchronization.
    Fast,
    /// Full synchronization.
    Full,
}

impl BesuSyncMode {
    /// Value passed to `--sync-mode`.
    pub fn as_flag(&self) -> &'static str {
        match self {
            BesuSyncMode::Fast => "FAST",
            BesuSyncMode::Full => "FULL",
        }
    }
}

/// JSON-RPC API namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum RpcApi {
    /// Node administration.
    Admin,
    /// Clique proof-of-authority.
    Clique,
    /// Tracing and debugging.
    Debug,
    /// Enterprise Ethereum Alliance extensions.
    Eea,
    /// Core Ethereum.
    Eth,
    /// IBFT consensus.
    Ibft,
    /// Mining control.
    Miner,
    /// Network status.
    Net,
    /// Permissioning.
    Perm,
    /// Plugin management.
    Plugins,
    /// Private transactions.
    Priv,
    /// Transaction pool.
    Txpool,
    /// Client utilities.
    Web3,
}

impl RpcApi {
    /// Name as Besu expects it on the command line.
    pub fn as_flag(&self) -> &'static str {
        match self {
            RpcApi::Admin => "ADMIN",
            RpcApi::Clique => "CLIQUE",
            RpcApi::Debug => "DEBUG",
            RpcApi::Eea => "EEA",
            RpcApi::Eth => "ETH",
            RpcApi::Ibft => "IBFT",
            RpcApi::Miner => "MINER",
            RpcApi::Net => "NET",
            RpcApi::Perm => "PERM",
            RpcApi::Plugins => "PLUGINS",
            RpcApi::Priv => "PRIV",
            RpcApi::Txpool => "TXPOOL",
            RpcApi::Web3 => "WEB3",
        }
    }
}

impl fmt::Display for RpcApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_flag())
    }
}

/// Default resources of a Besu node.
pub const DEFAULT_RESOURCES: ResourceDefaults = ResourceDefaults {
    cpu: "2",
    cpu_limit: "4",
    memory: "4Gi",
    memory_limit: "8Gi",
    storage: "100Gi",
};

/// Default synchronization mode.
pub const DEFAULT_SYNC_MODE: BesuSyncMode = BesuSyncMode::Fast;
/// Default logging verbosity.
pub const DEFAULT_LOGGING: LoggingVerbosity = LoggingVerbosity::Info;
/// Default HTTP JSON-RPC port.
pub const DEFAULT_RPC_PORT: u16 = 8545;
/// Default websocket JSON-RPC port.
pub const DEFAULT_WS_PORT: u16 = 8546;
/// Default listening host of enabled RPC servers.
pub const DEFAULT_HOST: &str = "0.0.0.0";
/// Default APIs of enabled RPC servers.
pub const DEFAULT_APIS: [RpcApi; 3] = [RpcApi::Web3, RpcApi::Eth, RpcApi::Net];

/// Longest workload name. Pods of a StatefulSet carry a
/// `<name>-<10 character hash>` revision label, capped at 63 characters.
pub const MAX_WORKLOAD_NAME_LEN: usize = 52;

/// RFC 1123 label: node names end up in object names and label values.
static DNS_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").expect("DNS label pattern is valid")
});

impl BesuNodeSpec {
    fn default_node(&mut self) {
        self.resources.apply_defaults(&DEFAULT_RESOURCES);

        if self.sync_mode.is_none() {
            self.sync_mode = Some(DEFAULT_SYNC_MODE);
        }
        if self.logging.is_none() {
            self.logging = Some(DEFAULT_LOGGING);
        }
        if self.rpc {
            if self.rpc_port == 0 {
                self.rpc_port = DEFAULT_RPC_PORT;
            }
            if self.rpc_host.is_empty() {
                self.rpc_host = DEFAULT_HOST.to_string();
            }
            if self.rpc_api.is_empty() {
                self.rpc_api = DEFAULT_APIS.to_vec();
            }
        }
        if self.ws {
            if self.ws_port == 0 {
                self.ws_port = DEFAULT_WS_PORT;
            }
            if self.ws_host.is_empty() {
                self.ws_host = DEFAULT_HOST.to_string();
            }
            if self.ws_api.is_empty() {
                self.ws_api = DEFAULT_APIS.to_vec();
            }
        }
        if self.rpc || self.ws {
            if self.hosts.is_empty() {
                self.hosts = vec!["*".to_string()];
            }
            if self.cors_domains.is_empty() {
                self.cors_domains = vec!["*".to_string()];
            }
        }
    }
}

impl BesuNetwork {
    /// Name of the child workload of `node`.
    pub fn node_workload_name(&self, node: &BesuNodeSpec) -> String {
        format!("{}-{}", self.name_any(), node.name)
    }

    /// Names of every declared child workload.
    pub fn declared_workloads(&self) -> HashSet<String> {
        self.spec
            .nodes
            .iter()
            .map(|node| self.node_workload_name(node))
            .collect()
    }

    fn validate(&self) -> FieldErrorList {
        let nodes_path = FieldPath::new("spec").child("nodes");
        let mut errors = FieldErrorList::new();

        if self.spec.nodes.is_empty() {
            errors.push(FieldError::required(&nodes_path, "at least one node is required"));
        }

        let mut seen = HashSet::new();
        for (i, node) in self.spec.nodes.iter().enumerate() {
            let node_path = nodes_path.index(i);

            let name_path = node_path.child("name");
            if node.name.is_empty() {
                errors.push(FieldError::required(&name_path, "node name is required"));
            } else if !DNS_LABEL.is_match(&node.name) {
                errors.push(FieldError::invalid(
                    &name_path,
                    &node.name,
                    "must consist of lower case alphanumeric characters or '-', \
                     and must start and end with an alphanumeric character",
                ));
            } else if !seen.insert(node.name.as_str()) {
                errors.push(FieldError::duplicate(&name_path, &node.name));
            } else {
                let workload = self.node_workload_name(node);
                if workload.len() > MAX_WORKLOAD_NAME_LEN {
                    errors.push(FieldError::invalid(
                        &name_path,
                        &node.name,
                        format!(
                            "workload name {} must be no more than {} characters",
                            workload, MAX_WORKLOAD_NAME_LEN
                        ),
                    ));
                }
            }

            if node.miner && node.miner_account.is_empty() {
                errors.push(FieldError::required(
                    &node_path.child("minerAccount"),
                    "must provide miner account if node is miner",
                ));
            }

            errors.extend(validate_resources(&node.resources, &node_path.child("resources")));
        }

        errors
    }
}

impl Defaulter for BesuNetwork {
    fn default_spec(&mut self) {
        tracing::debug!(name = %self.name_any(), "Defaulting BesuNetwork");
        for node in &mut self.spec.nodes {
            node.default_node();
        }
    }
}

impl Validator for BesuNetwork {
    fn validate_create(&self) -> FieldErrorList {
        tracing::debug!(name = %self.name_any(), "Validating BesuNetwork create");
        self.validate()
    }

    fn validate_update(&self, old: &Self) -> FieldErrorList {
        tracing::debug!(name = %self.name_any(), "Validating BesuNetwork update");
        let spec_path = FieldPath::new("spec");
        let mut errors = self.validate();

        if old.spec.join != self.spec.join {
            errors.push(FieldError::invalid(
                &spec_path.child("join"),
                &self.spec.join,
                "field is immutable",
            ));
        }

        // Nodes are matched by name; new nodes have no previous claim to compare.
        let previous: BTreeMap<&str, &BesuNodeSpec> = old
            .spec
            .nodes
            .iter()
            .map(|node| (node.name.as_str(), node))
            .collect();
        for (i, node) in self.spec.nodes.iter().enumerate() {
            if let Some(old_node) = previous.get(node.name.as_str()) {
                errors.extend(validate_resources_update(
                    &old_node.resources,
                    &node.resources,
                    &spec_path.child("nodes").index(i).child("resources"),
                ));
            }
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::FieldErrorType;

    fn network(nodes: Vec<BesuNodeSpec>) -> BesuNetwork {
        BesuNetwork::new(
            "goerli",
            BesuNetworkSpec {
                join: "goerli".into(),
                nodes,
            },
        )
    }

    fn named(name: &str) -> BesuNodeSpec {
        BesuNodeSpec {
            name: name.into(),
            ..Default::default()
        }
    }

    #[test]
    fn workloads_are_prefixed_with_the_network_name() {
        let net = network(vec![named("a"), named("b")]);
        let names = net.declared_workloads();
        assert!(names.contains("goerli-a"));
        assert!(names.contains("goerli-b"));
        assert_eq!(names.len(), 2);
    }

    #[test]
    fn defaults_apply_per_node() {
        let mut net = network(vec![
            BesuNodeSpec {
                rpc: true,
                ..named("rpc")
            },
            named("plain"),
        ]);
        net.default_spec();

        let rpc = &net.spec.nodes[0];
        assert_eq!(rpc.rpc_port, DEFAULT_RPC_PORT);
        assert_eq!(rpc.rpc_api, DEFAULT_APIS.to_vec());
        assert_eq!(rpc.hosts, vec!["*"]);
        assert_eq!(rpc.ws_port, 0);

        let plain = &net.spec.nodes[1];
        assert_eq!(plain.sync_mode, Some(BesuSyncMode::Fast));
        assert_eq!(plain.rpc_port, 0);
        assert!(plain.cors_domains.is_empty());
        assert_eq!(plain.resources.memory, "4Gi");
    }

    #[test]
    fn empty_network_is_rejected() {
        let errors = network(vec![]).validate_create();
        assert_eq!(errors.len(), 1);
        let err = errors.iter().next().unwrap();
        assert_eq!(err.error_type, FieldErrorType::Required);
        assert_eq!(err.field, "spec.nodes");
    }

    #[test]
    fn duplicate_names_and_missing_miner_accounts_accumulate() {
        let mut net = network(vec![
            named("a"),
            named("a"),
            BesuNodeSpec {
                miner: true,
                ..named("m")
            },
        ]);
        net.default_spec();

        let errors = net.validate_create();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["spec.nodes[1].name", "spec.nodes[2].minerAccount"]);
        assert_eq!(errors.iter().next().unwrap().error_type, FieldErrorType::Duplicate);
    }

    #[test]
    fn node_names_must_make_valid_workload_names() {
        let long = "n".repeat(MAX_WORKLOAD_NAME_LEN);
        let fits = "n".repeat(MAX_WORKLOAD_NAME_LEN - "goerli-".len());
        let mut net = network(vec![named("Node_A"), named(&long), named(&fits), named("-a")]);
        net.default_spec();

        let errors = net.validate_create();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec!["spec.nodes[0].name", "spec.nodes[1].name", "spec.nodes[3].name"]
        );
        assert!(errors.iter().all(|e| e.error_type == FieldErrorType::Invalid));
        assert!(errors.iter().nth(1).unwrap().detail.contains("no more than 52"));
    }

    #[test]
    fn node_resources_are_checked_at_their_index() {
        let mut net = network(vec![
            named("a"),
            BesuNodeSpec {
                resources: Resources {
                    memory: "1Gi".into(),
                    memory_limit: "1Gi".into(),
                    ..Default::default()
                },
                ..named("b")
            },
        ]);
        net.default_spec();

        let errors = net.validate_create();
        assert_eq!(errors.len(), 1);
        let err = errors.iter().next().unwrap();
        assert_eq!(err.field, "spec.nodes[1].resources.memoryLimit");
        assert_eq!(err.detail, "must be greater than memory 1Gi");
    }

    #[test]
    fn update_checks_join_and_surviving_node_storage() {
        let mut old = network(vec![named("a"), named("b")]);
        old.default_spec();

        let mut new = old.clone();
        new.spec.join = "mainnet".into();
        new.spec.nodes.remove(0);
        new.spec.nodes[0].resources.storage_class = Some("ssd".into());
        new.spec.nodes.push(BesuNodeSpec {
            resources: Resources {
                storage: "1Gi".into(),
                ..Default::default()
            },
            ..named("c")
        });
        new.default_spec();

        let errors = new.validate_update(&old);
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["spec.join", "spec.nodes[0].resources.storageClass"]);
    }
}
