//! Custom Resource Definitions for the chainkeeper Kubernetes operator.
//!
//! This module defines the CRDs that the operator manages:
//!
//! - [`PolkadotNode`]: a single Polkadot client instance
//! - [`NearNode`]: a single NEAR core client instance
//! - [`BesuNetwork`]: a set of Hyperledger Besu nodes joining one network

mod besu;
mod near;
mod polkadot;

pub use besu::{BesuNetwork, BesuNetworkSpec, BesuNodeSpec, BesuSyncMode, RpcApi};
pub use near::{NearNode, NearNodeSpec};
pub use polkadot::{PolkadotNode, PolkadotNodeSpec, PolkadotSyncMode};

use crate::admission::{Defaulter, Validator};
use crate::clients::{ClientFamily, NodeClient};
use kube::core::NamespaceResourceScope;
use kube::Resource;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Compute and storage allocation of one node.
///
/// Quantities are Kubernetes quantity strings; an empty string means unset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Resources {
    /// Requested CPU (e.g. "2", "500m").
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cpu: String,

    /// CPU limit; must be greater than or equal to the request.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cpu_limit: String,

    /// Requested memory (e.g. "4Gi").
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub memory: String,

    /// Memory limit; must be strictly greater than the request.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub memory_limit: String,

    /// Requested persistent storage (e.g. "100Gi").
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub storage: String,

    /// Storage class of the data volume. Immutable after creation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,
}

/// Per-family resource defaults.
#[derive(Debug, Clone, Copy)]
pub struct ResourceDefaults {
    /// CPU request.
    pub cpu: &'static str,
    /// CPU limit.
    pub cpu_limit: &'static str,
    /// Memory request.
    pub memory: &'static str,
    /// Memory limit.
    pub memory_limit: &'static str,
    /// Storage request.
    pub storage: &'static str,
}

impl Resources {
    /// Fill every empty quantity from `defaults`, leaving set values alone.
    pub fn apply_defaults(&mut self, defaults: &ResourceDefaults) {
        fill(&mut self.cpu, defaults.cpu);
        fill(&mut self.cpu_limit, defaults.cpu_limit);
        fill(&mut self.memory, defaults.memory);
        fill(&mut self.memory_limit, defaults.memory_limit);
        fill(&mut self.storage, defaults.storage);
    }
}

fn fill(field: &mut String, default: &str) {
    if field.is_empty() {
        *field = default.to_string();
    }
}

/// Logging verbosity shared by all clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum LoggingVerbosity {
    /// Errors only.
    Error,
    /// Warnings and errors.
    Warn,
    /// Informational messages.
    Info,
    /// Debug output.
    Debug,
    /// Everything.
    Trace,
}

impl LoggingVerbosity {
    /// Lowercase level name.
    pub fn as_str(&self) -> &'static str {
        match self {
            LoggingVerbosity::Error => "error",
            LoggingVerbosity::Warn => "warn",
            LoggingVerbosity::Info => "info",
            LoggingVerbosity::Debug => "debug",
            LoggingVerbosity::Trace => "trace",
        }
    }
}

impl fmt::Display for LoggingVerbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Any namespaced resource this operator reads or writes.
pub trait ChainResource:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + fmt::Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

impl<T> ChainResource for T where
    T: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + fmt::Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

/// A resource that declares exactly one blockchain node.
pub trait ChainNode: ChainResource + Defaulter + Validator {
    /// Client family running this node.
    const FAMILY: ClientFamily;

    /// Declared resources.
    fn resources(&self) -> &Resources;

    /// Adapter view over this node.
    fn client(&self) -> NodeClient<'_>;
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFAULTS: ResourceDefaults = ResourceDefaults {
        cpu: "1",
        cpu_limit: "2",
        memory: "1Gi",
        memory_limit: "2Gi",
        storage: "10Gi",
    };

    #[test]
    fn defaults_only_fill_empty_fields() {
        let mut resources = Resources {
            cpu: "4".into(),
            memory_limit: "8Gi".into(),
            ..Default::default()
        };
        resources.apply_defaults(&DEFAULTS);

        assert_eq!(resources.cpu, "4");
        assert_eq!(resources.cpu_limit, "2");
        assert_eq!(resources.memory, "1Gi");
        assert_eq!(resources.memory_limit, "8Gi");
        assert_eq!(resources.storage, "10Gi");
        assert_eq!(resources.storage_class, None);
    }

    #[test]
    fn resources_serialize_camel_case() {
        let resources = Resources {
            cpu_limit: "2".into(),
            storage_class: Some("ssd".into()),
            ..Default::default()
        };
        let json = serde_json::to_value(&resources).expect("serialize Resources");
        assert_eq!(json, serde_json::json!({"cpuLimit": "2", "storageClass": "ssd"}));
    }
}
