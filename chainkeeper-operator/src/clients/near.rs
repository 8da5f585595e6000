//! NEAR core client.
//!
//! <https://github.com/near/nearcore>

use super::{path_data, ClientAdapter, ClientFamily};
use crate::crd::NearNode;

const ARG_HOME: &str = "--home";
const ARG_NETWORK_ADDRESS: &str = "--network-addr";
const ARG_RPC_ADDRESS: &str = "--rpc-addr";
const ARG_PROMETHEUS_ADDRESS: &str = "--rpc-prometheus-addr";
const ARG_DISABLE_RPC: &str = "--disable-rpc";
const ARG_TELEMETRY_URL: &str = "--telemetry-url";
const ARG_ARCHIVE: &str = "--archive";
const ARG_MINIMUM_PEERS: &str = "--min-peers";
const ARG_BOOTNODES: &str = "--boot-nodes";

pub(super) struct NearClient<'a> {
    node: &'a NearNode,
}

impl<'a> NearClient<'a> {
    pub(super) fn new(node: &'a NearNode) -> Self {
        Self { node }
    }
}

impl ClientAdapter for NearClient<'_> {
    fn family(&self) -> ClientFamily {
        ClientFamily::Near
    }

    fn args(&self) -> Vec<String> {
        let spec = &self.node.spec;
        let mut args = vec![
            "neard".to_string(),
            ARG_HOME.to_string(),
            path_data(self.home_dir()),
            "run".to_string(),
            ARG_NETWORK_ADDRESS.to_string(),
            format!("{}:{}", spec.p2p_host, spec.p2p_port),
        ];

        if spec.rpc {
            args.extend([
                ARG_RPC_ADDRESS.to_string(),
                format!("{}:{}", spec.rpc_host, spec.rpc_port),
                ARG_PROMETHEUS_ADDRESS.to_string(),
                format!("{}:{}", spec.prometheus_host, spec.prometheus_port),
            ]);
        } else {
            args.push(ARG_DISABLE_RPC.to_string());
        }

        if !spec.telemetry_url.is_empty() {
            args.extend([ARG_TELEMETRY_URL.to_string(), spec.telemetry_url.clone()]);
        }

        if spec.archive {
            args.push(ARG_ARCHIVE.to_string());
        }

        args.extend([ARG_MINIMUM_PEERS.to_string(), spec.min_peers.to_string()]);

        if !spec.bootnodes.is_empty() {
            args.extend([ARG_BOOTNODES.to_string(), spec.bootnodes.join(",")]);
        }

        args
    }
}
