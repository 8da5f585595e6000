//! Hyperledger Besu client.
//!
//! <https://github.com/hyperledger/besu>

use super::{path_data, ClientAdapter, ClientFamily};
use crate::crd::{BesuNetwork, BesuNodeSpec, RpcApi};

const ARG_DATA_PATH: &str = "--data-path";
const ARG_NETWORK: &str = "--network";
const ARG_SYNC_MODE: &str = "--sync-mode";
const ARG_LOGGING: &str = "--logging";
const ARG_MINER_ENABLED: &str = "--miner-enabled";
const ARG_MINER_COINBASE: &str = "--miner-coinbase";
const ARG_RPC_HTTP_ENABLED: &str = "--rpc-http-enabled";
const ARG_RPC_HTTP_HOST: &str = "--rpc-http-host";
const ARG_RPC_HTTP_PORT: &str = "--rpc-http-port";
const ARG_RPC_HTTP_APIS: &str = "--rpc-http-api";
const ARG_RPC_WS_ENABLED: &str = "--rpc-ws-enabled";
const ARG_RPC_WS_HOST: &str = "--rpc-ws-host";
const ARG_RPC_WS_PORT: &str = "--rpc-ws-port";
const ARG_RPC_WS_APIS: &str = "--rpc-ws-api";
const ARG_HOST_ALLOWLIST: &str = "--host-allowlist";
const ARG_RPC_HTTP_CORS_ORIGINS: &str = "--rpc-http-cors-origins";

pub(super) struct BesuClient<'a> {
    network: &'a BesuNetwork,
    node: &'a BesuNodeSpec,
}

impl<'a> BesuClient<'a> {
    pub(super) fn new(network: &'a BesuNetwork, node: &'a BesuNodeSpec) -> Self {
        Self { network, node }
    }
}

fn join_apis(apis: &[RpcApi]) -> String {
    apis.iter().map(RpcApi::as_flag).collect::<Vec<_>>().join(",")
}

impl ClientAdapter for BesuClient<'_> {
    fn family(&self) -> ClientFamily {
        ClientFamily::Besu
    }

    fn command(&self) -> Vec<String> {
        vec!["besu".to_string()]
    }

    fn args(&self) -> Vec<String> {
        let node = self.node;
        let mut args = vec![ARG_DATA_PATH.to_string(), path_data(self.home_dir())];

        let join = &self.network.spec.join;
        if !join.is_empty() {
            args.extend([ARG_NETWORK.to_string(), join.clone()]);
        }

        if let Some(mode) = node.sync_mode {
            args.extend([ARG_SYNC_MODE.to_string(), mode.as_flag().to_string()]);
        }
        if let Some(logging) = node.logging {
            args.extend([ARG_LOGGING.to_string(), logging.as_str().to_uppercase()]);
        }

        if node.miner {
            args.extend([
                ARG_MINER_ENABLED.to_string(),
                ARG_MINER_COINBASE.to_string(),
                node.miner_account.clone(),
            ]);
        }

        if node.rpc {
            args.extend([
                ARG_RPC_HTTP_ENABLED.to_string(),
                ARG_RPC_HTTP_HOST.to_string(),
                node.rpc_host.clone(),
                ARG_RPC_HTTP_PORT.to_string(),
                node.rpc_port.to_string(),
            ]);
            if !node.rpc_api.is_empty() {
                args.extend([ARG_RPC_HTTP_APIS.to_string(), join_apis(&node.rpc_api)]);
            }
        }

        if node.ws {
            args.extend([
                ARG_RPC_WS_ENABLED.to_string(),
                ARG_RPC_WS_HOST.to_string(),
                node.ws_host.clone(),
                ARG_RPC_WS_PORT.to_string(),
                node.ws_port.to_string(),
            ]);
            if !node.ws_api.is_empty() {
                args.extend([ARG_RPC_WS_APIS.to_string(), join_apis(&node.ws_api)]);
            }
        }

        if !node.hosts.is_empty() {
            args.extend([ARG_HOST_ALLOWLIST.to_string(), node.hosts.join(",")]);
        }
        if !node.cors_domains.is_empty() {
            args.extend([ARG_RPC_HTTP_CORS_ORIGINS.to_string(), node.cors_domains.join(",")]);
        }

        args
    }
}
