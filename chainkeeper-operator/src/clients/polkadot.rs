//! Parity Polkadot client.
//!
//! <https://github.com/paritytech/polkadot>

use super::{path_data, ClientAdapter, ClientFamily};
use crate::crd::PolkadotNode;
use kube::ResourceExt;

const ARG_BASE_PATH: &str = "--base-path";
const ARG_CHAIN: &str = "--chain";
const ARG_NAME: &str = "--name";
const ARG_PORT: &str = "--port";
const ARG_SYNC: &str = "--sync";
const ARG_LOGGING: &str = "--log";
const ARG_VALIDATOR: &str = "--validator";
const ARG_PRUNING: &str = "--pruning";
const ARG_NO_TELEMETRY: &str = "--no-telemetry";
const ARG_TELEMETRY_URL: &str = "--telemetry-url";
const ARG_PROMETHEUS_EXTERNAL: &str = "--prometheus-external";
const ARG_PROMETHEUS_PORT: &str = "--prometheus-port";
const ARG_NO_PROMETHEUS: &str = "--no-prometheus";
const ARG_RPC_EXTERNAL: &str = "--rpc-external";
const ARG_RPC_PORT: &str = "--rpc-port";
const ARG_WS_EXTERNAL: &str = "--ws-external";
const ARG_WS_PORT: &str = "--ws-port";
const ARG_RPC_CORS: &str = "--rpc-cors";

/// Verbosity of the telemetry stream.
const TELEMETRY_VERBOSITY: u8 = 0;

pub(super) struct PolkadotClient<'a> {
    node: &'a PolkadotNode,
}

impl<'a> PolkadotClient<'a> {
    pub(super) fn new(node: &'a PolkadotNode) -> Self {
        Self { node }
    }
}

impl ClientAdapter for PolkadotClient<'_> {
    fn family(&self) -> ClientFamily {
        ClientFamily::Polkadot
    }

    fn args(&self) -> Vec<String> {
        let spec = &self.node.spec;
        let mut args = vec![
            ARG_BASE_PATH.to_string(),
            path_data(self.home_dir()),
            ARG_CHAIN.to_string(),
            spec.network.clone(),
            ARG_NAME.to_string(),
            self.node.name_any(),
            ARG_PORT.to_string(),
            spec.p2p_port.to_string(),
        ];

        if let Some(mode) = spec.sync_mode {
            args.extend([ARG_SYNC.to_string(), mode.to_string()]);
        }
        if let Some(logging) = spec.logging {
            args.extend([ARG_LOGGING.to_string(), logging.to_string()]);
        }

        if spec.validator {
            args.push(ARG_VALIDATOR.to_string());
        }

        match spec.pruning {
            Some(false) => args.extend([ARG_PRUNING.to_string(), "archive".to_string()]),
            Some(true) if spec.retained_blocks > 0 => {
                args.extend([ARG_PRUNING.to_string(), spec.retained_blocks.to_string()])
            }
            _ => {}
        }

        if !spec.telemetry {
            args.push(ARG_NO_TELEMETRY.to_string());
        } else if !spec.telemetry_url.is_empty() {
            args.extend([
                ARG_TELEMETRY_URL.to_string(),
                format!("{} {}", spec.telemetry_url, TELEMETRY_VERBOSITY),
            ]);
        }

        if spec.prometheus {
            args.extend([
                ARG_PROMETHEUS_EXTERNAL.to_string(),
                ARG_PROMETHEUS_PORT.to_string(),
                spec.prometheus_port.to_string(),
            ]);
        } else {
            args.push(ARG_NO_PROMETHEUS.to_string());
        }

        if spec.rpc {
            args.extend([
                ARG_RPC_EXTERNAL.to_string(),
                ARG_RPC_PORT.to_string(),
                spec.rpc_port.to_string(),
            ]);
        }
        if spec.ws {
            args.extend([
                ARG_WS_EXTERNAL.to_string(),
                ARG_WS_PORT.to_string(),
                spec.ws_port.to_string(),
            ]);
        }
        if (spec.rpc || spec.ws) && !spec.cors_domains.is_empty() {
            args.extend([ARG_RPC_CORS.to_string(), spec.cors_domains.join(",")]);
        }

        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::Defaulter;
    use crate::crd::PolkadotNodeSpec;

    fn args(spec: PolkadotNodeSpec) -> Vec<String> {
        let mut node = PolkadotNode::new("dot-1", spec);
        node.default_spec();
        PolkadotClient::new(&node).args()
    }

    fn has_pair(args: &[String], flag: &str, value: &str) -> bool {
        args.windows(2).any(|w| w[0] == flag && w[1] == value)
    }

    #[test]
    fn base_path_comes_first() {
        let args = args(PolkadotNodeSpec {
            network: "kusama".into(),
            ..Default::default()
        });
        assert_eq!(&args[..2], ["--base-path", "/polkadot/data"]);
        assert!(has_pair(&args, ARG_CHAIN, "kusama"));
        assert!(has_pair(&args, ARG_NAME, "dot-1"));
        assert!(has_pair(&args, ARG_PORT, "30333"));
        assert!(has_pair(&args, ARG_SYNC, "full"));
        assert!(args.contains(&ARG_NO_PROMETHEUS.to_string()));
        assert!(!args.contains(&ARG_RPC_EXTERNAL.to_string()));
    }

    #[test]
    fn archive_and_rpc_flags() {
        let args = args(PolkadotNodeSpec {
            network: "polkadot".into(),
            pruning: Some(false),
            rpc: true,
            ws: true,
            cors_domains: vec!["a.io".into(), "b.io".into()],
            ..Default::default()
        });
        assert!(has_pair(&args, ARG_PRUNING, "archive"));
        assert!(has_pair(&args, ARG_RPC_PORT, "9933"));
        assert!(has_pair(&args, ARG_WS_PORT, "9944"));
        assert!(has_pair(&args, ARG_RPC_CORS, "a.io,b.io"));
    }

    #[test]
    fn telemetry_can_be_disabled() {
        let args = args(PolkadotNodeSpec {
            network: "westend".into(),
            telemetry: false,
            telemetry_url: "wss://telemetry.local/submit".into(),
            ..Default::default()
        });
        assert!(args.contains(&ARG_NO_TELEMETRY.to_string()));
        assert!(!args.contains(&ARG_TELEMETRY_URL.to_string()));
    }
}
