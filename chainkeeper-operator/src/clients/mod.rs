//! Blockchain client adapters.
//!
//! Each supported client family maps a node resource to the process the
//! node container runs: image, command, arguments, environment and home
//! directory. Families are a closed set; the per-family constants live in
//! one lookup table.

mod besu;
mod near;
mod polkadot;

use crate::crd::{BesuNetwork, BesuNodeSpec, NearNode, PolkadotNode};
use k8s_openapi::api::core::v1::EnvVar;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Supported blockchain client families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientFamily {
    /// Parity Polkadot.
    Polkadot,
    /// NEAR core.
    Near,
    /// Hyperledger Besu.
    Besu,
}

/// Static facts about one client family.
#[derive(Debug, Clone, Copy)]
pub struct FamilyInfo {
    /// Family identifier, as used in labels.
    pub identifier: &'static str,
    /// Environment variable overriding the image.
    pub image_env: &'static str,
    /// Image used when no override is set.
    pub default_image: &'static str,
    /// Home directory inside the image.
    pub home_dir: &'static str,
}

const FAMILIES: [(ClientFamily, FamilyInfo); 3] = [
    (
        ClientFamily::Polkadot,
        FamilyInfo {
            identifier: "polkadot",
            image_env: "POLKADOT_IMAGE",
            default_image: "parity/polkadot:v0.9.9-1",
            home_dir: "/polkadot",
        },
    ),
    (
        ClientFamily::Near,
        FamilyInfo {
            identifier: "near",
            image_env: "NEAR_IMAGE",
            default_image: "kotalco/nearcore:1.23.1",
            home_dir: "/home/near",
        },
    ),
    (
        ClientFamily::Besu,
        FamilyInfo {
            identifier: "besu",
            image_env: "BESU_IMAGE",
            default_image: "hyperledger/besu:21.7.2",
            home_dir: "/opt/besu",
        },
    ),
];

impl ClientFamily {
    /// Every family, in table order.
    pub const ALL: [ClientFamily; 3] = [ClientFamily::Polkadot, ClientFamily::Near, ClientFamily::Besu];

    /// Lookup-table entry of this family.
    pub fn info(&self) -> &'static FamilyInfo {
        match self {
            ClientFamily::Polkadot => &FAMILIES[0].1,
            ClientFamily::Near => &FAMILIES[1].1,
            ClientFamily::Besu => &FAMILIES[2].1,
        }
    }

    /// Family identifier.
    pub fn identifier(&self) -> &'static str {
        self.info().identifier
    }
}

impl fmt::Display for ClientFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.identifier())
    }
}

/// Error returned when parsing an unknown family identifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown client family: {0}")]
pub struct UnknownFamily(pub String);

impl FromStr for ClientFamily {
    type Err = UnknownFamily;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FAMILIES
            .iter()
            .find(|(_, info)| info.identifier.eq_ignore_ascii_case(s))
            .map(|(family, _)| *family)
            .ok_or_else(|| UnknownFamily(s.to_string()))
    }
}

/// Data directory under a client home directory.
pub fn path_data(home_dir: &str) -> String {
    format!("{}/data", home_dir)
}

/// Capabilities every client adapter provides.
pub trait ClientAdapter {
    /// Family of this client.
    fn family(&self) -> ClientFamily;

    /// Container command. Empty means the image entrypoint.
    fn command(&self) -> Vec<String> {
        Vec::new()
    }

    /// Container arguments.
    fn args(&self) -> Vec<String>;

    /// Container environment.
    fn env(&self) -> Vec<EnvVar> {
        Vec::new()
    }

    /// Home directory inside the image.
    fn home_dir(&self) -> &'static str {
        self.family().info().home_dir
    }
}

/// A node viewed through its client adapter.
#[derive(Debug, Clone, Copy)]
pub enum NodeClient<'a> {
    /// A Polkadot node.
    Polkadot(&'a PolkadotNode),
    /// A NEAR node.
    Near(&'a NearNode),
    /// One node of a Besu network.
    Besu {
        /// Owning network.
        network: &'a BesuNetwork,
        /// The node itself.
        node: &'a BesuNodeSpec,
    },
}

// Runs `$body` with `$client` bound to the family adapter of `$node`.
macro_rules! with_adapter {
    ($node:expr, $client:ident => $body:expr) => {
        match *$node {
            NodeClient::Polkadot(node) => {
                let $client = polkadot::PolkadotClient::new(node);
                $body
            }
            NodeClient::Near(node) => {
                let $client = near::NearClient::new(node);
                $body
            }
            NodeClient::Besu { network, node } => {
                let $client = besu::BesuClient::new(network, node);
                $body
            }
        }
    };
}

impl ClientAdapter for NodeClient<'_> {
    fn family(&self) -> ClientFamily {
        match self {
            NodeClient::Polkadot(_) => ClientFamily::Polkadot,
            NodeClient::Near(_) => ClientFamily::Near,
            NodeClient::Besu { .. } => ClientFamily::Besu,
        }
    }

    fn command(&self) -> Vec<String> {
        with_adapter!(self, client => client.command())
    }

    fn args(&self) -> Vec<String> {
        with_adapter!(self, client => client.args())
    }

    fn env(&self) -> Vec<EnvVar> {
        with_adapter!(self, client => client.env())
    }
}

/// Everything needed to run one node process.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessSpec {
    /// Container image.
    pub image: String,
    /// Container command; empty means the image entrypoint.
    pub command: Vec<String>,
    /// Container arguments.
    pub args: Vec<String>,
    /// Container environment.
    pub env: Vec<EnvVar>,
    /// Home directory inside the image.
    pub home_dir: &'static str,
}

impl ProcessSpec {
    /// Data directory of the process.
    pub fn data_dir(&self) -> String {
        path_data(self.home_dir)
    }
}

/// Resolves client images and builds process specs.
///
/// Image overrides are read once at construction.
#[derive(Debug, Clone, Default)]
pub struct ClientRegistry {
    overrides: HashMap<ClientFamily, String>,
}

impl ClientRegistry {
    /// Registry with pinned default images only.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry honouring the `<FAMILY>_IMAGE` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Registry reading overrides through `lookup`. Empty values are ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let overrides = ClientFamily::ALL
            .iter()
            .filter_map(|family| {
                lookup(family.info().image_env)
                    .filter(|image| !image.is_empty())
                    .map(|image| (*family, image))
            })
            .collect();
        Self { overrides }
    }

    /// Override the image of one family.
    pub fn with_image(mut self, family: ClientFamily, image: impl Into<String>) -> Self {
        self.overrides.insert(family, image.into());
        self
    }

    /// Image used for `family`.
    pub fn image(&self, family: ClientFamily) -> &str {
        self.overrides
            .get(&family)
            .map(String::as_str)
            .unwrap_or(family.info().default_image)
    }

    /// Process spec of a node.
    pub fn process(&self, client: &NodeClient<'_>) -> ProcessSpec {
        let family = client.family();
        ProcessSpec {
            image: self.image(family).to_string(),
            command: client.command(),
            args: client.args(),
            env: client.env(),
            home_dir: client.home_dir(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_images_are_pinned() {
        let registry = ClientRegistry::new();
        assert_eq!(registry.image(ClientFamily::Polkadot), "parity/polkadot:v0.9.9-1");
        assert_eq!(registry.image(ClientFamily::Near), "kotalco/nearcore:1.23.1");
        assert_eq!(registry.image(ClientFamily::Besu), "hyperledger/besu:21.7.2");
    }

    #[test]
    fn env_overrides_apply_and_empty_values_are_ignored() {
        let registry = ClientRegistry::from_lookup(|key| match key {
            "NEAR_IMAGE" => Some("registry.local/nearcore:dev".to_string()),
            "BESU_IMAGE" => Some(String::new()),
            _ => None,
        });
        assert_eq!(registry.image(ClientFamily::Near), "registry.local/nearcore:dev");
        assert_eq!(registry.image(ClientFamily::Besu), "hyperledger/besu:21.7.2");
    }

    #[test]
    fn families_parse_from_identifiers() {
        for family in ClientFamily::ALL {
            assert_eq!(family.identifier().parse::<ClientFamily>(), Ok(family));
        }
        assert_eq!("NEAR".parse::<ClientFamily>(), Ok(ClientFamily::Near));
        assert!("geth".parse::<ClientFamily>().is_err());
    }

    #[test]
    fn data_dir_is_under_home() {
        assert_eq!(path_data("/polkadot"), "/polkadot/data");
    }
}
