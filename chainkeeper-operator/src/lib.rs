//! Chainkeeper Kubernetes Operator
//!
//! This crate provides a Kubernetes operator for running blockchain nodes.
//! Each node resource is converged into a PersistentVolumeClaim holding the
//! chain data and a single-replica StatefulSet running the client.
//!
//! # Custom Resource Definitions
//!
//! - **PolkadotNode**: One Polkadot or Kusama node
//! - **NearNode**: One NEAR node
//! - **BesuNetwork**: A set of Hyperledger Besu nodes joining one network
//!
//! # Example
//!
//! ```yaml
//! apiVersion: chainkeeper.io/v1alpha1
//! kind: PolkadotNode
//! metadata:
//!   name: kusama-rpc
//! spec:
//!   network: kusama
//!   rpc: true
//!   resources:
//!     storage: 200Gi
//!     storageClass: fast-ssd
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod admission;
pub mod clients;
pub mod config;
pub mod controller;
pub mod crd;
pub mod error;
pub mod quantity;
pub mod resources;

pub use crd::{
    BesuNetwork, BesuNetworkSpec, NearNode, NearNodeSpec, PolkadotNode, PolkadotNodeSpec,
};
pub use error::{OperatorError, OperatorResult};
