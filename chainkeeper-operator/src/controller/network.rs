//! BesuNetwork controller.
//!
//! A network fans out to one workload per declared node, named
//! `<network>-<node>`. Workloads of nodes dropped from the list are deleted;
//! their claims are kept so a node re-added under the same name resumes from
//! its old data.

use super::children::{admit, bounded, ensure_labels, ensure_pvc, ensure_statefulset, fetch};
use super::{ControllerContext, ReconcileAction};
use crate::clients::{ClientFamily, NodeClient};
use crate::crd::BesuNetwork;
use crate::error::{OperatorError, OperatorResult};
use crate::resources::{self, Workload, LABEL_PART_OF};
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::Instrument;

/// Controller for BesuNetwork resources.
#[derive(Clone)]
pub struct NetworkController {
    ctx: Arc<ControllerContext>,
}

impl NetworkController {
    /// Create a new network controller.
    pub fn new(ctx: Arc<ControllerContext>) -> Self {
        Self { ctx }
    }

    /// Reconcile a BesuNetwork.
    ///
    /// This is the main reconciliation loop that:
    /// 1. Re-reads the network, stopping if it was deleted
    /// 2. Defaults and validates it when no webhook does
    /// 3. Merges the network labels onto it
    /// 4. Deletes workloads of nodes no longer declared
    /// 5. Creates/updates the claim and StatefulSet of every declared node
    pub async fn reconcile(&self, network: Arc<BesuNetwork>) -> OperatorResult<ReconcileAction> {
        let name = network.name_any();
        let namespace = network
            .namespace()
            .ok_or_else(|| OperatorError::InvalidConfig("BesuNetwork must be namespaced".to_string()))?;

        let span = tracing::info_span!(
            "reconcile",
            kind = "BesuNetwork",
            name = %name,
            namespace = %namespace
        );
        self.reconcile_network(&namespace, &name).instrument(span).await
    }

    async fn reconcile_network(&self, namespace: &str, name: &str) -> OperatorResult<ReconcileAction> {
        let Some(mut network) = fetch::<BesuNetwork>(&self.ctx, namespace, name).await? else {
            tracing::info!("Network no longer exists");
            return Ok(ReconcileAction::Done);
        };

        tracing::info!(nodes = network.spec.nodes.len(), join = %network.spec.join, "Reconciling network");

        admit(&self.ctx.config, &mut network)?;

        ensure_labels(&self.ctx, &network, &network_labels(name, name)).await?;

        self.delete_redundant_nodes(&network, namespace).await?;

        let owner = resources::owner_reference(&network)?;
        for node in &network.spec.nodes {
            let workload_name = network.node_workload_name(node);
            let workload = Workload {
                labels: network_labels(name, &workload_name),
                name: workload_name,
                namespace: namespace.to_string(),
                owner: owner.clone(),
                resources: &node.resources,
                process: self
                    .ctx
                    .clients
                    .process(&NodeClient::Besu { network: &network, node }),
            };

            let pvc = ensure_pvc(&self.ctx, &workload).await?;
            let sts = ensure_statefulset(&self.ctx, &workload).await?;
            tracing::info!(node = %node.name, pvc = ?pvc, statefulset = ?sts, "Node reconciled");
        }

        Ok(ReconcileAction::Done)
    }

    /// Delete StatefulSets this network owns that no declared node maps to.
    async fn delete_redundant_nodes(&self, network: &BesuNetwork, namespace: &str) -> OperatorResult<()> {
        let limit = self.ctx.config.store_timeout();
        let selector = resources::network_selector(&network.name_any());
        let declared = network.declared_workloads();
        let uid = network.meta().uid.as_deref();

        let existing = bounded(
            limit,
            "list statefulsets",
            self.ctx.store.list_statefulsets(namespace, &selector),
        )
        .await?;

        for sts in existing {
            let owned = sts
                .owner_references()
                .iter()
                .any(|owner| Some(owner.uid.as_str()) == uid);
            let sts_name = sts.name_any();
            if !owned || declared.contains(&sts_name) {
                continue;
            }

            tracing::info!(statefulset = %sts_name, "Deleting redundant node");
            bounded(
                limit,
                "delete statefulset",
                self.ctx.store.delete_statefulset(namespace, &sts_name),
            )
            .await?;
        }

        Ok(())
    }
}

fn network_labels(network: &str, instance: &str) -> BTreeMap<String, String> {
    let mut labels = resources::workload_labels(ClientFamily::Besu, "BesuNetwork", instance);
    labels.insert(LABEL_PART_OF.to_string(), network.to_string());
    labels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::ClientRegistry;
    use crate::config::OperatorConfig;
    use crate::controller::testing::FakeCluster;
    use crate::crd::{BesuNetworkSpec, BesuNodeSpec};

    fn context(store: Arc<FakeCluster>) -> Arc<ControllerContext> {
        Arc::new(ControllerContext::with_store(
            store,
            ClientRegistry::new(),
            OperatorConfig {
                enable_webhooks: false,
                ..Default::default()
            },
        ))
    }

    fn node(name: &str) -> BesuNodeSpec {
        BesuNodeSpec {
            name: name.into(),
            rpc: true,
            ..Default::default()
        }
    }

    fn network(nodes: Vec<BesuNodeSpec>) -> BesuNetwork {
        let mut network = BesuNetwork::new(
            "goerli",
            BesuNetworkSpec {
                join: "goerli".into(),
                nodes,
            },
        );
        network.metadata.namespace = Some("chains".into());
        network
    }

    #[tokio::test]
    async fn every_declared_node_gets_a_workload() {
        let cluster = Arc::new(FakeCluster::new());
        let net = cluster.insert(&network(vec![node("a"), node("b")]));
        let controller = NetworkController::new(context(cluster.clone()));

        controller.reconcile(Arc::new(net)).await.unwrap();

        for name in ["goerli-a", "goerli-b"] {
            let sts = cluster.statefulset("chains", name).expect("statefulset");
            assert_eq!(sts.labels()[LABEL_PART_OF], "goerli");
            let container = &sts.spec.unwrap().template.spec.unwrap().containers[0];
            assert_eq!(container.command.as_deref(), Some(&["besu".to_string()][..]));
            assert!(cluster.pvc("chains", name).is_some());
        }
    }

    #[tokio::test]
    async fn dropped_nodes_lose_their_workload_only() {
        let cluster = Arc::new(FakeCluster::new());
        let net = cluster.insert(&network(vec![node("a"), node("b")]));
        let controller = NetworkController::new(context(cluster.clone()));
        controller.reconcile(Arc::new(net)).await.unwrap();

        let mut shrunk: BesuNetwork = cluster.get("chains", "goerli").unwrap();
        shrunk.spec.nodes.retain(|n| n.name == "a");
        cluster.update(&shrunk);
        let kept_before = cluster.statefulset("chains", "goerli-a").unwrap();

        controller.reconcile(Arc::new(shrunk)).await.unwrap();

        assert!(cluster.statefulset("chains", "goerli-b").is_none());
        assert!(cluster.pvc("chains", "goerli-b").is_some());
        assert_eq!(cluster.statefulset("chains", "goerli-a").unwrap(), kept_before);
    }

    #[tokio::test]
    async fn foreign_statefulsets_are_left_alone() {
        let cluster = Arc::new(FakeCluster::new());
        let net = cluster.insert(&network(vec![node("a")]));

        let mut stray = k8s_openapi::api::apps::v1::StatefulSet::default();
        stray.metadata.name = Some("goerli-manual".into());
        stray.metadata.namespace = Some("chains".into());
        stray.metadata.labels = Some(network_labels("goerli", "goerli-manual"));
        cluster.insert(&stray);

        NetworkController::new(context(cluster.clone()))
            .reconcile(Arc::new(net))
            .await
            .unwrap();

        assert!(cluster.statefulset("chains", "goerli-manual").is_some());
    }

    #[tokio::test]
    async fn second_pass_writes_nothing() {
        let cluster = Arc::new(FakeCluster::new());
        let net = cluster.insert(&network(vec![node("a"), node("b")]));
        let controller = NetworkController::new(context(cluster.clone()));

        controller.reconcile(Arc::new(net.clone())).await.unwrap();
        let writes = cluster.writes();
        controller.reconcile(Arc::new(net)).await.unwrap();
        assert_eq!(cluster.writes(), writes);
    }

    #[tokio::test]
    async fn miner_without_account_is_terminal() {
        let cluster = Arc::new(FakeCluster::new());
        let miner = BesuNodeSpec {
            miner: true,
            ..node("m")
        };
        let net = cluster.insert(&network(vec![miner]));

        let err = NetworkController::new(context(cluster.clone()))
            .reconcile(Arc::new(net))
            .await
            .unwrap_err();
        assert!(err.is_terminal());
        assert!(cluster.statefulset("chains", "goerli-m").is_none());
    }
}
