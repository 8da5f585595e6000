//! Single-node controller.
//!
//! Reconciles kinds that declare exactly one node, such as PolkadotNode and
//! NearNode, into one claim and one StatefulSet named after the resource.

use super::children::{admit, ensure_labels, ensure_pvc, ensure_statefulset, fetch};
use super::{ControllerContext, ReconcileAction};
use crate::crd::ChainNode;
use crate::error::{OperatorError, OperatorResult};
use crate::resources::{self, Workload};
use kube::ResourceExt;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::Instrument;

/// Controller for one node kind.
pub struct NodeController<K> {
    ctx: Arc<ControllerContext>,
    kind: PhantomData<fn() -> K>,
}

impl<K> Clone for NodeController<K> {
    fn clone(&self) -> Self {
        Self {
            ctx: self.ctx.clone(),
            kind: PhantomData,
        }
    }
}

impl<K: ChainNode> NodeController<K> {
    /// Create a new node controller.
    pub fn new(ctx: Arc<ControllerContext>) -> Self {
        Self {
            ctx,
            kind: PhantomData,
        }
    }

    /// Reconcile a node resource.
    ///
    /// This is the main reconciliation loop that:
    /// 1. Re-reads the node, stopping if it was deleted
    /// 2. Defaults and validates it when no webhook does
    /// 3. Merges the workload labels onto it
    /// 4. Creates/updates the data claim
    /// 5. Creates/updates the StatefulSet
    pub async fn reconcile(&self, node: Arc<K>) -> OperatorResult<ReconcileAction> {
        let name = node.name_any();
        let namespace = node
            .namespace()
            .ok_or_else(|| OperatorError::InvalidConfig(format!("{} must be namespaced", K::kind(&()))))?;

        let span = tracing::info_span!(
            "reconcile",
            kind = %K::kind(&()),
            name = %name,
            namespace = %namespace
        );
        self.reconcile_node(&namespace, &name).instrument(span).await
    }

    async fn reconcile_node(&self, namespace: &str, name: &str) -> OperatorResult<ReconcileAction> {
        let Some(mut node) = fetch::<K>(&self.ctx, namespace, name).await? else {
            tracing::info!("Node no longer exists");
            return Ok(ReconcileAction::Done);
        };

        tracing::info!(family = %K::FAMILY, "Reconciling node");

        admit(&self.ctx.config, &mut node)?;

        let labels = resources::workload_labels(K::FAMILY, &K::kind(&()), name);
        ensure_labels(&self.ctx, &node, &labels).await?;

        let workload = Workload {
            name: name.to_string(),
            namespace: namespace.to_string(),
            labels,
            owner: resources::owner_reference(&node)?,
            resources: node.resources(),
            process: self.ctx.clients.process(&node.client()),
        };

        let pvc = ensure_pvc(&self.ctx, &workload).await?;
        let sts = ensure_statefulset(&self.ctx, &workload).await?;
        tracing::info!(pvc = ?pvc, statefulset = ?sts, "Node reconciled");

        Ok(ReconcileAction::Done)
    }
}
