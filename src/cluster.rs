//! Public operation surface (spec.md §6): thin façades over the
//! Join/Rejoin/Reboot Engine, ClusterSet Coordinator, and Router surface,
//! grounded on the teacher's `BdbHandler`/`ClusterHandler` pattern of
//! narrow methods delegating to a shared client.

use crate::clusterset::{self, FenceMode};
use crate::context::OperationContext;
use crate::engine::join::{join_instance, JoinContext};
use crate::engine::reboot::{reboot_cluster_from_complete_outage, Candidate, RebootOptions, RebootOutcome};
use crate::engine::rejoin::rejoin_instance;
use crate::engine::{JoinOptions, JoinOutcome};
use crate::error::Result;
use crate::gr_probe::GrProbe;
use crate::metadata::model::{Cluster as ClusterRow, Member};
use crate::metadata::MetadataStore;
use crate::precondition::{commands, CommandConditions, ObservedState, PreconditionChecker};
use crate::session::InstanceSession;
use serde_json::Value;

/// A handle to one managed InnoDB cluster: the same role the teacher's
/// `BdbHandler` plays over one Redis Enterprise database, but scoped to
/// one Group Replication group (spec.md §2, §6).
pub struct Cluster<'a> {
    pub ctx: &'a OperationContext,
    pub metadata: &'a MetadataStore,
    pub probe: &'a dyn GrProbe,
    pub row: ClusterRow,
}

impl<'a> Cluster<'a> {
    pub fn new(ctx: &'a OperationContext, metadata: &'a MetadataStore, probe: &'a dyn GrProbe, row: ClusterRow) -> Self {
        Self { ctx, metadata, probe, row }
    }

    fn admit(&self, conds: &CommandConditions, observed: &ObservedState) -> Result<()> {
        PreconditionChecker::new(self.metadata, None).check(conds, observed)
    }

    /// `Cluster.addInstance`.
    pub async fn add_instance(
        &self,
        join_ctx: &JoinContext<'_>,
        joiner: &InstanceSession,
        joiner_supports_clone: bool,
        server_id: u32,
        host_pattern: &str,
        observed: &ObservedState,
        options: &JoinOptions,
    ) -> Result<JoinOutcome> {
        self.admit(&commands::add_instance(), observed)?;
        join_instance(
            self.ctx,
            self.metadata,
            self.probe,
            join_ctx,
            joiner,
            joiner_supports_clone,
            server_id,
            host_pattern,
            options,
        )
        .await
    }

    /// `Cluster.rejoinInstance`.
    pub async fn rejoin_instance(
        &self,
        join_ctx: &JoinContext<'_>,
        target: &InstanceSession,
        existing: &Member,
        host_pattern: &str,
        observed: &ObservedState,
        options: &JoinOptions,
    ) -> Result<JoinOutcome> {
        self.admit(&commands::rejoin_instance(), observed)?;
        rejoin_instance(self.ctx, self.metadata, self.probe, join_ctx, target, existing, host_pattern, options).await
    }

    /// `Cluster.removeInstance`: drop the member from metadata and its
    /// recovery account if no one else references it (spec.md §4.4).
    pub async fn remove_instance(&self, member: &Member, observed: &ObservedState, primary: &InstanceSession) -> Result<()> {
        self.admit(&commands::remove_instance(), observed)?;
        let accounts = self.metadata.recovery_accounts(&self.row.id).await?;
        let mut tx = self.metadata.begin_transaction();
        tx.delete_member(&self.row.id, &member.uuid);
        if let Some(account) = accounts.iter().find(|a| Some(a.user.as_str()) == member.recovery_account.as_deref()) {
            crate::recovery::account::drop_if_unreferenced(primary, &mut tx, &self.row.id, account, &member.uuid).await?;
        }
        tx.commit().await
    }

    /// `Cluster.setPrimaryInstance`: single-primary-mode switchover.
    pub async fn set_primary_instance(&self, new_primary: &InstanceSession, observed: &ObservedState) -> Result<()> {
        self.admit(&commands::set_primary_instance(), observed)?;
        new_primary
            .execute(&format!(
                "SELECT group_replication_set_as_primary('{}')",
                new_primary.username()
            ))
            .await?;
        Ok(())
    }

    /// `Cluster.setOption` (cluster-wide) / `Cluster.setInstanceOption`
    /// (member-scoped). Both reduce to a `SET PERSIST` against the
    /// relevant session(s); the distinction is which sessions the caller
    /// passes in.
    pub async fn set_option(&self, members: &[&InstanceSession], sysvar: &str, value: &str, observed: &ObservedState) -> Result<()> {
        self.admit(&commands::set_option(), observed)?;
        for member in members {
            member
                .set_sysvar(sysvar, value, crate::session::SysvarPersistence::Persist)
                .await?;
        }
        Ok(())
    }

    pub async fn set_instance_option(&self, member: &InstanceSession, sysvar: &str, value: &str, observed: &ObservedState) -> Result<()> {
        self.admit(&commands::set_instance_option(), observed)?;
        member.set_sysvar(sysvar, value, crate::session::SysvarPersistence::Persist).await
    }

    /// `Cluster.setRoutingOption`.
    pub async fn set_routing_option(&self, router: Option<&str>, name: &str, value: Value, observed: &ObservedState) -> Result<()> {
        self.admit(&commands::set_routing_option(), observed)?;
        crate::router::set_routing_option(self.metadata, &self.row.id, router, name, value).await
    }

    /// `Cluster.rebootClusterFromCompleteOutage`.
    pub async fn reboot_from_complete_outage(
        &self,
        candidates: Vec<Candidate<'_>>,
        host_pattern: &str,
        options: &RebootOptions,
    ) -> Result<RebootOutcome> {
        reboot_cluster_from_complete_outage(self.ctx, self.metadata, self.probe, &self.row, candidates, host_pattern, options).await
    }

    /// `Cluster.createReplicaCluster`: join the designated receiver as a
    /// standalone GR member first (via the Join Engine), then wire the
    /// managed async channel back to this cluster's primary.
    pub async fn create_replica_cluster(
        &self,
        primary_endpoint: &crate::types::Endpoint,
        receiver: &InstanceSession,
        channel_user: &str,
        channel_password: &str,
        observed: &ObservedState,
    ) -> Result<()> {
        self.admit(&commands::create_replica_cluster(), observed)?;
        clusterset::configure_managed_channel(receiver, primary_endpoint, channel_user, channel_password).await?;
        clusterset::start_managed_channel(receiver).await
    }

    /// `Cluster.removeCluster` (ClusterSet-scoped).
    pub async fn remove_from_cluster_set(&self, receiver: &InstanceSession, observed: &ObservedState) -> Result<()> {
        self.admit(&commands::remove_cluster(), observed)?;
        clusterset::remove_cluster(self.metadata, receiver, &self.row).await
    }

    /// `Cluster.rejoinCluster` (ClusterSet-scoped): reattach this cluster
    /// once it is reachable again.
    pub async fn rejoin_cluster_set(
        &self,
        receiver: &InstanceSession,
        cluster_set_id: &str,
        primary_endpoint: &crate::types::Endpoint,
        credential_user: &str,
        credential_password: &str,
        observed: &ObservedState,
    ) -> Result<()> {
        self.admit(&commands::rejoin_cluster(), observed)?;
        let cluster_set = self
            .metadata
            .cluster_set(cluster_set_id)
            .await?
            .ok_or_else(|| crate::error::AdminError::MetadataMissing(format!("cluster set {cluster_set_id}")))?;
        clusterset::rejoin_cluster(
            self.metadata,
            receiver,
            &self.row,
            &cluster_set,
            primary_endpoint,
            credential_user,
            credential_password,
        )
        .await
    }

    pub async fn fence_all_traffic(&self, members: &[&InstanceSession], observed: &ObservedState) -> Result<()> {
        self.admit(&commands::fence_all_traffic(), observed)?;
        clusterset::apply_fence(self.ctx, self.metadata, &self.row, members, FenceMode::AllTraffic).await
    }

    pub async fn fence_writes(&self, members: &[&InstanceSession], observed: &ObservedState) -> Result<()> {
        self.admit(&commands::fence_writes(), observed)?;
        clusterset::apply_fence(self.ctx, self.metadata, &self.row, members, FenceMode::WritesOnly).await
    }

    pub async fn unfence_writes(&self, members: &[&InstanceSession], observed: &ObservedState) -> Result<()> {
        self.admit(&commands::unfence_writes(), observed)?;
        clusterset::apply_fence(self.ctx, self.metadata, &self.row, members, FenceMode::None).await
    }
}

/// A handle to the ClusterSet as a whole, analogous to [`Cluster`] but
/// scoped to cross-cluster operations (spec.md §4.6, §6).
pub struct ClusterSetHandle<'a> {
    pub ctx: &'a OperationContext,
    pub metadata: &'a MetadataStore,
    pub id: String,
}

impl<'a> ClusterSetHandle<'a> {
    pub fn new(ctx: &'a OperationContext, metadata: &'a MetadataStore, id: impl Into<String>) -> Self {
        Self { ctx, metadata, id: id.into() }
    }

    pub async fn set_primary_cluster(
        &self,
        old_primary_member: &InstanceSession,
        new_primary_member: &InstanceSession,
        replicas: &[(&InstanceSession, &crate::types::Endpoint)],
        credential_user: &str,
        credential_password: &str,
    ) -> Result<()> {
        let cluster_set = self
            .metadata
            .cluster_set(&self.id)
            .await?
            .ok_or_else(|| crate::error::AdminError::MetadataMissing(format!("cluster set {}", self.id)))?;
        clusterset::set_primary_cluster(
            self.metadata,
            old_primary_member,
            new_primary_member,
            replicas,
            &cluster_set,
            credential_user,
            credential_password,
        )
        .await
    }

    pub async fn force_primary_cluster(
        &self,
        old_primary_cluster: &ClusterRow,
        new_primary_member: &InstanceSession,
        replicas: &[(&InstanceSession, &crate::types::Endpoint)],
        credential_user: &str,
        credential_password: &str,
    ) -> Result<()> {
        let cluster_set = self
            .metadata
            .cluster_set(&self.id)
            .await?
            .ok_or_else(|| crate::error::AdminError::MetadataMissing(format!("cluster set {}", self.id)))?;
        clusterset::force_primary_cluster(
            self.metadata,
            old_primary_cluster,
            new_primary_member,
            replicas,
            &cluster_set,
            credential_user,
            credential_password,
        )
        .await
    }
}

pub use crate::engine::reboot::Candidate as RebootCandidate;
