//! ClusterSet Coordinator (spec.md §4.6): computes cluster-global-status,
//! manages the async channel linking a replica cluster to the primary
//! cluster, and implements the ClusterSet-level operations.

use crate::context::OperationContext;
use crate::error::{AdminError, Result};
use crate::metadata::model::{Cluster, ClusterSet, ClusterSetRole};
use crate::metadata::MetadataStore;
use crate::session::{InstanceSession, SysvarPersistence};
use crate::types::{ClusterGlobalStatus, MemberState, QuorumState};
use tracing::info;

/// `group_replication_view_change_uuid`-qualified channel name GR uses
/// for the primary -> replica async link (spec.md §3).
pub const MANAGED_CHANNEL_NAME: &str = "clusterset_replication";

/// Everything the Coordinator needs to judge one replica cluster's
/// standing relative to the ClusterSet primary.
pub struct ClusterObservation<'a> {
    pub cluster: &'a Cluster,
    pub quorum_state: QuorumState,
    pub primary_member_state: Option<MemberState>,
    pub channel_running: bool,
    pub channel_has_errors: bool,
    pub consistency_satisfied: bool,
    pub misconfigured: bool,
}

/// Compute cluster-global-status for one cluster's entry in a
/// ClusterSet, per spec.md §4.6's decision table. `Invalidated` takes
/// precedence over every other signal, then quorum loss, then channel
/// health, then consistency/misconfiguration nuances.
pub fn compute_cluster_global_status(observation: &ClusterObservation<'_>) -> ClusterGlobalStatus {
    if observation.cluster.cluster_set_role == ClusterSetRole::Invalidated {
        return ClusterGlobalStatus::Invalidated;
    }
    if matches!(observation.quorum_state, QuorumState::Dead | QuorumState::Quorumless) {
        return ClusterGlobalStatus::NotOk;
    }
    if observation.misconfigured {
        return ClusterGlobalStatus::OkMisconfigured;
    }
    if observation.cluster.cluster_set_role == ClusterSetRole::Replica {
        if !observation.channel_running || observation.channel_has_errors {
            return ClusterGlobalStatus::OkNotReplicating;
        }
        if !observation.consistency_satisfied {
            return ClusterGlobalStatus::OkNotConsistent;
        }
    }
    ClusterGlobalStatus::Ok
}

/// `createReplicaCluster`: configure (but, per spec.md §4.5.1, do not
/// start until the joiner is already provisioned by the Join Engine) the
/// managed async channel from the primary cluster to a brand-new replica
/// cluster's receiving member.
pub async fn configure_managed_channel(
    receiver: &InstanceSession,
    primary_endpoint: &crate::types::Endpoint,
    user: &str,
    password: &str,
) -> Result<()> {
    receiver
        .execute(&format!(
            "CHANGE REPLICATION SOURCE FOR CHANNEL '{MANAGED_CHANNEL_NAME}' TO \
             SOURCE_HOST = '{}', SOURCE_PORT = {}, SOURCE_USER = '{}', SOURCE_PASSWORD = '{}', \
             SOURCE_CONNECTION_AUTO_FAILOVER = 1, SOURCE_SSL = 1",
            primary_endpoint.host, primary_endpoint.port, user, password
        ))
        .await?;
    Ok(())
}

pub async fn start_managed_channel(receiver: &InstanceSession) -> Result<()> {
    receiver
        .execute(&format!("START REPLICA FOR CHANNEL '{MANAGED_CHANNEL_NAME}'"))
        .await?;
    Ok(())
}

pub async fn stop_managed_channel(receiver: &InstanceSession) -> Result<()> {
    receiver
        .execute(&format!("STOP REPLICA FOR CHANNEL '{MANAGED_CHANNEL_NAME}'"))
        .await?;
    Ok(())
}

/// `removeCluster`: detach a replica cluster from the ClusterSet. The
/// cluster keeps its own Group Replication group; only the async channel
/// and its ClusterSet-role bookkeeping are torn down (spec.md §4.6).
pub async fn remove_cluster(
    metadata: &MetadataStore,
    receiver: &InstanceSession,
    cluster: &Cluster,
) -> Result<()> {
    if cluster.cluster_set_role == ClusterSetRole::Primary {
        return Err(AdminError::BadArgument(
            "the primary cluster cannot be removed from its own ClusterSet".to_string(),
        ));
    }
    stop_managed_channel(receiver).await?;
    receiver
        .execute(&format!("RESET REPLICA ALL FOR CHANNEL '{MANAGED_CHANNEL_NAME}'"))
        .await?;

    let mut tx = metadata.begin_transaction();
    let mut updated = cluster.clone();
    updated.cluster_set_id = None;
    updated.cluster_set_role = ClusterSetRole::None;
    tx.put_cluster(updated);
    tx.commit().await?;
    info!(target: "clusterset", "cluster {} detached from its ClusterSet", cluster.id);
    Ok(())
}

/// `rejoinCluster`: reattach a cluster previously detached by
/// `removeCluster` or invalidated by `forcePrimaryCluster`, once it is
/// reachable again. Re-points its managed channel at the current
/// primary and clears any `Invalidated` role (spec.md §4.6).
pub async fn rejoin_cluster(
    metadata: &MetadataStore,
    receiver: &InstanceSession,
    cluster: &Cluster,
    cluster_set: &ClusterSet,
    primary_endpoint: &crate::types::Endpoint,
    credential_user: &str,
    credential_password: &str,
) -> Result<()> {
    if cluster.cluster_set_role == ClusterSetRole::Primary {
        return Err(AdminError::BadArgument(
            "the primary cluster cannot be rejoined to its own ClusterSet".to_string(),
        ));
    }

    configure_managed_channel(receiver, primary_endpoint, credential_user, credential_password).await?;
    start_managed_channel(receiver).await?;

    let mut tx = metadata.begin_transaction();
    let mut updated = cluster.clone();
    updated.cluster_set_id = Some(cluster_set.id.clone());
    updated.cluster_set_role = ClusterSetRole::Replica;
    tx.put_cluster(updated);
    tx.commit().await?;
    info!(target: "clusterset", "cluster {} rejoined its ClusterSet", cluster.id);
    Ok(())
}

/// `setPrimaryCluster`: planned switchover — the current primary cluster
/// must be reachable and reporting `Ok` (spec.md §4.6/§4.1's admission
/// record for this operation enforces that; here we just perform the
/// mechanical channel flip once the caller has confirmed admission).
pub async fn set_primary_cluster(
    metadata: &MetadataStore,
    old_primary_member: &InstanceSession,
    new_primary_member: &InstanceSession,
    replicas: &[(&InstanceSession, &crate::types::Endpoint)],
    cluster_set: &ClusterSet,
    credential_user: &str,
    credential_password: &str,
) -> Result<()> {
    old_primary_member
        .set_sysvar("read_only", "ON", SysvarPersistence::Persist)
        .await?;
    new_primary_member
        .set_sysvar("read_only", "OFF", SysvarPersistence::Persist)
        .await?;

    for (replica_session, _) in replicas {
        stop_managed_channel(replica_session).await?;
    }
    let new_primary_endpoint = new_primary_member.endpoint().clone();
    for (replica_session, _) in replicas {
        configure_managed_channel(replica_session, &new_primary_endpoint, credential_user, credential_password).await?;
        start_managed_channel(replica_session).await?;
    }

    let mut tx = metadata.begin_transaction();
    let mut updated_set = cluster_set.clone();
    updated_set.primary_cluster_id = new_primary_endpoint.to_string();
    tx.put_cluster_set(updated_set);
    tx.commit().await?;
    Ok(())
}

/// `forcePrimaryCluster`: disaster-recovery promotion when the old
/// primary is unreachable. Skips the read-only handshake with the old
/// primary and marks it `Invalidated` instead (spec.md §4.6).
pub async fn force_primary_cluster(
    metadata: &MetadataStore,
    old_primary_cluster: &Cluster,
    new_primary_member: &InstanceSession,
    replicas: &[(&InstanceSession, &crate::types::Endpoint)],
    cluster_set: &ClusterSet,
    credential_user: &str,
    credential_password: &str,
) -> Result<()> {
    new_primary_member
        .set_sysvar("read_only", "OFF", SysvarPersistence::Persist)
        .await?;

    let new_primary_endpoint = new_primary_member.endpoint().clone();
    for (replica_session, _) in replicas {
        stop_managed_channel(replica_session).await?;
        configure_managed_channel(replica_session, &new_primary_endpoint, credential_user, credential_password).await?;
        start_managed_channel(replica_session).await?;
    }

    let mut tx = metadata.begin_transaction();
    let mut invalidated = old_primary_cluster.clone();
    invalidated.cluster_set_role = ClusterSetRole::Invalidated;
    tx.put_cluster(invalidated);
    let mut updated_set = cluster_set.clone();
    updated_set.primary_cluster_id = new_primary_endpoint.to_string();
    tx.put_cluster_set(updated_set);
    tx.commit().await?;
    info!(target: "clusterset", "force_primary_cluster: old primary marked Invalidated");
    Ok(())
}

/// `fenceAllTraffic` / `fenceWrites` / `unfenceWrites` (spec.md §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceMode {
    AllTraffic,
    WritesOnly,
    None,
}

pub async fn apply_fence(
    ctx: &OperationContext,
    metadata: &MetadataStore,
    cluster: &Cluster,
    members: &[&InstanceSession],
    mode: FenceMode,
) -> Result<()> {
    let value = match mode {
        FenceMode::AllTraffic => "ON",
        FenceMode::WritesOnly | FenceMode::None => "OFF",
    };
    for member in members {
        member
            .set_sysvar("super_read_only", value, SysvarPersistence::Session)
            .await?;
    }
    if mode == FenceMode::AllTraffic {
        ctx.warn(format!("cluster {} is now fenced against all traffic", cluster.id));
    }

    let mut tx = metadata.begin_transaction();
    let mut updated = cluster.clone();
    updated.fenced = mode != FenceMode::None;
    tx.put_cluster(updated);
    tx.commit().await?;
    Ok(())
}

/// Test hook for the chooser-like pure logic above; kept free of any
/// session I/O so it can run without mocks.
pub fn quorum_requires_not_ok(quorum_state: QuorumState) -> bool {
    matches!(quorum_state, QuorumState::Dead | QuorumState::Quorumless)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::model::ClusterSetRole;
    use crate::types::TopologyMode;

    fn sample_cluster() -> Cluster {
        Cluster {
            id: "cluster1".into(),
            name: "prod".into(),
            topology_mode: TopologyMode::SinglePrimary,
            communication_stack: crate::types::CommunicationStack::Mysql,
            group_name: "group1".into(),
            view_change_uuid: "uuid1".into(),
            gtid_set_complete: true,
            disable_clone: false,
            tags: Default::default(),
            cluster_set_id: Some("cs1".into()),
            cluster_set_role: ClusterSetRole::Replica,
            remove_pending: false,
            fenced: false,
            created_at: String::new(),
            last_changed_time: String::new(),
            extra: serde_json::Value::Null,
        }
    }

    #[test]
    fn invalidated_role_wins_over_everything_else() {
        let mut cluster = sample_cluster();
        cluster.cluster_set_role = ClusterSetRole::Invalidated;
        let observation = ClusterObservation {
            cluster: &cluster,
            quorum_state: QuorumState::Normal,
            primary_member_state: Some(MemberState::Online),
            channel_running: true,
            channel_has_errors: false,
            consistency_satisfied: true,
            misconfigured: false,
        };
        assert_eq!(compute_cluster_global_status(&observation), ClusterGlobalStatus::Invalidated);
    }

    #[test]
    fn replica_with_stopped_channel_is_not_replicating() {
        let cluster = sample_cluster();
        let observation = ClusterObservation {
            cluster: &cluster,
            quorum_state: QuorumState::Normal,
            primary_member_state: Some(MemberState::Online),
            channel_running: false,
            channel_has_errors: false,
            consistency_satisfied: true,
            misconfigured: false,
        };
        assert_eq!(compute_cluster_global_status(&observation), ClusterGlobalStatus::OkNotReplicating);
    }

    #[test]
    fn dead_quorum_overrides_replica_channel_health() {
        let cluster = sample_cluster();
        let observation = ClusterObservation {
            cluster: &cluster,
            quorum_state: QuorumState::Dead,
            primary_member_state: None,
            channel_running: true,
            channel_has_errors: false,
            consistency_satisfied: true,
            misconfigured: false,
        };
        assert_eq!(compute_cluster_global_status(&observation), ClusterGlobalStatus::NotOk);
    }
}
