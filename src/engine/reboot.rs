//! Reboot-from-complete-outage state machine (spec.md §4.5.3).
//!
//! Grounded on
//! `original_source/modules/adminapi/cluster/reboot_cluster_from_complete_outage.cc`:
//! pick a seed among the reachable instances, bootstrap Group Replication
//! there, then rejoin every other reachable instance against it.

use super::join::JoinContext;
use super::rejoin::rejoin_instance;
use super::{transition, JoinOptions, JoinState};
use crate::context::OperationContext;
use crate::error::{AdminError, Result};
use crate::gr_probe::GrProbe;
use crate::metadata::model::{Cluster, Member};
use crate::metadata::MetadataStore;
use crate::recovery::account;
use crate::session::{InstanceSession, SysvarPersistence};
use crate::types::{ClusterGlobalStatus, CommunicationStack, GtidRelation, MemberState};
use tracing::{info, warn};
use typed_builder::TypedBuilder;

/// Options accepted by `rebootClusterFromCompleteOutage` (spec.md §6).
#[derive(Debug, Clone, TypedBuilder)]
pub struct RebootOptions {
    /// Instance address to use as the reboot seed, overriding automatic
    /// selection.
    #[builder(default, setter(strip_option, into))]
    pub seed_instance: Option<String>,
    /// Proceed even though some members are unreachable or diverged
    /// (spec.md §7: without this, any such member aborts the reboot).
    #[builder(default)]
    pub force: bool,
    #[builder(default)]
    pub dry_run: bool,
}

#[derive(Debug, Clone)]
pub struct RebootOutcome {
    pub seed_uuid: String,
    pub rejoined: Vec<String>,
    pub skipped: Vec<String>,
}

/// One known member plus whatever session could be reached for it; `None`
/// means the instance did not respond within the connect timeout.
pub struct Candidate<'a> {
    pub member: Member,
    pub session: Option<&'a InstanceSession>,
}

/// Run the full reboot algorithm.
///
/// 1. Refuse if any candidate reports ONLINE (spec.md: "the cluster is
///    not actually down").
/// 2. Pick the seed: the caller's explicit choice, or else the reachable
///    candidate with the most advanced GTID set.
/// 3. Refuse unreachable/diverged members unless `force` is set.
/// 4. Bootstrap Group Replication on the seed.
/// 5. Recreate the seed's recovery account unconditionally on the
///    "MySQL" stack.
/// 6. Rejoin every other reachable, non-diverged candidate.
/// 7. Rewrite metadata to match what actually came back online.
/// 8. If the cluster belongs to a ClusterSet, leave cluster-global-status
///    as `Invalidated` for the caller's ClusterSet Coordinator to resolve
///    (spec.md §4.6) rather than guessing reintegration here.
pub async fn reboot_cluster_from_complete_outage(
    ctx: &OperationContext,
    metadata: &MetadataStore,
    probe: &dyn GrProbe,
    cluster: &Cluster,
    candidates: Vec<Candidate<'_>>,
    host_pattern: &str,
    options: &RebootOptions,
) -> Result<RebootOutcome> {
    for candidate in &candidates {
        if let Some(session) = candidate.session {
            if probe.member_state(session).await? == MemberState::Online {
                return Err(AdminError::ClusterNotDown);
            }
        }
    }

    let seed_index = select_seed(probe, &candidates, options.seed_instance.as_deref()).await?;

    let unreachable: Vec<&str> = candidates
        .iter()
        .enumerate()
        .filter(|(i, c)| *i != seed_index && c.session.is_none())
        .map(|(_, c)| c.member.endpoint.host.as_str())
        .collect();
    if !unreachable.is_empty() && !options.force {
        return Err(AdminError::BadArgument(format!(
            "instances unreachable: {unreachable:?} (use force to reboot without them)"
        )));
    }

    let seed = candidates[seed_index]
        .session
        .ok_or_else(|| AdminError::ClusterPrimaryUnavailable("seed instance is unreachable".to_string()))?;

    let mut diverged = Vec::new();
    for (i, candidate) in candidates.iter().enumerate() {
        if i == seed_index {
            continue;
        }
        let Some(session) = candidate.session else { continue };
        let relation = probe.check_replica_gtid_state(seed, session).await?;
        if relation == GtidRelation::Diverged {
            diverged.push(candidate.member.endpoint.to_string());
        }
    }
    if !diverged.is_empty() && !options.force {
        return Err(AdminError::DataErrantTransactions);
    }

    if options.dry_run {
        return Ok(RebootOutcome {
            seed_uuid: candidates[seed_index].member.uuid.clone(),
            rejoined: Vec::new(),
            skipped: unreachable.iter().map(|s| s.to_string()).chain(diverged).collect(),
        });
    }

    transition(JoinState::Init, JoinState::Checked);
    bootstrap_seed(seed, cluster).await?;

    let seed_credential = account::recreate_unconditionally_for_reboot(
        ctx,
        seed,
        candidates[seed_index].member.server_id,
        host_pattern,
        cluster.communication_stack,
    )
    .await?;
    if cluster.communication_stack == CommunicationStack::Mysql {
        account::create_locally_for_mysql_stack(seed, &seed_credential).await?;
    }
    transition(JoinState::Checked, JoinState::GrStarted);

    let join_ctx = JoinContext {
        cluster_id: cluster.id.clone(),
        group_name: cluster.group_name.clone(),
        view_change_uuid: cluster.view_change_uuid.clone(),
        topology_mode: cluster.topology_mode,
        communication_stack: cluster.communication_stack,
        primary: seed,
        peers: vec![seed],
        peer_server_ids: vec![candidates[seed_index].member.server_id],
        existing_member_count: 1,
        disable_clone: cluster.disable_clone,
        gtid_set_complete: cluster.gtid_set_complete,
    };

    let mut rejoined = Vec::new();
    let mut skipped: Vec<String> = unreachable.iter().map(|s| s.to_string()).collect();
    skipped.extend(diverged);

    for (i, candidate) in candidates.iter().enumerate() {
        if i == seed_index {
            continue;
        }
        let Some(session) = candidate.session else { continue };
        if skipped.contains(&candidate.member.endpoint.to_string()) {
            continue;
        }
        let rejoin_opts = JoinOptions::builder().build();
        match rejoin_instance(ctx, metadata, probe, &join_ctx, session, &candidate.member, host_pattern, &rejoin_opts).await {
            Ok(outcome) => rejoined.push(outcome.member_uuid),
            Err(e) => {
                warn!(target: "engine", "reboot: {} failed to rejoin: {e}", candidate.member.endpoint);
                skipped.push(candidate.member.endpoint.to_string());
            }
        }
    }

    let mut tx = metadata.begin_transaction();
    let mut updated_cluster = cluster.clone();
    updated_cluster.fenced = false;
    if updated_cluster.cluster_set_id.is_some() {
        info!(target: "engine", "cluster {} rebooted while part of a ClusterSet; cluster-global-status left for reconciliation", cluster.id);
    }
    tx.put_cluster(updated_cluster);
    tx.commit().await?;

    transition(JoinState::PeersUpdated, JoinState::Done);

    Ok(RebootOutcome {
        seed_uuid: candidates[seed_index].member.uuid.clone(),
        rejoined,
        skipped,
    })
}

async fn select_seed(probe: &dyn GrProbe, candidates: &[Candidate<'_>], explicit: Option<&str>) -> Result<usize> {
    if let Some(address) = explicit {
        return candidates
            .iter()
            .position(|c| c.member.endpoint.host == address || c.member.endpoint.to_string() == address)
            .ok_or_else(|| AdminError::BadArgument(format!("'{address}' is not a member of this cluster")));
    }

    let mut best: Option<(usize, String)> = None;
    for (i, candidate) in candidates.iter().enumerate() {
        let Some(session) = candidate.session else { continue };
        let gtid = probe.gtid_total_set(session, &[]).await?;
        match &best {
            Some((_, best_gtid)) if gtid.len() <= best_gtid.len() => {}
            _ => best = Some((i, gtid)),
        }
    }
    best.map(|(i, _)| i)
        .ok_or_else(|| AdminError::ClusterPrimaryUnavailable("no reachable instance to use as reboot seed".to_string()))
}

async fn bootstrap_seed(seed: &InstanceSession, cluster: &Cluster) -> Result<()> {
    seed.set_sysvar("group_replication_bootstrap_group", "ON", SysvarPersistence::Session)
        .await?;
    seed.set_sysvar(
        "group_replication_group_name",
        &format!("'{}'", cluster.group_name),
        SysvarPersistence::Persist,
    )
    .await?;
    seed.execute("START GROUP_REPLICATION").await?;
    seed.set_sysvar("group_replication_bootstrap_group", "OFF", SysvarPersistence::Session)
        .await?;
    Ok(())
}

/// Cluster-global-status a ClusterSet Coordinator should assign after a
/// bare reboot, before any reconciliation with the primary cluster has
/// run (spec.md §4.6 Open Question: left `Invalidated` rather than `Ok`
/// until the Coordinator confirms the primary's view agrees).
pub fn post_reboot_cluster_global_status(cluster: &Cluster) -> ClusterGlobalStatus {
    if cluster.cluster_set_id.is_some() {
        ClusterGlobalStatus::Invalidated
    } else {
        ClusterGlobalStatus::Ok
    }
}
