//! Join (`addInstance`) state machine (spec.md §4.5.1).
//!
//! States: `INIT -> CHECKED -> USER_CREATED -> GR_STARTED -> RECOVERING ->
//! METADATA_WRITTEN -> PEERS_UPDATED -> DONE`.

use super::{transition, JoinOptions, JoinOutcome, JoinState, PostFailureActions};
use crate::context::OperationContext;
use crate::error::{AdminError, Result};
use crate::gr_probe::{endpoint_supported_by_gr, GrProbe};
use crate::metadata::model::Member;
use crate::metadata::MetadataStore;
use crate::recovery::account::{self, IssuedCredential};
use crate::recovery::chooser::{choose_recovery_method, ChooserInput, Donor};
use crate::session::InstanceSession;
use crate::types::{CommunicationStack, MemberState, RecoveryMethod, TopologyMode};
use std::time::Duration;
use tracing::info;

/// Group Replication refuses a 10th member (spec.md §8 boundary
/// behavior; grounded on
/// `original_source/modules/adminapi/cluster/cluster_join.cc`'s
/// `check_cluster_members_limit`).
pub const GROUP_REPLICATION_MEMBERS_LIMIT: usize = 9;

/// Everything the engine needs about the cluster it is joining, gathered
/// by the caller from the Metadata Store + an ONLINE session.
pub struct JoinContext<'a> {
    pub cluster_id: String,
    pub group_name: String,
    pub view_change_uuid: String,
    pub topology_mode: TopologyMode,
    pub communication_stack: CommunicationStack,
    pub primary: &'a InstanceSession,
    pub peers: Vec<&'a InstanceSession>,
    /// Each entry in `peers`' own `server_id`, parallel by index — needed
    /// to rebuild that peer's account name when its credentials are
    /// rotated back after the joiner comes online (spec.md §4.4).
    pub peer_server_ids: Vec<u32>,
    pub existing_member_count: usize,
    /// Cluster row's `disable-clone` flag (spec.md §3): clone is never
    /// offered as a recovery method while set.
    pub disable_clone: bool,
    /// Cluster row's `gtid-set-complete` flag (spec.md §3): lets the
    /// chooser trust `gtid_executed` as the complete history even without
    /// a binlog that goes back to the first transaction.
    pub gtid_set_complete: bool,
}

/// Run the full Join algorithm. `server_id`/`host_pattern` identify the
/// account to mint for the joiner; `joiner_supports_clone` is a
/// capability bit the caller derives from `installed_schema_version`
/// plus a `SHOW PLUGINS` probe (not modeled here, out of scope per
/// spec.md §1's wire-protocol boundary).
pub async fn join_instance(
    ctx: &OperationContext,
    metadata: &MetadataStore,
    probe: &dyn GrProbe,
    join_ctx: &JoinContext<'_>,
    joiner: &InstanceSession,
    joiner_supports_clone: bool,
    server_id: u32,
    host_pattern: &str,
    options: &JoinOptions,
) -> Result<JoinOutcome> {
    let mut state = JoinState::Init;
    let mut compensation = PostFailureActions::default();

    // INIT -> CHECKED: the group must have room for one more member
    // before anything else is checked.
    if join_ctx.existing_member_count >= GROUP_REPLICATION_MEMBERS_LIMIT {
        return Err(AdminError::GroupReplicationMembersLimit);
    }

    // The "MySQL" communication stack carries its allowlisting at the
    // transport layer already; `ipAllowlist` only applies to XCom
    // (spec.md §8 boundary behavior).
    if join_ctx.communication_stack == CommunicationStack::Mysql && options.ip_allowlist.is_some() {
        return Err(AdminError::BadArgument(
            "ipAllowlist is not supported by the 'MySQL' communication stack".to_string(),
        ));
    }

    // target must not already carry GR state, and its endpoint must be
    // usable with the cluster's communication stack.
    let joiner_version = probe.installed_schema_version(joiner).await?;
    let joiner_endpoint = joiner.endpoint().clone();
    if !endpoint_supported_by_gr(&joiner_endpoint, joiner_version, join_ctx.communication_stack) {
        return Err(AdminError::UnsupportedCommunicationProtocol(format!(
            "{} is not reachable under the '{:?}' communication stack",
            joiner_endpoint, join_ctx.communication_stack
        )));
    }
    let member_state = probe.member_state(joiner).await?;
    if !matches!(member_state, MemberState::Missing | MemberState::Offline) {
        return Err(AdminError::BadArgInstanceAlreadyManaged(format!(
            "{joiner_endpoint} already reports Group Replication state {member_state}"
        )));
    }
    if probe.is_running_auto_rejoin(joiner).await? {
        crate::gr_probe::cancel_auto_rejoin(joiner).await?;
    }
    transition(state, JoinState::Checked);
    state = JoinState::Checked;

    let result = run_apply(
        ctx,
        metadata,
        probe,
        join_ctx,
        joiner,
        joiner_supports_clone,
        server_id,
        host_pattern,
        options,
        &mut state,
        &mut compensation,
    )
    .await;

    if let Err(e) = &result {
        let original_credential = None;
        compensation.run(join_ctx.primary, original_credential).await;
        info!(target: "engine", "join_instance failed in state {:?}: {e}", state);
    }

    result
}

#[allow(clippy::too_many_arguments)]
async fn run_apply(
    ctx: &OperationContext,
    metadata: &MetadataStore,
    probe: &dyn GrProbe,
    join_ctx: &JoinContext<'_>,
    joiner: &InstanceSession,
    joiner_supports_clone: bool,
    server_id: u32,
    host_pattern: &str,
    options: &JoinOptions,
    state: &mut JoinState,
    compensation: &mut PostFailureActions,
) -> Result<JoinOutcome> {
    // CHECKED -> USER_CREATED: mint the recovery account on the primary;
    // for the "MySQL" stack it must also exist locally on the joiner
    // before GR starts.
    let for_clone = options.recovery_method != crate::types::RecoveryMethodPreference::Incremental;
    let credential = account::create_on_primary(join_ctx.primary, server_id, host_pattern, for_clone).await?;
    compensation.created_account = Some((credential.user.clone(), credential.host_pattern.clone()));

    if join_ctx.communication_stack == CommunicationStack::Mysql {
        account::create_locally_for_mysql_stack(joiner, &credential).await?;
        account::point_peers_at_joiner(&join_ctx.peers, &credential).await?;
    }
    transition(*state, JoinState::UserCreated);
    *state = JoinState::UserCreated;

    // Decide incremental vs. clone before GR is started, since clone
    // requires a restart and incremental does not (spec.md §4.3).
    let donors: Vec<Donor<'_>> = join_ctx
        .peers
        .iter()
        .map(|session| Donor {
            endpoint: session.endpoint().clone(),
            session,
        })
        .collect();
    let chooser_input = ChooserInput {
        preference: options.recovery_method,
        disable_clone: join_ctx.disable_clone,
        gtid_set_complete: join_ctx.gtid_set_complete,
        joiner_supports_clone,
        interactive: options.interactive,
    };
    let recovery_method = choose_recovery_method(probe, joiner, &donors, chooser_input).await?;

    if options.dry_run {
        return Ok(JoinOutcome {
            member_uuid: String::new(),
            recovery_method,
            final_state: JoinState::Checked,
        });
    }

    // USER_CREATED -> GR_STARTED.
    start_group_replication(joiner, join_ctx, &credential, recovery_method, options).await?;
    transition(*state, JoinState::GrStarted);
    *state = JoinState::GrStarted;

    // GR_STARTED -> RECOVERING: watch distributed recovery / clone
    // progress by polling the GR Probe until ONLINE (spec.md §5's
    // supervised monitor is the same poll loop, run as a background task
    // by the Reboot path where a `'static` probe handle is available).
    transition(*state, JoinState::Recovering);
    *state = JoinState::Recovering;
    wait_until_online(ctx, probe, joiner).await?;

    if recovery_method == RecoveryMethod::Clone {
        account::rebind_after_clone(joiner, &credential).await?;
    }

    if join_ctx.communication_stack == CommunicationStack::Mysql {
        let peer_pairs: Vec<(&InstanceSession, u32)> =
            join_ctx.peers.iter().copied().zip(join_ctx.peer_server_ids.iter().copied()).collect();
        account::restore_peer_credentials(join_ctx.primary, &peer_pairs, host_pattern).await?;
    }

    // RECOVERING -> METADATA_WRITTEN.
    let member_uuid = uuid::Uuid::new_v4().to_string();
    let mut tx = metadata.begin_transaction();
    tx.put_member(Member {
        uuid: member_uuid.clone(),
        cluster_id: join_ctx.cluster_id.clone(),
        endpoint: joiner.endpoint().clone(),
        label: joiner.endpoint().to_string(),
        server_id,
        local_address: options
            .local_address
            .clone()
            .unwrap_or_else(|| joiner.endpoint().to_string()),
        recovery_account: Some(credential.user.clone()),
        cert_subject: None,
        join_timestamp: String::new(),
        extra: serde_json::Value::Null,
    });
    account::bind(&mut tx, &member_uuid, &credential);
    tx.commit().await?;
    transition(*state, JoinState::MetadataWritten);
    *state = JoinState::MetadataWritten;

    // METADATA_WRITTEN -> PEERS_UPDATED: recompute group_seeds across the
    // membership, and recompute auto_increment_* once the group crosses
    // the 8-member multi-primary escalation threshold (spec.md §8). Both
    // are applied to every surviving cluster member, not just the joiner,
    // so every member's view of the group stays consistent.
    let new_member_count = join_ctx.existing_member_count + 1;
    let group_seeds = join_ctx
        .peers
        .iter()
        .map(|p| p.endpoint().to_string())
        .chain(std::iter::once(joiner.endpoint().to_string()))
        .collect::<Vec<_>>()
        .join(",");
    let all_members: Vec<&InstanceSession> = join_ctx.peers.iter().copied().chain(std::iter::once(joiner)).collect();

    for member in &all_members {
        member
            .set_sysvar(
                "group_replication_group_seeds",
                &format!("'{group_seeds}'"),
                crate::session::SysvarPersistence::Persist,
            )
            .await?;
    }

    if join_ctx.topology_mode == TopologyMode::MultiPrimary && new_member_count > 7 {
        let offset = (new_member_count % 7) as u32;
        for member in &all_members {
            member
                .set_sysvar(
                    "auto_increment_increment",
                    "7",
                    crate::session::SysvarPersistence::Persist,
                )
                .await?;
            member
                .set_sysvar(
                    "auto_increment_offset",
                    &offset.to_string(),
                    crate::session::SysvarPersistence::Persist,
                )
                .await?;
        }
    }
    transition(*state, JoinState::PeersUpdated);
    *state = JoinState::PeersUpdated;

    transition(*state, JoinState::Done);
    *state = JoinState::Done;

    Ok(JoinOutcome {
        member_uuid,
        recovery_method,
        final_state: JoinState::Done,
    })
}

async fn start_group_replication(
    joiner: &InstanceSession,
    join_ctx: &JoinContext<'_>,
    credential: &IssuedCredential,
    recovery_method: RecoveryMethod,
    options: &JoinOptions,
) -> Result<()> {
    joiner
        .set_sysvar(
            "group_replication_group_name",
            &format!("'{}'", join_ctx.group_name),
            crate::session::SysvarPersistence::Persist,
        )
        .await?;
    joiner
        .set_sysvar(
            "group_replication_view_change_uuid",
            &format!("'{}'", join_ctx.view_change_uuid),
            crate::session::SysvarPersistence::Persist,
        )
        .await?;
    joiner
        .set_sysvar(
            "group_replication_recovery_use_ssl",
            "1",
            crate::session::SysvarPersistence::Persist,
        )
        .await?;

    if let Some(weight) = options.member_weight {
        joiner
            .set_sysvar(
                "group_replication_member_weight",
                &weight.to_string(),
                crate::session::SysvarPersistence::Persist,
            )
            .await?;
    }
    if let Some(action) = &options.exit_state_action {
        joiner
            .set_sysvar(
                "group_replication_exit_state_action",
                &format!("'{action}'"),
                crate::session::SysvarPersistence::Persist,
            )
            .await?;
    }
    if let Some(tries) = options.auto_rejoin_tries {
        joiner
            .set_sysvar(
                "group_replication_autorejoin_tries",
                &tries.to_string(),
                crate::session::SysvarPersistence::Persist,
            )
            .await?;
    }

    joiner
        .execute(&format!(
            "CHANGE REPLICATION SOURCE FOR CHANNEL 'group_replication_recovery' TO \
             SOURCE_USER = '{}', SOURCE_PASSWORD = '{}'",
            credential.user,
            credential.password()
        ))
        .await?;

    if recovery_method == RecoveryMethod::Clone {
        let donor = join_ctx
            .peers
            .first()
            .ok_or_else(|| AdminError::CloneNoDonors { rejected_donors: vec![] })?;
        joiner
            .execute(&format!(
                "CLONE INSTANCE FROM '{}'@'{}':{} IDENTIFIED BY '{}'",
                credential.user,
                donor.endpoint().host,
                donor.endpoint().port,
                credential.password()
            ))
            .await?;
    }

    joiner.execute("START GROUP_REPLICATION").await?;
    Ok(())
}

async fn wait_until_online(ctx: &OperationContext, probe: &dyn GrProbe, joiner: &InstanceSession) -> Result<()> {
    let poll_interval = ctx.timeouts.monitor_poll_interval;
    let deadline = tokio::time::Instant::now() + ctx.timeouts.recovery_start.max(Duration::from_secs(1)) * 30;
    loop {
        match probe.member_state(joiner).await? {
            MemberState::Online => return Ok(()),
            MemberState::Error | MemberState::Offline => {
                return Err(AdminError::CloneRecoveryFailed(format!(
                    "{} left RECOVERING without reaching ONLINE",
                    joiner.endpoint()
                )))
            }
            _ => {}
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(AdminError::GtidSyncTimeout);
        }
        tokio::time::sleep(poll_interval).await;
    }
}

