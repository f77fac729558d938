//! Rejoin (`rejoinInstance`) state machine (spec.md §4.5.2).
//!
//! Shares most of Join's shape but starts from a member already present
//! in metadata: it must reconcile GTID state rather than mint a fresh
//! identity, and on the "MySQL" communication stack the recovery account
//! is unconditionally recreated rather than reused, since the instance
//! may have been offline long enough for credentials to have rotated.

use super::{transition, JoinOptions, JoinOutcome, JoinState, PostFailureActions};
use crate::context::OperationContext;
use crate::error::{AdminError, Result};
use crate::gr_probe::GrProbe;
use crate::metadata::model::Member;
use crate::metadata::MetadataStore;
use crate::recovery::account::{self, IssuedCredential};
use crate::recovery::chooser::{choose_recovery_method, ChooserInput, Donor};
use crate::session::InstanceSession;
use crate::types::{CommunicationStack, GtidRelation, MemberState, RecoveryMethod};
use std::time::Duration;
use tracing::info;

use super::join::JoinContext;

/// Run the Rejoin algorithm against a member already recorded in
/// metadata. `existing` is the Metadata Store's row for this instance;
/// its `uuid` is preserved across the rejoin (spec.md §3: member
/// identity is stable across rejoin, unlike a fresh `addInstance`).
pub async fn rejoin_instance(
    ctx: &OperationContext,
    metadata: &MetadataStore,
    probe: &dyn GrProbe,
    join_ctx: &JoinContext<'_>,
    target: &InstanceSession,
    existing: &Member,
    host_pattern: &str,
    options: &JoinOptions,
) -> Result<JoinOutcome> {
    let mut state = JoinState::Init;
    let mut compensation = PostFailureActions::default();

    let member_state = probe.member_state(target).await?;
    if member_state == MemberState::Online {
        return Err(AdminError::BadArgInstanceAlreadyManaged(format!(
            "{} is already ONLINE, nothing to rejoin",
            target.endpoint()
        )));
    }
    if probe.is_running_auto_rejoin(target).await? {
        crate::gr_probe::cancel_auto_rejoin(target).await?;
    }

    // A member invalidated while its cluster was partitioned off from a
    // ClusterSet primary can never rejoin under its old identity
    // (spec.md §4.5.2).
    if existing.extra.get("invalidated").and_then(|v| v.as_bool()).unwrap_or(false) {
        return Err(AdminError::AsyncMemberInvalidated(existing.uuid.clone()));
    }

    transition(state, JoinState::Checked);
    state = JoinState::Checked;

    let result = run_apply(
        ctx,
        metadata,
        probe,
        join_ctx,
        target,
        existing,
        host_pattern,
        options,
        &mut state,
        &mut compensation,
    )
    .await;

    if let Err(e) = &result {
        compensation.run(join_ctx.primary, None).await;
        info!(target: "engine", "rejoin_instance failed in state {:?}: {e}", state);
    }

    result
}

#[allow(clippy::too_many_arguments)]
async fn run_apply(
    ctx: &OperationContext,
    metadata: &MetadataStore,
    probe: &dyn GrProbe,
    join_ctx: &JoinContext<'_>,
    target: &InstanceSession,
    existing: &Member,
    host_pattern: &str,
    options: &JoinOptions,
    state: &mut JoinState,
    compensation: &mut PostFailureActions,
) -> Result<JoinOutcome> {
    // CHECKED -> USER_CREATED: the "MySQL" stack recreates unconditionally
    // (spec.md §4.4); other stacks reuse the existing account if one is
    // still bound and referenced.
    let credential = if join_ctx.communication_stack == CommunicationStack::Mysql {
        let cred = account::recreate_unconditionally_for_reboot(
            ctx,
            join_ctx.primary,
            existing.server_id,
            host_pattern,
            join_ctx.communication_stack,
        )
        .await?;
        account::create_locally_for_mysql_stack(target, &cred).await?;
        account::point_peers_at_joiner(&join_ctx.peers, &cred).await?;
        cred
    } else {
        account::create_on_primary(join_ctx.primary, existing.server_id, host_pattern, true).await?
    };
    compensation.created_account = Some((credential.user.clone(), credential.host_pattern.clone()));
    transition(*state, JoinState::UserCreated);
    *state = JoinState::UserCreated;

    let donors: Vec<Donor<'_>> = join_ctx
        .peers
        .iter()
        .map(|session| Donor {
            endpoint: session.endpoint().clone(),
            session,
        })
        .collect();

    // A rejoin with an Identical GTID set never needs provisioning; only
    // escalate to the full chooser when the instance has actually fallen
    // behind (spec.md §4.5.2).
    let mut relation = GtidRelation::New;
    if let Some(donor) = donors.first() {
        relation = probe.check_replica_gtid_state(donor.session, target).await?;
    }

    let recovery_method = if relation == GtidRelation::Identical {
        RecoveryMethod::Incremental
    } else {
        let chooser_input = ChooserInput {
            preference: options.recovery_method,
            disable_clone: join_ctx.disable_clone,
            gtid_set_complete: join_ctx.gtid_set_complete,
            joiner_supports_clone: true,
            interactive: options.interactive,
        };
        choose_recovery_method(probe, target, &donors, chooser_input).await?
    };

    if options.dry_run {
        return Ok(JoinOutcome {
            member_uuid: existing.uuid.clone(),
            recovery_method,
            final_state: JoinState::Checked,
        });
    }

    // USER_CREATED -> GR_STARTED.
    restart_group_replication(target, &credential, recovery_method, join_ctx).await?;
    transition(*state, JoinState::GrStarted);
    *state = JoinState::GrStarted;

    transition(*state, JoinState::Recovering);
    *state = JoinState::Recovering;
    wait_until_online(ctx, probe, target).await?;

    if recovery_method == RecoveryMethod::Clone {
        account::rebind_after_clone(target, &credential).await?;
    }

    if join_ctx.communication_stack == CommunicationStack::Mysql {
        let peer_pairs: Vec<(&InstanceSession, u32)> =
            join_ctx.peers.iter().copied().zip(join_ctx.peer_server_ids.iter().copied()).collect();
        account::restore_peer_credentials(join_ctx.primary, &peer_pairs, host_pattern).await?;
    }

    // RECOVERING -> METADATA_WRITTEN: identity is unchanged, only the
    // recovery-account binding and join timestamp are refreshed.
    let mut tx = metadata.begin_transaction();
    let mut updated = existing.clone();
    updated.recovery_account = Some(credential.user.clone());
    tx.put_member(updated);
    account::bind(&mut tx, &existing.uuid, &credential);
    tx.commit().await?;
    transition(*state, JoinState::MetadataWritten);
    *state = JoinState::MetadataWritten;

    transition(*state, JoinState::PeersUpdated);
    *state = JoinState::PeersUpdated;
    transition(*state, JoinState::Done);
    *state = JoinState::Done;

    Ok(JoinOutcome {
        member_uuid: existing.uuid.clone(),
        recovery_method,
        final_state: JoinState::Done,
    })
}

async fn restart_group_replication(
    target: &InstanceSession,
    credential: &IssuedCredential,
    recovery_method: RecoveryMethod,
    join_ctx: &JoinContext<'_>,
) -> Result<()> {
    target
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
        target
            .execute(&format!(
                "CLONE INSTANCE FROM '{}'@'{}':{} IDENTIFIED BY '{}'",
                credential.user,
                donor.endpoint().host,
                donor.endpoint().port,
                credential.password()
            ))
            .await?;
    }

    target.execute("START GROUP_REPLICATION").await?;
    Ok(())
}

async fn wait_until_online(ctx: &OperationContext, probe: &dyn GrProbe, target: &InstanceSession) -> Result<()> {
    let poll_interval = ctx.timeouts.monitor_poll_interval;
    let deadline = tokio::time::Instant::now() + ctx.timeouts.recovery_start.max(Duration::from_secs(1)) * 30;
    loop {
        match probe.member_state(target).await? {
            MemberState::Online => return Ok(()),
            MemberState::Error | MemberState::Offline => {
                return Err(AdminError::CloneRecoveryFailed(format!(
                    "{} left RECOVERING without reaching ONLINE",
                    target.endpoint()
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
