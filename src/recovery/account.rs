//! Recovery-Account Manager (spec.md §4.4).
//!
//! Issues, rotates, binds, restores, and drops the replication user GR
//! uses for distributed recovery, including the "MySQL" communication
//! stack's requirement that the account also exist locally on the
//! joiner before GR starts.

use crate::context::OperationContext;
use crate::error::Result;
use crate::metadata::model::RecoveryAccount;
use crate::metadata::Transaction;
use crate::session::{InstanceSession, SysvarPersistence};
use crate::types::CommunicationStack;
use tracing::info;
use uuid::Uuid;

fn account_name(server_id: u32) -> String {
    format!("mysql_innodb_cluster_{server_id}")
}

/// A freshly minted credential. The raw secret never leaves this module;
/// callers only see an opaque reference stored in metadata
/// (`RecoveryAccount::credential_ref`).
pub struct IssuedCredential {
    pub user: String,
    pub host_pattern: String,
    password: String,
}

impl IssuedCredential {
    pub fn password(&self) -> &str {
        &self.password
    }
}

fn generate_password() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Create `mysql_innodb_cluster_<server_id>` on the primary with
/// privileges sufficient for distributed recovery, plus `BACKUP_ADMIN`
/// when clone is in play (spec.md §4.4).
pub async fn create_on_primary(
    primary: &InstanceSession,
    server_id: u32,
    host_pattern: &str,
    for_clone: bool,
) -> Result<IssuedCredential> {
    let user = account_name(server_id);
    let password = generate_password();
    primary
        .execute(&format!(
            "CREATE USER '{user}'@'{host_pattern}' IDENTIFIED BY '{password}'"
        ))
        .await?;
    primary
        .execute(&format!(
            "GRANT REPLICATION SLAVE, REPLICATION_SLAVE_ADMIN, BACKUP_ADMIN ON *.* TO '{user}'@'{host_pattern}'"
        ))
        .await?;
    if !for_clone {
        primary
            .execute(&format!(
                "REVOKE BACKUP_ADMIN ON *.* FROM '{user}'@'{host_pattern}'"
            ))
            .await
            .ok();
    }
    Ok(IssuedCredential {
        user,
        host_pattern: host_pattern.to_string(),
        password,
    })
}

/// For the "MySQL" communication stack: create the account locally on
/// the joiner too, with binary logging suppressed, because GR
/// authenticates recovery connections in both directions before the
/// first transaction replicates (spec.md §4.4).
pub async fn create_locally_for_mysql_stack(
    joiner: &InstanceSession,
    credential: &IssuedCredential,
) -> Result<()> {
    joiner
        .set_sysvar("sql_log_bin", "0", SysvarPersistence::Session)
        .await?;
    let result = joiner
        .execute(&format!(
            "CREATE USER IF NOT EXISTS '{}'@'{}' IDENTIFIED BY '{}'",
            credential.user,
            credential.host_pattern,
            credential.password()
        ))
        .await;
    joiner
        .set_sysvar("sql_log_bin", "1", SysvarPersistence::Session)
        .await?;
    result?;
    Ok(())
}

/// Bind the new member to its recovery account in the metadata
/// transaction (spec.md §3: "every ONLINE/RECOVERING member binds to
/// exactly one recovery account").
pub fn bind(tx: &mut Transaction<'_>, member_uuid: &str, credential: &IssuedCredential) {
    tx.put_recovery_account(RecoveryAccount {
        user: credential.user.clone(),
        host_pattern: credential.host_pattern.clone(),
        credential_ref: format!("vault://{}", credential.user),
        owning_member_uuid: member_uuid.to_string(),
        referenced_by: vec![member_uuid.to_string()],
    });
}

/// Update every existing ONLINE member's recovery credentials to
/// reference the joiner's account, so any of them may serve as donor
/// during distributed recovery (spec.md §4.4, "MySQL" stack).
pub async fn point_peers_at_joiner(
    peers: &[&InstanceSession],
    joiner_credential: &IssuedCredential,
) -> Result<()> {
    for peer in peers {
        peer.execute(&format!(
            "CHANGE REPLICATION SOURCE FOR CHANNEL 'group_replication_recovery' TO \
             SOURCE_USER = '{}', SOURCE_PASSWORD = '{}'",
            joiner_credential.user,
            joiner_credential.password()
        ))
        .await?;
    }
    Ok(())
}

/// After the joiner is ONLINE, restore each peer's recovery credentials
/// to reference that peer's own account rather than the joiner's
/// (spec.md §4.4, §4.5 PEERS_UPDATED step). A peer's original password
/// is never retained anywhere (`IssuedCredential` never leaves this
/// module), so "restore" means rotating that peer's own account on the
/// primary and repointing its channel at the freshly rotated secret.
pub async fn restore_peer_credentials(
    primary: &InstanceSession,
    peers: &[(&InstanceSession, u32)],
    host_pattern: &str,
) -> Result<()> {
    for (peer, server_id) in peers {
        let user = account_name(*server_id);
        let password = generate_password();
        primary
            .execute(&format!("ALTER USER '{user}'@'{host_pattern}' IDENTIFIED BY '{password}'"))
            .await?;
        peer.execute(&format!(
            "CHANGE REPLICATION SOURCE FOR CHANNEL 'group_replication_recovery' TO \
             SOURCE_USER = '{user}', SOURCE_PASSWORD = '{password}'"
        ))
        .await?;
    }
    Ok(())
}

/// After a successful clone, re-issue the change-source command so the
/// joiner ends up bound to its own account rather than the donor's
/// inherited `mysql.slave_master_info` (spec.md §4.4).
pub async fn rebind_after_clone(
    joiner: &InstanceSession,
    own_credential: &IssuedCredential,
) -> Result<()> {
    joiner
        .execute(&format!(
            "CHANGE REPLICATION SOURCE FOR CHANNEL 'group_replication_recovery' TO \
             SOURCE_USER = '{}', SOURCE_PASSWORD = '{}'",
            own_credential.user,
            own_credential.password()
        ))
        .await
}

/// Drop an account only if no metadata row still references it
/// (spec.md §3, §4.4 invariant). Returns `true` if the account was
/// actually dropped.
pub async fn drop_if_unreferenced(
    primary: &InstanceSession,
    tx: &mut Transaction<'_>,
    cluster_id: &str,
    account: &RecoveryAccount,
    removed_member_uuid: &str,
) -> Result<bool> {
    let remaining: Vec<&String> = account
        .referenced_by
        .iter()
        .filter(|m| m.as_str() != removed_member_uuid)
        .collect();

    if !remaining.is_empty() {
        let mut updated = account.clone();
        updated.referenced_by = remaining.into_iter().cloned().collect();
        tx.put_recovery_account(updated);
        return Ok(false);
    }

    primary
        .execute(&format!(
            "DROP USER IF EXISTS '{}'@'{}'",
            account.user, account.host_pattern
        ))
        .await?;
    tx.delete_recovery_account(cluster_id, &account.user);
    info!(target: "recovery_account", "dropped recovery account {} (no remaining references)", account.user);
    Ok(true)
}

/// Reboot-from-outage: if the cluster uses the "MySQL" stack,
/// unconditionally re-create the account, since credentials may have
/// rotated while the cluster was down (spec.md §4.4).
pub async fn recreate_unconditionally_for_reboot(
    ctx: &OperationContext,
    primary: &InstanceSession,
    server_id: u32,
    host_pattern: &str,
    stack: CommunicationStack,
) -> Result<IssuedCredential> {
    if stack != CommunicationStack::Mysql {
        ctx.note("non-MySQL communication stack: recovery account reuse is safe, skipping re-create");
    }
    let user = account_name(server_id);
    primary
        .execute(&format!("DROP USER IF EXISTS '{user}'@'{host_pattern}'"))
        .await?;
    create_on_primary(primary, server_id, host_pattern, false).await
}
