//! GR Probe: read-only, idempotent queries over an Instance Session that
//! report a member's Group Replication state (spec.md §4.2).

use crate::error::Result;
use crate::session::{parse_server_version, InstanceSession, SysvarPersistence};
use crate::types::{CommunicationStack, Endpoint, GtidRelation, MemberState, ServerVersion};
use async_trait::async_trait;

/// Abstraction over the GR Probe so the Join/Rejoin/Reboot Engine and
/// tests can substitute a scripted implementation.
#[async_trait]
pub trait GrProbe: Send + Sync {
    async fn member_state(&self, session: &InstanceSession) -> Result<MemberState>;
    async fn installed_schema_version(&self, session: &InstanceSession) -> Result<ServerVersion>;
    async fn gtid_total_set(&self, session: &InstanceSession, known_channels: &[String]) -> Result<String>;
    async fn check_replica_gtid_state(
        &self,
        source: &InstanceSession,
        replica: &InstanceSession,
    ) -> Result<GtidRelation>;
    async fn is_running_auto_rejoin(&self, session: &InstanceSession) -> Result<bool>;
}

/// Policy helper: IPv6 local-addresses require ≥ 8.0.14; the "MySQL"
/// communication stack requires ≥ 8.0.27 (spec.md §4.2).
pub fn endpoint_supported_by_gr(
    address: &Endpoint,
    version: ServerVersion,
    stack: CommunicationStack,
) -> bool {
    if address.is_ipv6() && version < ServerVersion::new(8, 0, 14) {
        return false;
    }
    let (maj, min, patch) = stack.min_version();
    version >= ServerVersion::new(maj, min, patch)
}

/// Default implementation driving GR's `performance_schema` views over a
/// real [`InstanceSession`] (spec.md §6's read surface).
pub struct SqlGrProbe;

#[async_trait]
impl GrProbe for SqlGrProbe {
    async fn member_state(&self, session: &InstanceSession) -> Result<MemberState> {
        let rows = session
            .query(
                "SELECT MEMBER_STATE FROM performance_schema.replication_group_members \
                 WHERE MEMBER_ID = @@GLOBAL.server_uuid",
            )
            .await;
        let rows = match rows {
            Ok(r) => r,
            Err(e) if e.is_reconnectable() => return Ok(MemberState::Unreachable),
            Err(e) => return Err(e),
        };
        let Some(row) = rows.first() else {
            return Ok(MemberState::Missing);
        };
        let state = row
            .get("MEMBER_STATE")
            .and_then(|v| v.as_str())
            .unwrap_or("");
        Ok(match state {
            "ONLINE" => MemberState::Online,
            "RECOVERING" => MemberState::Recovering,
            "OFFLINE" => MemberState::Offline,
            "ERROR" => MemberState::Error,
            _ => MemberState::Missing,
        })
    }

    async fn installed_schema_version(&self, session: &InstanceSession) -> Result<ServerVersion> {
        let raw = session.get_sysvar("version").await?;
        parse_server_version(&raw)
    }

    async fn gtid_total_set(&self, session: &InstanceSession, known_channels: &[String]) -> Result<String> {
        let _ = known_channels;
        session.get_sysvar("gtid_executed").await
    }

    async fn check_replica_gtid_state(
        &self,
        source: &InstanceSession,
        replica: &InstanceSession,
    ) -> Result<GtidRelation> {
        let source_gtid = self.gtid_total_set(source, &[]).await?;
        let replica_gtid = self.gtid_total_set(replica, &[]).await?;

        if source_gtid == replica_gtid {
            return Ok(GtidRelation::Identical);
        }
        if replica_gtid.is_empty() {
            return Ok(GtidRelation::New);
        }

        let rows = replica
            .query(&format!(
                "SELECT GTID_SUBTRACT('{replica_gtid}', '{source_gtid}') AS errant, \
                 GTID_SUBTRACT('{source_gtid}', @@GLOBAL.gtid_purged) AS missing_from_replica"
            ))
            .await?;
        let row = rows.first();
        let errant = row
            .and_then(|r| r.get("errant"))
            .and_then(|v| v.as_str())
            .unwrap_or("");
        if !errant.is_empty() {
            return Ok(GtidRelation::Diverged);
        }

        let purged = replica.get_sysvar("gtid_purged").await.unwrap_or_default();
        let rows = replica
            .query(&format!(
                "SELECT GTID_SUBTRACT('{source_gtid}', '{purged}') AS needed, \
                 GTID_SUBTRACT(GTID_SUBTRACT('{source_gtid}', '{purged}'), '{replica_gtid}') AS still_needed"
            ))
            .await?;
        let still_needed = rows
            .first()
            .and_then(|r| r.get("still_needed"))
            .and_then(|v| v.as_str())
            .unwrap_or("");
        if still_needed.is_empty() {
            Ok(GtidRelation::Recoverable)
        } else {
            Ok(GtidRelation::Irrecoverable)
        }
    }

    async fn is_running_auto_rejoin(&self, session: &InstanceSession) -> Result<bool> {
        let rows = session
            .query(
                "SELECT COUNT(*) AS n FROM performance_schema.threads \
                 WHERE NAME = 'thread/group_rpl/THD_autorejoin'",
            )
            .await?;
        Ok(rows
            .first()
            .and_then(|r| r.get("n"))
            .and_then(|v| v.as_u64())
            .unwrap_or(0)
            > 0)
    }
}

/// Helper used by the Join/Rejoin Engine to disable/enable auto-rejoin
/// via `group_replication_start_on_boot` and a direct `STOP
/// GROUP_REPLICATION`, grounded on `cluster_join.cc`'s cancellation of a
/// running auto-rejoin before a manual join.
pub async fn cancel_auto_rejoin(session: &InstanceSession) -> Result<()> {
    session.execute("STOP GROUP_REPLICATION").await?;
    session
        .set_sysvar("group_replication_start_on_boot", "OFF", SysvarPersistence::Persist)
        .await
}
