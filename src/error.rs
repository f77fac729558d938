//! Error types for the cluster admin engine

use thiserror::Error;

/// Stable error codes surfaced across every public operation.
///
/// Mirrors the original AdminAPI's per-call exception codes
/// (`modules/adminapi/common/errors.h`); kept as a flat enum rather than
/// free-form strings so callers can match on outcome.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdminError {
    #[error("the group has no quorum and cannot process write transactions")]
    GroupHasNoQuorum,

    #[error("no suitable donor was found for clone recovery: {rejected_donors:?}")]
    CloneNoDonors { rejected_donors: Vec<String> },

    #[error("clone recovery is not supported by the target instance")]
    CloneNoSupport,

    #[error("clone recovery is disabled on the cluster")]
    CloneDisabled,

    #[error("the target instance contains transactions that did not originate from the cluster")]
    DataErrantTransactions,

    #[error("the target instance's clone recovery failed: {0}")]
    CloneRecoveryFailed(String),

    #[error("the metadata is not compatible with this operation: {0}")]
    MetadataIncompatible(String),

    #[error("metadata row not found: {0}")]
    MetadataMissing(String),

    #[error("the cluster is fenced against write traffic")]
    ClusterFenced,

    #[error("the cluster's PRIMARY instance is not available: {0}")]
    ClusterPrimaryUnavailable(String),

    #[error("the cluster already belongs to a ClusterSet")]
    ClusterAlreadyInClusterSet,

    #[error("routing guideline '{0}' is in use and cannot be removed")]
    RoutingGuidelineInUse(String),

    #[error("routing guideline '{name}' version {version} is incompatible with router '{router}' (supports up to {supported})")]
    RoutingGuidelineInvalidVersion {
        name: String,
        version: String,
        router: String,
        supported: String,
    },

    #[error("router '{router}' does not support this feature: {feature}")]
    RouterUnsupportedFeature { router: String, feature: String },

    #[error("timed out waiting for GTID sets to converge")]
    GtidSyncTimeout,

    #[error("timed out waiting for the instance to restart")]
    ServerRestartTimeout,

    #[error("member '{0}' was invalidated and cannot be rejoined")]
    AsyncMemberInvalidated(String),

    #[error("the requested communication stack is not supported: {0}")]
    UnsupportedCommunicationProtocol(String),

    #[error("invalid argument: {0}")]
    BadArgument(String),

    #[error("instance is not managed by this cluster: {0}")]
    BadArgInstanceNotManaged(String),

    #[error("instance is already a member of another cluster or replication topology: {0}")]
    BadArgInstanceAlreadyManaged(String),

    #[error("the cluster has reached its member-count limit")]
    GroupReplicationMembersLimit,

    #[error("the cluster is ONLINE and cannot be rebooted from a complete outage")]
    ClusterNotDown,

    #[error("cluster lock could not be acquired: {0}")]
    LockContention(String),

    #[error("operation was cancelled")]
    Cancelled,

    #[error("server error (code {code}): {message}")]
    Sql { code: u16, message: String },

    #[error("connection error: {0}")]
    Connection(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("{0}")]
    Other(String),
}

impl AdminError {
    /// Transport-level errors worth a single reconnect attempt (spec.md §7):
    /// `CR_SERVER_LOST`, `CR_SERVER_GONE_ERROR`, and access-denied errors that
    /// can be retried against a fallback account.
    pub fn is_reconnectable(&self) -> bool {
        matches!(self, AdminError::Connection(_))
            || matches!(self, AdminError::Sql { code, .. } if matches!(*code, 2006 | 2013 | 1045))
    }

    pub fn is_quorum_loss(&self) -> bool {
        matches!(self, AdminError::GroupHasNoQuorum)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, AdminError::Cancelled)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, AdminError::Timeout(_))
            || matches!(self, AdminError::GtidSyncTimeout)
            || matches!(self, AdminError::ServerRestartTimeout)
    }
}

pub type Result<T> = std::result::Result<T, AdminError>;
