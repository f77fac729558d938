//! Shared enums and value types for the cluster admin engine.
//!
//! Grounded on `original_source/modules/adminapi/common/preconditions.h`
//! (`TargetType`, `ReplicationQuorum::State`, `Cluster_global_status_mask`)
//! and `cluster_types.h`.

use serde::{Deserialize, Serialize};
use std::fmt;

bitflags::bitflags! {
    /// Observed configuration state of a target instance. A bitmask so a
    /// single `Command_conditions` entry can allow several states at once.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct InstanceConfigState: u32 {
        const STANDALONE               = 0b0000_0001;
        const STANDALONE_WITH_METADATA = 0b0000_0010;
        const STANDALONE_IN_METADATA   = 0b0000_0100;
        const GROUP_REPLICATION        = 0b0000_1000;
        const ASYNC_REPLICATION        = 0b0001_0000;
        const INNODB_CLUSTER           = 0b0010_0000;
        const INNODB_CLUSTER_SET       = 0b0100_0000;
        const INNODB_CLUSTER_SET_OFFLINE = 0b1000_0000;
        const ASYNC_REPLICA_SET        = 0b1_0000_0000;
        const UNKNOWN                  = 0b10_0000_0000;
    }
}

/// Group Replication / async quorum state of the target cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuorumState {
    Any,
    Normal,
    AllOnline,
    Quorumless,
    Dead,
}

/// Action a metadata-compatibility rule takes when it matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataAction {
    RaiseError,
    Warn,
    Note,
    None,
}

/// Metadata-schema compatibility state, compared against a rule's mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetadataCompatibility {
    Compatible,
    MajorHigher,
    MajorLower,
    MinorHigher,
    MinorLower,
    PatchHigher,
    PatchLower,
    NotFound,
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ClusterGlobalStateMask: u32 {
        const OK                 = 0b0000_0001;
        const OK_NOT_REPLICATING = 0b0000_0010;
        const OK_NOT_CONSISTENT  = 0b0000_0100;
        const OK_MISCONFIGURED   = 0b0000_1000;
        const NOT_OK             = 0b0001_0000;
        const INVALIDATED        = 0b0010_0000;
        const UNKNOWN            = 0b0100_0000;
    }
}

impl ClusterGlobalStateMask {
    pub fn any() -> Self {
        Self::all()
    }
}

/// Per-instance cluster-global-status, computed by the ClusterSet
/// Coordinator (spec.md §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClusterGlobalStatus {
    Ok,
    OkNotReplicating,
    OkNotConsistent,
    OkMisconfigured,
    NotOk,
    Invalidated,
    Unknown,
}

impl ClusterGlobalStatus {
    pub fn as_mask(self) -> ClusterGlobalStateMask {
        match self {
            ClusterGlobalStatus::Ok => ClusterGlobalStateMask::OK,
            ClusterGlobalStatus::OkNotReplicating => ClusterGlobalStateMask::OK_NOT_REPLICATING,
            ClusterGlobalStatus::OkNotConsistent => ClusterGlobalStateMask::OK_NOT_CONSISTENT,
            ClusterGlobalStatus::OkMisconfigured => ClusterGlobalStateMask::OK_MISCONFIGURED,
            ClusterGlobalStatus::NotOk => ClusterGlobalStateMask::NOT_OK,
            ClusterGlobalStatus::Invalidated => ClusterGlobalStateMask::INVALIDATED,
            ClusterGlobalStatus::Unknown => ClusterGlobalStateMask::UNKNOWN,
        }
    }
}

/// Group Replication member state as reported by the GR Probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemberState {
    Online,
    Recovering,
    Offline,
    Error,
    Unreachable,
    Missing,
}

impl fmt::Display for MemberState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MemberState::Online => "ONLINE",
            MemberState::Recovering => "RECOVERING",
            MemberState::Offline => "OFFLINE",
            MemberState::Error => "ERROR",
            MemberState::Unreachable => "UNREACHABLE",
            MemberState::Missing => "MISSING",
        };
        f.write_str(s)
    }
}

/// GTID relationship of a joining/rejoining instance to a reference member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GtidRelation {
    Identical,
    Recoverable,
    Irrecoverable,
    Diverged,
    New,
}

/// Cluster topology mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TopologyMode {
    SinglePrimary,
    MultiPrimary,
}

/// Group Replication communication transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommunicationStack {
    Xcom,
    Mysql,
}

impl CommunicationStack {
    /// Minimum server version introducing the "MySQL" communication stack
    /// (spec.md §2, §4.2).
    pub fn min_version(self) -> (u32, u32, u32) {
        match self {
            CommunicationStack::Xcom => (8, 0, 0),
            CommunicationStack::Mysql => (8, 0, 27),
        }
    }
}

/// User-facing recovery method preference (spec.md §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RecoveryMethodPreference {
    #[default]
    Auto,
    Incremental,
    Clone,
}

/// Resolved recovery method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecoveryMethod {
    Incremental,
    Clone,
}

/// Minimal semantic server version used for precondition gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ServerVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl ServerVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// `host:port` endpoint identifying a MySQL instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn is_ipv6(&self) -> bool {
        self.host.contains(':') && self.host.parse::<std::net::Ipv6Addr>().is_ok()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ipv6() {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl std::str::FromStr for Endpoint {
    type Err = crate::error::AdminError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s.rsplit_once(':').ok_or_else(|| {
            crate::error::AdminError::BadArgument(format!("'{s}' is not a valid host:port"))
        })?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        let port: u16 = port
            .parse()
            .map_err(|_| crate::error::AdminError::BadArgument(format!("invalid port in '{s}'")))?;
        Ok(Endpoint::new(host, port))
    }
}
