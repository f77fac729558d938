//! Metadata catalog row types (spec.md §3).

use crate::types::{CommunicationStack, Endpoint, TopologyMode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClusterSetRole {
    Primary,
    Replica,
    Invalidated,
    /// Not a member of any ClusterSet.
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    pub id: String,
    pub name: String,
    pub topology_mode: TopologyMode,
    pub communication_stack: CommunicationStack,
    pub group_name: String,
    pub view_change_uuid: String,
    pub gtid_set_complete: bool,
    pub disable_clone: bool,
    pub tags: BTreeMap<String, serde_json::Value>,
    pub cluster_set_id: Option<String>,
    pub cluster_set_role: ClusterSetRole,
    pub remove_pending: bool,
    pub fenced: bool,
    pub created_at: String,
    pub last_changed_time: String,

    #[serde(flatten)]
    pub extra: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    pub uuid: String,
    pub cluster_id: String,
    pub endpoint: Endpoint,
    pub label: String,
    pub server_id: u32,
    pub local_address: String,
    pub recovery_account: Option<String>,
    pub cert_subject: Option<String>,
    pub join_timestamp: String,

    #[serde(flatten)]
    pub extra: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryAccount {
    pub user: String,
    pub host_pattern: String,
    /// Opaque credential handle — the engine never logs or serializes the
    /// raw secret (grounded on the teacher never logging `password`
    /// fields in `client.rs`'s `trace!` request bodies).
    pub credential_ref: String,
    pub owning_member_uuid: String,
    /// Other member uuids currently referencing this account (clone donor
    /// case, spec.md §3/§4.4).
    pub referenced_by: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterSet {
    pub id: String,
    pub domain_name: String,
    pub primary_cluster_id: String,
    pub auth_type: String,
    pub cert_issuer: Option<String>,
    pub ssl_mode: String,
    pub replication_allowed_host: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Router {
    pub hostname: String,
    pub name: String,
    pub version: String,
    pub supported_guideline_version: String,
    pub last_check_in: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutingOptions {
    pub global: BTreeMap<String, serde_json::Value>,
    pub per_router: BTreeMap<String, BTreeMap<String, serde_json::Value>>,
    pub active_guideline: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingGuideline {
    pub name: String,
    pub cluster_set_id: String,
    pub version: String,
    pub document: serde_json::Value,
}
