//! Common test utilities: a scripted [`MockTransport`] standing in for
//! the out-of-scope MySQL wire client, and a scripted
//! [`MockMetadataBackend`] standing in for the real metadata schema.
#![allow(dead_code)]

use async_trait::async_trait;
use mysql_cluster_admin::error::{AdminError, Result};
use mysql_cluster_admin::gr_probe::GrProbe;
use mysql_cluster_admin::metadata::model::{Cluster, ClusterSet, Member, RecoveryAccount, RoutingGuideline, RoutingOptions, Router};
use mysql_cluster_admin::metadata::MetadataBackend;
use mysql_cluster_admin::session::{InstanceSession, Row, SqlConnection, SqlTransport};
use mysql_cluster_admin::types::{Endpoint, GtidRelation, MemberState, ServerVersion};
use std::collections::HashMap;
use std::sync::Mutex;

/// A scripted response to one exact query/execute string. Real driver
/// round-trips are out of scope (spec.md §1); tests only need
/// deterministic stand-ins.
#[derive(Clone)]
pub enum Scripted {
    Rows(Vec<Row>),
    Affected(u64),
    Error(AdminError),
}

#[derive(Default)]
pub struct MockConnection {
    pub responses: HashMap<String, Scripted>,
    pub calls: Vec<String>,
    pub alive: bool,
}

impl MockConnection {
    pub fn new() -> Self {
        Self {
            responses: HashMap::new(),
            calls: Vec::new(),
            alive: true,
        }
    }

    pub fn on(mut self, sql: impl Into<String>, response: Scripted) -> Self {
        self.responses.insert(sql.into(), response);
        self
    }
}

#[async_trait]
impl SqlConnection for MockConnection {
    async fn query(&mut self, sql: &str) -> Result<Vec<Row>> {
        self.calls.push(sql.to_string());
        match self.responses.get(sql) {
            Some(Scripted::Rows(rows)) => Ok(rows.clone()),
            Some(Scripted::Error(e)) => Err(e.clone()),
            Some(Scripted::Affected(_)) | None => Ok(Vec::new()),
        }
    }

    async fn execute(&mut self, sql: &str) -> Result<u64> {
        self.calls.push(sql.to_string());
        match self.responses.get(sql) {
            Some(Scripted::Affected(n)) => Ok(*n),
            Some(Scripted::Error(e)) => Err(e.clone()),
            _ => Ok(1),
        }
    }

    async fn is_alive(&mut self) -> bool {
        self.alive
    }
}

/// A transport that hands out one pre-scripted [`MockConnection`] per
/// endpoint, recording which endpoints were dialed.
pub struct MockTransport {
    connections: Mutex<HashMap<String, MockConnection>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_connection(self, endpoint: &Endpoint, conn: MockConnection) -> Self {
        self.connections.lock().unwrap().insert(endpoint.to_string(), conn);
        self
    }
}

#[async_trait]
impl SqlTransport for MockTransport {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn SqlConnection>> {
        let conn = self
            .connections
            .lock()
            .unwrap()
            .remove(&endpoint.to_string())
            .unwrap_or_default();
        Ok(Box::new(conn))
    }
}

/// In-memory [`MetadataBackend`] for exercising [`MetadataStore`]
/// caching/transaction semantics without a real schema.
#[derive(Default)]
pub struct MockMetadataBackend {
    pub clusters: Mutex<HashMap<String, Cluster>>,
    pub members: Mutex<HashMap<String, Vec<Member>>>,
    pub recovery_accounts: Mutex<HashMap<String, Vec<RecoveryAccount>>>,
    pub cluster_sets: Mutex<HashMap<String, ClusterSet>>,
    pub routers: Mutex<HashMap<String, Vec<Router>>>,
    pub routing_options: Mutex<HashMap<String, RoutingOptions>>,
    pub routing_guidelines: Mutex<HashMap<String, Vec<RoutingGuideline>>>,
}

#[async_trait]
impl MetadataBackend for MockMetadataBackend {
    async fn load_cluster(&self, cluster_id: &str) -> Result<Option<Cluster>> {
        Ok(self.clusters.lock().unwrap().get(cluster_id).cloned())
    }

    async fn load_cluster_by_name(&self, name: &str) -> Result<Option<Cluster>> {
        Ok(self.clusters.lock().unwrap().values().find(|c| c.name == name).cloned())
    }

    async fn load_members(&self, cluster_id: &str) -> Result<Vec<Member>> {
        Ok(self.members.lock().unwrap().get(cluster_id).cloned().unwrap_or_default())
    }

    async fn load_recovery_accounts(&self, cluster_id: &str) -> Result<Vec<RecoveryAccount>> {
        Ok(self.recovery_accounts.lock().unwrap().get(cluster_id).cloned().unwrap_or_default())
    }

    async fn load_cluster_set(&self, cluster_set_id: &str) -> Result<Option<ClusterSet>> {
        Ok(self.cluster_sets.lock().unwrap().get(cluster_set_id).cloned())
    }

    async fn load_routers(&self, cluster_id: &str) -> Result<Vec<Router>> {
        Ok(self.routers.lock().unwrap().get(cluster_id).cloned().unwrap_or_default())
    }

    async fn load_routing_options(&self, cluster_id: &str) -> Result<RoutingOptions> {
        Ok(self.routing_options.lock().unwrap().get(cluster_id).cloned().unwrap_or_default())
    }

    async fn load_routing_guidelines(&self, cluster_set_id: &str) -> Result<Vec<RoutingGuideline>> {
        Ok(self.routing_guidelines.lock().unwrap().get(cluster_set_id).cloned().unwrap_or_default())
    }

    async fn save_cluster(&self, cluster: &Cluster) -> Result<()> {
        self.clusters.lock().unwrap().insert(cluster.id.clone(), cluster.clone());
        Ok(())
    }

    async fn save_member(&self, member: &Member) -> Result<()> {
        let mut members = self.members.lock().unwrap();
        let entry = members.entry(member.cluster_id.clone()).or_default();
        entry.retain(|m| m.uuid != member.uuid);
        entry.push(member.clone());
        Ok(())
    }

    async fn delete_member(&self, cluster_id: &str, uuid: &str) -> Result<()> {
        if let Some(entry) = self.members.lock().unwrap().get_mut(cluster_id) {
            entry.retain(|m| m.uuid != uuid);
        }
        Ok(())
    }

    async fn save_recovery_account(&self, account: &RecoveryAccount) -> Result<()> {
        let mut accounts = self.recovery_accounts.lock().unwrap();
        let entry = accounts.entry(account.owning_member_uuid.clone()).or_default();
        entry.retain(|a| a.user != account.user);
        entry.push(account.clone());
        Ok(())
    }

    async fn delete_recovery_account(&self, cluster_id: &str, user: &str) -> Result<()> {
        if let Some(entry) = self.recovery_accounts.lock().unwrap().get_mut(cluster_id) {
            entry.retain(|a| a.user != user);
        }
        Ok(())
    }

    async fn save_cluster_set(&self, cluster_set: &ClusterSet) -> Result<()> {
        self.cluster_sets.lock().unwrap().insert(cluster_set.id.clone(), cluster_set.clone());
        Ok(())
    }

    async fn save_router(&self, cluster_id: &str, router: &Router) -> Result<()> {
        let entry = self.routers.lock().unwrap().entry(cluster_id.to_string()).or_default().clone();
        let mut entry = entry;
        entry.retain(|r| r.hostname != router.hostname);
        entry.push(router.clone());
        self.routers.lock().unwrap().insert(cluster_id.to_string(), entry);
        Ok(())
    }

    async fn delete_router(&self, cluster_id: &str, hostname: &str) -> Result<()> {
        if let Some(entry) = self.routers.lock().unwrap().get_mut(cluster_id) {
            entry.retain(|r| r.hostname != hostname);
        }
        Ok(())
    }

    async fn save_routing_options(&self, cluster_id: &str, options: &RoutingOptions) -> Result<()> {
        self.routing_options.lock().unwrap().insert(cluster_id.to_string(), options.clone());
        Ok(())
    }

    async fn save_routing_guideline(&self, guideline: &RoutingGuideline) -> Result<()> {
        let entry = self
            .routing_guidelines
            .lock()
            .unwrap()
            .entry(guideline.cluster_set_id.clone())
            .or_default()
            .clone();
        let mut entry = entry;
        entry.retain(|g| g.name != guideline.name);
        entry.push(guideline.clone());
        self.routing_guidelines.lock().unwrap().insert(guideline.cluster_set_id.clone(), entry);
        Ok(())
    }

    async fn delete_routing_guideline(&self, cluster_set_id: &str, name: &str) -> Result<()> {
        if let Some(entry) = self.routing_guidelines.lock().unwrap().get_mut(cluster_set_id) {
            entry.retain(|g| g.name != name);
        }
        Ok(())
    }
}

/// A [`GrProbe`] whose answers are fixed per-endpoint ahead of time, so
/// engine-level tests can drive the Join/Rejoin/Reboot state machines
/// without a real Group Replication deployment.
#[derive(Default)]
pub struct ScriptedProbe {
    pub member_states: HashMap<String, MemberState>,
    pub versions: HashMap<String, ServerVersion>,
    pub gtid_sets: HashMap<String, String>,
    pub replica_relations: HashMap<(String, String), GtidRelation>,
    pub auto_rejoin_running: HashMap<String, bool>,
}

impl ScriptedProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(mut self, endpoint: &Endpoint, state: MemberState) -> Self {
        self.member_states.insert(endpoint.to_string(), state);
        self
    }

    pub fn with_version(mut self, endpoint: &Endpoint, version: ServerVersion) -> Self {
        self.versions.insert(endpoint.to_string(), version);
        self
    }

    pub fn with_gtid(mut self, endpoint: &Endpoint, gtid: impl Into<String>) -> Self {
        self.gtid_sets.insert(endpoint.to_string(), gtid.into());
        self
    }
}

#[async_trait]
impl GrProbe for ScriptedProbe {
    async fn member_state(&self, session: &InstanceSession) -> Result<MemberState> {
        Ok(self
            .member_states
            .get(&session.endpoint().to_string())
            .copied()
            .unwrap_or(MemberState::Missing))
    }

    async fn installed_schema_version(&self, session: &InstanceSession) -> Result<ServerVersion> {
        Ok(self
            .versions
            .get(&session.endpoint().to_string())
            .copied()
            .unwrap_or_else(|| ServerVersion::new(8, 0, 34)))
    }

    async fn gtid_total_set(&self, session: &InstanceSession, _known_channels: &[String]) -> Result<String> {
        Ok(self.gtid_sets.get(&session.endpoint().to_string()).cloned().unwrap_or_default())
    }

    async fn check_replica_gtid_state(&self, source: &InstanceSession, replica: &InstanceSession) -> Result<GtidRelation> {
        let key = (source.endpoint().to_string(), replica.endpoint().to_string());
        Ok(self.replica_relations.get(&key).copied().unwrap_or(GtidRelation::Identical))
    }

    async fn is_running_auto_rejoin(&self, session: &InstanceSession) -> Result<bool> {
        Ok(self.auto_rejoin_running.get(&session.endpoint().to_string()).copied().unwrap_or(false))
    }
}
