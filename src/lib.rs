//! Cluster-lifecycle engine for MySQL Group Replication, asynchronous
//! replication, and ClusterSets.
//!
//! This crate owns the *decisions* a MySQL cluster administration tool
//! makes — which recovery method to use when a new instance joins,
//! whether a command is admissible given the cluster's current health,
//! how a ClusterSet's replica clusters should be wired together — not
//! the SQL wire protocol itself. [`session::SqlTransport`] is the seam a
//! concrete MySQL driver fills in; this crate talks to it through typed
//! [`session::InstanceSession`] handles.
//!
//! # Quick start
//!
//! ```ignore
//! use mysql_cluster_admin::context::OperationContext;
//! use mysql_cluster_admin::gr_probe::SqlGrProbe;
//! use mysql_cluster_admin::metadata::MetadataStore;
//!
//! let ctx = OperationContext::builder().from_env().build();
//! let metadata = MetadataStore::new(my_backend);
//! let probe = SqlGrProbe;
//! ```
//!
//! # Module organization
//!
//! - [`error`] — the stable [`error::AdminError`] code enum every public
//!   operation returns.
//! - [`types`] — shared enums and value types (member state, quorum
//!   state, GTID relations, communication stack).
//! - [`session`] — [`session::InstanceSession`], the pooled connection
//!   handle, and the [`session::SqlTransport`] seam.
//! - [`context`] — [`context::OperationContext`], the console/timeouts
//!   bag threaded through every operation instead of process-wide state.
//! - [`metadata`] — the transactional, cached catalog of clusters,
//!   members, recovery accounts, routers, and routing guidelines.
//! - [`precondition`] — the uniform admission gate every named operation
//!   passes through before touching state.
//! - [`gr_probe`] — read-only Group Replication state queries.
//! - [`recovery`] — the recovery-method chooser and recovery-account
//!   lifecycle manager.
//! - [`monitor`] — the supervised background task that polls
//!   distributed-recovery/clone progress.
//! - [`engine`] — the Join/Rejoin/Reboot state machines.
//! - [`clusterset`] — the ClusterSet Coordinator.
//! - [`router`] — router options and routing-guideline compatibility.
//! - [`cluster`] — the public `Cluster`/`ClusterSetHandle` operation
//!   surface.

pub mod cluster;
pub mod clusterset;
pub mod context;
pub mod engine;
pub mod error;
pub mod gr_probe;
pub mod metadata;
pub mod monitor;
pub mod precondition;
pub mod recovery;
pub mod router;
pub mod session;
pub mod types;

pub use error::{AdminError, Result};
