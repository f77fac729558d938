//! Precondition Checker: the uniform gate every operation passes through
//! before touching state (spec.md §4.1).
//!
//! Grounded on `original_source/modules/adminapi/common/preconditions.h`
//! (`Command_conditions`, `Precondition_checker::check_preconditions`).

use crate::error::{AdminError, Result};
use crate::metadata::MetadataStore;
use crate::session::InstanceSession;
use crate::types::{
    ClusterGlobalStateMask, InstanceConfigState, MetadataAction, MetadataCompatibility,
    QuorumState, ServerVersion,
};
use tracing::debug;

/// `k_min_adminapi_server_version` / `k_max_adminapi_server_version` /
/// `k_deprecated_adminapi_server_version` from the original source.
pub const MIN_SUPPORTED_VERSION: ServerVersion = ServerVersion::new(8, 0, 0);
pub const MAX_SUPPORTED_VERSION: ServerVersion = ServerVersion::new(9, 9, 9);
pub const DEPRECATED_BELOW: ServerVersion = ServerVersion::new(8, 0, 23);

/// One (compatibility-mask, action) rule, applied in declaration order;
/// the first `RaiseError` aborts (spec.md §4.1).
#[derive(Debug, Clone)]
pub struct MetadataStateRule {
    pub compatibility: Vec<MetadataCompatibility>,
    pub action: MetadataAction,
}

/// The static admission record for one named operation (spec.md §3's
/// "Command Conditions" row, §4.1's `Command_conditions`).
#[derive(Debug, Clone)]
pub struct CommandConditions {
    pub name: &'static str,
    pub min_mysql_version: ServerVersion,
    pub instance_config_state: InstanceConfigState,
    pub quorum_state: QuorumState,
    pub metadata_states: Vec<MetadataStateRule>,
    pub primary_required: bool,
    pub cluster_global_state: ClusterGlobalStateMask,
    pub allowed_on_fenced: bool,
}

impl CommandConditions {
    pub fn builder(name: &'static str) -> CommandConditionsBuilder {
        CommandConditionsBuilder {
            conds: CommandConditions {
                name,
                min_mysql_version: MIN_SUPPORTED_VERSION,
                instance_config_state: InstanceConfigState::empty(),
                quorum_state: QuorumState::Any,
                metadata_states: Vec::new(),
                primary_required: true,
                cluster_global_state: ClusterGlobalStateMask::any(),
                allowed_on_fenced: false,
            },
        }
    }
}

pub struct CommandConditionsBuilder {
    conds: CommandConditions,
}

impl CommandConditionsBuilder {
    pub fn min_mysql_version(mut self, v: ServerVersion) -> Self {
        self.conds.min_mysql_version = v;
        self
    }

    pub fn target_instance(mut self, states: InstanceConfigState) -> Self {
        self.conds.instance_config_state = states;
        self
    }

    pub fn quorum_state(mut self, state: QuorumState) -> Self {
        self.conds.quorum_state = state;
        self
    }

    pub fn compatibility_check(mut self, rule: MetadataStateRule) -> Self {
        self.conds.metadata_states.push(rule);
        self
    }

    pub fn primary_required(mut self, required: bool) -> Self {
        self.conds.primary_required = required;
        self
    }

    pub fn cluster_global_status(mut self, mask: ClusterGlobalStateMask) -> Self {
        self.conds.cluster_global_state = mask;
        self
    }

    pub fn allowed_on_fenced(mut self, allowed: bool) -> Self {
        self.conds.allowed_on_fenced = allowed;
        self
    }

    pub fn build(self) -> CommandConditions {
        self.conds
    }
}

/// Observed state fed into the checker by the caller, equivalent to the
/// original source probing GR state / metadata membership right before
/// evaluating each rule.
#[derive(Debug, Clone)]
pub struct ObservedState {
    pub server_version: ServerVersion,
    pub instance_config_state: InstanceConfigState,
    pub metadata_compatibility: MetadataCompatibility,
    pub quorum_state: QuorumState,
    pub primary_available: bool,
    pub cluster_global_status: Option<crate::types::ClusterGlobalStatus>,
    pub fenced: bool,
}

/// The gate itself. Construction takes the metadata handle and an
/// optional session to any reachable "group server" the way the original
/// `Precondition_checker` takes a `MetadataStorage` + `Instance` pair.
pub struct PreconditionChecker<'a> {
    pub metadata: &'a MetadataStore,
    pub group_server: Option<&'a InstanceSession>,
}

impl<'a> PreconditionChecker<'a> {
    pub fn new(metadata: &'a MetadataStore, group_server: Option<&'a InstanceSession>) -> Self {
        Self {
            metadata,
            group_server,
        }
    }

    /// Steps 1–2 of spec.md §4.1: validate/ open the session and
    /// invalidate the cached metadata view.
    pub fn check_session(&self, observed: &ObservedState) -> Result<()> {
        if self.group_server.is_none() {
            return Err(AdminError::Connection(
                "no session open to the metadata server".to_string(),
            ));
        }
        if observed.server_version < MIN_SUPPORTED_VERSION
            || observed.server_version > MAX_SUPPORTED_VERSION
        {
            return Err(AdminError::BadArgument(format!(
                "server version {} is not supported (requires {}..={})",
                observed.server_version, MIN_SUPPORTED_VERSION, MAX_SUPPORTED_VERSION
            )));
        }
        self.metadata.invalidate_cache();
        Ok(())
    }

    /// The full eight-step algorithm of spec.md §4.1.
    pub fn check(&self, conds: &CommandConditions, observed: &ObservedState) -> Result<()> {
        debug!(target: "precondition", "checking preconditions for '{}'", conds.name);

        // 1–2: session + cache invalidation.
        self.check_session(observed)?;

        // 3: metadata_states rules, in order; first RaiseError aborts.
        let mut effective = MetadataAction::None;
        for rule in &conds.metadata_states {
            if rule.compatibility.contains(&observed.metadata_compatibility) {
                effective = rule.action;
                if effective == MetadataAction::RaiseError {
                    return Err(AdminError::MetadataIncompatible(format!(
                        "metadata state {:?} is not compatible with '{}'",
                        observed.metadata_compatibility, conds.name
                    )));
                }
            }
        }
        match effective {
            MetadataAction::Warn => tracing::warn!(
                target: "precondition",
                "metadata state {:?} is deprecated for '{}'",
                observed.metadata_compatibility,
                conds.name
            ),
            MetadataAction::Note => tracing::info!(
                target: "precondition",
                "metadata state {:?} noted for '{}'",
                observed.metadata_compatibility,
                conds.name
            ),
            _ => {}
        }

        // 4: min_mysql_version.
        if observed.server_version < conds.min_mysql_version {
            return Err(AdminError::BadArgument(format!(
                "'{}' requires MySQL {} or newer, instance reports {}",
                conds.name, conds.min_mysql_version, observed.server_version
            )));
        }

        // 5: instance_config_state.
        if !conds.instance_config_state.is_empty()
            && !conds
                .instance_config_state
                .intersects(observed.instance_config_state)
        {
            return Err(AdminError::BadArgInstanceNotManaged(format!(
                "'{}' is not allowed on an instance in state {:?}",
                conds.name, observed.instance_config_state
            )));
        }

        // 6: primary_required.
        if conds.primary_required && !observed.primary_available {
            if observed.quorum_state == QuorumState::Dead
                || observed.quorum_state == QuorumState::Quorumless
            {
                return Err(AdminError::GroupHasNoQuorum);
            }
            return Err(AdminError::ClusterPrimaryUnavailable(conds.name.to_string()));
        }

        // 7: quorum_state.
        if conds.quorum_state != QuorumState::Any && conds.quorum_state != observed.quorum_state {
            return Err(AdminError::GroupHasNoQuorum);
        }

        // 8: cluster_global_state, only when the cluster is in a ClusterSet.
        if let Some(status) = observed.cluster_global_status {
            if !conds.cluster_global_state.intersects(status.as_mask()) {
                return Err(AdminError::ClusterPrimaryUnavailable(format!(
                    "cluster-global-status {:?} does not admit '{}'",
                    status, conds.name
                )));
            }
        }

        // 9: fenced-to-writes.
        if observed.fenced && !conds.allowed_on_fenced {
            return Err(AdminError::ClusterFenced);
        }

        Ok(())
    }
}

/// Named operations and their static admission records (spec.md §3's
/// Command Conditions table, §6's operation table).
pub mod commands {
    use super::*;
    use crate::types::MetadataCompatibility as MC;

    fn deprecated_warns() -> MetadataStateRule {
        MetadataStateRule {
            compatibility: vec![MC::MinorLower, MC::PatchLower],
            action: MetadataAction::Warn,
        }
    }

    fn incompatible_errors() -> MetadataStateRule {
        MetadataStateRule {
            compatibility: vec![MC::MajorHigher, MC::MajorLower, MC::NotFound],
            action: MetadataAction::RaiseError,
        }
    }

    pub fn bootstrap() -> CommandConditions {
        CommandConditions::builder("bootstrap")
            .target_instance(
                InstanceConfigState::STANDALONE | InstanceConfigState::STANDALONE_WITH_METADATA,
            )
            .primary_required(false)
            .quorum_state(QuorumState::Any)
            .build()
    }

    pub fn add_instance() -> CommandConditions {
        CommandConditions::builder("addInstance")
            .target_instance(InstanceConfigState::INNODB_CLUSTER)
            .compatibility_check(incompatible_errors())
            .compatibility_check(deprecated_warns())
            .quorum_state(QuorumState::Normal)
            .primary_required(true)
            .build()
    }

    pub fn rejoin_instance() -> CommandConditions {
        CommandConditions::builder("rejoinInstance")
            .target_instance(InstanceConfigState::INNODB_CLUSTER)
            .compatibility_check(incompatible_errors())
            .quorum_state(QuorumState::Normal)
            .primary_required(true)
            .build()
    }

    pub fn remove_instance() -> CommandConditions {
        CommandConditions::builder("removeInstance")
            .target_instance(InstanceConfigState::INNODB_CLUSTER)
            .compatibility_check(incompatible_errors())
            .quorum_state(QuorumState::Normal)
            .primary_required(true)
            .build()
    }

    pub fn reboot_cluster_from_complete_outage() -> CommandConditions {
        CommandConditions::builder("rebootClusterFromCompleteOutage")
            .target_instance(
                InstanceConfigState::STANDALONE_IN_METADATA | InstanceConfigState::GROUP_REPLICATION,
            )
            .compatibility_check(incompatible_errors())
            .quorum_state(QuorumState::Any)
            .primary_required(false)
            .cluster_global_status(ClusterGlobalStateMask::all())
            .build()
    }

    pub fn set_primary_instance() -> CommandConditions {
        CommandConditions::builder("setPrimaryInstance")
            .target_instance(InstanceConfigState::INNODB_CLUSTER)
            .compatibility_check(incompatible_errors())
            .quorum_state(QuorumState::Normal)
            .primary_required(true)
            .build()
    }

    pub fn set_option() -> CommandConditions {
        CommandConditions::builder("setOption")
            .target_instance(InstanceConfigState::INNODB_CLUSTER)
            .compatibility_check(incompatible_errors())
            .quorum_state(QuorumState::Normal)
            .primary_required(true)
            .build()
    }

    pub fn set_instance_option() -> CommandConditions {
        CommandConditions::builder("setInstanceOption")
            .target_instance(InstanceConfigState::INNODB_CLUSTER)
            .compatibility_check(incompatible_errors())
            .quorum_state(QuorumState::Normal)
            .primary_required(true)
            .build()
    }

    pub fn set_routing_option() -> CommandConditions {
        CommandConditions::builder("setRoutingOption")
            .target_instance(InstanceConfigState::INNODB_CLUSTER | InstanceConfigState::INNODB_CLUSTER_SET)
            .compatibility_check(incompatible_errors())
            .quorum_state(QuorumState::Any)
            .primary_required(false)
            .allowed_on_fenced(true)
            .build()
    }

    pub fn create_replica_cluster() -> CommandConditions {
        CommandConditions::builder("createReplicaCluster")
            .target_instance(InstanceConfigState::INNODB_CLUSTER_SET)
            .compatibility_check(incompatible_errors())
            .quorum_state(QuorumState::Normal)
            .primary_required(true)
            .cluster_global_status(ClusterGlobalStateMask::OK)
            .build()
    }

    /// A cluster invalidated by a `forcePrimaryCluster` promotion, or one
    /// that was detached by `removeCluster`, can be reattached once it is
    /// reachable again; the ClusterSet itself only needs its primary up.
    pub fn rejoin_cluster() -> CommandConditions {
        CommandConditions::builder("rejoinCluster")
            .target_instance(InstanceConfigState::INNODB_CLUSTER_SET)
            .compatibility_check(incompatible_errors())
            .quorum_state(QuorumState::Normal)
            .primary_required(true)
            .cluster_global_status(ClusterGlobalStateMask::all())
            .build()
    }

    pub fn remove_cluster() -> CommandConditions {
        CommandConditions::builder("removeCluster")
            .target_instance(InstanceConfigState::INNODB_CLUSTER_SET)
            .compatibility_check(incompatible_errors())
            .quorum_state(QuorumState::Normal)
            .primary_required(true)
            .cluster_global_status(
                ClusterGlobalStateMask::OK
                    | ClusterGlobalStateMask::OK_NOT_REPLICATING
                    | ClusterGlobalStateMask::NOT_OK,
            )
            .build()
    }

    pub fn set_primary_cluster() -> CommandConditions {
        CommandConditions::builder("setPrimaryCluster")
            .target_instance(InstanceConfigState::INNODB_CLUSTER_SET)
            .compatibility_check(incompatible_errors())
            .quorum_state(QuorumState::Normal)
            .primary_required(true)
            .cluster_global_status(ClusterGlobalStateMask::OK)
            .build()
    }

    pub fn force_primary_cluster() -> CommandConditions {
        CommandConditions::builder("forcePrimaryCluster")
            .target_instance(InstanceConfigState::INNODB_CLUSTER_SET)
            .compatibility_check(incompatible_errors())
            .quorum_state(QuorumState::Any)
            .primary_required(false)
            .cluster_global_status(ClusterGlobalStateMask::all())
            .build()
    }

    pub fn fence_all_traffic() -> CommandConditions {
        CommandConditions::builder("fenceAllTraffic")
            .target_instance(InstanceConfigState::INNODB_CLUSTER_SET)
            .quorum_state(QuorumState::Normal)
            .primary_required(true)
            .allowed_on_fenced(true)
            .build()
    }

    pub fn fence_writes() -> CommandConditions {
        CommandConditions::builder("fenceWrites")
            .target_instance(InstanceConfigState::INNODB_CLUSTER_SET)
            .quorum_state(QuorumState::Normal)
            .primary_required(true)
            .allowed_on_fenced(true)
            .build()
    }

    pub fn unfence_writes() -> CommandConditions {
        CommandConditions::builder("unfenceWrites")
            .target_instance(InstanceConfigState::INNODB_CLUSTER_SET)
            .quorum_state(QuorumState::Normal)
            .primary_required(true)
            .allowed_on_fenced(true)
            .build()
    }
}
