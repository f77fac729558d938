//! Join / Rejoin / Reboot Engine: the central state machine orchestrating
//! cluster membership changes (spec.md §4.5).

pub mod join;
pub mod reboot;
pub mod rejoin;

use crate::recovery::account::IssuedCredential;
use crate::session::{InstanceSession, SysvarPersistence};
use tracing::warn;

/// `prepare -> apply -> commit` state shared by Join, Rejoin, and Reboot
/// (spec.md §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinState {
    Init,
    Checked,
    UserCreated,
    GrStarted,
    Recovering,
    MetadataWritten,
    PeersUpdated,
    Done,
}

/// What to unwind if `apply` fails partway through (spec.md §4.5:
/// "post_failure_actions").
#[derive(Debug, Default)]
pub struct PostFailureActions {
    pub created_account: Option<(String, String)>,
    pub clone_threshold_tweaked: bool,
    pub peer_credentials_modified: Vec<String>,
    /// A post-clone restart timeout must NOT drop the account: the
    /// restarted instance still needs it to authenticate (spec.md §4.5).
    pub was_post_clone_restart_timeout: bool,
}

impl PostFailureActions {
    /// Run the compensator. Errors during compensation are logged, not
    /// propagated — the original failure is what the caller sees
    /// (spec.md §7: "after compensation the original error is
    /// propagated").
    pub async fn run(
        self,
        primary: &InstanceSession,
        original_credential: Option<&IssuedCredential>,
    ) {
        if !self.was_post_clone_restart_timeout {
            if let (Some((user, host)), Some(_cred)) = (&self.created_account, original_credential) {
                if let Err(e) = primary
                    .execute(&format!("DROP USER IF EXISTS '{user}'@'{host}'"))
                    .await
                {
                    warn!(target: "engine", "compensator: failed to drop recovery account {user}: {e}");
                }
            }
        }

        if self.clone_threshold_tweaked {
            if let Err(e) = primary
                .set_sysvar(
                    "group_replication_clone_threshold",
                    "9223372036854775807",
                    SysvarPersistence::Session,
                )
                .await
            {
                warn!(target: "engine", "compensator: failed to restore clone_threshold: {e}");
            }
        }

        for peer in &self.peer_credentials_modified {
            warn!(target: "engine", "compensator: peer {peer} recovery credentials require manual rescan");
        }
    }
}

/// Apply a JoinState transition and log it (spec.md SPEC_FULL §2's
/// "one `info!` per state transition").
pub fn transition(from: JoinState, to: JoinState) {
    tracing::info!(target: "engine", "{:?} -> {:?}", from, to);
}

pub use crate::types::{CommunicationStack, RecoveryMethod, RecoveryMethodPreference};

/// Options accepted by `addInstance`/`rejoinInstance` (spec.md §6).
#[derive(Debug, Clone, typed_builder::TypedBuilder)]
pub struct JoinOptions {
    #[builder(default, setter(strip_option, into))]
    pub local_address: Option<String>,
    #[builder(default, setter(strip_option, into))]
    pub group_seeds: Option<String>,
    #[builder(default, setter(strip_option, into))]
    pub ip_allowlist: Option<String>,
    #[builder(default, setter(strip_option))]
    pub member_weight: Option<u8>,
    #[builder(default, setter(strip_option, into))]
    pub exit_state_action: Option<String>,
    #[builder(default, setter(strip_option))]
    pub auto_rejoin_tries: Option<u32>,
    #[builder(default, setter(strip_option, into))]
    pub consistency: Option<String>,
    #[builder(default, setter(strip_option))]
    pub expel_timeout: Option<u32>,
    #[builder(default)]
    pub communication_stack: Option<CommunicationStack>,
    #[builder(default)]
    pub recovery_method: RecoveryMethodPreference,
    #[builder(default)]
    pub interactive: bool,
    #[builder(default)]
    pub dry_run: bool,
}

/// Result of a Join/Rejoin operation.
#[derive(Debug, Clone)]
pub struct JoinOutcome {
    pub member_uuid: String,
    pub recovery_method: RecoveryMethod,
    pub final_state: JoinState,
}
