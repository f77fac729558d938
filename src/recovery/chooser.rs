//! Recovery-Method Chooser (spec.md §4.3).

use crate::error::{AdminError, Result};
use crate::gr_probe::GrProbe;
use crate::session::InstanceSession;
use crate::types::{Endpoint, GtidRelation, RecoveryMethod, RecoveryMethodPreference};

/// One candidate donor: its reachable session, endpoint, and whether the
/// target supports clone against it (computed by the caller from a
/// capability probe; kept separate from [`GrProbe`] because clone
/// support is a target-instance property, not a donor property).
pub struct Donor<'a> {
    pub endpoint: Endpoint,
    pub session: &'a InstanceSession,
}

#[derive(Debug, Clone, Copy)]
pub struct ChooserInput {
    pub preference: RecoveryMethodPreference,
    pub disable_clone: bool,
    pub gtid_set_complete: bool,
    pub joiner_supports_clone: bool,
    pub interactive: bool,
}

/// Implements the eight decision rules of spec.md §4.3 in order.
pub async fn choose_recovery_method(
    probe: &dyn GrProbe,
    joiner: &InstanceSession,
    donors: &[Donor<'_>],
    input: ChooserInput,
) -> Result<RecoveryMethod> {
    // Rule 1–3: an explicit clone request is honored (or rejected) first.
    if input.preference == RecoveryMethodPreference::Clone {
        if input.disable_clone {
            return Err(AdminError::CloneDisabled);
        }
        if !input.joiner_supports_clone {
            return Err(AdminError::CloneNoSupport);
        }
        return Ok(RecoveryMethod::Clone);
    }

    // Rule 4: errant transactions on the joiner relative to any member
    // override every preference.
    let mut relations = Vec::with_capacity(donors.len());
    for donor in donors {
        let relation = probe.check_replica_gtid_state(donor.session, joiner).await?;
        if relation == GtidRelation::Diverged {
            return Err(AdminError::DataErrantTransactions);
        }
        relations.push((donor.endpoint.clone(), relation));
    }

    let any_recoverable = relations
        .iter()
        .any(|(_, r)| matches!(r, GtidRelation::Identical | GtidRelation::Recoverable));

    // Rule 5.
    if any_recoverable
        && matches!(
            input.preference,
            RecoveryMethodPreference::Incremental | RecoveryMethodPreference::Auto
        )
    {
        return Ok(RecoveryMethod::Incremental);
    }

    let all_irrecoverable_or_new = relations
        .iter()
        .all(|(_, r)| matches!(r, GtidRelation::Irrecoverable | GtidRelation::New));

    // Rule 6.
    if all_irrecoverable_or_new && input.gtid_set_complete {
        return Ok(RecoveryMethod::Incremental);
    }

    // Rule 8: a non-auto request that contradicts the above fails rather
    // than silently upgrading, when not interactive.
    if input.preference == RecoveryMethodPreference::Incremental && !input.interactive {
        return Err(AdminError::BadArgument(
            "incremental recovery is not possible from any available member".to_string(),
        ));
    }

    // Rule 7: clone is the only remaining safe choice.
    if input.disable_clone {
        let rejected: Vec<String> = donors.iter().map(|d| d.endpoint.to_string()).collect();
        return Err(AdminError::CloneNoDonors {
            rejected_donors: rejected,
        });
    }
    if !input.joiner_supports_clone {
        return Err(AdminError::CloneNoSupport);
    }
    let non_ipv6_donor = donors.iter().any(|d| !d.endpoint.is_ipv6());
    if !non_ipv6_donor {
        let rejected: Vec<String> = donors.iter().map(|d| d.endpoint.to_string()).collect();
        return Err(AdminError::CloneNoDonors {
            rejected_donors: rejected,
        });
    }

    Ok(RecoveryMethod::Clone)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ipv6_only_donors_have_no_non_ipv6_candidate() {
        let donors = vec![
            Endpoint::new("2001:db8::1", 3306),
            Endpoint::new("2001:db8::2", 3306),
        ];
        assert!(donors.iter().all(|d| d.is_ipv6()));
    }
}
