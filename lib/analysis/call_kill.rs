//! The field kill-set decision for a call statement, shared by the
//! must-alias and may-alias transfer functions. The two analyses apply the
//! decision to their own, independently computed states.

use crate::analysis::SideEffects;
use crate::ir::{CallTargets, Location, Locations};
use std::collections::BTreeSet;

/// Which tracked fields a call may rebind.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum FieldKill {
    /// Every tracked field.
    All,
    /// Every tracked field whose declaration permits external visibility.
    ExternallyVisible,
    /// Exactly these program-wide field indices.
    Fields(BTreeSet<usize>),
}

/// Decides the kill-set for a call with the given targets.
///
/// Without an oracle, any call may rebind any non-private field. With an
/// oracle, the union of the targets' write-sets is killed; any target with
/// an unknown write-set forces a kill of every field.
pub(crate) fn fields_killed_by_call(
    targets: &CallTargets,
    oracle: Option<&SideEffects>,
) -> FieldKill {
    let oracle = match oracle {
        Some(oracle) => oracle,
        None => return FieldKill::ExternallyVisible,
    };

    let targets = match targets {
        CallTargets::Resolved(targets) => targets,
        CallTargets::Unresolved => return FieldKill::All,
    };

    // a call with no resolvable targets tells us nothing
    if targets.is_empty() {
        return FieldKill::All;
    }

    let mut killed = BTreeSet::new();
    for &target in targets {
        match oracle.written_fields(target) {
            Some(fields) => killed.extend(fields.iter().cloned()),
            None => return FieldKill::All,
        }
    }
    FieldKill::Fields(killed)
}

impl FieldKill {
    /// True if the given location is a field this kill-set removes.
    /// Locals are never killed by calls.
    pub(crate) fn kills(&self, locations: &Locations, location: Location) -> bool {
        if !locations.is_field(location) {
            return false;
        }
        match self {
            FieldKill::All => true,
            FieldKill::ExternallyVisible => !locations.is_private_field(location),
            FieldKill::Fields(fields) => locations
                .field_index(location)
                .map(|field| fields.contains(&field))
                .unwrap_or(false),
        }
    }
}
