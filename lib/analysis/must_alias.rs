//! Must-alias analysis: a forward fixed point whose state is a partition
//! of locations into groups guaranteed to denote the same object.
//!
//! The state keeps one group id per location; "same alias set" means "same
//! group id." A location with no group has no information, which for a
//! must-analysis is the same as "aliases nothing but itself." Merging at a
//! join intersects the partitions: a pair of locations stays aliased only
//! when both incoming branches agree, and a location absent on either side
//! is killed, since a must-claim cannot survive uncertainty.

use crate::analysis::call_kill;
use crate::analysis::fixed_point::{fixed_point, Direction, FixedPointAnalysis, FlowResult};
use crate::analysis::SideEffects;
use crate::ir::{Location, Operation, Procedure, Rvalue, Statement};
use crate::Error;
use log::debug;
use std::collections::{BTreeMap, BTreeSet};

/// Compute must-alias information for the given procedure.
///
/// `oracle` is an optional side-effect analysis result; with it, calls
/// kill only the fields their targets may write. Without it, every call
/// kills every externally visible field.
pub fn must_alias(
    procedure: &Procedure,
    oracle: Option<&SideEffects>,
) -> Result<MustAlias, Error> {
    procedure.validate()?;
    let entry = procedure.control_flow_graph().entry().ok_or(Error::NoEntry)?;

    let analysis = MustAliasAnalysis { procedure, oracle };
    let flow = fixed_point(&analysis, procedure.control_flow_graph().graph(), &[entry])?;

    debug!(
        "must_alias: {} locations over {} statements",
        procedure.locations().len(),
        procedure.control_flow_graph().statements().len()
    );

    Ok(MustAlias { flow })
}

/// The result of a must-alias analysis over one procedure.
pub struct MustAlias {
    flow: FlowResult<MustState>,
}

impl MustAlias {
    /// The locations guaranteed to denote the same object as `location`
    /// immediately before the given statement. The location itself is not
    /// included. An empty set means nothing is known.
    pub fn aliases_before(&self, location: Location, statement: usize) -> BTreeSet<Location> {
        Self::aliases(self.flow.before(statement), location)
    }

    /// The locations guaranteed to denote the same object as `location`
    /// immediately after the given statement.
    pub fn aliases_after(&self, location: Location, statement: usize) -> BTreeSet<Location> {
        Self::aliases(self.flow.after(statement), location)
    }

    fn aliases(state: Option<&MustState>, location: Location) -> BTreeSet<Location> {
        state
            .map(|state| state.aliases_of(location.index()))
            .unwrap_or_default()
            .into_iter()
            .map(Location)
            .collect()
    }
}

/// The flow state: one optional group id per location index. States are
/// kept normalized (no singleton groups, ids issued in first-occurrence
/// order), so derived equality is lattice equality.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct MustState {
    groups: Vec<Option<u32>>,
}

impl MustState {
    pub(crate) fn new(locations: usize) -> MustState {
        MustState {
            groups: vec![None; locations],
        }
    }

    pub(crate) fn kill(&mut self, location: usize) {
        self.groups[location] = None;
    }

    /// Places `dst` in the same group as `src`, opening a fresh group if
    /// `src` has none. After this, the two locations must-alias.
    pub(crate) fn alias(&mut self, dst: usize, src: usize) {
        let group = match self.groups[src] {
            Some(group) => group,
            None => {
                let fresh = self.fresh_group();
                self.groups[src] = Some(fresh);
                fresh
            }
        };
        self.groups[dst] = Some(group);
    }

    fn fresh_group(&self) -> u32 {
        self.groups
            .iter()
            .flatten()
            .max()
            .map(|group| group + 1)
            .unwrap_or(0)
    }

    /// Every other location sharing `location`'s group.
    pub(crate) fn aliases_of(&self, location: usize) -> BTreeSet<usize> {
        let group = match self.groups.get(location) {
            Some(Some(group)) => *group,
            _ => return BTreeSet::new(),
        };
        self.groups
            .iter()
            .enumerate()
            .filter(|(index, g)| **g == Some(group) && *index != location)
            .map(|(index, _)| index)
            .collect()
    }

    /// Drops singleton groups and renumbers the rest in first-occurrence
    /// order.
    pub(crate) fn normalize(&mut self) {
        let mut members: BTreeMap<u32, usize> = BTreeMap::new();
        for group in self.groups.iter().flatten() {
            *members.entry(*group).or_insert(0) += 1;
        }

        let mut renumber: BTreeMap<u32, u32> = BTreeMap::new();
        let mut next = 0;
        for slot in self.groups.iter_mut() {
            let group = match slot {
                Some(group) => *group,
                None => continue,
            };
            if members[&group] < 2 {
                *slot = None;
                continue;
            }
            let id = *renumber.entry(group).or_insert_with(|| {
                let id = next;
                next += 1;
                id
            });
            *slot = Some(id);
        }
    }

    /// Partition intersection: a pair of locations stays aliased only when
    /// both inputs agree.
    pub(crate) fn intersect(&self, other: &MustState) -> MustState {
        let mut out = MustState::new(self.groups.len());
        let mut pairs: BTreeMap<(u32, u32), u32> = BTreeMap::new();
        let mut next = 0;
        for index in 0..self.groups.len() {
            let this = self.groups[index];
            let that = other.groups.get(index).cloned().flatten();
            if let (Some(this), Some(that)) = (this, that) {
                let id = *pairs.entry((this, that)).or_insert_with(|| {
                    let id = next;
                    next += 1;
                    id
                });
                out.groups[index] = Some(id);
            }
        }
        out.normalize();
        out
    }
}

struct MustAliasAnalysis<'a> {
    procedure: &'a Procedure,
    oracle: Option<&'a SideEffects>,
}

impl<'a> FixedPointAnalysis<Statement, MustState> for MustAliasAnalysis<'a> {
    fn direction(&self) -> Direction {
        Direction::Forward
    }

    fn initial_state(&self) -> MustState {
        MustState::new(self.procedure.locations().len())
    }

    fn entry_state(&self) -> MustState {
        // nothing is known to alias at procedure entry
        MustState::new(self.procedure.locations().len())
    }

    fn transfer(&self, statement: &Statement, state: &MustState) -> Result<MustState, Error> {
        let mut out = state.clone();
        let locations = self.procedure.locations();

        match statement.operation() {
            Operation::Nop => {}
            Operation::Call { result, targets } => {
                let kill = call_kill::fields_killed_by_call(targets, self.oracle);
                for location in locations.iter() {
                    if kill.kills(locations, location) {
                        out.kill(location.index());
                    }
                }
                // the returned object is untracked
                if let Some(result) = result {
                    if locations.is_reference(*result) {
                        out.kill(result.index());
                    }
                }
            }
            Operation::Assign { dst, src } => {
                if locations.is_reference(*dst) {
                    match src {
                        Rvalue::Location(src) | Rvalue::Cast(src) => {
                            if src != dst {
                                out.kill(dst.index());
                                if locations.is_reference(*src) {
                                    out.alias(dst.index(), src.index());
                                }
                            }
                        }
                        Rvalue::New | Rvalue::Opaque => out.kill(dst.index()),
                    }
                }
            }
        }

        out.normalize();
        Ok(out)
    }

    fn merge(&self, state0: MustState, state1: &MustState) -> Result<MustState, Error> {
        Ok(state0.intersect(state1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::side_effects;
    use crate::ir::{CallTargets, Method, Program};

    fn pure_method(index: usize, name: &str) -> Method {
        let mut procedure = Procedure::new(name);
        let cfg = procedure.control_flow_graph_mut();
        let s0 = cfg.nop();
        cfg.set_entry(s0).unwrap();
        Method::new(index, name, Some(procedure))
    }

    fn field_writing_method(index: usize, name: &str, field: usize) -> Method {
        let mut procedure = Procedure::new(name);
        let f = procedure.locations_mut().field(field, "f", false);
        let cfg = procedure.control_flow_graph_mut();
        let s0 = cfg.assign(f, Rvalue::New);
        cfg.set_entry(s0).unwrap();
        Method::new(index, name, Some(procedure))
    }

    #[test]
    fn scenario_a_copy_after_allocation() {
        // a = new; b = a; c = foo() with foo pure
        let mut program = Program::new();
        program.add_method(pure_method(1, "foo")).unwrap();
        let oracle = side_effects(&program).unwrap();

        let mut procedure = Procedure::new("main");
        let a = procedure.locations_mut().local("a");
        let b = procedure.locations_mut().local("b");
        let c = procedure.locations_mut().local("c");
        let cfg = procedure.control_flow_graph_mut();
        let s0 = cfg.assign(a, Rvalue::New);
        let s1 = cfg.assign(b, Rvalue::Location(a));
        let s2 = cfg.call(Some(c), CallTargets::Resolved(vec![1]));
        cfg.chain(&[s0, s1, s2]).unwrap();
        cfg.set_entry(s0).unwrap();

        let must = must_alias(&procedure, Some(&oracle)).unwrap();

        let expected: BTreeSet<Location> = vec![a].into_iter().collect();
        assert_eq!(must.aliases_before(b, s2), expected);
        // the pure call kills nothing
        let expected: BTreeSet<Location> = vec![b].into_iter().collect();
        assert_eq!(must.aliases_after(a, s2), expected);
        assert!(must.aliases_after(c, s2).is_empty());
    }

    #[test]
    fn scenario_b_call_kills_written_field_only() {
        // foo writes program field 0; locals survive the call, the field
        // alias does not
        let mut program = Program::new();
        program.add_method(field_writing_method(1, "foo", 0)).unwrap();
        let oracle = side_effects(&program).unwrap();
        assert!(oracle.has_side_effects(1));

        let mut procedure = Procedure::new("main");
        let a = procedure.locations_mut().local("a");
        let b = procedure.locations_mut().local("b");
        let f = procedure.locations_mut().field(0, "f", false);
        let x = procedure.locations_mut().local("x");
        let cfg = procedure.control_flow_graph_mut();
        let s0 = cfg.assign(a, Rvalue::New);
        let s1 = cfg.assign(b, Rvalue::Location(a));
        let s2 = cfg.assign(x, Rvalue::Location(f));
        let s3 = cfg.call(None, CallTargets::Resolved(vec![1]));
        cfg.chain(&[s0, s1, s2, s3]).unwrap();
        cfg.set_entry(s0).unwrap();

        let must = must_alias(&procedure, Some(&oracle)).unwrap();

        // before the call, x and f alias
        let expected: BTreeSet<Location> = vec![f].into_iter().collect();
        assert_eq!(must.aliases_before(x, s3), expected);
        // after the call, the field alias is gone and the locals remain
        assert!(must.aliases_after(f, s3).is_empty());
        assert!(must.aliases_after(x, s3).is_empty());
        let expected: BTreeSet<Location> = vec![b].into_iter().collect();
        assert_eq!(must.aliases_after(a, s3), expected);
    }

    #[test]
    fn scenario_c_join_disagreement_kills() {
        // if (..) { x = p } else { x = q }
        let mut procedure = Procedure::new("main");
        let p = procedure.locations_mut().local("p");
        let q = procedure.locations_mut().local("q");
        let x = procedure.locations_mut().local("x");
        let cfg = procedure.control_flow_graph_mut();
        let s0 = cfg.assign(p, Rvalue::New);
        let s1 = cfg.assign(q, Rvalue::New);
        let branch = cfg.nop();
        let then_arm = cfg.assign(x, Rvalue::Location(p));
        let else_arm = cfg.assign(x, Rvalue::Location(q));
        let join = cfg.nop();
        cfg.chain(&[s0, s1, branch, then_arm, join]).unwrap();
        cfg.edge(branch, else_arm).unwrap();
        cfg.edge(else_arm, join).unwrap();
        cfg.set_entry(s0).unwrap();

        let must = must_alias(&procedure, None).unwrap();

        // each arm knows its own alias
        let expected: BTreeSet<Location> = vec![p].into_iter().collect();
        assert_eq!(must.aliases_after(x, then_arm), expected);
        // the join cannot keep either claim
        assert!(must.aliases_before(x, join).is_empty());
        assert!(must.aliases_before(p, join).is_empty());
    }

    #[test]
    fn merge_one_side_absent_kills() {
        // one arm aliases b to a, the other arm says nothing
        let mut procedure = Procedure::new("main");
        let a = procedure.locations_mut().local("a");
        let b = procedure.locations_mut().local("b");
        let cfg = procedure.control_flow_graph_mut();
        let branch = cfg.nop();
        let then_arm = cfg.assign(b, Rvalue::Location(a));
        let else_arm = cfg.nop();
        let join = cfg.nop();
        cfg.chain(&[branch, then_arm, join]).unwrap();
        cfg.edge(branch, else_arm).unwrap();
        cfg.edge(else_arm, join).unwrap();
        cfg.set_entry(branch).unwrap();

        let must = must_alias(&procedure, None).unwrap();

        let expected: BTreeSet<Location> = vec![a].into_iter().collect();
        assert_eq!(must.aliases_after(b, then_arm), expected);
        assert!(must.aliases_before(b, join).is_empty());
        assert!(must.aliases_before(a, join).is_empty());
    }

    #[test]
    fn merge_with_self_is_a_no_op() {
        let mut state = MustState::new(4);
        state.alias(1, 0);
        state.alias(3, 2);
        state.normalize();
        assert_eq!(state.intersect(&state), state);
    }

    #[test]
    fn kill_on_call_without_oracle_spares_private_fields_and_locals() {
        let mut procedure = Procedure::new("main");
        let a = procedure.locations_mut().local("a");
        let b = procedure.locations_mut().local("b");
        let f = procedure.locations_mut().field(0, "f", false);
        let g = procedure.locations_mut().field(1, "g", true);
        let x = procedure.locations_mut().local("x");
        let y = procedure.locations_mut().local("y");
        let cfg = procedure.control_flow_graph_mut();
        let s0 = cfg.assign(a, Rvalue::New);
        let s1 = cfg.assign(b, Rvalue::Location(a));
        let s2 = cfg.assign(x, Rvalue::Location(f));
        let s3 = cfg.assign(y, Rvalue::Location(g));
        let s4 = cfg.call(None, CallTargets::Unresolved);
        cfg.chain(&[s0, s1, s2, s3, s4]).unwrap();
        cfg.set_entry(s0).unwrap();

        let must = must_alias(&procedure, None).unwrap();

        // the externally visible field dies, the private field and the
        // locals survive
        assert!(must.aliases_after(f, s4).is_empty());
        assert!(must.aliases_after(x, s4).is_empty());
        let expected: BTreeSet<Location> = vec![g].into_iter().collect();
        assert_eq!(must.aliases_after(y, s4), expected);
        let expected: BTreeSet<Location> = vec![b].into_iter().collect();
        assert_eq!(must.aliases_after(a, s4), expected);
    }

    #[test]
    fn oracle_limits_the_kill_to_written_fields() {
        let mut program = Program::new();
        program.add_method(field_writing_method(1, "foo", 0)).unwrap();
        let oracle = side_effects(&program).unwrap();

        let mut procedure = Procedure::new("main");
        let x = procedure.locations_mut().local("x");
        let y = procedure.locations_mut().local("y");
        let f = procedure.locations_mut().field(0, "f", false);
        let g = procedure.locations_mut().field(1, "g", false);
        let cfg = procedure.control_flow_graph_mut();
        let s0 = cfg.assign(x, Rvalue::Location(f));
        let s1 = cfg.assign(y, Rvalue::Location(g));
        let s2 = cfg.call(None, CallTargets::Resolved(vec![1]));
        cfg.chain(&[s0, s1, s2]).unwrap();
        cfg.set_entry(s0).unwrap();

        let must = must_alias(&procedure, Some(&oracle)).unwrap();

        // only field 0 is in foo's write-set
        assert!(must.aliases_after(f, s2).is_empty());
        let expected: BTreeSet<Location> = vec![g].into_iter().collect();
        assert_eq!(must.aliases_after(y, s2), expected);
    }

    #[test]
    fn cast_preserves_the_alias() {
        let mut procedure = Procedure::new("main");
        let a = procedure.locations_mut().local("a");
        let b = procedure.locations_mut().local("b");
        let cfg = procedure.control_flow_graph_mut();
        let s0 = cfg.assign(a, Rvalue::New);
        let s1 = cfg.assign(b, Rvalue::Cast(a));
        cfg.chain(&[s0, s1]).unwrap();
        cfg.set_entry(s0).unwrap();

        let must = must_alias(&procedure, None).unwrap();
        let expected: BTreeSet<Location> = vec![a].into_iter().collect();
        assert_eq!(must.aliases_after(b, s1), expected);
    }

    #[test]
    fn symmetry_holds_at_every_point() {
        let mut procedure = Procedure::new("main");
        let a = procedure.locations_mut().local("a");
        let b = procedure.locations_mut().local("b");
        let c = procedure.locations_mut().local("c");
        let cfg = procedure.control_flow_graph_mut();
        let s0 = cfg.assign(a, Rvalue::New);
        let s1 = cfg.assign(b, Rvalue::Location(a));
        let s2 = cfg.assign(c, Rvalue::Location(b));
        let s3 = cfg.assign(b, Rvalue::New);
        cfg.chain(&[s0, s1, s2, s3]).unwrap();
        cfg.set_entry(s0).unwrap();

        let must = must_alias(&procedure, None).unwrap();

        for statement in [s0, s1, s2, s3] {
            for location in [a, b, c] {
                for other in must.aliases_before(location, statement) {
                    assert!(must.aliases_before(other, statement).contains(&location));
                }
                for other in must.aliases_after(location, statement) {
                    assert!(must.aliases_after(other, statement).contains(&location));
                }
            }
        }
        // redefining b drops it from the group, c keeps aliasing a
        let expected: BTreeSet<Location> = vec![c].into_iter().collect();
        assert_eq!(must.aliases_after(a, s3), expected);
    }

    #[test]
    fn non_reference_assignments_carry_no_aliases() {
        let mut procedure = Procedure::new("main");
        let a = procedure.locations_mut().local("a");
        let b = procedure.locations_mut().local("b");
        let i = procedure.locations_mut().scalar("i");
        let cfg = procedure.control_flow_graph_mut();
        let s0 = cfg.assign(a, Rvalue::New);
        let s1 = cfg.assign(b, Rvalue::Location(a));
        let s2 = cfg.assign(i, Rvalue::Opaque);
        cfg.chain(&[s0, s1, s2]).unwrap();
        cfg.set_entry(s0).unwrap();

        let must = must_alias(&procedure, None).unwrap();
        assert!(must.aliases_after(i, s2).is_empty());
        let expected: BTreeSet<Location> = vec![a].into_iter().collect();
        assert_eq!(must.aliases_after(b, s2), expected);
    }

    #[test]
    fn queries_for_unknown_points_return_no_information() {
        let mut procedure = Procedure::new("main");
        let a = procedure.locations_mut().local("a");
        let cfg = procedure.control_flow_graph_mut();
        let s0 = cfg.assign(a, Rvalue::New);
        cfg.set_entry(s0).unwrap();

        let must = must_alias(&procedure, None).unwrap();
        assert!(must.aliases_before(a, 99).is_empty());
    }
}
