//! May-alias analysis: a forward fixed point whose state over-approximates
//! which locations might denote the same object.
//!
//! The conservatism runs the opposite way from must-alias. Merging at a
//! join unions the relations, and a location bound to an untrackable value
//! lands in an explicit "unknown" sink rather than being dropped. A
//! may-alias result proves *non*-aliasing: two locations with known,
//! disjoint alias sets cannot be the same object. It never proves aliasing
//! on its own.

use crate::analysis::call_kill;
use crate::analysis::fixed_point::{fixed_point, Direction, FixedPointAnalysis, FlowResult};
use crate::analysis::SideEffects;
use crate::ir::{Location, Operation, Procedure, Rvalue, Statement};
use crate::Error;
use log::debug;
use std::collections::{BTreeMap, BTreeSet};

/// A may-alias query result.
///
/// `Unknown` means "no information": the location may alias anything, and
/// callers must never read it as "no aliases."
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Aliases {
    Unknown,
    Known(BTreeSet<Location>),
}

impl Aliases {
    pub fn is_unknown(&self) -> bool {
        matches!(self, Aliases::Unknown)
    }

    pub fn known(&self) -> Option<&BTreeSet<Location>> {
        match self {
            Aliases::Known(locations) => Some(locations),
            Aliases::Unknown => None,
        }
    }
}

/// Compute may-alias information for the given procedure.
///
/// The oracle plays the same role as for must-alias; the two analyses
/// share the kill decision but never share state.
pub fn may_alias(procedure: &Procedure, oracle: Option<&SideEffects>) -> Result<MayAlias, Error> {
    procedure.validate()?;
    let entry = procedure.control_flow_graph().entry().ok_or(Error::NoEntry)?;

    let analysis = MayAliasAnalysis { procedure, oracle };
    let flow = fixed_point(&analysis, procedure.control_flow_graph().graph(), &[entry])?;

    debug!(
        "may_alias: {} locations over {} statements",
        procedure.locations().len(),
        procedure.control_flow_graph().statements().len()
    );

    Ok(MayAlias { flow })
}

/// The result of a may-alias analysis over one procedure.
pub struct MayAlias {
    flow: FlowResult<MayState>,
}

impl MayAlias {
    /// The locations which might denote the same object as `location`
    /// immediately before the given statement. Queries against statements
    /// the analysis never saw return [`Aliases::Unknown`].
    pub fn aliases_before(&self, location: Location, statement: usize) -> Aliases {
        Self::aliases(self.flow.before(statement), location)
    }

    /// The locations which might denote the same object as `location`
    /// immediately after the given statement.
    pub fn aliases_after(&self, location: Location, statement: usize) -> Aliases {
        Self::aliases(self.flow.after(statement), location)
    }

    /// True unless the state before the given statement proves `a` and `b`
    /// cannot denote the same object.
    pub fn may_alias_before(&self, a: Location, b: Location, statement: usize) -> bool {
        if a == b {
            return true;
        }
        match (self.aliases_before(a, statement), self.aliases_before(b, statement)) {
            (Aliases::Known(of_a), Aliases::Known(_)) => of_a.contains(&b),
            _ => true,
        }
    }

    fn aliases(state: Option<&MayState>, location: Location) -> Aliases {
        let state = match state {
            Some(state) => state,
            None => return Aliases::Unknown,
        };
        match state.aliases_of(location.index()) {
            Some(aliases) => Aliases::Known(aliases.into_iter().map(Location).collect()),
            None => Aliases::Unknown,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Cell {
    /// The in-relation is fully known and empty.
    Untracked,
    /// May alias anything.
    Unknown,
    /// Member of an alias group.
    Group(u32),
}

/// The flow state: one cell per location index, normalized the same way as
/// the must-alias state.
#[derive(Clone, Debug, Eq, PartialEq)]
struct MayState {
    cells: Vec<Cell>,
}

impl MayState {
    fn new(locations: usize) -> MayState {
        MayState {
            cells: vec![Cell::Untracked; locations],
        }
    }

    fn fresh_group(&self) -> u32 {
        self.cells
            .iter()
            .filter_map(|cell| match cell {
                Cell::Group(group) => Some(*group),
                _ => None,
            })
            .max()
            .map(|group| group + 1)
            .unwrap_or(0)
    }

    /// `None` means the location may alias anything.
    fn aliases_of(&self, location: usize) -> Option<BTreeSet<usize>> {
        match self.cells.get(location) {
            None | Some(Cell::Unknown) => None,
            Some(Cell::Untracked) => Some(BTreeSet::new()),
            Some(Cell::Group(group)) => Some(
                self.cells
                    .iter()
                    .enumerate()
                    .filter(|(index, cell)| **cell == Cell::Group(*group) && *index != location)
                    .map(|(index, _)| index)
                    .collect(),
            ),
        }
    }

    fn normalize(&mut self) {
        let mut members: BTreeMap<u32, usize> = BTreeMap::new();
        for cell in &self.cells {
            if let Cell::Group(group) = cell {
                *members.entry(*group).or_insert(0) += 1;
            }
        }

        let mut renumber: BTreeMap<u32, u32> = BTreeMap::new();
        let mut next = 0;
        for cell in self.cells.iter_mut() {
            let group = match cell {
                Cell::Group(group) => *group,
                _ => continue,
            };
            if members[&group] < 2 {
                *cell = Cell::Untracked;
                continue;
            }
            let id = *renumber.entry(group).or_insert_with(|| {
                let id = next;
                next += 1;
                id
            });
            *cell = Cell::Group(id);
        }
    }

    /// Relation union: a pair of locations stays (or becomes) aliased if
    /// either input relates them, and `Unknown` on either side wins.
    fn union(&self, other: &MayState) -> MayState {
        let len = self.cells.len();
        let mut parent: Vec<usize> = (0..len).collect();

        fn find(parent: &mut Vec<usize>, index: usize) -> usize {
            let mut root = index;
            while parent[root] != root {
                root = parent[root];
            }
            let mut walk = index;
            while parent[walk] != root {
                let next = parent[walk];
                parent[walk] = root;
                walk = next;
            }
            root
        }

        for state in [self, other] {
            let mut representatives: BTreeMap<u32, usize> = BTreeMap::new();
            for (index, cell) in state.cells.iter().enumerate() {
                if let Cell::Group(group) = cell {
                    match representatives.get(group) {
                        Some(&representative) => {
                            let a = find(&mut parent, representative);
                            let b = find(&mut parent, index);
                            parent[b] = a;
                        }
                        None => {
                            representatives.insert(*group, index);
                        }
                    }
                }
            }
        }

        let mut out = MayState::new(len);
        let mut root_ids: BTreeMap<usize, u32> = BTreeMap::new();
        let mut next = 0;
        for index in 0..len {
            if self.cells[index] == Cell::Unknown || other.cells[index] == Cell::Unknown {
                out.cells[index] = Cell::Unknown;
                continue;
            }
            let grouped = matches!(self.cells[index], Cell::Group(_))
                || matches!(other.cells[index], Cell::Group(_));
            if !grouped {
                continue;
            }
            let root = find(&mut parent, index);
            let id = *root_ids.entry(root).or_insert_with(|| {
                let id = next;
                next += 1;
                id
            });
            out.cells[index] = Cell::Group(id);
        }
        out.normalize();
        out
    }
}

struct MayAliasAnalysis<'a> {
    procedure: &'a Procedure,
    oracle: Option<&'a SideEffects>,
}

impl<'a> FixedPointAnalysis<Statement, MayState> for MayAliasAnalysis<'a> {
    fn direction(&self) -> Direction {
        Direction::Forward
    }

    fn initial_state(&self) -> MayState {
        MayState::new(self.procedure.locations().len())
    }

    fn entry_state(&self) -> MayState {
        MayState::new(self.procedure.locations().len())
    }

    fn transfer(&self, statement: &Statement, state: &MayState) -> Result<MayState, Error> {
        let mut out = state.clone();
        let locations = self.procedure.locations();

        match statement.operation() {
            Operation::Nop => {}
            Operation::Call { result, targets } => {
                // a rebound field holds an object we know nothing about
                let kill = call_kill::fields_killed_by_call(targets, self.oracle);
                for location in locations.iter() {
                    if kill.kills(locations, location) {
                        out.cells[location.index()] = Cell::Unknown;
                    }
                }
                if let Some(result) = result {
                    if locations.is_reference(*result) {
                        out.cells[result.index()] = Cell::Unknown;
                    }
                }
            }
            Operation::Assign { dst, src } => {
                if locations.is_reference(*dst) {
                    match src {
                        Rvalue::Location(src) | Rvalue::Cast(src) => {
                            if src != dst {
                                if locations.is_reference(*src) {
                                    out.cells[dst.index()] = match out.cells[src.index()] {
                                        Cell::Group(group) => Cell::Group(group),
                                        Cell::Unknown => Cell::Unknown,
                                        Cell::Untracked => {
                                            let group = out.fresh_group();
                                            out.cells[src.index()] = Cell::Group(group);
                                            Cell::Group(group)
                                        }
                                    };
                                } else {
                                    out.cells[dst.index()] = Cell::Untracked;
                                }
                            }
                        }
                        // a fresh allocation aliases nothing yet
                        Rvalue::New => out.cells[dst.index()] = Cell::Untracked,
                        Rvalue::Opaque => out.cells[dst.index()] = Cell::Unknown,
                    }
                }
            }
        }

        out.normalize();
        Ok(out)
    }

    fn merge(&self, state0: MayState, state1: &MayState) -> Result<MayState, Error> {
        Ok(state0.union(state1))
    }
}
