//! Side-effect analysis: a backward fixed point over the call graph.
//!
//! Each method gets one fact: whether it may observably write state, and
//! if so which program-wide fields it (transitively) may write. Anything
//! the analysis cannot see resolves to "has side effects, writes unknown":
//! methods without a retrievable body, calls the call graph cannot
//! resolve, and calls to methods outside the program snapshot. The alias
//! analyses consume the result read-only, so their kill-on-call handling
//! is never unsound.

use crate::analysis::fixed_point::{fixed_point, Direction, FixedPointAnalysis};
use crate::graph::Vertex;
use crate::ir::{CallTargets, MethodRef, Operation, Program};
use crate::Error;
use log::debug;
use std::collections::{BTreeMap, BTreeSet};

/// Compute side-effect facts for every method in the program. The facts
/// are valid for this call-graph snapshot; recompute if the program
/// changes.
pub fn side_effects(program: &Program) -> Result<SideEffects, Error> {
    if program.is_empty() {
        return Ok(SideEffects {
            facts: BTreeMap::new(),
        });
    }

    let call_graph = program.call_graph()?;

    // flow runs callee to caller, so leaf methods are the exit side; with
    // no leaves at all (every method calls), seeding order is arbitrary
    let mut exits: Vec<usize> = call_graph
        .vertices_without_successors()
        .iter()
        .map(|vertex| vertex.index())
        .collect();
    if exits.is_empty() {
        exits = call_graph.vertex_indices();
    }

    let analysis = SideEffectAnalysis { program };
    let flow = fixed_point(&analysis, &call_graph, &exits)?;

    let facts = flow.before_states().clone();
    debug!("side_effects: {} methods analyzed", facts.len());

    Ok(SideEffects { facts })
}

/// Per-method side-effect facts, usable as the kill-on-call oracle for the
/// alias analyses.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SideEffects {
    facts: BTreeMap<usize, Fact>,
}

impl SideEffects {
    /// True if the method may observably write state. Methods the analysis
    /// never saw are side-effecting, conservatively.
    pub fn has_side_effects(&self, method: usize) -> bool {
        self.facts
            .get(&method)
            .map(|fact| fact.side_effects)
            .unwrap_or(true)
    }

    /// The program-wide fields the method may (transitively) write.
    /// `None` means the write-set is unknown and callers must assume any
    /// field.
    pub fn written_fields(&self, method: usize) -> Option<&BTreeSet<usize>> {
        match self.facts.get(&method).map(|fact| &fact.written) {
            Some(Written::Fields(fields)) => Some(fields),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
enum Written {
    Fields(BTreeSet<usize>),
    All,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct Fact {
    side_effects: bool,
    written: Written,
}

impl Fact {
    fn pure() -> Fact {
        Fact {
            side_effects: false,
            written: Written::Fields(BTreeSet::new()),
        }
    }

    fn unanalyzable() -> Fact {
        Fact {
            side_effects: true,
            written: Written::All,
        }
    }

    fn write(&mut self, field: usize) {
        self.side_effects = true;
        if let Written::Fields(fields) = &mut self.written {
            fields.insert(field);
        }
    }
}

struct SideEffectAnalysis<'a> {
    program: &'a Program,
}

impl<'a> FixedPointAnalysis<MethodRef, Fact> for SideEffectAnalysis<'a> {
    fn direction(&self) -> Direction {
        Direction::Backward
    }

    fn initial_state(&self) -> Fact {
        Fact::pure()
    }

    fn entry_state(&self) -> Fact {
        Fact::pure()
    }

    fn transfer(&self, vertex: &MethodRef, state: &Fact) -> Result<Fact, Error> {
        let method = self.program.method(vertex.index())?;
        let procedure = match method.procedure() {
            Some(procedure) => procedure,
            None => return Ok(Fact::unanalyzable()),
        };

        // state already aggregates the facts of every resolved callee
        let mut fact = state.clone();
        let locations = procedure.locations();

        for statement in procedure.control_flow_graph().statements() {
            match statement.operation() {
                Operation::Assign { dst, .. } => {
                    if let Some(field) = locations.field_index(*dst) {
                        fact.write(field);
                    }
                }
                Operation::Call { targets, .. } => match targets {
                    CallTargets::Unresolved => return Ok(Fact::unanalyzable()),
                    CallTargets::Resolved(targets) => {
                        if targets.iter().any(|target| !self.program.has_method(*target)) {
                            return Ok(Fact::unanalyzable());
                        }
                    }
                },
                Operation::Nop => {}
            }
        }

        Ok(fact)
    }

    fn merge(&self, mut state0: Fact, state1: &Fact) -> Result<Fact, Error> {
        state0.side_effects |= state1.side_effects;
        state0.written = match (state0.written, &state1.written) {
            (Written::Fields(mut fields), Written::Fields(other)) => {
                fields.extend(other.iter().cloned());
                Written::Fields(fields)
            }
            _ => Written::All,
        };
        Ok(state0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Method, Procedure, Rvalue};

    fn method_with_body<F>(index: usize, name: &str, build: F) -> Method
    where
        F: FnOnce(&mut Procedure),
    {
        let mut procedure = Procedure::new(name);
        build(&mut procedure);
        Method::new(index, name, Some(procedure))
    }

    fn nop_body(procedure: &mut Procedure) {
        let cfg = procedure.control_flow_graph_mut();
        let s0 = cfg.nop();
        cfg.set_entry(s0).unwrap();
    }

    fn calling_body(targets: Vec<usize>) -> impl FnOnce(&mut Procedure) {
        move |procedure: &mut Procedure| {
            let cfg = procedure.control_flow_graph_mut();
            let s0 = cfg.call(None, CallTargets::Resolved(targets));
            cfg.set_entry(s0).unwrap();
        }
    }

    #[test]
    fn scenario_d_bodyless_callee_taints_the_chain() {
        // A -> B -> C, C has no retrievable body
        let mut program = Program::new();
        program
            .add_method(method_with_body(0, "a", calling_body(vec![1])))
            .unwrap();
        program
            .add_method(method_with_body(1, "b", calling_body(vec![2])))
            .unwrap();
        program.add_method(Method::new(2, "c", None)).unwrap();

        let effects = side_effects(&program).unwrap();

        assert!(effects.has_side_effects(2));
        assert!(effects.has_side_effects(1));
        assert!(effects.has_side_effects(0));
        assert_eq!(effects.written_fields(0), None);
    }

    #[test]
    fn direct_field_writes_propagate_to_callers() {
        let mut program = Program::new();
        program
            .add_method(method_with_body(0, "caller", calling_body(vec![1])))
            .unwrap();
        program
            .add_method(method_with_body(1, "writer", |procedure| {
                let f = procedure.locations_mut().field(3, "f", false);
                let cfg = procedure.control_flow_graph_mut();
                let s0 = cfg.assign(f, Rvalue::New);
                cfg.set_entry(s0).unwrap();
            }))
            .unwrap();

        let effects = side_effects(&program).unwrap();

        assert!(effects.has_side_effects(1));
        let expected: BTreeSet<usize> = vec![3].into_iter().collect();
        assert_eq!(effects.written_fields(1), Some(&expected));
        // the caller inherits the callee's write-set
        assert!(effects.has_side_effects(0));
        assert_eq!(effects.written_fields(0), Some(&expected));
    }

    #[test]
    fn pure_methods_stay_pure() {
        let mut program = Program::new();
        program.add_method(method_with_body(0, "caller", calling_body(vec![1]))).unwrap();
        program.add_method(method_with_body(1, "leaf", nop_body)).unwrap();

        let effects = side_effects(&program).unwrap();

        assert!(!effects.has_side_effects(1));
        assert!(!effects.has_side_effects(0));
        assert_eq!(effects.written_fields(0), Some(&BTreeSet::new()));
    }

    #[test]
    fn unresolved_calls_are_conservative() {
        let mut program = Program::new();
        program
            .add_method(method_with_body(0, "m", |procedure| {
                let cfg = procedure.control_flow_graph_mut();
                let s0 = cfg.call(None, CallTargets::Unresolved);
                cfg.set_entry(s0).unwrap();
            }))
            .unwrap();

        let effects = side_effects(&program).unwrap();
        assert!(effects.has_side_effects(0));
        assert_eq!(effects.written_fields(0), None);
    }

    #[test]
    fn targets_outside_the_program_are_conservative() {
        let mut program = Program::new();
        program
            .add_method(method_with_body(0, "m", calling_body(vec![42])))
            .unwrap();

        let effects = side_effects(&program).unwrap();
        assert!(effects.has_side_effects(0));
        assert_eq!(effects.written_fields(0), None);
    }

    #[test]
    fn mutual_recursion_terminates() {
        let mut program = Program::new();
        program
            .add_method(method_with_body(0, "ping", calling_body(vec![1])))
            .unwrap();
        program
            .add_method(method_with_body(1, "pong", calling_body(vec![0])))
            .unwrap();

        let effects = side_effects(&program).unwrap();
        assert!(!effects.has_side_effects(0));
        assert!(!effects.has_side_effects(1));
    }

    #[test]
    fn unknown_methods_have_side_effects() {
        let effects = side_effects(&Program::new()).unwrap();
        assert!(effects.has_side_effects(7));
        assert_eq!(effects.written_fields(7), None);
    }

    #[test]
    fn recursive_writer_taints_the_cycle() {
        let mut program = Program::new();
        program
            .add_method(method_with_body(0, "ping", calling_body(vec![1])))
            .unwrap();
        program
            .add_method(method_with_body(1, "pong", |procedure| {
                let f = procedure.locations_mut().field(5, "f", true);
                let cfg = procedure.control_flow_graph_mut();
                let s0 = cfg.assign(f, Rvalue::New);
                let s1 = cfg.call(None, CallTargets::Resolved(vec![0]));
                cfg.chain(&[s0, s1]).unwrap();
                cfg.set_entry(s0).unwrap();
            }))
            .unwrap();

        let effects = side_effects(&program).unwrap();
        let expected: BTreeSet<usize> = vec![5].into_iter().collect();
        assert!(effects.has_side_effects(0));
        assert!(effects.has_side_effects(1));
        assert_eq!(effects.written_fields(0), Some(&expected));
        assert_eq!(effects.written_fields(1), Some(&expected));
    }
}
