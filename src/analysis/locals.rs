use super::ControlFlowGraph;
use crate::il::{Instruction, MethodBody};
use crate::util::Offset;
use std::collections::BTreeSet;

/// Uses of one local variable and the instructions across which its storage is occupied
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LocalVariableAnalysis {
    pub index: usize,

    /// Instructions writing the variable (`stloc`)
    pub sources: BTreeSet<Offset>,

    /// Instructions reading the variable (`ldloc`)
    pub sinks: BTreeSet<Offset>,

    /// Instructions taking the address of the variable (`ldloca`)
    pub address_sources: BTreeSet<Offset>,

    /// Instructions across which the variable must keep its value
    pub scope: BTreeSet<Offset>,

    /// Calls inside the scope (the value must survive those calls)
    pub spanned_method_calls: BTreeSet<Offset>,
}

impl LocalVariableAnalysis {
    fn new(index: usize) -> LocalVariableAnalysis {
        LocalVariableAnalysis {
            index,
            ..LocalVariableAnalysis::default()
        }
    }

    /// Is the variable ever read or its address taken?
    pub fn is_live(&self) -> bool {
        !self.scope.is_empty()
    }

    /// Are both variables occupied at some common instruction (so they can't share storage)?
    pub fn overlaps(&self, other: &LocalVariableAnalysis) -> bool {
        !self.scope.is_disjoint(&other.scope)
    }
}

/// Compute the scope of every local variable of a method
///
/// The scope of a variable is the union of:
///
///   - for every read, all instructions from which the read can be reached (walking the CFG
///     backwards) without going through a write of the variable
///
///   - for every address taken, all instructions reachable afterwards (the address might be used
///     anywhere from there on)
///
pub fn analyze_locals(
    body: &MethodBody,
    cfg: &ControlFlowGraph,
    method_calls: &BTreeSet<Offset>,
) -> Vec<LocalVariableAnalysis> {
    let mut locals: Vec<LocalVariableAnalysis> = (0..body.local_count())
        .map(LocalVariableAnalysis::new)
        .collect();

    for insn in body.instructions() {
        match insn.instruction {
            Instruction::LdLoc(idx) => locals[idx as usize].sinks.insert(insn.offset),
            Instruction::StLoc(idx) => locals[idx as usize].sources.insert(insn.offset),
            Instruction::LdLocA(idx) => locals[idx as usize].address_sources.insert(insn.offset),
            _ => continue,
        };
    }

    for local in &mut locals {
        let sources: BTreeSet<usize> = local
            .sources
            .iter()
            .filter_map(|source| cfg.vertex(*source))
            .collect();

        let mut scope = BTreeSet::new();
        for sink in &local.sinks {
            if let Some(sink) = cfg.vertex(*sink) {
                walk(sink, &mut scope, |vertex| !sources.contains(&vertex), |vertex| {
                    cfg.predecessor_vertices(vertex).collect()
                });
            }
        }
        for address_source in &local.address_sources {
            if let Some(address_source) = cfg.vertex(*address_source) {
                walk(address_source, &mut scope, |_| true, |vertex| {
                    cfg.successor_vertices(vertex).collect()
                });
            }
        }

        local.scope = scope.into_iter().map(|vertex| cfg.offset(vertex)).collect();
        local.spanned_method_calls = local.scope.intersection(method_calls).copied().collect();
        log::trace!(
            "local {} spans {} instructions and {} calls",
            local.index,
            local.scope.len(),
            local.spanned_method_calls.len()
        );
    }

    locals
}

/// Depth-first walk from `start`, adding to `visited` every vertex passing `include` and
/// continuing through its `neighbours`
fn walk(
    start: usize,
    visited: &mut BTreeSet<usize>,
    include: impl Fn(usize) -> bool,
    neighbours: impl Fn(usize) -> Vec<usize>,
) {
    // `visited` may already hold vertices from other walks
    let mut seen = BTreeSet::new();
    let mut to_visit = vec![start];
    while let Some(vertex) = to_visit.pop() {
        if !include(vertex) || !seen.insert(vertex) {
            continue;
        }
        visited.insert(vertex);
        to_visit.extend(neighbours(vertex));
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::il::BytecodeInstruction;

    fn analyze(instructions: Vec<(usize, Instruction<Offset>)>) -> Vec<LocalVariableAnalysis> {
        let instructions = instructions
            .into_iter()
            .map(|(off, insn)| BytecodeInstruction::new(Offset(off), insn))
            .collect();
        let body = MethodBody::new(instructions, 0, vec![]).unwrap();
        let cfg = ControlFlowGraph::build(&body).unwrap();
        let method_calls = body
            .instructions()
            .iter()
            .filter(|insn| insn.instruction.method_operand().is_some())
            .map(|insn| insn.offset)
            .collect();
        analyze_locals(&body, &cfg, &method_calls)
    }

    fn offsets(offsets: &[usize]) -> BTreeSet<Offset> {
        offsets.iter().map(|off| Offset(*off)).collect()
    }

    #[test]
    fn write_then_read() {
        let locals = analyze(vec![
            (0, Instruction::LdcI4(1)),
            (1, Instruction::StLoc(0)),
            (2, Instruction::Nop),
            (3, Instruction::LdLoc(0)),
            (4, Instruction::Ret),
        ]);

        assert_eq!(locals.len(), 1);
        assert_eq!(locals[0].sources, offsets(&[1]));
        assert_eq!(locals[0].sinks, offsets(&[3]));
        assert_eq!(locals[0].scope, offsets(&[2, 3]));
        assert!(locals[0].spanned_method_calls.is_empty());
    }

    #[test]
    fn rewrite_cuts_scope() {
        let locals = analyze(vec![
            (0, Instruction::LdcI4(1)),
            (1, Instruction::StLoc(0)),
            (2, Instruction::LdLoc(0)),
            (3, Instruction::Pop),
            (4, Instruction::LdcI4(2)),
            (5, Instruction::StLoc(0)),
            (6, Instruction::LdLoc(0)),
            (7, Instruction::Pop),
            (8, Instruction::Ret),
        ]);
        assert_eq!(locals[0].scope, offsets(&[2, 6]));
    }

    #[test]
    fn read_without_write_reaches_entry() {
        let locals = analyze(vec![
            (0, Instruction::Nop),
            (1, Instruction::LdLoc(1)),
            (2, Instruction::Pop),
            (3, Instruction::Ret),
        ]);
        assert_eq!(locals.len(), 2);
        assert!(!locals[0].is_live());
        assert_eq!(locals[1].scope, offsets(&[0, 1]));
    }

    #[test]
    fn address_taken_keeps_rest_alive() {
        let locals = analyze(vec![
            (0, Instruction::LdLocA(0)),
            (2, Instruction::Pop),
            (3, Instruction::Call(crate::metadata::MethodId(0))),
            (8, Instruction::Ret),
        ]);
        assert_eq!(locals[0].address_sources, offsets(&[0]));
        assert_eq!(locals[0].scope, offsets(&[0, 2, 3, 8]));
        assert_eq!(locals[0].spanned_method_calls, offsets(&[3]));
    }

    #[test]
    fn disjoint_scopes_can_share() {
        let locals = analyze(vec![
            (0, Instruction::LdcI4(1)),
            (1, Instruction::StLoc(0)),
            (2, Instruction::LdLoc(0)),
            (3, Instruction::StLoc(1)),
            (4, Instruction::LdLoc(1)),
            (5, Instruction::Ret),
        ]);
        assert!(!locals[0].overlaps(&locals[1]));
    }

    #[test]
    fn no_locals() {
        assert!(analyze(vec![(0, Instruction::Ret)]).is_empty());
    }
}
