use super::Error;
use crate::il::MethodBody;
use crate::util::Offset;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub enum EdgeKind {
    /// Control continues into the next instruction
    FallThrough,

    /// Control transfers to a branch target
    Branch,
}

/// Control-flow graph of one method, with instructions as vertices
///
/// Vertex `i` is the `i`-th instruction of the method body. Edges are kept in both directions so
/// the graph can be walked forwards and backwards. There is at most one edge between any two
/// vertices: a conditional branch to the very next instruction only gets its fall-through edge.
///
/// Exception handlers are not connected to their protected regions.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ControlFlowGraph {
    offsets: Vec<Offset>,
    successors: Vec<Vec<(usize, EdgeKind)>>,
    predecessors: Vec<Vec<(usize, EdgeKind)>>,
}

impl ControlFlowGraph {
    /// Build the graph of a method body
    ///
    /// Every instruction falls through into the next one unless it unconditionally branches,
    /// returns, or throws. Branches additionally get an edge to their target.
    pub fn build(body: &MethodBody) -> Result<ControlFlowGraph, Error> {
        let instructions = body.instructions();
        let mut graph = ControlFlowGraph {
            offsets: instructions.iter().map(|insn| insn.offset).collect(),
            successors: vec![vec![]; instructions.len()],
            predecessors: vec![vec![]; instructions.len()],
        };

        for (idx, insn) in instructions.iter().enumerate() {
            if !insn.instruction.flow_control().is_discontinuous() && idx + 1 < instructions.len() {
                graph.add_edge(idx, idx + 1, EdgeKind::FallThrough);
            }

            if let Some(target) = insn.instruction.branch_target() {
                let target_idx = body
                    .index_of(*target)
                    .ok_or(Error::UnresolvedBranchTarget {
                        source: insn.offset,
                        target: *target,
                    })?;
                graph.add_edge(idx, target_idx, EdgeKind::Branch);
            }
        }

        Ok(graph)
    }

    fn add_edge(&mut self, from: usize, to: usize, kind: EdgeKind) {
        if self.successors[from].iter().any(|(succ, _)| *succ == to) {
            return;
        }
        self.successors[from].push((to, kind));
        self.predecessors[to].push((from, kind));
    }

    pub fn vertex_count(&self) -> usize {
        self.offsets.len()
    }

    pub fn edge_count(&self) -> usize {
        self.successors.iter().map(Vec::len).sum()
    }

    /// Offset of the instruction at a vertex
    pub fn offset(&self, vertex: usize) -> Offset {
        self.offsets[vertex]
    }

    /// Vertex of the instruction at an offset
    pub fn vertex(&self, offset: Offset) -> Option<usize> {
        self.offsets.binary_search(&offset).ok()
    }

    pub(crate) fn successor_vertices(&self, vertex: usize) -> impl Iterator<Item = usize> + '_ {
        self.successors[vertex].iter().map(|(succ, _)| *succ)
    }

    pub(crate) fn predecessor_vertices(&self, vertex: usize) -> impl Iterator<Item = usize> + '_ {
        self.predecessors[vertex].iter().map(|(pred, _)| *pred)
    }

    /// Instructions that can execute right after the one at `offset`
    pub fn successors(&self, offset: Offset) -> Vec<(Offset, EdgeKind)> {
        self.vertex(offset)
            .map(|vertex| {
                self.successors[vertex]
                    .iter()
                    .map(|(succ, kind)| (self.offsets[*succ], *kind))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Instructions that can execute right before the one at `offset`
    pub fn predecessors(&self, offset: Offset) -> Vec<(Offset, EdgeKind)> {
        self.vertex(offset)
            .map(|vertex| {
                self.predecessors[vertex]
                    .iter()
                    .map(|(pred, kind)| (self.offsets[*pred], *kind))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// All edges as `(from, to, kind)`, ordered by source and then by insertion
    pub fn edges(&self) -> impl Iterator<Item = (Offset, Offset, EdgeKind)> + '_ {
        self.successors
            .iter()
            .enumerate()
            .flat_map(move |(from, succs)| {
                succs
                    .iter()
                    .map(move |(to, kind)| (self.offsets[from], self.offsets[*to], *kind))
            })
    }

    pub fn has_edge(&self, from: Offset, to: Offset) -> bool {
        self.successors(from).iter().any(|(succ, _)| *succ == to)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::il::{BytecodeInstruction, Instruction};

    fn body(instructions: Vec<(usize, Instruction<Offset>)>) -> MethodBody {
        let instructions = instructions
            .into_iter()
            .map(|(off, insn)| BytecodeInstruction::new(Offset(off), insn))
            .collect();
        MethodBody::new(instructions, 0, vec![]).unwrap()
    }

    #[test]
    fn conditional_branch_edges() {
        // 0: ldarg.0; 1: brfalse 11; 6: ldc.i4.1; 7: br 12; 11: ldc.i4.2 (dead); 12: ret
        let body = body(vec![
            (0, Instruction::LdArg(0)),
            (1, Instruction::BrFalse(Offset(11))),
            (6, Instruction::LdcI4(1)),
            (7, Instruction::Br(Offset(12))),
            (11, Instruction::LdcI4(2)),
            (12, Instruction::Ret),
        ]);
        let cfg = ControlFlowGraph::build(&body).unwrap();

        assert_eq!(cfg.vertex_count(), 6);
        assert_eq!(
            cfg.edges().collect::<Vec<_>>(),
            vec![
                (Offset(0), Offset(1), EdgeKind::FallThrough),
                (Offset(1), Offset(6), EdgeKind::FallThrough),
                (Offset(1), Offset(11), EdgeKind::Branch),
                (Offset(6), Offset(7), EdgeKind::FallThrough),
                (Offset(7), Offset(12), EdgeKind::Branch),
                (Offset(11), Offset(12), EdgeKind::FallThrough),
            ]
        );
        assert!(!cfg.has_edge(Offset(7), Offset(11)), "no fall-through after br");
        assert_eq!(
            cfg.predecessors(Offset(12)),
            vec![(Offset(7), EdgeKind::Branch), (Offset(11), EdgeKind::FallThrough)]
        );
    }

    #[test]
    fn terminators_cut_fall_through() {
        let body = body(vec![
            (0, Instruction::LdNull),
            (1, Instruction::Throw),
            (2, Instruction::Ret),
            (3, Instruction::Ret),
        ]);
        let cfg = ControlFlowGraph::build(&body).unwrap();
        assert_eq!(cfg.edge_count(), 1);
        assert!(cfg.predecessors(Offset(2)).is_empty());
        assert!(cfg.successors(Offset(2)).is_empty());
        assert!(cfg.successors(Offset(99)).is_empty());
    }

    #[test]
    fn branch_to_next_is_single_edge() {
        let body = body(vec![
            (0, Instruction::LdcI4(0)),
            (1, Instruction::BrTrue(Offset(6))),
            (6, Instruction::Ret),
        ]);
        let cfg = ControlFlowGraph::build(&body).unwrap();
        assert_eq!(cfg.successors(Offset(1)), vec![(Offset(6), EdgeKind::FallThrough)]);
    }

    #[test]
    fn backward_branch() {
        let body = body(vec![
            (0, Instruction::Nop),
            (1, Instruction::Br(Offset(0))),
        ]);
        let cfg = ControlFlowGraph::build(&body).unwrap();
        assert!(cfg.has_edge(Offset(1), Offset(0)));
        assert_eq!(cfg.vertex(Offset(1)), Some(1));
    }

    #[test]
    fn unresolved_target() {
        let body = body(vec![(0, Instruction::Br(Offset(3))), (5, Instruction::Ret)]);
        assert_eq!(
            ControlFlowGraph::build(&body),
            Err(Error::UnresolvedBranchTarget {
                source: Offset(0),
                target: Offset(3)
            })
        );
    }

    #[test]
    fn empty_body() {
        let cfg = ControlFlowGraph::build(&MethodBody::default()).unwrap();
        assert_eq!(cfg.vertex_count(), 0);
        assert_eq!(cfg.edges().count(), 0);
    }
}
