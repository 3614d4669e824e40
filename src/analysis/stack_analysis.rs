use super::{Error, PersistentStack, StackValueSet};
use crate::il::{BytecodeInstruction, Instruction, MethodBody, StackEffect};
use crate::metadata::{MethodData, ProgramMetadata};
use crate::util::Offset;
use std::collections::{BTreeMap, BTreeSet};

/// Instruction consuming a value, along with the operand position the value fills
///
/// Operands are numbered left to right in the order they were pushed. For calls, the receiver
/// (if any) is operand `0` and arguments follow it.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct Sink {
    pub instruction: Offset,
    pub operand: usize,
}

/// Result of simulating the operand stack through a method
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StackAnalysis {
    /// Consumer of the value pushed by each producer
    ///
    /// When a producer's value reaches several consumers along different paths, the consumer
    /// latest in the method wins.
    pub source_sink_map: BTreeMap<Offset, Sink>,

    /// Instructions following an unconditional transfer, along with a forward jump into them
    /// (or `None` if they can only be reached by jumping backwards)
    pub discontinuity_map: BTreeMap<Offset, Option<Offset>>,

    /// Stack right after each instruction
    pub stack_snapshots: BTreeMap<Offset, PersistentStack>,
}

/// Simulate the abstract operand stack through every instruction of a method, in offset order
///
/// `method` is the metadata of the method owning the body (needed to know what `ret` pops).
pub fn analyze_stack<M: ProgramMetadata + ?Sized>(
    metadata: &M,
    method: &MethodData,
    body: &MethodBody,
) -> Result<StackAnalysis, Error> {
    let mut simulator = StackSimulator {
        metadata,
        returns_value: method.returns_value(),
        catch_handler_entries: body.catch_handler_entries(),
        forward_jump_sources: BTreeMap::new(),
        stack: PersistentStack::new(),
        follows_discontinuity: false,
        result: StackAnalysis::default(),
    };

    for insn in body.instructions() {
        if let Some(target) = insn.instruction.branch_target() {
            if body.index_of(*target).is_none() {
                return Err(Error::UnresolvedBranchTarget {
                    source: insn.offset,
                    target: *target,
                });
            }
        }
        simulator.step(insn)?;
    }

    Ok(simulator.result)
}

struct StackSimulator<'a, M: ?Sized> {
    metadata: &'a M,

    /// Does `ret` pop a value?
    returns_value: bool,

    catch_handler_entries: BTreeSet<Offset>,

    /// Instructions jumping forward to an offset, in the order they were encountered
    forward_jump_sources: BTreeMap<Offset, Vec<Offset>>,

    /// Stack before the instruction being processed
    stack: PersistentStack,

    /// Was the previous instruction an unconditional branch, a return, or a throw?
    follows_discontinuity: bool,

    result: StackAnalysis,
}

impl<'a, M: ProgramMetadata + ?Sized> StackSimulator<'a, M> {
    fn step(&mut self, insn: &BytecodeInstruction) -> Result<(), Error> {
        let offset = insn.offset;

        self.enter(offset)?;

        // The exception is on the stack when control reaches a catch handler
        if self.catch_handler_entries.contains(&offset) {
            self.stack = self.stack.push(StackValueSet::new());
        }

        match insn.instruction.stack_effect() {
            StackEffect::Fixed { pops, pushes } => {
                for operand in (0..pops).rev() {
                    self.pop_into(offset, operand)?;
                }
                for _ in 0..pushes {
                    self.push_from(offset);
                }
            }
            StackEffect::Variable => self.call_or_return(insn)?,
        }

        if let Instruction::Leave(_) = insn.instruction {
            self.stack = PersistentStack::new();
        }

        if insn.is_forward_jump() {
            if let Some(target) = insn.instruction.branch_target() {
                self.forward_jump_sources
                    .entry(*target)
                    .or_default()
                    .push(offset);
            }
        }

        self.follows_discontinuity = insn.instruction.flow_control().is_discontinuous();

        log::trace!("{} {:?} -> {:?}", offset, insn.instruction, self.stack);
        self.result
            .stack_snapshots
            .insert(offset, self.stack.clone());
        Ok(())
    }

    /// Work out the stack on entry to an instruction
    fn enter(&mut self, offset: Offset) -> Result<(), Error> {
        if let Some(jump_sources) = self.forward_jump_sources.get(&offset) {
            let mut candidates = vec![];
            if self.follows_discontinuity {
                // Fall-through is impossible, so the stack comes only from the jumps
                self.result
                    .discontinuity_map
                    .insert(offset, jump_sources.first().copied());
            } else {
                candidates.push(self.stack.clone());
            }
            candidates.extend(
                jump_sources
                    .iter()
                    .filter_map(|source| self.result.stack_snapshots.get(source))
                    .cloned(),
            );

            let mut candidates = candidates.into_iter();
            let mut merged = candidates.next().unwrap_or_default();
            for candidate in candidates {
                merged = match merged.merge(&candidate) {
                    Some(merged) => merged,
                    None => {
                        let depths = (merged.depth(), candidate.depth());
                        log::error!(
                            "cannot reconcile stacks at {}: depths {} and {}",
                            offset,
                            depths.0,
                            depths.1
                        );
                        return Err(Error::StackReconciliationFailure { offset, depths });
                    }
                };
            }
            self.stack = merged;
        } else if self.follows_discontinuity {
            // Only reachable through a backwards jump, where the stack is assumed empty
            self.stack = PersistentStack::new();
            self.result.discontinuity_map.insert(offset, None);
        }

        self.follows_discontinuity = false;
        Ok(())
    }

    /// Pop the top of the stack, recording `offset` as the sink of its producers
    fn pop_into(&mut self, offset: Offset, operand: usize) -> Result<(), Error> {
        let (producers, below) = match self.stack.pop() {
            Some(popped) => popped,
            None => {
                log::error!("stack underflow at {}", offset);
                return Err(Error::StackUnderflow { offset });
            }
        };

        let sink = Sink {
            instruction: offset,
            operand,
        };
        for producer in producers {
            self.result.source_sink_map.insert(*producer, sink);
        }
        self.stack = below;
        Ok(())
    }

    fn push_from(&mut self, offset: Offset) {
        let producers: StackValueSet = [offset].into_iter().collect();
        self.stack = self.stack.push(producers);
    }

    fn call_or_return(&mut self, insn: &BytecodeInstruction) -> Result<(), Error> {
        let offset = insn.offset;

        let (callee, is_newobj) = match &insn.instruction {
            Instruction::Ret => {
                if self.returns_value {
                    self.pop_into(offset, 0)?;
                }
                return Ok(());
            }
            Instruction::NewObj(callee) => (*callee, true),
            other => match other.method_operand() {
                Some(callee) => (callee, false),
                None => return Ok(()),
            },
        };

        let metadata = self.metadata;
        let callee = metadata.method(callee);
        let receiver_slots = if callee.is_static() { 0 } else { 1 };

        // Arguments are on top of the stack, last argument topmost
        for parameter in (0..callee.parameter_count()).rev() {
            self.pop_into(offset, parameter + receiver_slots)?;
        }
        if !callee.is_static() && !is_newobj {
            self.pop_into(offset, 0)?;
        }

        // `newobj` always produces the constructed object
        if is_newobj || callee.returns_value() {
            self.push_from(offset);
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::il::{ExceptionHandler, HandlerKind};
    use crate::metadata::{MethodFlags, ProgramGraph, TypeId};

    fn body(instructions: Vec<(usize, Instruction<Offset>)>) -> MethodBody {
        body_with_handlers(instructions, vec![])
    }

    fn body_with_handlers(
        instructions: Vec<(usize, Instruction<Offset>)>,
        handlers: Vec<ExceptionHandler>,
    ) -> MethodBody {
        let instructions = instructions
            .into_iter()
            .map(|(off, insn)| BytecodeInstruction::new(Offset(off), insn))
            .collect();
        MethodBody::new(instructions, 0, handlers).unwrap()
    }

    fn sink(instruction: usize, operand: usize) -> Sink {
        Sink {
            instruction: Offset(instruction),
            operand,
        }
    }

    fn static_method(graph: &ProgramGraph, params: usize, returns: bool) -> MethodData {
        let object = graph.object_type();
        MethodData::new(
            object,
            "M",
            vec![object; params],
            if returns { Some(object) } else { None },
            MethodFlags::STATIC,
        )
    }

    #[test]
    fn straight_line() {
        let graph = ProgramGraph::new();
        let method = static_method(&graph, 0, true);
        let body = body(vec![
            (0, Instruction::LdcI4(1)),
            (1, Instruction::LdcI4(2)),
            (2, Instruction::Sub),
            (3, Instruction::Ret),
        ]);
        let analysis = analyze_stack(&graph, &method, &body).unwrap();

        assert_eq!(analysis.source_sink_map[&Offset(0)], sink(2, 0));
        assert_eq!(analysis.source_sink_map[&Offset(1)], sink(2, 1));
        assert_eq!(analysis.source_sink_map[&Offset(2)], sink(3, 0));
        assert!(analysis.discontinuity_map.is_empty());
        assert_eq!(analysis.stack_snapshots[&Offset(1)].depth(), 2);
        assert_eq!(analysis.stack_snapshots[&Offset(3)].depth(), 0);
    }

    #[test]
    fn void_return_pops_nothing() {
        let graph = ProgramGraph::new();
        let method = static_method(&graph, 0, false);
        let body = body(vec![(0, Instruction::LdcI4(1)), (1, Instruction::Ret)]);
        let analysis = analyze_stack(&graph, &method, &body).unwrap();
        assert!(analysis.source_sink_map.is_empty());
        assert_eq!(analysis.stack_snapshots[&Offset(1)].depth(), 1);
    }

    #[test]
    fn calls_record_operand_positions() {
        let graph = ProgramGraph::new();
        let ty = graph.add_class("Vector");
        let object = graph.object_type();
        let instance = graph.add_method(MethodData::new(
            ty,
            "Scale",
            vec![object, object],
            Some(object),
            MethodFlags::empty(),
        ));
        let ctor = graph.add_method(MethodData::new(
            ty,
            ".ctor",
            vec![object],
            None,
            MethodFlags::CONSTRUCTOR,
        ));
        let method = static_method(&graph, 0, false);
        let body = body(vec![
            (0, Instruction::LdNull),
            (1, Instruction::LdcI4(1)),
            (2, Instruction::LdcI4(2)),
            (3, Instruction::CallVirt(instance)),
            (8, Instruction::NewObj(ctor)),
            (13, Instruction::Pop),
            (14, Instruction::Ret),
        ]);
        let analysis = analyze_stack(&graph, &method, &body).unwrap();

        assert_eq!(analysis.source_sink_map[&Offset(0)], sink(3, 0), "receiver");
        assert_eq!(analysis.source_sink_map[&Offset(1)], sink(3, 1));
        assert_eq!(analysis.source_sink_map[&Offset(2)], sink(3, 2));
        assert_eq!(analysis.source_sink_map[&Offset(3)], sink(8, 1));
        assert_eq!(analysis.source_sink_map[&Offset(8)], sink(13, 0));
        assert_eq!(analysis.stack_snapshots[&Offset(14)].depth(), 0);
    }

    #[test]
    fn merge_at_forward_jump_target() {
        let graph = ProgramGraph::new();
        let method = static_method(&graph, 1, true);
        // if (arg0) 2 else 1, then + 10
        let body = body(vec![
            (0, Instruction::LdArg(0)),
            (1, Instruction::BrTrue(Offset(12))),
            (6, Instruction::LdcI4(1)),
            (7, Instruction::Br(Offset(13))),
            (12, Instruction::LdcI4(2)),
            (13, Instruction::LdcI4(10)),
            (15, Instruction::Add),
            (16, Instruction::Ret),
        ]);
        let analysis = analyze_stack(&graph, &method, &body).unwrap();

        assert_eq!(analysis.source_sink_map[&Offset(6)], sink(15, 0));
        assert_eq!(analysis.source_sink_map[&Offset(12)], sink(15, 0));
        assert_eq!(analysis.source_sink_map[&Offset(13)], sink(15, 1));
        assert_eq!(
            analysis.discontinuity_map.get(&Offset(12)),
            Some(&Some(Offset(1)))
        );
        assert!(!analysis.discontinuity_map.contains_key(&Offset(13)));
    }

    #[test]
    fn jumps_into_discontinuity_ignore_fall_through() {
        let graph = ProgramGraph::new();
        let method = static_method(&graph, 1, true);
        let body = body(vec![
            (0, Instruction::LdcI4(1)),
            (1, Instruction::LdArg(0)),
            (2, Instruction::BrTrue(Offset(20))),
            (7, Instruction::Pop),
            (8, Instruction::LdcI4(2)),
            (9, Instruction::Br(Offset(20))),
            (14, Instruction::LdcI4(3)),
            (15, Instruction::LdcI4(4)),
            (16, Instruction::LdcI4(5)),
            (17, Instruction::Ret),
            (20, Instruction::Ret),
        ]);
        let analysis = analyze_stack(&graph, &method, &body).unwrap();

        // Falling into 20 would leave two values, but only the jumps reach it
        assert_eq!(analysis.stack_snapshots[&Offset(17)].depth(), 2);
        let expected: BTreeMap<Offset, Option<Offset>> =
            [(Offset(14), None), (Offset(20), Some(Offset(2)))]
                .into_iter()
                .collect();
        assert_eq!(analysis.discontinuity_map, expected);

        assert_eq!(analysis.source_sink_map[&Offset(1)], sink(2, 0));
        assert_eq!(analysis.source_sink_map[&Offset(0)], sink(20, 0));
        assert_eq!(analysis.source_sink_map[&Offset(8)], sink(20, 0));
        assert_eq!(analysis.source_sink_map[&Offset(16)], sink(17, 0));
        assert_eq!(analysis.stack_snapshots[&Offset(20)].depth(), 0);
    }

    #[test]
    fn backward_only_region_starts_empty() {
        let graph = ProgramGraph::new();
        let method = static_method(&graph, 0, false);
        let body = body(vec![
            (0, Instruction::LdcI4(1)),
            (1, Instruction::Br(Offset(8))),
            (6, Instruction::LdcI4(2)),
            (7, Instruction::Ret),
            (8, Instruction::Pop),
            (9, Instruction::Br(Offset(6))),
        ]);
        let analysis = analyze_stack(&graph, &method, &body).unwrap();

        assert_eq!(analysis.discontinuity_map.get(&Offset(6)), Some(&None));
        assert_eq!(
            analysis.discontinuity_map.get(&Offset(8)),
            Some(&Some(Offset(1)))
        );
        assert_eq!(analysis.source_sink_map[&Offset(0)], sink(8, 0));
        assert_eq!(analysis.stack_snapshots[&Offset(6)].depth(), 1);
    }

    #[test]
    fn depth_mismatch_is_fatal() {
        let graph = ProgramGraph::new();
        let method = static_method(&graph, 1, false);
        let body = body(vec![
            (0, Instruction::LdArg(0)),
            (1, Instruction::BrTrue(Offset(7))),
            (6, Instruction::LdNull),
            (7, Instruction::Ret),
        ]);
        assert_eq!(
            analyze_stack(&graph, &method, &body),
            Err(Error::StackReconciliationFailure {
                offset: Offset(7),
                depths: (1, 0)
            })
        );
    }

    #[test]
    fn underflow_is_fatal() {
        let graph = ProgramGraph::new();
        let method = static_method(&graph, 0, false);
        let body = body(vec![(0, Instruction::Pop), (1, Instruction::Ret)]);
        assert_eq!(
            analyze_stack(&graph, &method, &body),
            Err(Error::StackUnderflow { offset: Offset(0) })
        );
    }

    #[test]
    fn catch_handler_pushes_unknown_producer() {
        let graph = ProgramGraph::new();
        let method = static_method(&graph, 0, false);
        let body = body_with_handlers(
            vec![
                (0, Instruction::Nop),
                (1, Instruction::Leave(Offset(8))),
                (6, Instruction::Pop),
                (7, Instruction::EndFinally),
                (8, Instruction::Ret),
            ],
            vec![ExceptionHandler {
                kind: HandlerKind::Catch(TypeId(0)),
                try_start: Offset(0),
                try_end: Offset(6),
                handler_start: Offset(6),
                handler_end: Offset(8),
            }],
        );
        let analysis = analyze_stack(&graph, &method, &body).unwrap();

        // The exception has no producer, so nothing maps to the `pop`
        assert!(analysis.source_sink_map.is_empty());
        assert_eq!(analysis.discontinuity_map.get(&Offset(6)), Some(&None));
        assert_eq!(
            analysis.discontinuity_map.get(&Offset(8)),
            Some(&Some(Offset(1)))
        );
        assert_eq!(analysis.stack_snapshots[&Offset(6)].depth(), 0);
    }

    #[test]
    fn leave_empties_the_stack() {
        let graph = ProgramGraph::new();
        let method = static_method(&graph, 0, false);
        let body = body(vec![
            (0, Instruction::LdcI4(3)),
            (1, Instruction::Leave(Offset(6))),
            (6, Instruction::Ret),
        ]);
        let analysis = analyze_stack(&graph, &method, &body).unwrap();
        assert!(analysis.stack_snapshots[&Offset(1)].is_empty());
        assert!(analysis.source_sink_map.is_empty());
    }

    #[test]
    fn unresolved_branch_target() {
        let graph = ProgramGraph::new();
        let method = static_method(&graph, 0, false);
        let body = body(vec![(0, Instruction::Br(Offset(2))), (5, Instruction::Ret)]);
        assert_eq!(
            analyze_stack(&graph, &method, &body),
            Err(Error::UnresolvedBranchTarget {
                source: Offset(0),
                target: Offset(2)
            })
        );
    }
}
