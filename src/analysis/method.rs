use super::{
    analyze_locals, analyze_stack, ControlFlowGraph, Error, LocalVariableAnalysis,
    PersistentStack, Settings, Sink,
};
use crate::il::{BytecodeInstruction, Instruction};
use crate::metadata::{MethodId, ProgramMetadata};
use crate::util::Offset;
use std::collections::{BTreeMap, BTreeSet};

/// Everything the emitter needs to know about one method
///
/// Instructions are borrowed from the metadata the method was analyzed against.
#[derive(Clone, Debug, PartialEq)]
pub struct MethodAnalysis<'p> {
    pub method: MethodId,

    /// Analyzed instructions (empty for compiler-generated methods and methods without a body)
    pub instructions: &'p [BytecodeInstruction],

    pub is_compiler_generated: bool,

    pub source_sink_map: BTreeMap<Offset, Sink>,
    pub discontinuity_map: BTreeMap<Offset, Option<Offset>>,

    /// Stack after each instruction (only if [`Settings::retain_stack_snapshots`])
    pub stack_snapshots: Option<BTreeMap<Offset, PersistentStack>>,

    pub flow_graph: ControlFlowGraph,
    pub local_variables: Vec<LocalVariableAnalysis>,

    /// Parameters that are reassigned or have their address taken
    pub non_inlineable_parameters: BTreeSet<u16>,

    /// Locals whose address is taken
    pub non_register_locals: BTreeSet<u16>,

    /// Call-shaped instructions (`call`, `callvirt`, `newobj`)
    pub method_calls: BTreeSet<Offset>,
}

impl<'p> MethodAnalysis<'p> {
    /// Analysis with no instructions
    pub fn empty(method: MethodId, is_compiler_generated: bool) -> MethodAnalysis<'p> {
        MethodAnalysis {
            method,
            instructions: &[],
            is_compiler_generated,
            source_sink_map: BTreeMap::new(),
            discontinuity_map: BTreeMap::new(),
            stack_snapshots: Some(BTreeMap::new()),
            flow_graph: ControlFlowGraph::default(),
            local_variables: vec![],
            non_inlineable_parameters: BTreeSet::new(),
            non_register_locals: BTreeSet::new(),
            method_calls: BTreeSet::new(),
        }
    }

    /// Methods called by this method, in order of first call
    pub fn callees(&self) -> impl Iterator<Item = MethodId> + 'p {
        let instructions: &'p [BytecodeInstruction] = self.instructions;
        instructions
            .iter()
            .filter_map(|insn| insn.instruction.method_operand())
    }

    /// Consumer of the value pushed by the instruction at `offset`
    pub fn sink_of(&self, offset: Offset) -> Option<Sink> {
        self.source_sink_map.get(&offset).copied()
    }

    /// Producers whose value is consumed by the instruction at `offset`
    pub fn sources_of(&self, offset: Offset) -> impl Iterator<Item = (Offset, usize)> + '_ {
        self.source_sink_map
            .iter()
            .filter(move |(_, sink)| sink.instruction == offset)
            .map(|(source, sink)| (*source, sink.operand))
    }
}

/// Analyze one method in isolation
pub fn analyze_method<'p, M: ProgramMetadata + ?Sized>(
    metadata: &'p M,
    method: MethodId,
    settings: &Settings,
) -> Result<MethodAnalysis<'p>, Error> {
    let method_data = metadata.method(method);
    let empty = |is_compiler_generated| {
        let mut analysis = MethodAnalysis::empty(method, is_compiler_generated);
        if !settings.retain_stack_snapshots {
            analysis.stack_snapshots = None;
        }
        analysis
    };

    if metadata.is_compiler_generated(method) {
        log::debug!("skipping compiler-generated {}", method_data.name);
        return Ok(empty(true));
    }
    let body = match metadata.method_body(method) {
        Some(body) => body,
        None => {
            log::debug!("{} has no body", method_data.name);
            return Ok(empty(false));
        }
    };

    let mut non_inlineable_parameters = BTreeSet::new();
    let mut non_register_locals = BTreeSet::new();
    let mut method_calls = BTreeSet::new();
    for insn in body.instructions() {
        match insn.instruction {
            Instruction::StArg(idx) | Instruction::LdArgA(idx) => {
                non_inlineable_parameters.insert(idx);
            }
            Instruction::LdLocA(idx) => {
                non_register_locals.insert(idx);
            }
            Instruction::Call(_) | Instruction::CallVirt(_) | Instruction::NewObj(_) => {
                method_calls.insert(insn.offset);
            }
            _ => (),
        }
    }

    let flow_graph = ControlFlowGraph::build(body)?;
    let local_variables = analyze_locals(body, &flow_graph, &method_calls);
    let stack = analyze_stack(metadata, method_data, body)?;

    log::debug!(
        "analyzed {} ({} instructions, {} edges, {} locals, {} discontinuities)",
        method_data.name,
        body.instructions().len(),
        flow_graph.edge_count(),
        local_variables.len(),
        stack.discontinuity_map.len(),
    );

    Ok(MethodAnalysis {
        method,
        instructions: body.instructions(),
        is_compiler_generated: false,
        source_sink_map: stack.source_sink_map,
        discontinuity_map: stack.discontinuity_map,
        stack_snapshots: if settings.retain_stack_snapshots {
            Some(stack.stack_snapshots)
        } else {
            None
        },
        flow_graph,
        local_variables,
        non_inlineable_parameters,
        non_register_locals,
        method_calls,
    })
}
