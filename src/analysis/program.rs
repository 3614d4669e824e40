use super::{analyze_method, CallGraph, Error, MethodAnalysis, Settings, TypeWalker};
use crate::metadata::{MethodId, ProgramMetadata, TypeId};
use std::collections::{BTreeMap, BTreeSet};

/// Analysis of every method reachable from an entry point
#[derive(Clone, Debug)]
pub struct ProgramAnalysis<'p> {
    pub entry: MethodId,

    /// Analyses of all reachable methods
    pub methods: BTreeMap<MethodId, MethodAnalysis<'p>>,

    /// Order in which methods were analyzed
    pub visit_order: Vec<MethodId>,

    /// Number of call sites of each called method (the entry counts as called once)
    pub call_counts: BTreeMap<MethodId, usize>,

    /// Methods that must be emitted as standalone code
    pub non_inlined_methods: BTreeSet<MethodId>,

    /// Reachable methods marked always-inline
    pub inlined_methods: BTreeSet<MethodId>,

    /// Types that must exist at runtime
    pub types: BTreeSet<TypeId>,

    /// Types whose static initializer must run, along with their static constructor
    pub initialized_types: BTreeMap<TypeId, Option<MethodId>>,
}

impl<'p> ProgramAnalysis<'p> {
    pub fn method(&self, method: MethodId) -> Option<&MethodAnalysis<'p>> {
        self.methods.get(&method)
    }

    pub fn is_reachable(&self, method: MethodId) -> bool {
        self.methods.contains_key(&method)
    }
}

/// Analyze every method reachable from `entry`
///
/// Methods are analyzed one at a time off a work list. Scanning a method schedules its callees
/// and the static constructors of the types whose static fields it touches. The first error
/// aborts the whole analysis.
pub fn analyze_program<'p, M: ProgramMetadata + ?Sized>(
    metadata: &'p M,
    entry: MethodId,
    settings: &Settings,
) -> Result<ProgramAnalysis<'p>, Error> {
    let mut types = TypeWalker::new();
    let mut calls = CallGraph::new(entry);
    let mut methods = BTreeMap::new();

    if settings.include_runtime_type {
        types.add_type(metadata, metadata.runtime_type_type());
    }

    while let Some(method) = calls.next_method() {
        let method_data = metadata.method(method);
        types.add_type(metadata, method_data.declaring_type);
        if metadata.is_always_inline(method) {
            calls.mark_inline(method);
        }

        let analysis = match analyze_method(metadata, method, settings) {
            Ok(analysis) => analysis,
            Err(err) => {
                log::error!("failed to analyze {} ({}): {}", method_data.name, method, err);
                return Err(err);
            }
        };

        for insn in analysis.instructions {
            if let Some(static_constructor) = types.scan_instruction(metadata, insn) {
                calls.enqueue(static_constructor);
            }
            if let Some(callee) = insn.instruction.method_operand() {
                calls.record_call(callee);
            }
        }
        if !analysis.is_compiler_generated {
            if let Some(body) = metadata.method_body(method) {
                types.scan_exception_handlers(metadata, body);
            }
        }

        methods.insert(method, analysis);
    }

    let non_inlined_methods = calls.non_inlined_methods();
    let (types, initialized_types) = types.into_parts();
    log::info!(
        "analyzed {} methods ({} standalone), {} types ({} initialized)",
        methods.len(),
        non_inlined_methods.len(),
        types.len(),
        initialized_types.len()
    );

    Ok(ProgramAnalysis {
        entry,
        methods,
        visit_order: calls.visit_order().to_vec(),
        call_counts: calls.call_counts().clone(),
        non_inlined_methods,
        inlined_methods: calls.inlined_methods().clone(),
        types,
        initialized_types,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::il::{Instruction, MethodBodyBuilder};
    use crate::metadata::{FieldData, FieldFlags, MethodData, MethodFlags, ProgramGraph};

    #[test]
    fn static_constructor_is_analyzed_once() {
        let graph = ProgramGraph::new();
        let program = graph.add_class("Program");
        let config = graph.add_class("Config");
        let main = graph.add_method(MethodData::new(
            program,
            "Main",
            vec![],
            None,
            MethodFlags::STATIC,
        ));
        let cctor = graph.add_method(MethodData::new(
            config,
            ".cctor",
            vec![],
            None,
            MethodFlags::TYPE_INITIALIZER,
        ));
        let value = graph.add_field(FieldData {
            declaring_type: config,
            name: "Value".to_owned(),
            field_type: graph.object_type(),
            flags: FieldFlags::STATIC,
        });

        let mut builder = MethodBodyBuilder::new();
        builder.push(Instruction::LdSFld(value));
        builder.push(Instruction::Pop);
        builder.push(Instruction::Call(cctor));
        builder.push(Instruction::Ret);
        graph.set_body(main, builder.result().unwrap());

        let mut builder = MethodBodyBuilder::new();
        builder.push(Instruction::LdNull);
        builder.push(Instruction::StSFld(value));
        builder.push(Instruction::Ret);
        graph.set_body(cctor, builder.result().unwrap());

        let analysis = analyze_program(&graph, main, &Settings::new()).unwrap();
        assert_eq!(analysis.visit_order, vec![main, cctor]);
        assert_eq!(analysis.call_counts.get(&cctor), Some(&1));
        assert_eq!(analysis.initialized_types.get(&config), Some(&Some(cctor)));
        assert!(analysis.types.contains(&config));
        assert!(analysis.types.contains(&graph.runtime_type_type()));
    }

    #[test]
    fn runtime_type_is_optional() {
        let graph = ProgramGraph::new();
        let program = graph.add_class("Program");
        let main = graph.add_method(MethodData::new(
            program,
            "Main",
            vec![],
            None,
            MethodFlags::STATIC,
        ));

        let settings = Settings {
            include_runtime_type: false,
            ..Settings::new()
        };
        let analysis = analyze_program(&graph, main, &settings).unwrap();
        let expected: BTreeSet<TypeId> = [graph.object_type(), program].into_iter().collect();
        assert_eq!(analysis.types, expected);
        assert!(analysis.method(main).is_some(), "bodiless methods are still recorded");
    }
}
