use crate::il::{BytecodeInstruction, Instruction, MethodBody};
use crate::metadata::{MethodId, ProgramMetadata, TypeId};
use std::collections::{BTreeMap, BTreeSet};

/// Collects the types a program needs, along with the types whose static initializer must run
///
/// Both sets only ever grow. Adding a type also adds its whole base type chain.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TypeWalker {
    types: BTreeSet<TypeId>,

    /// Types to initialize, along with their static constructor (if they have one)
    initialized_types: BTreeMap<TypeId, Option<MethodId>>,
}

impl TypeWalker {
    pub fn new() -> TypeWalker {
        TypeWalker::default()
    }

    /// Add a type and its base types
    pub fn add_type<M: ProgramMetadata + ?Sized>(&mut self, metadata: &M, ty: TypeId) {
        let mut next = Some(ty);
        while let Some(ty) = next {
            if !self.types.insert(ty) {
                break; // base chain already added
            }
            log::trace!("reachable type {}", metadata.type_data(ty).name);
            next = metadata.type_data(ty).base;
        }
    }

    /// Schedule the static initializer of a type
    ///
    /// Returns the static constructor the first time a type is scheduled (so it can be analyzed),
    /// and `None` afterwards or if the type has no static constructor.
    pub fn add_type_initializer<M: ProgramMetadata + ?Sized>(
        &mut self,
        metadata: &M,
        ty: TypeId,
    ) -> Option<MethodId> {
        if self.initialized_types.contains_key(&ty) {
            return None;
        }
        let static_constructor = metadata.static_constructor_of(ty);
        self.initialized_types.insert(ty, static_constructor);
        static_constructor
    }

    /// Add the types an instruction refers to
    ///
    /// Returns a static constructor to analyze, if the instruction is the first access to a
    /// static field of a type with a static initializer.
    pub fn scan_instruction<M: ProgramMetadata + ?Sized>(
        &mut self,
        metadata: &M,
        insn: &BytecodeInstruction,
    ) -> Option<MethodId> {
        match &insn.instruction {
            // Field tokens don't require the field to exist at runtime
            Instruction::LdTokenField(_) => None,

            Instruction::LdStr(_) => {
                self.add_type(metadata, metadata.string_type());
                None
            }

            Instruction::NewArr(element) => {
                self.add_type(metadata, *element);
                self.add_type(metadata, metadata.array_type_of(*element));
                None
            }

            other => {
                if let Some(ty) = other.type_operand() {
                    self.add_type(metadata, ty);
                }

                let field = metadata.field(other.field_operand()?);
                self.add_type(metadata, field.declaring_type);
                if field.is_static() {
                    self.add_type_initializer(metadata, field.declaring_type)
                } else {
                    None
                }
            }
        }
    }

    /// Add the types a method body refers to outside of its instructions
    pub fn scan_exception_handlers<M: ProgramMetadata + ?Sized>(
        &mut self,
        metadata: &M,
        body: &MethodBody,
    ) {
        for handler in body.exception_handlers() {
            if let Some(ty) = handler.catch_type() {
                self.add_type(metadata, ty);
            }
        }
    }

    pub fn types(&self) -> &BTreeSet<TypeId> {
        &self.types
    }

    pub fn initialized_types(&self) -> &BTreeMap<TypeId, Option<MethodId>> {
        &self.initialized_types
    }

    pub fn into_parts(self) -> (BTreeSet<TypeId>, BTreeMap<TypeId, Option<MethodId>>) {
        (self.types, self.initialized_types)
    }
}
