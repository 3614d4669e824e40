use super::{Error, Instruction};
use crate::metadata::TypeId;
use crate::util::Offset;
use std::collections::BTreeSet;

/// Instruction along with the byte offset that identifies it in its method
#[derive(Clone, Debug, PartialEq)]
pub struct BytecodeInstruction {
    pub offset: Offset,
    pub instruction: Instruction<Offset>,
}

impl BytecodeInstruction {
    pub fn new(offset: Offset, instruction: Instruction<Offset>) -> BytecodeInstruction {
        BytecodeInstruction {
            offset,
            instruction,
        }
    }

    /// Is this a branch to a strictly greater offset?
    pub fn is_forward_jump(&self) -> bool {
        matches!(self.instruction.branch_target(), Some(target) if *target > self.offset)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum HandlerKind {
    /// Catches exceptions of the given type (the exception is pushed on handler entry)
    Catch(TypeId),
    Finally,
    Fault,
}

/// Protected region and its handler, both as half-open offset ranges
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ExceptionHandler {
    pub kind: HandlerKind,
    pub try_start: Offset,
    pub try_end: Offset,
    pub handler_start: Offset,
    pub handler_end: Offset,
}

impl ExceptionHandler {
    /// Does the handler start with the exception value on the stack?
    pub fn pushes_exception(&self) -> bool {
        matches!(self.kind, HandlerKind::Catch(_))
    }

    pub fn catch_type(&self) -> Option<TypeId> {
        match self.kind {
            HandlerKind::Catch(ty) => Some(ty),
            HandlerKind::Finally | HandlerKind::Fault => None,
        }
    }
}

/// Immutable body of a method, as produced by the front end
///
/// Instructions are kept in strictly increasing offset order (gaps are allowed), so lookups by
/// offset are binary searches.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct MethodBody {
    instructions: Vec<BytecodeInstruction>,
    local_count: usize,
    exception_handlers: Vec<ExceptionHandler>,
}

impl MethodBody {
    /// Validate and assemble a method body
    ///
    /// The local variable count is grown to cover every local index that an instruction
    /// references, so `declared_locals` may be left at zero.
    pub fn new(
        instructions: Vec<BytecodeInstruction>,
        declared_locals: usize,
        exception_handlers: Vec<ExceptionHandler>,
    ) -> Result<MethodBody, Error> {
        for pair in instructions.windows(2) {
            if pair[0].offset >= pair[1].offset {
                return Err(Error::NonMonotonicOffset {
                    previous: pair[0].offset,
                    next: pair[1].offset,
                });
            }
        }

        for handler in &exception_handlers {
            for (start, end) in [
                (handler.try_start, handler.try_end),
                (handler.handler_start, handler.handler_end),
            ] {
                if start >= end {
                    return Err(Error::InvalidHandlerRange { start, end });
                }
            }
            let handler_start = handler.handler_start;
            if instructions
                .binary_search_by_key(&handler_start, |insn| insn.offset)
                .is_err()
            {
                return Err(Error::UnknownHandlerStart(handler_start));
            }
        }

        let referenced_locals = instructions
            .iter()
            .filter_map(|insn| match insn.instruction {
                Instruction::LdLoc(idx) | Instruction::LdLocA(idx) | Instruction::StLoc(idx) => {
                    Some(idx as usize + 1)
                }
                _ => None,
            })
            .max()
            .unwrap_or(0);

        Ok(MethodBody {
            instructions,
            local_count: declared_locals.max(referenced_locals),
            exception_handlers,
        })
    }

    pub fn instructions(&self) -> &[BytecodeInstruction] {
        &self.instructions
    }

    pub fn local_count(&self) -> usize {
        self.local_count
    }

    pub fn exception_handlers(&self) -> &[ExceptionHandler] {
        &self.exception_handlers
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Index of the instruction at exactly this offset
    pub fn index_of(&self, offset: Offset) -> Option<usize> {
        self.instructions
            .binary_search_by_key(&offset, |insn| insn.offset)
            .ok()
    }

    pub fn get(&self, offset: Offset) -> Option<&BytecodeInstruction> {
        self.index_of(offset).map(|idx| &self.instructions[idx])
    }

    /// Offsets at which a catch handler starts (and so the exception value gets pushed)
    pub fn catch_handler_entries(&self) -> BTreeSet<Offset> {
        self.exception_handlers
            .iter()
            .filter(|handler| handler.pushes_exception())
            .map(|handler| handler.handler_start)
            .collect()
    }
}
