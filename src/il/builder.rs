use super::{
    BytecodeInstruction, Error, ExceptionHandler, HandlerKind, Instruction, LabelGenerator,
    MethodBody, SynLabel, SynLabelGenerator,
};
use crate::util::{Offset, OffsetVec};
use std::collections::{BTreeSet, HashMap};

/// Interface for building up method bodies top to bottom
///
/// Instructions refer to positions in the body using symbolic labels, so a forward branch can be
/// emitted before its target is known. Offsets are laid out from instruction widths as the
/// instructions are pushed, and labels are only resolved into offsets in [`Self::result`].
#[derive(Debug, Default)]
pub struct MethodBodyBuilder {
    /// Instructions pushed so far, with their offsets
    instructions: OffsetVec<Instruction<SynLabel>>,

    /// Labels which have been placed so far
    placed_labels: HashMap<SynLabel, Offset>,

    /// Handlers as (kind, try start, try end, handler start, handler end)
    exception_handlers: Vec<(HandlerKind, [SynLabel; 4])>,

    declared_locals: usize,

    label_generator: SynLabelGenerator,
}

impl MethodBodyBuilder {
    pub fn new() -> MethodBodyBuilder {
        MethodBodyBuilder::default()
    }

    /// Declare (at least) this many local variables
    pub fn declare_locals(&mut self, count: usize) {
        self.declared_locals = self.declared_locals.max(count);
    }

    /// Generate a fresh label
    pub fn fresh_label(&mut self) -> SynLabel {
        self.label_generator.fresh_label()
    }

    /// Offset at which the next instruction will be placed
    pub fn next_offset(&self) -> Offset {
        self.instructions.offset_len()
    }

    /// Push a new instruction and return its offset
    pub fn push(&mut self, instruction: Instruction<SynLabel>) -> Offset {
        self.instructions.push(instruction)
    }

    /// Bind a label to the offset of the next instruction
    pub fn place_label(&mut self, label: SynLabel) -> Result<Offset, Error> {
        let offset = self.next_offset();
        if self.placed_labels.insert(label, offset).is_some() {
            return Err(Error::DuplicateLabel(label));
        }
        Ok(offset)
    }

    /// Declare an exception handler
    ///
    /// Ranges are half-open: `try_end` and `handler_end` label the first instruction past the
    /// region (which may be the end of the body).
    pub fn add_exception_handler(
        &mut self,
        kind: HandlerKind,
        try_start: SynLabel,
        try_end: SynLabel,
        handler_start: SynLabel,
        handler_end: SynLabel,
    ) {
        self.exception_handlers
            .push((kind, [try_start, try_end, handler_start, handler_end]));
    }

    /// Resolve all labels and turn the builder into a method body
    pub fn result(self) -> Result<MethodBody, Error> {
        let placed_labels = self.placed_labels;

        // Weed out unplaced labels up front, so they can be reported all at once
        let unplaced_labels: BTreeSet<SynLabel> = self
            .instructions
            .iter()
            .filter_map(|(_, _, insn)| insn.branch_target().copied())
            .chain(
                self.exception_handlers
                    .iter()
                    .flat_map(|(_, labels)| labels.iter().copied()),
            )
            .filter(|label| !placed_labels.contains_key(label))
            .collect();
        if !unplaced_labels.is_empty() {
            return Err(Error::UnplacedLabel(unplaced_labels.into_iter().collect()));
        }

        let resolve = |label: &SynLabel| -> Result<Offset, Error> {
            placed_labels
                .get(label)
                .copied()
                .ok_or_else(|| Error::UnplacedLabel(vec![*label]))
        };

        let instructions = self
            .instructions
            .into_iter()
            .map(|(offset, _, insn)| -> Result<BytecodeInstruction, Error> {
                Ok(BytecodeInstruction::new(offset, insn.map_label(resolve)?))
            })
            .collect::<Result<Vec<_>, Error>>()?;

        let exception_handlers = self
            .exception_handlers
            .iter()
            .map(|(kind, [try_start, try_end, handler_start, handler_end])| -> Result<_, Error> {
                Ok(ExceptionHandler {
                    kind: *kind,
                    try_start: resolve(try_start)?,
                    try_end: resolve(try_end)?,
                    handler_start: resolve(handler_start)?,
                    handler_end: resolve(handler_end)?,
                })
            })
            .collect::<Result<Vec<_>, Error>>()?;

        MethodBody::new(instructions, self.declared_locals, exception_handlers)
    }
}
