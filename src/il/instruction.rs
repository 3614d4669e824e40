use crate::metadata::{FieldId, MethodId, TypeId};
use crate::util::Width;

/// Stack bytecode instruction (opcode together with its operand)
///
/// The representation is slightly different from the raw encoding to make it more convenient to
/// analyze:
///
///   - short and long forms of the same opcode (eg. `ldloc.0`, `ldloc.s`, `ldloc`) are merged into
///     one variant, and the encoded width is recomputed from the operand
///
///   - the instruction is generic over the branch label type: the builder works with symbolic
///     labels and the analysis with resolved byte offsets (see [`Instruction::map_label`])
///
#[derive(Clone, Debug, PartialEq)]
pub enum Instruction<Lbl> {
    Nop,

    LdNull,
    LdcI4(i32), // covers `ldc.i4.m1`..`ldc.i4.8`, `ldc.i4.s`, and `ldc.i4`
    LdcI8(i64),
    LdcR8(f64),
    LdStr(String),

    LdArg(u16), // covers `ldarg.{0,3}`, `ldarg.s`, and `ldarg`
    LdArgA(u16),
    StArg(u16),
    LdLoc(u16), // covers `ldloc.{0,3}`, `ldloc.s`, and `ldloc`
    LdLocA(u16),
    StLoc(u16),

    LdFld(FieldId),
    LdFldA(FieldId),
    StFld(FieldId),
    LdSFld(FieldId),
    LdSFldA(FieldId),
    StSFld(FieldId),

    LdTokenType(TypeId),
    LdTokenField(FieldId),

    Dup,
    Pop,

    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Neg,
    Not,
    Ceq,
    Cgt,
    Clt,
    ConvI4,
    ConvI8,
    ConvR8,

    Br(Lbl),
    BrTrue(Lbl),
    BrFalse(Lbl),
    Beq(Lbl),
    Bne(Lbl),
    Blt(Lbl),
    Ble(Lbl),
    Bgt(Lbl),
    Bge(Lbl),

    /// Exit a protected region, emptying the evaluation stack
    Leave(Lbl),

    Call(MethodId),
    CallVirt(MethodId),
    NewObj(MethodId),

    Ret,
    Throw,
    Rethrow,
    EndFinally,

    NewArr(TypeId),
    LdLen,
    LdElem(TypeId),
    LdElemA(TypeId),
    StElem(TypeId),

    Box(TypeId),
    UnboxAny(TypeId),
    CastClass(TypeId),
    IsInst(TypeId),
    InitObj(TypeId),
    SizeOf(TypeId),
}

/// How control leaves an instruction
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum FlowControl {
    /// Execution continues with the next instruction
    Next,

    /// Execution continues with the next instruction after a method call
    Call,

    /// Unconditional transfer to the branch target
    Branch,

    /// Either the branch target or the next instruction
    CondBranch,

    /// Leaves the method (or a handler)
    Return,

    /// Raises an exception
    Throw,
}

impl FlowControl {
    /// Control never falls through into the next instruction
    pub fn is_discontinuous(self) -> bool {
        matches!(
            self,
            FlowControl::Branch | FlowControl::Return | FlowControl::Throw
        )
    }
}

/// Number of values an instruction pops off and pushes onto the operand stack
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum StackEffect {
    Fixed { pops: usize, pushes: usize },

    /// Depends on the callee (for calls) or on the enclosing method (for `ret`)
    Variable,
}

impl StackEffect {
    const fn fixed(pops: usize, pushes: usize) -> StackEffect {
        StackEffect::Fixed { pops, pushes }
    }
}

impl<Lbl> Instruction<Lbl> {
    pub fn flow_control(&self) -> FlowControl {
        use Instruction::*;

        match self {
            Br(_) | Leave(_) => FlowControl::Branch,
            BrTrue(_) | BrFalse(_) | Beq(_) | Bne(_) | Blt(_) | Ble(_) | Bgt(_) | Bge(_) => {
                FlowControl::CondBranch
            }
            Call(_) | CallVirt(_) | NewObj(_) => FlowControl::Call,
            Ret | EndFinally => FlowControl::Return,
            Throw | Rethrow => FlowControl::Throw,
            _ => FlowControl::Next,
        }
    }

    /// Stack effect table
    ///
    /// Only the counts matter: the analysis tracks which instruction produced a value, never the
    /// value itself.
    pub fn stack_effect(&self) -> StackEffect {
        use Instruction::*;

        match self {
            Nop | Br(_) | Leave(_) | Rethrow | EndFinally => StackEffect::fixed(0, 0),

            LdNull | LdcI4(_) | LdcI8(_) | LdcR8(_) | LdStr(_) => StackEffect::fixed(0, 1),
            LdArg(_) | LdArgA(_) | LdLoc(_) | LdLocA(_) => StackEffect::fixed(0, 1),
            LdSFld(_) | LdSFldA(_) | LdTokenType(_) | LdTokenField(_) | SizeOf(_) => {
                StackEffect::fixed(0, 1)
            }
            StArg(_) | StLoc(_) | StSFld(_) => StackEffect::fixed(1, 0),

            LdFld(_) | LdFldA(_) => StackEffect::fixed(1, 1),
            StFld(_) => StackEffect::fixed(2, 0),

            Dup => StackEffect::fixed(1, 2),
            Pop => StackEffect::fixed(1, 0),

            Add | Sub | Mul | Div | Rem | And | Or | Xor | Shl | Shr | Ceq | Cgt | Clt => {
                StackEffect::fixed(2, 1)
            }
            Neg | Not | ConvI4 | ConvI8 | ConvR8 => StackEffect::fixed(1, 1),

            BrTrue(_) | BrFalse(_) => StackEffect::fixed(1, 0),
            Beq(_) | Bne(_) | Blt(_) | Ble(_) | Bgt(_) | Bge(_) => StackEffect::fixed(2, 0),

            Call(_) | CallVirt(_) | NewObj(_) | Ret => StackEffect::Variable,
            Throw => StackEffect::fixed(1, 0),

            NewArr(_) | LdLen => StackEffect::fixed(1, 1),
            LdElem(_) | LdElemA(_) => StackEffect::fixed(2, 1),
            StElem(_) => StackEffect::fixed(3, 0),

            Box(_) | UnboxAny(_) | CastClass(_) | IsInst(_) => StackEffect::fixed(1, 1),
            InitObj(_) => StackEffect::fixed(1, 0),
        }
    }

    /// Target of a branching instruction
    pub fn branch_target(&self) -> Option<&Lbl> {
        use Instruction::*;

        match self {
            Br(lbl) | BrTrue(lbl) | BrFalse(lbl) | Beq(lbl) | Bne(lbl) | Blt(lbl) | Ble(lbl)
            | Bgt(lbl) | Bge(lbl) | Leave(lbl) => Some(lbl),
            _ => None,
        }
    }

    /// Method referenced by a call-shaped instruction
    pub fn method_operand(&self) -> Option<MethodId> {
        match self {
            Instruction::Call(method) | Instruction::CallVirt(method) | Instruction::NewObj(method) => {
                Some(*method)
            }
            _ => None,
        }
    }

    /// Field referenced by the instruction (including `ldtoken` of a field)
    pub fn field_operand(&self) -> Option<FieldId> {
        use Instruction::*;

        match self {
            LdFld(field) | LdFldA(field) | StFld(field) | LdSFld(field) | LdSFldA(field)
            | StSFld(field) | LdTokenField(field) => Some(*field),
            _ => None,
        }
    }

    /// Type referenced by the instruction
    pub fn type_operand(&self) -> Option<TypeId> {
        use Instruction::*;

        match self {
            LdTokenType(ty) | NewArr(ty) | LdElem(ty) | LdElemA(ty) | StElem(ty) | Box(ty)
            | UnboxAny(ty) | CastClass(ty) | IsInst(ty) | InitObj(ty) | SizeOf(ty) => Some(*ty),
            _ => None,
        }
    }

    /// Change the label type (eg. resolve symbolic labels into offsets)
    pub fn map_label<Lbl2, E>(
        &self,
        map_label: impl FnOnce(&Lbl) -> Result<Lbl2, E>,
    ) -> Result<Instruction<Lbl2>, E> {
        use Instruction::*;

        Ok(match self {
            Nop => Nop,
            LdNull => LdNull,
            LdcI4(value) => LdcI4(*value),
            LdcI8(value) => LdcI8(*value),
            LdcR8(value) => LdcR8(*value),
            LdStr(value) => LdStr(value.clone()),
            LdArg(index) => LdArg(*index),
            LdArgA(index) => LdArgA(*index),
            StArg(index) => StArg(*index),
            LdLoc(index) => LdLoc(*index),
            LdLocA(index) => LdLocA(*index),
            StLoc(index) => StLoc(*index),
            LdFld(field) => LdFld(*field),
            LdFldA(field) => LdFldA(*field),
            StFld(field) => StFld(*field),
            LdSFld(field) => LdSFld(*field),
            LdSFldA(field) => LdSFldA(*field),
            StSFld(field) => StSFld(*field),
            LdTokenType(ty) => LdTokenType(*ty),
            LdTokenField(field) => LdTokenField(*field),
            Dup => Dup,
            Pop => Pop,
            Add => Add,
            Sub => Sub,
            Mul => Mul,
            Div => Div,
            Rem => Rem,
            And => And,
            Or => Or,
            Xor => Xor,
            Shl => Shl,
            Shr => Shr,
            Neg => Neg,
            Not => Not,
            Ceq => Ceq,
            Cgt => Cgt,
            Clt => Clt,
            ConvI4 => ConvI4,
            ConvI8 => ConvI8,
            ConvR8 => ConvR8,
            Br(lbl) => Br(map_label(lbl)?),
            BrTrue(lbl) => BrTrue(map_label(lbl)?),
            BrFalse(lbl) => BrFalse(map_label(lbl)?),
            Beq(lbl) => Beq(map_label(lbl)?),
            Bne(lbl) => Bne(map_label(lbl)?),
            Blt(lbl) => Blt(map_label(lbl)?),
            Ble(lbl) => Ble(map_label(lbl)?),
            Bgt(lbl) => Bgt(map_label(lbl)?),
            Bge(lbl) => Bge(map_label(lbl)?),
            Leave(lbl) => Leave(map_label(lbl)?),
            Call(method) => Call(*method),
            CallVirt(method) => CallVirt(*method),
            NewObj(method) => NewObj(*method),
            Ret => Ret,
            Throw => Throw,
            Rethrow => Rethrow,
            EndFinally => EndFinally,
            NewArr(ty) => NewArr(*ty),
            LdLen => LdLen,
            LdElem(ty) => LdElem(*ty),
            LdElemA(ty) => LdElemA(*ty),
            StElem(ty) => StElem(*ty),
            Box(ty) => Box(*ty),
            UnboxAny(ty) => UnboxAny(*ty),
            CastClass(ty) => CastClass(*ty),
            IsInst(ty) => IsInst(*ty),
            InitObj(ty) => InitObj(*ty),
            SizeOf(ty) => SizeOf(*ty),
        })
    }
}

/// Width of the encoding of a variable or argument index operand
fn variable_width(index: u16, has_short_forms: bool) -> usize {
    if has_short_forms && index <= 3 {
        1
    } else if index <= u8::MAX as u16 {
        2
    } else {
        4 // two byte opcode (prefixed) and a two byte index
    }
}

impl<Lbl> Width for Instruction<Lbl> {
    fn width(&self) -> usize {
        use Instruction::*;

        match self {
            LdcI4(-1..=8) => 1,
            LdcI4(value) if i8::try_from(*value).is_ok() => 2,
            LdcI4(_) => 5,
            LdcI8(_) | LdcR8(_) => 9,
            LdStr(_) => 5,

            LdArg(index) | LdLoc(index) | StLoc(index) => variable_width(*index, true),
            LdArgA(index) | StArg(index) | LdLocA(index) => variable_width(*index, false),

            LdFld(_) | LdFldA(_) | StFld(_) | LdSFld(_) | LdSFldA(_) | StSFld(_) => 5,
            LdTokenType(_) | LdTokenField(_) => 5,

            Ceq | Cgt | Clt | Rethrow => 2,

            // Branches are always laid out in their long form
            Br(_) | BrTrue(_) | BrFalse(_) | Beq(_) | Bne(_) | Blt(_) | Ble(_) | Bgt(_)
            | Bge(_) | Leave(_) => 5,

            Call(_) | CallVirt(_) | NewObj(_) => 5,

            NewArr(_) | LdElem(_) | LdElemA(_) | StElem(_) => 5,
            Box(_) | UnboxAny(_) | CastClass(_) | IsInst(_) => 5,
            InitObj(_) | SizeOf(_) => 6,

            _ => 1,
        }
    }
}
