//! Stack bytecode consumed by the analysis
//!
//! Method bodies are sequences of [`BytecodeInstruction`]s, each of which is an [`Instruction`]
//! placed at a byte offset. The offset is the identity of the instruction within its method: it
//! is what branches target and what every analysis result is keyed on.
//!
//! Bodies can be assembled directly with [`MethodBody::new`] (when the offsets are already known)
//! or with [`MethodBodyBuilder`], which lays out offsets from instruction widths and resolves
//! symbolic labels.

mod body;
mod builder;
mod errors;
mod instruction;
mod label;

pub use body::*;
pub use builder::*;
pub use errors::*;
pub use instruction::*;
pub use label::*;
