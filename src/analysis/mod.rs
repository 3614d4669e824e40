//! Reachability, control-flow, stack, and local variable analysis
//!
//! [`analyze_program`] walks every method reachable from an entry point. For each method it:
//!
//!   - builds a [`ControlFlowGraph`] linking instructions by fall-through and branch edges
//!
//!   - simulates the operand stack (see [`analyze_stack`]) to find out which instruction
//!     produced every value consumed by another instruction, merging the stacks of paths that
//!     join at forward jump targets
//!
//!   - computes the scope of every local variable (see [`analyze_locals`]) so the emitter can
//!     tell which variables can share storage
//!
//! Along the way, the [`TypeWalker`] collects the types the program needs and the
//! [`CallGraph`] counts call sites to decide which methods must be emitted standalone.

mod call_graph;
mod errors;
mod flow;
mod locals;
mod method;
mod program;
mod settings;
mod stack;
mod stack_analysis;
mod types;

pub use call_graph::*;
pub use errors::*;
pub use flow::*;
pub use locals::*;
pub use method::*;
pub use program::*;
pub use settings::*;
pub use stack::*;
pub use stack_analysis::*;
pub use types::*;
