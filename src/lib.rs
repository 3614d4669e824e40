//! Analysis of stack bytecode ahead of code generation for a register-and-memory VM
//!
//! Given method bodies (see [`il`]) and the metadata describing their types, fields, and methods
//! (see [`metadata`]), [`analysis::analyze_program`] discovers everything reachable from an entry
//! method and produces, for every reachable method, the facts the emitter needs: which
//! instruction produces every consumed stack value, which regions are only reachable through
//! jumps, and how long every local variable must keep its storage.

pub mod analysis;
pub mod il;
pub mod metadata;
pub mod util;
