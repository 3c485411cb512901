//! twine-tac - Linear three-address IR for the twine language
//!
//! A flat quadruple form generated in a single pass over the syntax
//! tree, mainly serving as a diagnostic artifact: its textual listing is
//! bit-exact and deterministic. This pass also performs the language's
//! one static type check. Forward jump targets are backpatched; after
//! generation every label holds a valid instruction index.

pub mod generate;
pub mod instruction;

pub use generate::Tac;
pub use instruction::{Dest, Instruction, Label, Literal, Opcode, Ty, Value, Variable};
