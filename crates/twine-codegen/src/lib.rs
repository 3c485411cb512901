//! twine-codegen - Code generation for the twine language
//!
//! Lowers the syntax tree into a basic-block control-flow graph in a
//! small typed instruction set, synthesizing the runtime string
//! semantics (length scans, allocation, repetition, concatenation,
//! equality, manual deallocation) as explicit control flow with a
//! transient/persistent ownership discipline: every heap buffer is
//! freed exactly once on every path.
//!
//! The produced [`Module`] is the hand-off point to an external
//! backend; this crate performs no target-specific instruction
//! selection.

pub mod codegen;
pub mod ir;

pub use codegen::CodeGen;
pub use ir::{
    BasicBlock, BlockId, Function, IcmpOp, Instruction, IrType, Module, Slot, SlotId, TempId,
    Value,
};
