//! Intermediate representation for one analyzed unit.
//!
//! A front end (out of scope here) lowers a method, lambda, or initializer
//! into a [`ControlFlow`]: an ordered sequence of [`Instruction`]s plus the
//! offset and synthetic-slot bookkeeping needed while lowering. Once
//! finalized, the flow is immutable; the loop analyzer annotates it and the
//! interpreter executes it.

pub mod control_flow;
pub mod instruction;
pub mod instructions;
pub mod offset;
pub mod synthetic;

pub use control_flow::ControlFlow;
pub use instruction::{InstrIndex, Instruction, InstructionState, NodeId};
pub use instructions::{
    Branch, DerivedValueSource, Goto, PassThrough, Return, StateTransfer, Transfer, Unwrap,
};
pub use offset::{DeferredOffset, Offset};
pub use synthetic::{is_synthetic, Descriptor, Synthetic};
