//! Worklist-driven abstract interpretation over a flat instruction IR.
//!
//! The crate splits into three layers:
//!
//! - [`ir`]: the [`ControlFlow`](ir::ControlFlow) container, the
//!   [`Instruction`](ir::Instruction) protocol, deferred forward-jump
//!   offsets, and a small set of structural instruction kinds plus
//!   synthetic-variable descriptors.
//! - [`loop_analysis`]: a one-shot strongly-connected-component pass that
//!   stamps every instruction with a loop id before interpretation.
//! - [`interpreter`]: the fixed-point driver that pushes domain states
//!   through a finalized flow under step, state, and cancellation budgets.
//!
//! Client analyses provide the domain by implementing
//! [`AbstractState`](state::AbstractState) and the value semantics by
//! implementing [`Instruction`](ir::Instruction) (or reusing the structural
//! kinds in [`ir::instructions`] with closure-backed transfer functions).

pub mod interpreter;
pub mod ir;
pub mod loop_analysis;
pub mod state;

pub use interpreter::{
    CancellationProbe, Interpreter, InterpreterConfig, NeverCancel, ProbeFn, RunError, RunResult,
};
pub use ir::{ControlFlow, DeferredOffset, Instruction, InstructionState, NodeId, Offset};
pub use loop_analysis::LoopAnalyzer;
pub use state::AbstractState;
