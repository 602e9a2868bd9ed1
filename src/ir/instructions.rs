//! Engine-level instruction kinds.
//!
//! The instruction set of a concrete analysis lives with its domain; the
//! kinds here are the ones the engine can express without inspecting the
//! abstract state: control transfer, source anchoring, and narrow delegation
//! seams through which domain semantics enter the flow.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use super::instruction::{InstrIndex, Instruction, InstructionState, NodeId};
use super::offset::Offset;
use crate::state::AbstractState;

// ═══════════════════════════════════════════════════════════════════════════
// PassThrough
// ═══════════════════════════════════════════════════════════════════════════

/// Re-emits the incoming state unchanged.
///
/// Exists purely to attach a source anchor to an already-computed value so
/// per-instruction facts can be correlated back to the construct that
/// produced it. Never branches.
#[derive(Debug)]
pub struct PassThrough {
    index: InstrIndex,
    anchor: NodeId,
}

impl PassThrough {
    pub fn new(anchor: NodeId) -> Self {
        Self {
            index: InstrIndex::new(),
            anchor,
        }
    }
}

impl fmt::Display for PassThrough {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pass-through {}", self.anchor)
    }
}

impl<S: AbstractState> Instruction<S> for PassThrough {
    fn index(&self) -> Option<usize> {
        self.index.get()
    }

    fn set_index(&mut self, index: usize) {
        self.index.set(index);
    }

    fn anchor(&self) -> Option<NodeId> {
        Some(self.anchor)
    }

    fn accept(&self, state: S) -> Vec<InstructionState<S>> {
        self.fall_through(state)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Unwrap
// ═══════════════════════════════════════════════════════════════════════════

/// External contract producing a derived sub-value.
///
/// Supplied by the domain; the engine never sees the value representation.
/// A closure `Fn(&mut S)` works directly.
pub trait DerivedValueSource<S>: Send + Sync {
    /// Replace the qualifier value in `state` with the derived sub-value.
    fn derive(&self, state: &mut S);
}

impl<S, F> DerivedValueSource<S> for F
where
    F: Fn(&mut S) + Send + Sync,
{
    fn derive(&self, state: &mut S) {
        self(state)
    }
}

/// Consumes the qualifier value and pushes a sub-value derived from it via a
/// [`DerivedValueSource`]. Single successor; mutates the state in place.
pub struct Unwrap<S> {
    index: InstrIndex,
    anchor: Option<NodeId>,
    source: Arc<dyn DerivedValueSource<S>>,
}

impl<S> Unwrap<S> {
    pub fn new(source: impl DerivedValueSource<S> + 'static) -> Self {
        Self {
            index: InstrIndex::new(),
            anchor: None,
            source: Arc::new(source),
        }
    }

    pub fn with_anchor(mut self, anchor: NodeId) -> Self {
        self.anchor = Some(anchor);
        self
    }
}

impl<S> fmt::Display for Unwrap<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("unwrap")
    }
}

impl<S: AbstractState> Instruction<S> for Unwrap<S> {
    fn index(&self) -> Option<usize> {
        self.index.get()
    }

    fn set_index(&mut self, index: usize) {
        self.index.set(index);
    }

    fn anchor(&self) -> Option<NodeId> {
        self.anchor
    }

    fn accept(&self, mut state: S) -> Vec<InstructionState<S>> {
        self.source.derive(&mut state);
        self.fall_through(state)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Goto
// ═══════════════════════════════════════════════════════════════════════════

/// Unconditional jump. The target may be a deferred offset patched by the
/// builder after this instruction was emitted.
#[derive(Debug)]
pub struct Goto {
    index: InstrIndex,
    target: Offset,
}

impl Goto {
    pub fn new(target: impl Into<Offset>) -> Self {
        Self {
            index: InstrIndex::new(),
            target: target.into(),
        }
    }
}

impl fmt::Display for Goto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "goto {}", self.target)
    }
}

impl<S: AbstractState> Instruction<S> for Goto {
    fn index(&self) -> Option<usize> {
        self.index.get()
    }

    fn set_index(&mut self, index: usize) {
        self.index.set(index);
    }

    fn successors(&self) -> Vec<usize> {
        vec![self.target.get()]
    }

    fn accept(&self, state: S) -> Vec<InstructionState<S>> {
        vec![InstructionState::new(self.target.get(), state)]
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Branch
// ═══════════════════════════════════════════════════════════════════════════

/// Two-way fork: control continues both at `target` and at the next
/// instruction, each side receiving its own fork of the state. Domains that
/// can prove one side unreachable express that with their own kinds.
#[derive(Debug)]
pub struct Branch {
    index: InstrIndex,
    target: Offset,
    anchor: Option<NodeId>,
}

impl Branch {
    pub fn new(target: impl Into<Offset>) -> Self {
        Self {
            index: InstrIndex::new(),
            target: target.into(),
            anchor: None,
        }
    }

    pub fn with_anchor(mut self, anchor: NodeId) -> Self {
        self.anchor = Some(anchor);
        self
    }
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "branch {}", self.target)
    }
}

impl<S: AbstractState> Instruction<S> for Branch {
    fn index(&self) -> Option<usize> {
        self.index.get()
    }

    fn set_index(&mut self, index: usize) {
        self.index.set(index);
    }

    fn anchor(&self) -> Option<NodeId> {
        self.anchor
    }

    fn successors(&self) -> Vec<usize> {
        vec![self.target.get(), <Self as Instruction<S>>::bound_index(self) + 1]
    }

    fn accept(&self, state: S) -> Vec<InstructionState<S>> {
        let taken = state.clone();
        vec![
            InstructionState::new(self.target.get(), taken),
            InstructionState::new(<Self as Instruction<S>>::bound_index(self) + 1, state),
        ]
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Return
// ═══════════════════════════════════════════════════════════════════════════

/// Ends the unit normally: jumps to the canonical past-the-end exit offset,
/// recording the state as a final state of the run.
#[derive(Debug)]
pub struct Return {
    index: InstrIndex,
    exit: Offset,
}

impl Return {
    /// `exit` is the container's end offset
    /// ([`ControlFlow::end_offset`](crate::ir::ControlFlow::end_offset)).
    pub fn new(exit: impl Into<Offset>) -> Self {
        Self {
            index: InstrIndex::new(),
            exit: exit.into(),
        }
    }
}

impl fmt::Display for Return {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("return")
    }
}

impl<S: AbstractState> Instruction<S> for Return {
    fn index(&self) -> Option<usize> {
        self.index.get()
    }

    fn set_index(&mut self, index: usize) {
        self.index.set(index);
    }

    fn successors(&self) -> Vec<usize> {
        vec![self.exit.get()]
    }

    fn accept(&self, state: S) -> Vec<InstructionState<S>> {
        vec![InstructionState::new(self.exit.get(), state)]
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Transfer
// ═══════════════════════════════════════════════════════════════════════════

/// Domain-supplied transfer function over the opaque state.
///
/// A closure `Fn(S) -> Option<S>` works directly.
pub trait StateTransfer<S>: Send + Sync {
    /// Transform the state, or return `None` when control does not continue
    /// here (the domain raised an error, the unit returned abnormally).
    fn apply(&self, state: S) -> Option<S>;
}

impl<S, F> StateTransfer<S> for F
where
    F: Fn(S) -> Option<S> + Send + Sync,
{
    fn apply(&self, state: S) -> Option<S> {
        self(state)
    }
}

/// Applies a [`StateTransfer`] and falls through. This is the seam standing
/// in for the domain's value-semantic instruction set.
pub struct Transfer<S> {
    index: InstrIndex,
    anchor: Option<NodeId>,
    label: Cow<'static, str>,
    function: Arc<dyn StateTransfer<S>>,
}

impl<S> Transfer<S> {
    pub fn new(function: impl StateTransfer<S> + 'static) -> Self {
        Self {
            index: InstrIndex::new(),
            anchor: None,
            label: Cow::Borrowed("transfer"),
            function: Arc::new(function),
        }
    }

    /// Label used when the instruction is rendered in errors and logs.
    pub fn with_label(mut self, label: impl Into<Cow<'static, str>>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_anchor(mut self, anchor: NodeId) -> Self {
        self.anchor = Some(anchor);
        self
    }
}

impl<S> fmt::Display for Transfer<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

impl<S: AbstractState> Instruction<S> for Transfer<S> {
    fn index(&self) -> Option<usize> {
        self.index.get()
    }

    fn set_index(&mut self, index: usize) {
        self.index.set(index);
    }

    fn anchor(&self) -> Option<NodeId> {
        self.anchor
    }

    fn accept(&self, state: S) -> Vec<InstructionState<S>> {
        match self.function.apply(state) {
            Some(next) => self.fall_through(next),
            None => Vec::new(),
        }
    }
}
