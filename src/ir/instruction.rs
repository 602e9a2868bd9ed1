//! The instruction execution protocol.
//!
//! An instruction is one node of the intermediate representation: an
//! immutable position in its flow plus an execution method that maps an
//! input state to zero or more (successor, output state) pairs. The driver
//! owns sequencing and deduplication; the instruction owns semantics,
//! including forking the state when it branches.

use std::fmt;

use crate::state::AbstractState;

/// Opaque handle for the source construct an instruction originates from.
///
/// Assigned by the front end that lowers concrete syntax into instructions;
/// the engine only correlates facts back to it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// A pending unit of work: an instruction index paired with the abstract
/// state control arrives there with.
#[derive(Clone, Debug, PartialEq)]
pub struct InstructionState<S> {
    /// Index of the instruction to execute next.
    pub index: usize,
    /// State flowing into that instruction.
    pub state: S,
}

impl<S> InstructionState<S> {
    pub fn new(index: usize, state: S) -> Self {
        Self { index, state }
    }
}

/// Set-once storage for an instruction's position in its flow.
///
/// Starts unset; the owning [`ControlFlow`](crate::ir::ControlFlow) binds it
/// exactly once when the instruction is appended.
#[derive(Clone, Debug, Default)]
pub struct InstrIndex(Option<usize>);

impl InstrIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<usize> {
        self.0
    }

    /// Bind the position.
    ///
    /// # Panics
    ///
    /// Panics if the position was already bound; re-binding an instruction
    /// index is an IR-builder programming error.
    pub fn set(&mut self, index: usize) {
        if let Some(current) = self.0 {
            panic!("instruction index set twice: already {current}, now {index}");
        }
        self.0 = Some(index);
    }
}

/// One executable node of the intermediate representation.
///
/// Implementations must keep `successors` a superset of every index `accept`
/// can ever return: the loop analyzer consumes the static relation, and a
/// dynamic successor outside it would make loop bounding unsound.
pub trait Instruction<S: AbstractState>: fmt::Display + Send + Sync {
    /// Position in the flow, or `None` while the instruction has not been
    /// appended to a container yet.
    fn index(&self) -> Option<usize>;

    /// Bind the position. Called exactly once by the owning container.
    ///
    /// # Panics
    ///
    /// Panics if the index was already bound.
    fn set_index(&mut self, index: usize);

    /// Source construct this instruction was emitted for, if any.
    fn anchor(&self) -> Option<NodeId> {
        None
    }

    /// Input-independent over-approximation of every index this instruction
    /// can transfer control to. The default is plain fall-through.
    fn successors(&self) -> Vec<usize> {
        vec![self.bound_index() + 1]
    }

    /// Execute on `state`, producing the successor states.
    ///
    /// An empty result means control does not continue here. Multiple
    /// results model a branch; each branch must carry its own fork of the
    /// state so mutations cannot leak between branches.
    fn accept(&self, state: S) -> Vec<InstructionState<S>>;

    /// Position in the flow.
    ///
    /// # Panics
    ///
    /// Panics if the index was never bound; executing an instruction before
    /// it was appended to a container is a programming error.
    fn bound_index(&self) -> usize {
        match self.index() {
            Some(index) => index,
            None => panic!("instruction used before its index was bound"),
        }
    }

    /// Convenience for the common straight-line case: pass `state` on to the
    /// next instruction unchanged (or already transformed by the caller).
    fn fall_through(&self, state: S) -> Vec<InstructionState<S>> {
        vec![InstructionState::new(self.bound_index() + 1, state)]
    }
}
