//! The abstract-state contract supplied by the analysis domain.
//!
//! The engine is domain-agnostic: it never looks inside a state. It forks
//! states when instructions branch (`Clone`), deduplicates work items by
//! state equality (`PartialEq`), and merges states inside loops
//! ([`AbstractState::merge`]) to bound growth on cyclic flow.

/// A forkable, comparable, joinable partial-program state.
///
/// `Clone` is the fork operation: forked branches must not share mutations.
/// `PartialEq` drives the driver's visited-state deduplication.
pub trait AbstractState: Clone + PartialEq {
    /// Join (widen) `other` into `self`.
    ///
    /// Called at in-loop instructions once too many distinct states
    /// accumulate.
    /// The result must over-approximate both inputs; a domain that widens
    /// towards a finite lattice height guarantees termination on any cyclic
    /// flow, at the cost of precision.
    fn merge(&mut self, other: &Self);
}
