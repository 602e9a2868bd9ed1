//! Shared fixtures for interpreter integration tests.

#![allow(dead_code)]

use std::collections::BTreeSet;

use dataflow_core::ir::{Branch, Goto, Transfer};
use dataflow_core::{AbstractState, ControlFlow, LoopAnalyzer};

/// Value sets saturate to `Top` once they grow past this many members.
const SATURATION: usize = 8;

/// Small value-set domain over integers.
///
/// Merging unions the sets and saturates to [`ValueSet::Top`], which gives
/// widening a real fixpoint to land on.
#[derive(Clone, Debug, PartialEq)]
pub enum ValueSet {
    Values(BTreeSet<i64>),
    Top,
}

impl ValueSet {
    pub fn of(values: &[i64]) -> Self {
        Self::Values(values.iter().copied().collect())
    }

    pub fn map(&self, f: impl Fn(i64) -> i64) -> Self {
        match self {
            Self::Values(values) => Self::Values(values.iter().map(|&v| f(v)).collect()),
            Self::Top => Self::Top,
        }
    }

    pub fn is_top(&self) -> bool {
        matches!(self, Self::Top)
    }
}

impl AbstractState for ValueSet {
    fn merge(&mut self, other: &Self) {
        match (&mut *self, other) {
            (Self::Values(mine), Self::Values(theirs)) => {
                mine.extend(theirs.iter().copied());
                if mine.len() > SATURATION {
                    *self = Self::Top;
                }
            }
            _ => *self = Self::Top,
        }
    }
}

/// Transfer that shifts every tracked value by one.
pub fn increment() -> Transfer<ValueSet> {
    Transfer::new(|state: ValueSet| Some(state.map(|v| v + 1))).with_label("increment")
}

/// `n` increments in a row, finalized.
pub fn straight_line(n: usize) -> ControlFlow<ValueSet> {
    let mut flow = ControlFlow::new();
    for _ in 0..n {
        flow.emit(increment());
    }
    flow.finish();
    flow
}

/// An unconditional counting loop:
///
/// ```text
/// 0: branch -> exit | 1
/// 1: increment
/// 2: goto 0
/// ```
///
/// Every trip around the cycle produces a fresh state, so without loop
/// annotation (or widening) the run never drains on its own.
pub fn counting_loop(annotated: bool) -> ControlFlow<ValueSet> {
    let mut flow = ControlFlow::new();
    let exit = flow.end_offset();
    flow.emit(Branch::new(exit));
    flow.emit(increment());
    flow.emit(Goto::new(0));
    flow.finish();
    if annotated {
        LoopAnalyzer::new().annotate(&mut flow);
    }
    flow
}
