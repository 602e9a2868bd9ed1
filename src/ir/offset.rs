//! Symbolic instruction offsets.
//!
//! Jump targets are usually emitted before their destination index is known:
//! the builder hands a [`DeferredOffset`] to the jump instruction, keeps a
//! clone of the handle, and resolves it exactly once when emission reaches
//! the destination. Fixed offsets cover backward jumps whose target already
//! exists.

use std::fmt;
use std::sync::{Arc, OnceLock};

/// Symbolic reference to an instruction index.
///
/// The unresolved state is explicit rather than a sentinel value, so reading
/// an offset before the builder patched it is a checked error instead of a
/// silently wrong jump.
#[derive(Clone, Debug)]
pub enum Offset {
    /// Index known at construction time.
    Fixed(usize),
    /// Forward reference resolved once by the IR builder.
    Deferred(DeferredOffset),
}

impl Offset {
    /// Resolve to a concrete instruction index.
    ///
    /// # Panics
    ///
    /// Panics on an unresolved deferred offset; that is an IR-builder
    /// programming error and must not be tolerated silently.
    pub fn get(&self) -> usize {
        match self {
            Offset::Fixed(index) => *index,
            Offset::Deferred(deferred) => deferred.get(),
        }
    }

    /// Resolve to a concrete index, or `None` if still unresolved.
    pub fn try_get(&self) -> Option<usize> {
        match self {
            Offset::Fixed(index) => Some(*index),
            Offset::Deferred(deferred) => deferred.try_get(),
        }
    }
}

impl From<usize> for Offset {
    fn from(index: usize) -> Self {
        Offset::Fixed(index)
    }
}

impl From<DeferredOffset> for Offset {
    fn from(deferred: DeferredOffset) -> Self {
        Offset::Deferred(deferred)
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.try_get() {
            Some(index) => write!(f, "{index}"),
            None => f.write_str("<unresolved>"),
        }
    }
}

/// A forward-jump patch slot.
///
/// Created unresolved and shared (via cheap clones) between the instruction
/// that jumps through it and the builder site that later resolves it. The
/// slot is set exactly once; after the containing flow is finalized the
/// handle is read-only and safe to share across threads.
#[derive(Clone, Debug, Default)]
pub struct DeferredOffset {
    slot: Arc<OnceLock<usize>>,
}

impl DeferredOffset {
    /// Create a fresh unresolved offset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Patch the offset with its final instruction index.
    ///
    /// # Panics
    ///
    /// Panics if the offset was already resolved.
    pub fn resolve(&self, index: usize) {
        if self.slot.set(index).is_err() {
            panic!(
                "deferred offset resolved twice: already {}, now {}",
                self.get(),
                index
            );
        }
    }

    /// Read the resolved index.
    ///
    /// # Panics
    ///
    /// Panics if the offset has not been resolved yet.
    pub fn get(&self) -> usize {
        match self.slot.get() {
            Some(index) => *index,
            None => panic!("deferred offset read before it was resolved"),
        }
    }

    /// Read the resolved index, or `None` if still unresolved.
    pub fn try_get(&self) -> Option<usize> {
        self.slot.get().copied()
    }

    /// Whether the builder has patched this offset yet.
    pub fn is_resolved(&self) -> bool {
        self.slot.get().is_some()
    }
}
