//! Synthetic value slots.
//!
//! Lowering introduces temporaries that have no counterpart in the source:
//! loop bound snapshots, switch selector copies, desugared accumulator
//! slots. The engine only needs to identify them and to know that, unlike
//! source variables, nothing can alias them.

use std::fmt;
use std::sync::Arc;

/// Descriptor of a compiler-introduced temporary slot.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Synthetic {
    origin: usize,
    declared_type: Arc<str>,
}

impl Synthetic {
    /// `origin` is the index of the instruction introducing the slot;
    /// `declared_type` is the domain's type name, opaque to the engine.
    pub fn new(origin: usize, declared_type: impl Into<Arc<str>>) -> Self {
        Self {
            origin,
            declared_type: declared_type.into(),
        }
    }

    /// Index of the introducing instruction.
    pub fn origin(&self) -> usize {
        self.origin
    }

    /// Declared abstract type of the slot.
    pub fn declared_type(&self) -> &str {
        &self.declared_type
    }

    /// Synthetic slots are never aliased, so no unrelated write can
    /// invalidate a fact tracked for them. Always true.
    pub fn is_stable(&self) -> bool {
        true
    }
}

impl fmt::Display for Synthetic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "synthetic@{}: {}", self.origin, self.declared_type)
    }
}

/// A variable descriptor as classified by the engine. Domains implement this
/// for their own descriptor kinds; classification is intrinsic to the
/// descriptor, no registry involved.
pub trait Descriptor {
    /// The synthetic descriptor, if this is one.
    fn as_synthetic(&self) -> Option<&Synthetic> {
        None
    }
}

impl Descriptor for Synthetic {
    fn as_synthetic(&self) -> Option<&Synthetic> {
        Some(self)
    }
}

/// Whether `descriptor` names a compiler-introduced slot.
pub fn is_synthetic(descriptor: &dyn Descriptor) -> bool {
    descriptor.as_synthetic().is_some()
}
