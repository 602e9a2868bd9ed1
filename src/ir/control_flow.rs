//! The per-unit control-flow container.
//!
//! Owns the ordered instruction sequence for one analyzed unit (a method,
//! lambda, or initializer) together with the offset bookkeeping the builder
//! needs while lowering: per-source-node instruction ranges, synthetic slots
//! declared per node, and the canonical past-the-end exit offset. The
//! container is append-only during construction and immutable after
//! [`finish`](ControlFlow::finish), so the loop analyzer and interpreter can
//! cache per-index arrays and share the flow across concurrent runs.

use std::collections::HashMap;
use std::fmt;

use super::instruction::{Instruction, NodeId};
use super::offset::{DeferredOffset, Offset};
use super::synthetic::Synthetic;
use crate::state::AbstractState;

/// Instruction range emitted for one source node.
#[derive(Clone, Debug, Default)]
struct ElementRange {
    start: DeferredOffset,
    end: DeferredOffset,
}

/// Loop facts written by the loop analyzer.
#[derive(Clone, Debug)]
pub(crate) struct LoopAnnotation {
    /// Loop id per instruction index; 0 = not part of a non-trivial cycle.
    pub numbers: Vec<u32>,
    /// Whether the instruction is an entry point of its loop.
    pub entries: Vec<bool>,
}

/// Ordered, indexable instruction sequence for one analyzed unit.
pub struct ControlFlow<S: AbstractState> {
    instructions: Vec<Box<dyn Instruction<S>>>,
    ranges: HashMap<NodeId, ElementRange>,
    synthetics: HashMap<NodeId, Vec<Synthetic>>,
    end: DeferredOffset,
    loops: Option<LoopAnnotation>,
    finished: bool,
}

impl<S: AbstractState> ControlFlow<S> {
    pub fn new() -> Self {
        Self {
            instructions: Vec::new(),
            ranges: HashMap::new(),
            synthetics: HashMap::new(),
            end: DeferredOffset::new(),
            loops: None,
            finished: false,
        }
    }

    /// Append an instruction, binding its index to its position.
    ///
    /// # Panics
    ///
    /// Panics if the flow was already finalized, or if the instruction's
    /// index was already bound elsewhere.
    pub fn push(&mut self, mut instruction: Box<dyn Instruction<S>>) -> usize {
        assert!(!self.finished, "instruction appended to a finalized flow");
        let index = self.instructions.len();
        instruction.set_index(index);
        self.instructions.push(instruction);
        index
    }

    /// Convenience wrapper boxing a concrete instruction.
    pub fn emit(&mut self, instruction: impl Instruction<S> + 'static) -> usize {
        self.push(Box::new(instruction))
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// The instruction at `index`.
    ///
    /// # Panics
    ///
    /// Panics on an out-of-range index.
    pub fn instruction_at(&self, index: usize) -> &dyn Instruction<S> {
        match self.get(index) {
            Some(instruction) => instruction,
            None => panic!(
                "instruction index {index} out of range for flow of {}",
                self.instructions.len()
            ),
        }
    }

    /// Checked access used by the driver, which converts `None` into a fatal
    /// consistency error instead of panicking.
    pub fn get(&self, index: usize) -> Option<&dyn Instruction<S>> {
        self.instructions.get(index).map(Box::as_ref)
    }

    /// Record that emission for `node` starts at the current position.
    pub fn start_element(&mut self, node: NodeId) {
        assert!(!self.finished, "element started on a finalized flow");
        let position = self.instructions.len();
        self.ranges.entry(node).or_default().start.resolve(position);
    }

    /// Record that emission for `node` ends at the current position.
    pub fn finish_element(&mut self, node: NodeId) {
        assert!(!self.finished, "element finished on a finalized flow");
        let position = self.instructions.len();
        self.ranges.entry(node).or_default().end.resolve(position);
    }

    /// Offset of the first instruction emitted for `node`.
    ///
    /// May be requested before the node is started; the returned offset
    /// resolves when [`start_element`](Self::start_element) runs.
    pub fn start_offset_of(&mut self, node: NodeId) -> Offset {
        self.ranges.entry(node).or_default().start.clone().into()
    }

    /// Offset just past the last instruction emitted for `node`.
    ///
    /// May be requested before the node is finished (forward jumps out of
    /// the node, e.g. breaks); resolves at
    /// [`finish_element`](Self::finish_element).
    pub fn end_offset_of(&mut self, node: NodeId) -> Offset {
        self.ranges.entry(node).or_default().end.clone().into()
    }

    /// Resolved `[start, end)` instruction range of `node`, if both
    /// boundaries were recorded.
    pub fn element_range(&self, node: NodeId) -> Option<(usize, usize)> {
        let range = self.ranges.get(&node)?;
        Some((range.start.try_get()?, range.end.try_get()?))
    }

    /// Declare a synthetic slot introduced while lowering `node`.
    pub fn declare_synthetic(&mut self, node: NodeId, synthetic: Synthetic) {
        assert!(!self.finished, "synthetic declared on a finalized flow");
        self.synthetics.entry(node).or_default().push(synthetic);
    }

    /// Synthetic slots declared for `node`, in declaration order.
    pub fn synthetics_of(&self, node: NodeId) -> &[Synthetic] {
        self.synthetics.get(&node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The canonical past-the-end exit offset; control arriving here leaves
    /// the unit normally. Resolves to the instruction count at
    /// [`finish`](Self::finish).
    pub fn end_offset(&self) -> Offset {
        self.end.clone().into()
    }

    /// Seal the flow. No further instructions, elements, or synthetics may
    /// be added; the exit offset resolves to the instruction count.
    pub fn finish(&mut self) {
        assert!(!self.finished, "flow finalized twice");
        self.end.resolve(self.instructions.len());
        self.finished = true;
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Loop id of the instruction at `index`; 0 when the instruction is not
    /// part of a non-trivial cycle or the flow was not annotated yet.
    pub fn loop_number(&self, index: usize) -> u32 {
        self.loops
            .as_ref()
            .and_then(|annotation| annotation.numbers.get(index))
            .copied()
            .unwrap_or(0)
    }

    /// Whether the instruction at `index` is an entry point of a loop, that
    /// is, reachable from outside its own cycle. Diagnostic-facing: consumers
    /// reporting loop facts anchor them here.
    pub fn is_loop_entry(&self, index: usize) -> bool {
        self.loops
            .as_ref()
            .and_then(|annotation| annotation.entries.get(index))
            .copied()
            .unwrap_or(false)
    }

    pub(crate) fn set_loops(&mut self, annotation: LoopAnnotation) {
        debug_assert_eq!(annotation.numbers.len(), self.instructions.len());
        debug_assert_eq!(annotation.entries.len(), self.instructions.len());
        self.loops = Some(annotation);
    }
}

impl<S: AbstractState> Default for ControlFlow<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: AbstractState> fmt::Display for ControlFlow<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, instruction) in self.instructions.iter().enumerate() {
            writeln!(f, "{index}: {instruction}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::instructions::{Goto, PassThrough, Return};
    use crate::ir::synthetic::Synthetic;

    #[derive(Clone, Debug, PartialEq)]
    struct Unit;

    impl AbstractState for Unit {
        fn merge(&mut self, _other: &Self) {}
    }

    fn flow() -> ControlFlow<Unit> {
        ControlFlow::new()
    }

    #[test]
    fn push_binds_index_to_position() {
        let mut flow = flow();
        for node in 0..3 {
            flow.emit(PassThrough::new(NodeId::new(node)));
        }
        flow.finish();

        for index in 0..3 {
            assert_eq!(flow.instruction_at(index).index(), Some(index));
        }
        assert_eq!(flow.len(), 3);
    }

    #[test]
    #[should_panic(expected = "finalized flow")]
    fn push_after_finish_panics() {
        let mut flow = flow();
        flow.finish();
        flow.emit(PassThrough::new(NodeId::new(0)));
    }

    #[test]
    fn element_range_spans_emitted_instructions() {
        let node = NodeId::new(1);
        let mut flow = flow();

        flow.emit(PassThrough::new(NodeId::new(0)));
        flow.start_element(node);
        flow.emit(PassThrough::new(node));
        flow.emit(PassThrough::new(node));
        flow.finish_element(node);
        flow.finish();

        assert_eq!(flow.element_range(node), Some((1, 3)));
        assert_eq!(flow.element_range(NodeId::new(9)), None);
    }

    #[test]
    fn forward_end_offset_resolves_when_element_finishes() {
        let node = NodeId::new(2);
        let mut flow = flow();

        flow.start_element(node);
        // Emit a jump past the element before its end is known.
        let target = flow.end_offset_of(node);
        flow.emit(Goto::new(target.clone()));
        flow.emit(PassThrough::new(node));
        flow.finish_element(node);
        flow.finish();

        assert_eq!(target.get(), 2);
    }

    #[test]
    fn exit_offset_resolves_to_instruction_count() {
        let mut flow = flow();
        let exit = flow.end_offset();
        flow.emit(Return::new(exit.clone()));
        flow.finish();

        assert_eq!(exit.get(), 1);
    }

    #[test]
    fn synthetics_keep_declaration_order() {
        let node = NodeId::new(4);
        let mut flow = flow();
        flow.declare_synthetic(node, Synthetic::new(0, "int"));
        flow.declare_synthetic(node, Synthetic::new(1, "bool"));
        flow.finish();

        let slots = flow.synthetics_of(node);
        assert_eq!(slots.len(), 2);
        assert_eq!(slots[0].declared_type(), "int");
        assert_eq!(slots[1].declared_type(), "bool");
        assert!(flow.synthetics_of(NodeId::new(5)).is_empty());
    }

    #[test]
    fn unannotated_flow_reports_no_loops() {
        let mut flow = flow();
        flow.emit(PassThrough::new(NodeId::new(0)));
        flow.finish();

        assert_eq!(flow.loop_number(0), 0);
        assert!(!flow.is_loop_entry(0));
    }

    #[test]
    fn display_lists_indexed_instructions() {
        let mut flow = flow();
        flow.emit(PassThrough::new(NodeId::new(0)));
        flow.emit(Goto::new(0));
        flow.finish();

        let rendered = flow.to_string();
        assert!(rendered.contains("0: pass-through node#0"));
        assert!(rendered.contains("1: goto 0"));
    }
}
