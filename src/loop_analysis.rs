//! Loop detection over the static successor relation.
//!
//! One-shot precomputation run once per finalized flow before
//! interpretation. Instructions are partitioned into strongly connected
//! components with Tarjan's algorithm; every non-trivial component gets a
//! fresh positive loop id, everything else stays 0. The interpreter uses the
//! ids to decide where state growth must be bounded by widening.
//!
//! The depth-first search is iterative (explicit frame stack): instruction
//! graphs for one unit can be thousands of nodes deep, unlike the call
//! graphs this kind of pass usually runs on.

use crate::ir::control_flow::LoopAnnotation;
use crate::ir::ControlFlow;
use crate::state::AbstractState;

/// Marker for a node the depth-first search has not reached yet.
const UNVISITED: u32 = u32::MAX;

/// Forward and reverse adjacency over instruction indices.
///
/// Lives only for the duration of one [`LoopAnalyzer::annotate`] call; the
/// annotation written to the flow is the only thing that survives.
struct Graph {
    successors: Vec<Vec<usize>>,
    predecessors: Vec<Vec<usize>>,
}

impl Graph {
    fn build<S: AbstractState>(flow: &ControlFlow<S>) -> Self {
        let len = flow.len();
        let mut successors = vec![Vec::new(); len];
        let mut predecessors = vec![Vec::new(); len];

        for index in 0..len {
            for target in flow.instruction_at(index).successors() {
                // Edges to the exit sentinel (or beyond) carry no loop
                // structure; the driver validates them at run time.
                if target < len {
                    successors[index].push(target);
                    predecessors[target].push(index);
                }
            }
        }

        Self {
            successors,
            predecessors,
        }
    }

    fn has_self_edge(&self, node: usize) -> bool {
        self.successors[node].contains(&node)
    }
}

/// Tarjan bookkeeping, indexed by instruction.
struct TarjanState {
    next_index: u32,
    indices: Vec<u32>,
    low_links: Vec<u32>,
    on_stack: Vec<bool>,
    stack: Vec<usize>,
    /// Components in discovery (pop) order.
    components: Vec<Vec<usize>>,
}

impl TarjanState {
    fn new(len: usize) -> Self {
        Self {
            next_index: 0,
            indices: vec![UNVISITED; len],
            low_links: vec![UNVISITED; len],
            on_stack: vec![false; len],
            stack: Vec::new(),
            components: Vec::new(),
        }
    }

    fn visit(&mut self, node: usize) {
        self.indices[node] = self.next_index;
        self.low_links[node] = self.next_index;
        self.next_index += 1;
        self.stack.push(node);
        self.on_stack[node] = true;
    }

    fn pop_component(&mut self, root: usize) {
        let mut component = Vec::new();
        loop {
            let node = self.stack.pop().expect("component root not on stack");
            self.on_stack[node] = false;
            component.push(node);
            if node == root {
                break;
            }
        }
        self.components.push(component);
    }
}

/// One depth-first-search frame: a node and the position of the next
/// successor to explore.
struct Frame {
    node: usize,
    next: usize,
}

/// Partitions a flow's instructions into strongly connected components and
/// writes the resulting loop annotation onto the flow.
#[derive(Clone, Copy, Debug)]
pub struct LoopAnalyzer {
    count_self_loops: bool,
}

impl Default for LoopAnalyzer {
    fn default() -> Self {
        Self {
            count_self_loops: true,
        }
    }
}

impl LoopAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Policy flag: whether a size-1 component with a self-edge counts as a
    /// loop. On by default; domains whose widening must not fire on tight
    /// self-loops opt out.
    pub fn count_self_loops(mut self, enabled: bool) -> Self {
        self.count_self_loops = enabled;
        self
    }

    /// Compute loop ids and loop entry points and store them on `flow`.
    ///
    /// Total over any well-formed successor relation: zero edges and one
    /// all-encompassing cycle are both fine.
    pub fn annotate<S: AbstractState>(&self, flow: &mut ControlFlow<S>) {
        let graph = Graph::build(flow);
        let annotation = self.compute(&graph);
        flow.set_loops(annotation);
    }

    fn compute(&self, graph: &Graph) -> LoopAnnotation {
        let len = graph.successors.len();
        let mut state = TarjanState::new(len);

        for root in 0..len {
            if state.indices[root] == UNVISITED {
                self.connect_from(root, graph, &mut state);
            }
        }

        let mut numbers = vec![0u32; len];
        let mut next_id = 0u32;
        for component in &state.components {
            let is_loop = component.len() > 1
                || (self.count_self_loops && graph.has_self_edge(component[0]));
            if is_loop {
                next_id += 1;
                for &node in component {
                    numbers[node] = next_id;
                }
            }
        }

        // A loop entry is an in-loop instruction control can reach from
        // outside its component; this is where the interpreter first sees
        // states that have not been around the cycle yet.
        let mut entries = vec![false; len];
        for node in 0..len {
            if numbers[node] == 0 {
                continue;
            }
            let from_outside = graph.predecessors[node].is_empty()
                || graph.predecessors[node]
                    .iter()
                    .any(|&pred| numbers[pred] != numbers[node]);
            entries[node] = from_outside;
        }

        LoopAnnotation { numbers, entries }
    }

    /// Iterative Tarjan from one root.
    fn connect_from(&self, root: usize, graph: &Graph, state: &mut TarjanState) {
        state.visit(root);
        let mut frames = vec![Frame { node: root, next: 0 }];

        loop {
            let (node, descend) = match frames.last_mut() {
                Some(frame) => {
                    let node = frame.node;
                    if frame.next < graph.successors[node].len() {
                        let target = graph.successors[node][frame.next];
                        frame.next += 1;
                        (node, Some(target))
                    } else {
                        (node, None)
                    }
                }
                None => break,
            };

            match descend {
                Some(target) => {
                    if state.indices[target] == UNVISITED {
                        state.visit(target);
                        frames.push(Frame {
                            node: target,
                            next: 0,
                        });
                    } else if state.on_stack[target] {
                        state.low_links[node] = state.low_links[node].min(state.indices[target]);
                    }
                }
                None => {
                    frames.pop();
                    if let Some(parent) = frames.last() {
                        state.low_links[parent.node] =
                            state.low_links[parent.node].min(state.low_links[node]);
                    }
                    if state.low_links[node] == state.indices[node] {
                        state.pop_component(node);
                    }
                }
            }
        }
    }
}
