//! Worklist-driven fixed-point interpretation.
//!
//! The interpreter walks a finalized [`ControlFlow`] breadth-first: it keeps
//! a queue of (instruction index, abstract state) pairs, asks each
//! instruction to transform the state it arrives with, and enqueues the
//! results at the successor indices. A per-index memo of already-seen states
//! prunes re-entry, and loop membership from the loop analysis decides where
//! the memo must be bounded by widening instead of growing without limit.
//!
//! Interpretation is resource-governed rather than guaranteed to converge:
//! hitting the step budget, the per-index state limit, or a cancellation
//! request ends the run early with `completed = false`. Only a structurally
//! broken flow (a successor past the container end) is an error.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace};

use crate::ir::{ControlFlow, InstructionState};
use crate::state::AbstractState;

/// Resource limits for one interpretation run.
///
/// The defaults are sized for method-scale flows (a few thousand
/// instructions); batch analyses over much larger units should raise
/// `max_steps` and lower `join_threshold`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpreterConfig {
    /// Hard bound on dequeued work items across the whole run.
    pub max_steps: u64,
    /// Per-index cap on memoized states; reaching it ends the run as
    /// incomplete.
    pub states_limit: usize,
    /// Number of distinct states an in-loop index accumulates before new
    /// arrivals are widened into the most recent one.
    pub join_threshold: usize,
    /// How many steps pass between cancellation polls.
    pub cancel_check_interval: u64,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            max_steps: 100_000,
            states_limit: 300,
            join_threshold: 16,
            cancel_check_interval: 512,
        }
    }
}

impl InterpreterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_steps(mut self, max_steps: u64) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_states_limit(mut self, states_limit: usize) -> Self {
        self.states_limit = states_limit;
        self
    }

    pub fn with_join_threshold(mut self, join_threshold: usize) -> Self {
        self.join_threshold = join_threshold;
        self
    }

    pub fn with_cancel_check_interval(mut self, interval: u64) -> Self {
        self.cancel_check_interval = interval;
        self
    }
}

/// Polled periodically during a run; returning `true` ends the run as
/// incomplete.
pub trait CancellationProbe {
    fn should_stop(&self) -> bool;
}

/// Probe that never fires; the default for standalone runs.
#[derive(Clone, Copy, Debug, Default)]
pub struct NeverCancel;

impl CancellationProbe for NeverCancel {
    fn should_stop(&self) -> bool {
        false
    }
}

/// Adapts a closure into a probe.
pub struct ProbeFn<F>(pub F);

impl<F> CancellationProbe for ProbeFn<F>
where
    F: Fn() -> bool,
{
    fn should_stop(&self) -> bool {
        (self.0)()
    }
}

/// A shared flag doubles as a probe; flip it from another thread to stop
/// the run.
impl CancellationProbe for std::sync::atomic::AtomicBool {
    fn should_stop(&self) -> bool {
        self.load(std::sync::atomic::Ordering::Relaxed)
    }
}

/// Structural failures of a run.
///
/// Resource exhaustion is deliberately not here; running out of budget is a
/// normal (incomplete) outcome, not an error.
#[derive(Debug, Error)]
pub enum RunError {
    /// An instruction produced a successor index past the container end.
    /// The index equal to the flow length is the exit sentinel and is fine;
    /// anything beyond it means the flow was assembled wrong.
    #[error("instruction {index} ({instruction}) jumps to {successor}, past the end of a {len}-instruction flow")]
    InvalidSuccessor {
        index: usize,
        instruction: String,
        successor: usize,
        len: usize,
    },

    /// A seed state targeted an index outside the flow.
    #[error("entry state targets instruction {index}, but the flow has {len}")]
    InvalidEntry { index: usize, len: usize },
}

/// Everything a finished (or aborted) run produced.
#[derive(Clone, Debug)]
pub struct RunResult<S> {
    /// Distinct states observed at each instruction index, in arrival order.
    /// In-loop indices may hold widened states rather than raw arrivals.
    pub states: Vec<Vec<S>>,
    /// Distinct states that flowed past the end of the container.
    pub exit_states: Vec<S>,
    /// Whether the worklist drained; `false` means a budget or cancellation
    /// cut the run short and `states` is a sound-but-partial view.
    pub completed: bool,
    /// Work items dequeued before the run ended.
    pub steps: u64,
}

impl<S> RunResult<S> {
    pub fn states_at(&self, index: usize) -> &[S] {
        &self.states[index]
    }
}

/// Outcome of offering one state to an instruction index.
enum Admit {
    /// Enqueued, or dropped as already covered.
    Continue,
    /// The per-index state cap was hit; the run must end incomplete.
    Exhausted,
}

struct RunState<S> {
    queue: VecDeque<InstructionState<S>>,
    visited: Vec<Vec<S>>,
    exit_states: Vec<S>,
    steps: u64,
}

impl<S> RunState<S> {
    fn new(len: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            visited: (0..len).map(|_| Vec::new()).collect(),
            exit_states: Vec::new(),
            steps: 0,
        }
    }
}

/// Drives states through a finalized flow until the worklist drains or a
/// budget runs out.
///
/// The interpreter only reads the container, so one flow can back any number
/// of concurrent runs.
pub struct Interpreter<'a, S: AbstractState> {
    flow: &'a ControlFlow<S>,
    config: InterpreterConfig,
}

impl<'a, S: AbstractState> Interpreter<'a, S> {
    /// # Panics
    ///
    /// Panics if the flow was never [finished](ControlFlow::finish);
    /// interpreting a half-built container is a programming error.
    pub fn new(flow: &'a ControlFlow<S>) -> Self {
        assert!(
            flow.is_finished(),
            "control flow must be finished before interpretation"
        );
        Self {
            flow,
            config: InterpreterConfig::default(),
        }
    }

    pub fn with_config(mut self, config: InterpreterConfig) -> Self {
        self.config = config;
        self
    }

    /// Run from the first instruction with a single entry state.
    pub fn run(&self, entry: S) -> Result<RunResult<S>, RunError> {
        self.run_from(vec![InstructionState::new(0, entry)], &NeverCancel)
    }

    /// Run from explicit seed positions, polling `probe` for cancellation.
    pub fn run_from(
        &self,
        seeds: Vec<InstructionState<S>>,
        probe: &dyn CancellationProbe,
    ) -> Result<RunResult<S>, RunError> {
        let len = self.flow.len();
        let mut run = RunState::new(len);
        let mut completed = true;

        for seed in seeds {
            if seed.index > len {
                return Err(RunError::InvalidEntry {
                    index: seed.index,
                    len,
                });
            }
            if let Admit::Exhausted = self.offer(seed.index, seed.state, &mut run) {
                completed = false;
            }
        }

        'drain: while completed {
            let item = match run.queue.pop_front() {
                Some(item) => item,
                None => break,
            };

            if run.steps >= self.config.max_steps {
                debug!(steps = run.steps, "step budget exhausted, aborting run");
                completed = false;
                break;
            }
            if self.poll_due(run.steps) && probe.should_stop() {
                debug!(steps = run.steps, "run cancelled");
                completed = false;
                break;
            }
            run.steps += 1;

            let instruction = self.flow.instruction_at(item.index);
            trace!(index = item.index, %instruction, "visiting");

            for next in instruction.accept(item.state) {
                if next.index > len {
                    return Err(RunError::InvalidSuccessor {
                        index: item.index,
                        instruction: instruction.to_string(),
                        successor: next.index,
                        len,
                    });
                }
                if let Admit::Exhausted = self.offer(next.index, next.state, &mut run) {
                    debug!(
                        index = next.index,
                        limit = self.config.states_limit,
                        "state limit reached, aborting run"
                    );
                    completed = false;
                    break 'drain;
                }
            }
        }

        Ok(RunResult {
            states: run.visited,
            exit_states: run.exit_states,
            completed,
            steps: run.steps,
        })
    }

    fn poll_due(&self, steps: u64) -> bool {
        self.config.cancel_check_interval <= 1 || steps % self.config.cancel_check_interval == 0
    }

    /// Admit `state` at `target`, which must be a valid index or the exit
    /// sentinel.
    fn offer(&self, target: usize, state: S, run: &mut RunState<S>) -> Admit {
        if target == self.flow.len() {
            if !run.exit_states.contains(&state) {
                run.exit_states.push(state);
            }
            return Admit::Continue;
        }

        let seen = &mut run.visited[target];
        if seen.iter().any(|known| *known == state) {
            return Admit::Continue;
        }
        if seen.len() >= self.config.states_limit {
            return Admit::Exhausted;
        }

        // Inside a loop, past the fan-in threshold, new arrivals are folded
        // into the latest memoized state instead of accumulating. The merged
        // state replaces the memo entry so later arrivals compare against
        // the widened version.
        if self.flow.loop_number(target) != 0 && seen.len() >= self.config.join_threshold {
            if let Some(last) = seen.last_mut() {
                let mut widened = last.clone();
                widened.merge(&state);
                if widened == *last {
                    return Admit::Continue;
                }
                debug!(
                    index = target,
                    loop_id = self.flow.loop_number(target),
                    "widening at in-loop instruction"
                );
                *last = widened.clone();
                run.queue.push_back(InstructionState::new(target, widened));
                return Admit::Continue;
            }
        }

        seen.push(state.clone());
        run.queue.push_back(InstructionState::new(target, state));
        Admit::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{InstrIndex, Instruction, Transfer};
    use std::fmt;

    /// Counter domain: merge saturates to the larger value.
    #[derive(Clone, Debug, PartialEq)]
    struct Count(u32);

    impl AbstractState for Count {
        fn merge(&mut self, other: &Self) {
            self.0 = self.0.max(other.0);
        }
    }

    fn increment() -> Transfer<Count> {
        Transfer::new(|state: Count| Some(Count(state.0 + 1)))
    }

    #[test]
    fn default_config_is_fluent() {
        let config = InterpreterConfig::new()
            .with_max_steps(10)
            .with_join_threshold(2);
        assert_eq!(config.max_steps, 10);
        assert_eq!(config.join_threshold, 2);
        assert_eq!(config.states_limit, InterpreterConfig::default().states_limit);
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = InterpreterConfig::new()
            .with_max_steps(42)
            .with_states_limit(7)
            .with_join_threshold(3)
            .with_cancel_check_interval(9);
        let json = serde_json::to_string(&config).unwrap();
        let back: InterpreterConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn partial_config_json_falls_back_to_defaults() {
        let back: InterpreterConfig = serde_json::from_str(r#"{"max_steps": 5}"#).unwrap();
        assert_eq!(back.max_steps, 5);
        assert_eq!(back.states_limit, InterpreterConfig::default().states_limit);
    }

    #[test]
    fn empty_flow_yields_the_entry_as_exit() {
        let mut flow: ControlFlow<Count> = ControlFlow::new();
        flow.finish();
        let result = Interpreter::new(&flow).run(Count(7)).unwrap();
        assert!(result.completed);
        assert_eq!(result.exit_states, vec![Count(7)]);
        assert_eq!(result.steps, 0);
    }

    #[test]
    fn straight_line_counts_every_instruction() {
        let mut flow = ControlFlow::new();
        for _ in 0..5 {
            flow.emit(increment());
        }
        flow.finish();
        let result = Interpreter::new(&flow).run(Count(0)).unwrap();
        assert!(result.completed);
        assert_eq!(result.steps, 5);
        assert_eq!(result.exit_states, vec![Count(5)]);
    }

    #[test]
    fn duplicate_states_are_not_revisited() {
        // Identity transfer: re-offering the same state must be a no-op.
        let mut flow = ControlFlow::new();
        flow.emit(Transfer::new(|state: Count| Some(state)));
        flow.finish();
        let interpreter = Interpreter::new(&flow);
        let result = interpreter
            .run_from(
                vec![
                    InstructionState::new(0, Count(1)),
                    InstructionState::new(0, Count(1)),
                ],
                &NeverCancel,
            )
            .unwrap();
        assert_eq!(result.steps, 1);
        assert_eq!(result.states_at(0), &[Count(1)]);
    }

    #[test]
    fn dead_transfer_ends_the_path() {
        let mut flow = ControlFlow::new();
        flow.emit(Transfer::<Count>::new(|_| None));
        flow.finish();
        let result = Interpreter::new(&flow).run(Count(0)).unwrap();
        assert!(result.completed);
        assert!(result.exit_states.is_empty());
    }

    #[test]
    fn successor_past_the_end_is_an_error() {
        struct Wild {
            index: InstrIndex,
        }
        impl fmt::Display for Wild {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("wild")
            }
        }
        impl Instruction<Count> for Wild {
            fn index(&self) -> Option<usize> {
                self.index.get()
            }
            fn set_index(&mut self, index: usize) {
                self.index.set(index);
            }
            fn successors(&self) -> Vec<usize> {
                vec![99]
            }
            fn accept(&self, state: Count) -> Vec<InstructionState<Count>> {
                vec![InstructionState::new(99, state)]
            }
        }

        let mut flow = ControlFlow::new();
        flow.emit(Wild {
            index: InstrIndex::new(),
        });
        flow.finish();
        let err = Interpreter::new(&flow).run(Count(0)).unwrap_err();
        assert!(matches!(
            err,
            RunError::InvalidSuccessor { successor: 99, .. }
        ));
    }

    #[test]
    fn seed_outside_the_flow_is_rejected() {
        let mut flow: ControlFlow<Count> = ControlFlow::new();
        flow.emit(increment());
        flow.finish();
        let err = Interpreter::new(&flow)
            .run_from(vec![InstructionState::new(5, Count(0))], &NeverCancel)
            .unwrap_err();
        assert!(matches!(err, RunError::InvalidEntry { index: 5, len: 1 }));
    }

    #[test]
    #[should_panic(expected = "must be finished")]
    fn unfinished_flow_is_refused() {
        let mut flow: ControlFlow<Count> = ControlFlow::new();
        flow.emit(increment());
        let _ = Interpreter::new(&flow);
    }
}
