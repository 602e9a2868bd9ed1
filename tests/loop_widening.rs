//! Convergence behavior on cyclic flows.

mod common;

use common::{counting_loop, increment, ValueSet};
use dataflow_core::ir::{Branch, Goto};
use dataflow_core::{ControlFlow, Interpreter, InterpreterConfig, LoopAnalyzer};

#[test]
fn annotated_loop_converges_through_widening() {
    let flow = counting_loop(true);
    let config = InterpreterConfig::new().with_join_threshold(4);
    let result = Interpreter::new(&flow)
        .with_config(config)
        .run(ValueSet::of(&[0]))
        .unwrap();

    assert!(result.completed);
    // Widening folds the unbounded counter into the saturated state.
    assert!(result.states_at(0).iter().any(ValueSet::is_top));
    assert!(result.exit_states.iter().any(ValueSet::is_top));
    assert!(result.steps < InterpreterConfig::default().max_steps);
}

#[test]
fn unannotated_loop_burns_the_step_budget() {
    let flow = counting_loop(false);
    let config = InterpreterConfig::new().with_max_steps(200);
    let result = Interpreter::new(&flow)
        .with_config(config)
        .run(ValueSet::of(&[0]))
        .unwrap();

    assert!(!result.completed);
    assert_eq!(result.steps, 200);
}

#[test]
fn state_limit_ends_the_run_incomplete() {
    let flow = counting_loop(false);
    let config = InterpreterConfig::new()
        .with_states_limit(10)
        .with_max_steps(1_000_000);
    let result = Interpreter::new(&flow)
        .with_config(config)
        .run(ValueSet::of(&[0]))
        .unwrap();

    assert!(!result.completed);
    assert!(result.states.iter().any(|states| states.len() == 10));
}

#[test]
fn loop_annotation_lands_on_the_cycle_only() {
    // 0: increment (preheader)
    // 1: branch -> exit | 2
    // 2: increment
    // 3: goto 1
    let mut flow = ControlFlow::new();
    let exit = flow.end_offset();
    flow.emit(increment());
    flow.emit(Branch::new(exit));
    flow.emit(increment());
    flow.emit(Goto::new(1usize));
    flow.finish();
    LoopAnalyzer::new().annotate(&mut flow);

    assert_eq!(flow.loop_number(0), 0);
    let id = flow.loop_number(1);
    assert_ne!(id, 0);
    assert_eq!(flow.loop_number(2), id);
    assert_eq!(flow.loop_number(3), id);
    // Control enters the cycle through the branch only.
    assert!(flow.is_loop_entry(1));
    assert!(!flow.is_loop_entry(2));
    assert!(!flow.is_loop_entry(3));
}

#[test]
fn partial_results_remain_usable() {
    let flow = counting_loop(false);
    let config = InterpreterConfig::new().with_max_steps(50);
    let result = Interpreter::new(&flow)
        .with_config(config)
        .run(ValueSet::of(&[0]))
        .unwrap();

    // Aborted runs still expose every state observed so far.
    assert!(!result.completed);
    assert!(result.states_at(0).contains(&ValueSet::of(&[0])));
    assert!(!result.exit_states.is_empty());
}
