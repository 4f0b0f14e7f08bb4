//! The same machines through the interpreter and through `fsm!`-generated
//! Rust; both must call the same actions in the same order.

use std::convert::Infallible;

use anyhow::{Context, Result};
use hsmc_core::emit::{EmitOptions, Language, emit};
use hsmc_core::runtime::Instance;
use hsmc_core::test_utils::Recorder;
use hsmc_core::{
    BranchDecl, MachineIr, StateDecl, TargetDecl, TransitionDecl, When, compile, document,
};
use tracing::debug;

use crate::common::{self, Trace, setup_tracing};

hsmc_macro::fsm! {
    name: test_fsm,
    events: [X, Y, Z],
    initial: A,
    state A {
        initial: B;
        entry: enter_A;
        exit: exit_A;
        on Z [guard check] => D::E [action jump];
        on Z [guard !check] => D::F [action jump];
        state B {
            entry: enter_B;
            exit: exit_B;
            on X => C [action jump];
        }
        state C {
            entry: enter_C;
            exit: exit_C;
            on X => B [action jump];
            on Y => final [action jump];
        }
    }
    state D {
        initial: E;
        entry: enter_D;
        exit: exit_D;
        on Y => final [action done];
        state E {
            entry: enter_E;
            exit: exit_E;
            on X => F [action jump];
        }
        state F {
            entry: enter_F;
            exit: exit_F;
            on X => E [action jump];
            on Y => final [action jump];
        }
    }
}

hsmc_macro::fsm! {
    name: pump,
    initial: idle,
    state idle {
        on tick [guard level(0)] [action wait];
        on tick [guard level(1)] => low [action start];
        on tick [guard level(_)] => high [action start];
    }
    state low {
        entry: slow;
        on tick => idle;
    }
    state high {
        entry: fast;
        on tick => idle;
    }
}

macro_rules! record {
    ($name:literal) => {
        |fsm, _| {
            fsm.data_mut().calls.push($name);
            Ok(())
        }
    };
}

fn test_fsm_callbacks() -> test_fsm::Callbacks<Trace, (), Infallible> {
    test_fsm::Callbacks::<Trace, (), Infallible> {
        action_enter_A: record!("enter_A"),
        action_exit_A: record!("exit_A"),
        action_enter_B: record!("enter_B"),
        action_exit_B: record!("exit_B"),
        action_enter_C: record!("enter_C"),
        action_exit_C: record!("exit_C"),
        action_enter_D: record!("enter_D"),
        action_exit_D: record!("exit_D"),
        action_enter_E: record!("enter_E"),
        action_exit_E: record!("exit_E"),
        action_enter_F: record!("enter_F"),
        action_exit_F: record!("exit_F"),
        condition_check: |fsm, _| Ok(fsm.data().check),
        action_jump: record!("jump"),
        action_done: record!("done"),
    }
}

fn pump_callbacks() -> pump::Callbacks<Trace, (), Infallible> {
    pump::Callbacks::<Trace, (), Infallible> {
        action_slow: record!("slow"),
        action_fast: record!("fast"),
        condition_level: |fsm, _| Ok(fsm.data().level),
        action_wait: record!("wait"),
        action_start: record!("start"),
    }
}

fn pump_ir() -> MachineIr {
    MachineIr::new("pump")
        .initial("idle")
        .events(["tick"])
        .state(StateDecl::new("idle"))
        .state(StateDecl::new("low").entry("slow"))
        .state(StateDecl::new("high").entry("fast"))
        .transition(
            TransitionDecl::new("idle", "tick")
                .guard("level")
                .branch(BranchDecl::new(When::Case(0), TargetDecl::Internal).action("wait"))
                .branch(BranchDecl::new(When::Case(1), TargetDecl::state("low")).action("start"))
                .branch(BranchDecl::new(When::Otherwise, TargetDecl::state("high")).action("start")),
        )
        .transition(TransitionDecl::to("low", "tick", TargetDecl::state("idle")))
        .transition(TransitionDecl::to("high", "tick", TargetDecl::state("idle")))
}

/// Runs `events` through both backends, comparing the state after every
/// step, and returns the two action traces.
fn run_both(events: &[(test_fsm::Event, bool)]) -> Result<(Vec<String>, Vec<&'static str>)> {
    let machine = compile(&common::test_fsm())?;
    let mut interpreted = Instance::new(&machine, Recorder::new(), ());
    interpreted.init(&())?;

    let cb = test_fsm_callbacks();
    let mut generated = test_fsm::Fsm::new(&cb, Trace::default());
    generated.init(&())?;
    assert_eq!(interpreted.state_id(), generated.state().map(test_fsm::State::id));

    for &(event, check) in events {
        interpreted.callbacks_mut().set_answer("check", check);
        generated.data_mut().check = check;

        let idx = machine
            .event(event.id())
            .context("generated event missing from the compiled machine")?;
        interpreted.inject(idx, &())?;
        generated.inject(event, &())?;
        assert_eq!(
            interpreted.state_id(),
            generated.state().map(test_fsm::State::id),
            "after {event:?}"
        );
        debug!(?event, check, state = ?interpreted.state_id(), "stepped both backends");
    }

    let (recorder, ()) = interpreted.into_parts();
    Ok((recorder.calls().to_vec(), generated.into_data().calls))
}

#[test]
fn generated_machine_reproduces_the_reference_trace() -> Result<()> {
    setup_tracing();
    use test_fsm::Event::{X, Y, Z};

    let (interpreted, generated) =
        run_both(&[(X, true), (X, true), (Z, true), (X, true), (Y, true), (Y, true)])?;
    assert_eq!(interpreted, generated);
    assert_eq!(
        generated,
        [
            "enter_A", "enter_B", "exit_B", "jump", "enter_C", "exit_C", "jump", "enter_B",
            "exit_B", "exit_A", "jump", "enter_D", "enter_E", "exit_E", "jump", "enter_F",
            "exit_F", "jump", "exit_D", "done",
        ]
    );
    Ok(())
}

#[test]
fn both_backends_agree_on_the_false_branch_and_region_completion() -> Result<()> {
    use test_fsm::Event::{X, Y, Z};

    let (interpreted, generated) =
        run_both(&[(X, false), (Y, false), (Z, false), (Y, false), (Z, true), (X, true)])?;
    assert_eq!(interpreted, generated);
    assert_eq!(
        generated,
        [
            "enter_A", "enter_B", "exit_B", "jump", "enter_C", "exit_C", "jump", "exit_A",
            "jump", "enter_D", "enter_F", "exit_F", "jump",
        ]
    );
    Ok(())
}

#[test]
fn generated_layout_matches_the_compiled_machine() -> Result<()> {
    let machine = compile(&common::test_fsm())?;
    assert_eq!(test_fsm::NUM_STATE, machine.tree().len());
    assert_eq!(test_fsm::NUM_EVENT, machine.events().len());
    for state in test_fsm::State::ALL {
        let idx = machine.state(state.id()).context("unknown state")?;
        assert_eq!(idx.ordinal(), state.ordinal());
    }
    Ok(())
}

#[test]
fn selector_guard_agrees_across_backends() -> Result<()> {
    let machine = compile(&pump_ir())?;
    let tick = machine.event("tick").context("tick")?;
    let mut interpreted = Instance::new(&machine, Recorder::new().queue("level", [0_i64, 1, 7]), ());
    interpreted.init(&())?;

    let cb = pump_callbacks();
    let mut generated = pump::Fsm::new(&cb, Trace::default());
    generated.init(&())?;

    for level in [0, 1, 1, 7] {
        generated.data_mut().level = level;
        generated.inject_tick(&())?;
        interpreted.inject(tick, &())?;
        assert_eq!(interpreted.state_id(), generated.state().map(pump::State::id));
    }

    let expected = ["wait", "start", "slow", "start", "fast"];
    assert_eq!(interpreted.callbacks().calls(), expected);
    assert_eq!(interpreted.callbacks().guard_calls().len(), 3);
    assert_eq!(generated.into_data().calls, expected);
    Ok(())
}

#[test]
fn every_front_end_produces_the_same_output() -> Result<()> {
    let from_document =
        document::from_str(include_str!("../../hsmc-core/tests/fixtures/test_fsm.json"))?;
    let from_builders = common::test_fsm();
    assert_eq!(from_document, from_builders);

    for language in [Language::C, Language::Python, Language::Rust] {
        let a = emit(language, &compile(&from_document)?, &EmitOptions::default());
        let b = emit(language, &compile(&from_builders)?, &EmitOptions::default());
        assert_eq!(a, b, "{language}");
    }
    Ok(())
}
