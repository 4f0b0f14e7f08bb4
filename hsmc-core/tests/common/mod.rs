//! Fixtures shared by the integration tests.

#![allow(dead_code)]

use hsmc_core::{BranchDecl, MachineIr, StateDecl, TargetDecl, TransitionDecl, When};

pub const TEST_FSM_JSON: &str = include_str!("../fixtures/test_fsm.json");

pub fn setup_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn state(id: &str, parent: Option<&str>) -> StateDecl {
    let name = id.rsplit('/').next().unwrap_or(id);
    let decl = StateDecl::new(id)
        .entry(format!("enter_{name}"))
        .exit(format!("exit_{name}"));
    match parent {
        Some(parent) => decl.parent(parent),
        None => decl,
    }
}

/// `A{B,C}` and `D{E,F}` with defaults `B` and `E`.
pub fn test_fsm() -> MachineIr {
    MachineIr::new("test_fsm")
        .initial("A")
        .events(["X", "Y", "Z"])
        .state(state("A", None).initial("A/B"))
        .state(state("A/B", Some("A")))
        .state(state("A/C", Some("A")))
        .state(state("D", None).initial("D/E"))
        .state(state("D/E", Some("D")))
        .state(state("D/F", Some("D")))
        .transition(
            TransitionDecl::new("A", "Z")
                .guard("check")
                .branch(BranchDecl::new(When::Is(true), TargetDecl::state("D/E")).action("jump"))
                .branch(BranchDecl::new(When::Is(false), TargetDecl::state("D/F")).action("jump")),
        )
        .transition(TransitionDecl::to("A/B", "X", TargetDecl::state("A/C")).action("jump"))
        .transition(TransitionDecl::to("A/C", "X", TargetDecl::state("A/B")).action("jump"))
        .transition(TransitionDecl::to("A/C", "Y", TargetDecl::Final).action("jump"))
        .transition(TransitionDecl::to("D", "Y", TargetDecl::Final).action("done"))
        .transition(TransitionDecl::to("D/E", "X", TargetDecl::state("D/F")).action("jump"))
        .transition(TransitionDecl::to("D/F", "X", TargetDecl::state("D/E")).action("jump"))
        .transition(TransitionDecl::to("D/F", "Y", TargetDecl::Final).action("jump"))
}
