//! Machines used by the benchmarks

use hsmc_core::{BranchDecl, MachineIr, StateDecl, TargetDecl, TransitionDecl, When};

/// The reference machine: `A{B,C}` and `D{E,F}`, events `X, Y, Z`.
#[must_use]
pub fn test_fsm() -> MachineIr {
    let state = |id: &str| {
        let name = id.rsplit('/').next().unwrap_or(id);
        StateDecl::new(id)
            .entry(format!("enter_{name}"))
            .exit(format!("exit_{name}"))
    };
    MachineIr::new("test_fsm")
        .initial("A")
        .events(["X", "Y", "Z"])
        .state(state("A").initial("A/B"))
        .state(state("A/B").parent("A"))
        .state(state("A/C").parent("A"))
        .state(state("D").initial("D/E"))
        .state(state("D/E").parent("D"))
        .state(state("D/F").parent("D"))
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

/// `width` top-level columns `L<i>`, each a chain of `depth` nested states
/// `L<i>/N1/.../N<depth-1>`. `next` moves from any state of a column to the
/// next column, so every dispatch exits and enters `depth` levels.
///
/// # Panics
///
/// Panics if `width` or `depth` is zero.
#[must_use]
pub fn ladder(width: usize, depth: usize) -> MachineIr {
    assert!(width > 0 && depth > 0, "ladder needs at least one state");
    let mut ir = MachineIr::new("ladder").initial("L0").events(["next"]);
    for column in 0..width {
        let mut id = format!("L{column}");
        let mut parent: Option<String> = None;
        for level in 1..=depth {
            let child = format!("{id}/N{level}");
            let mut decl = StateDecl::new(id.as_str())
                .entry(format!("enter_{level}"))
                .exit(format!("exit_{level}"));
            if level < depth {
                decl = decl.initial(child.as_str());
            }
            if let Some(parent) = &parent {
                decl = decl.parent(parent.as_str());
            }
            ir = ir.state(decl);
            parent = Some(id);
            id = child;
        }
        let next = format!("L{}", (column + 1) % width);
        ir = ir.transition(TransitionDecl::to(
            format!("L{column}"),
            "next",
            TargetDecl::state(next),
        ));
    }
    ir
}
