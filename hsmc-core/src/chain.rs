//! Exit / jump / entry chains.
//!
//! A chain is the flat list of steps one injection performs. Every backend
//! renders chains step by step, so the call order is fixed here and nowhere
//! else.

#[cfg(feature = "serde")]
use serde::Serialize;
use tracing::trace;

use crate::callback::CallbackIdx;
use crate::ir::When;
use crate::transition::{Branch, GuardDomain, Target, TransitionDef};
use crate::tree::{StateIdx, StateTree};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Step {
    /// Invoke an action.
    Call(CallbackIdx),
    /// Record the current state.
    SetState(StateIdx),
    /// Move to the terminal sentinel.
    Terminate,
}

/// One branch of a guarded handler.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Arm {
    pub when: When,
    pub steps: Vec<Step>,
}

/// What a resolved (state, event) pair does when injected.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Handler {
    Chain(Vec<Step>),
    /// The guard runs once; the first arm whose condition matches runs.
    Guarded {
        guard: CallbackIdx,
        domain: GuardDomain,
        arms: Vec<Arm>,
    },
}

pub struct ChainBuilder<'a> {
    tree: &'a StateTree,
}

impl<'a> ChainBuilder<'a> {
    pub fn new(tree: &'a StateTree) -> Self {
        Self { tree }
    }

    /// Builds the handler run when `origin` receives the event of `def`.
    pub fn handler(&self, origin: StateIdx, def: &TransitionDef) -> Handler {
        match def.guard {
            None => Handler::Chain(
                def.branches
                    .first()
                    .map(|branch| self.branch_chain(origin, def.defining, branch))
                    .unwrap_or_default(),
            ),
            Some(guard) => Handler::Guarded {
                guard: guard.callback,
                domain: guard.domain,
                arms: def
                    .branches
                    .iter()
                    .map(|branch| Arm {
                        when: branch.when,
                        steps: self.branch_chain(origin, def.defining, branch),
                    })
                    .collect(),
            },
        }
    }

    pub fn branch_chain(&self, origin: StateIdx, defining: StateIdx, branch: &Branch) -> Vec<Step> {
        let actions = branch.actions.iter().copied().map(Step::Call);
        let steps: Vec<Step> = match branch.target {
            Target::Internal => actions.collect(),
            Target::Final => match self.tree.get(defining).parent {
                // Terminal: leave everything up to and including the top-level
                // defining state, then run the completion actions.
                None => {
                    let mut steps = self.exit_steps(origin, None);
                    steps.push(Step::Terminate);
                    steps.extend(actions);
                    steps
                }
                Some(parent) => self.external(origin, parent, actions),
            },
            Target::State(target) => {
                let leaf = self.tree.default_leaf(target);
                self.external(origin, leaf, actions)
            }
        };
        trace!(
            origin = %self.tree.get(origin).id,
            defining = %self.tree.get(defining).id,
            steps = steps.len(),
            "built chain"
        );
        steps
    }

    fn external(
        &self,
        origin: StateIdx,
        dest: StateIdx,
        actions: impl Iterator<Item = Step>,
    ) -> Vec<Step> {
        // A self transition leaves and re-enters the state itself.
        let lca = if origin == dest {
            self.tree.get(origin).parent
        } else {
            self.tree.lca(origin, dest)
        };
        let mut steps = self.exit_steps(origin, lca);
        steps.extend(actions);
        steps.extend(self.entry_steps(lca, dest));
        steps
    }

    /// Exits from `from` upwards, stopping below `stop` (`None` exits every
    /// level). Each level runs its exit actions and then records itself as
    /// the current state.
    pub fn exit_steps(&self, from: StateIdx, stop: Option<StateIdx>) -> Vec<Step> {
        let mut steps = Vec::new();
        for level in self.tree.ancestors(from) {
            if Some(level) == stop {
                break;
            }
            steps.extend(self.tree.get(level).exit.iter().copied().map(Step::Call));
            steps.push(Step::SetState(level));
        }
        steps
    }

    /// Enters from just below `lca` down to `dest`. When `dest` is `lca`
    /// itself the machine only records it as current.
    pub fn entry_steps(&self, lca: Option<StateIdx>, dest: StateIdx) -> Vec<Step> {
        if Some(dest) == lca {
            return vec![Step::SetState(dest)];
        }
        let path = self.tree.path(dest);
        let start = lca
            .and_then(|lca| path.iter().position(|&level| level == lca))
            .map_or(0, |at| at + 1);
        let mut steps = Vec::new();
        for &level in &path[start..] {
            steps.push(Step::SetState(level));
            steps.extend(self.tree.get(level).entry.iter().copied().map(Step::Call));
        }
        steps
    }

    /// Startup sequence: enter the initial top-level state and cascade down
    /// its default children.
    pub fn initial_cascade(&self) -> Vec<Step> {
        let leaf = self.tree.default_leaf(self.tree.initial());
        self.entry_steps(None, leaf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::CallbackTable;
    use crate::ir::{BranchDecl, MachineIr, StateDecl, TargetDecl, TransitionDecl};
    use crate::resolve::{Resolution, Resolver};
    use crate::transition::TransitionSet;
    use crate::tree::EventAlphabet;

    fn state(id: &str) -> StateDecl {
        let label = id.rsplit('/').next().unwrap_or(id);
        StateDecl::new(id)
            .entry(format!("enter_{label}"))
            .exit(format!("exit_{label}"))
    }

    fn machine() -> MachineIr {
        MachineIr::new("chains")
            .initial("A")
            .events(["X", "Y", "Z"])
            .state(state("A").initial("A/B"))
            .state(state("A/B").parent("A"))
            .state(state("A/C").parent("A"))
            .state(state("D").initial("D/E"))
            .state(state("D/E").parent("D"))
            .state(state("D/F").parent("D"))
            .transition(TransitionDecl::to("A/B", "X", TargetDecl::state("A/C")).action("jump"))
            .transition(TransitionDecl::to("A/C", "Y", TargetDecl::Final).action("jump"))
            .transition(TransitionDecl::to("A/C", "X", TargetDecl::state("A/C")).action("jump"))
            .transition(
                TransitionDecl::new("A", "Z")
                    .guard("check")
                    .branch(BranchDecl::new(When::Is(true), TargetDecl::state("D")).action("jump"))
                    .branch(BranchDecl::new(When::Is(false), TargetDecl::Internal).action("stay")),
            )
            .transition(TransitionDecl::to("D", "Y", TargetDecl::Final).action("done"))
    }

    /// Renders a chain with callback names and state ids for readable asserts.
    fn render(steps: &[Step], tree: &StateTree, callbacks: &CallbackTable) -> Vec<String> {
        steps
            .iter()
            .map(|step| match *step {
                Step::Call(cb) => callbacks.name(cb).to_string(),
                Step::SetState(s) => format!("={}", tree.get(s).id),
                Step::Terminate => "=END".to_string(),
            })
            .collect()
    }

    struct Fixture {
        tree: StateTree,
        events: EventAlphabet,
        transitions: TransitionSet,
        callbacks: CallbackTable,
    }

    impl Fixture {
        fn new() -> Self {
            let ir = machine();
            let mut callbacks = CallbackTable::default();
            let tree = StateTree::build(&ir, &mut callbacks).unwrap();
            let events = EventAlphabet::build(&ir.events).unwrap();
            let transitions = TransitionSet::build(&ir, &tree, &events, &mut callbacks).unwrap();
            Self {
                tree,
                events,
                transitions,
                callbacks,
            }
        }

        fn handler(&self, state: &str, event: &str) -> Handler {
            let origin = self.tree.lookup(state).unwrap();
            let event = self.events.lookup(event).unwrap();
            match Resolver::new(&self.tree, &self.transitions).resolve(origin, event) {
                Resolution::Handled { def, .. } => ChainBuilder::new(&self.tree).handler(origin, def),
                Resolution::NotHandled => panic!("{state} does not handle {event:?}"),
            }
        }

        fn chain(&self, state: &str, event: &str) -> Vec<String> {
            match self.handler(state, event) {
                Handler::Chain(steps) => render(&steps, &self.tree, &self.callbacks),
                Handler::Guarded { .. } => panic!("unexpected guard"),
            }
        }
    }

    #[test]
    fn sibling_transition_exits_and_enters_one_level() {
        let f = Fixture::new();
        assert_eq!(
            f.chain("A/B", "X"),
            ["exit_B", "=A/B", "jump", "=A/C", "enter_C"]
        );
    }

    #[test]
    fn self_transition_is_external() {
        let f = Fixture::new();
        assert_eq!(
            f.chain("A/C", "X"),
            ["exit_C", "=A/C", "jump", "=A/C", "enter_C"]
        );
    }

    #[test]
    fn nested_final_rests_in_parent() {
        let f = Fixture::new();
        assert_eq!(f.chain("A/C", "Y"), ["exit_C", "=A/C", "jump", "=A"]);
    }

    #[test]
    fn top_level_final_terminates_from_descendant() {
        let f = Fixture::new();
        assert_eq!(
            f.chain("D/E", "Y"),
            ["exit_E", "=D/E", "exit_D", "=D", "=END", "done"]
        );
    }

    #[test]
    fn inherited_guarded_transition_cascades_into_default_leaf() {
        let f = Fixture::new();
        let Handler::Guarded { guard, domain, arms } = f.handler("A/B", "Z") else {
            panic!("Z is guarded");
        };
        assert_eq!(f.callbacks.name(guard), "check");
        assert_eq!(domain, GuardDomain::Boolean);
        assert_eq!(arms.len(), 2);
        assert_eq!(arms[0].when, When::Is(true));
        assert_eq!(
            render(&arms[0].steps, &f.tree, &f.callbacks),
            ["exit_B", "=A/B", "exit_A", "=A", "jump", "=D", "enter_D", "=D/E", "enter_E"]
        );
        assert_eq!(render(&arms[1].steps, &f.tree, &f.callbacks), ["stay"]);
    }

    #[test]
    fn initial_cascade_enters_every_level() {
        let f = Fixture::new();
        let steps = ChainBuilder::new(&f.tree).initial_cascade();
        assert_eq!(
            render(&steps, &f.tree, &f.callbacks),
            ["=A", "enter_A", "=A/B", "enter_B"]
        );
    }

    #[test]
    fn transition_into_child_of_resting_composite() {
        let f = Fixture::new();
        let builder = ChainBuilder::new(&f.tree);
        let a = f.tree.lookup("A").unwrap();
        let c = f.tree.lookup("A/C").unwrap();
        let steps = builder.entry_steps(f.tree.lca(a, c), c);
        assert_eq!(render(&steps, &f.tree, &f.callbacks), ["=A/C", "enter_C"]);
    }
}
