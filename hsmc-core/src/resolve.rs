//! Nearest-definition lookup of transitions through the state hierarchy.

use crate::transition::{TransitionDef, TransitionSet};
use crate::tree::{EventIdx, StateIdx, StateTree};

/// Outcome of resolving one (state, event) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution<'a> {
    /// `defining` is the state itself or its nearest ancestor that declares
    /// a transition on the event.
    Handled {
        defining: StateIdx,
        def: &'a TransitionDef,
    },
    /// Nothing on the ancestor chain reacts to the event.
    NotHandled,
}

pub struct Resolver<'a> {
    tree: &'a StateTree,
    transitions: &'a TransitionSet,
}

impl<'a> Resolver<'a> {
    pub fn new(tree: &'a StateTree, transitions: &'a TransitionSet) -> Self {
        Self { tree, transitions }
    }

    pub fn resolve(&self, state: StateIdx, event: EventIdx) -> Resolution<'a> {
        let transitions = self.transitions;
        self.tree
            .ancestors(state)
            .find_map(|level| {
                transitions
                    .get(level, event)
                    .map(|def| Resolution::Handled {
                        defining: level,
                        def,
                    })
            })
            .unwrap_or(Resolution::NotHandled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::CallbackTable;
    use crate::ir::{MachineIr, StateDecl, TargetDecl, TransitionDecl};
    use crate::tree::EventAlphabet;

    fn setup(ir: &MachineIr) -> (StateTree, EventAlphabet, TransitionSet) {
        let mut callbacks = CallbackTable::default();
        let tree = StateTree::build(ir, &mut callbacks).unwrap();
        let events = EventAlphabet::build(&ir.events).unwrap();
        let transitions = TransitionSet::build(ir, &tree, &events, &mut callbacks).unwrap();
        (tree, events, transitions)
    }

    #[test]
    fn nearest_definition_wins() {
        let ir = MachineIr::new("m")
            .events(["X", "Y", "Z"])
            .state(StateDecl::new("A").initial("A/B"))
            .state(StateDecl::new("A/B").parent("A").initial("A/B/C"))
            .state(StateDecl::new("A/B/C").parent("A/B"))
            .transition(TransitionDecl::to("A", "X", TargetDecl::Internal))
            .transition(TransitionDecl::to("A/B", "X", TargetDecl::Final))
            .transition(TransitionDecl::to("A", "Y", TargetDecl::Internal));
        let (tree, events, transitions) = setup(&ir);
        let resolver = Resolver::new(&tree, &transitions);
        let leaf = tree.lookup("A/B/C").unwrap();
        let x = events.lookup("X").unwrap();
        let y = events.lookup("Y").unwrap();
        let z = events.lookup("Z").unwrap();

        match resolver.resolve(leaf, x) {
            Resolution::Handled { defining, def } => {
                assert_eq!(defining, tree.lookup("A/B").unwrap());
                assert_eq!(def.defining, defining);
            }
            Resolution::NotHandled => panic!("X is handled by A/B"),
        }
        assert!(matches!(
            resolver.resolve(leaf, y),
            Resolution::Handled { defining, .. } if defining == tree.lookup("A").unwrap()
        ));
        assert_eq!(resolver.resolve(leaf, z), Resolution::NotHandled);
    }
}
