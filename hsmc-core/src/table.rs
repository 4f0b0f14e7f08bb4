//! Flat per-event dispatch tables.

#[cfg(feature = "serde")]
use serde::Serialize;
use tracing::{debug, trace};

use crate::chain::{ChainBuilder, Handler, Step};
use crate::resolve::{Resolution, Resolver};
use crate::transition::TransitionSet;
use crate::tree::{EventAlphabet, EventIdx, StateIdx, StateTree};

/// The effective reaction of `origin` to one event.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct ResolvedTransition {
    pub origin: StateIdx,
    pub event: EventIdx,
    /// Where the reaction was declared: `origin` or one of its ancestors.
    pub defining: StateIdx,
    pub handler: Handler,
}

/// `rows[event][state]` holds the reaction of `state` to `event`; `None` is a
/// no-op.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct DispatchTable {
    rows: Vec<Vec<Option<ResolvedTransition>>>,
    init: Vec<Step>,
}

impl DispatchTable {
    pub(crate) fn assemble(
        tree: &StateTree,
        events: &EventAlphabet,
        transitions: &TransitionSet,
    ) -> Self {
        let resolver = Resolver::new(tree, transitions);
        let builder = ChainBuilder::new(tree);

        let rows: Vec<Vec<Option<ResolvedTransition>>> = events
            .iter()
            .map(|(event, event_name)| {
                tree.iter()
                    .map(|(origin, node)| match resolver.resolve(origin, event) {
                        Resolution::Handled { defining, def } => {
                            trace!(
                                state = %node.id,
                                event = event_name,
                                defining = %tree.get(defining).id,
                                "resolved"
                            );
                            Some(ResolvedTransition {
                                origin,
                                event,
                                defining,
                                handler: builder.handler(origin, def),
                            })
                        }
                        Resolution::NotHandled => None,
                    })
                    .collect()
            })
            .collect();

        let init = builder.initial_cascade();
        debug!(
            events = rows.len(),
            handled = rows.iter().flatten().flatten().count(),
            init_steps = init.len(),
            "assembled dispatch table"
        );
        Self { rows, init }
    }

    pub fn lookup(&self, state: StateIdx, event: EventIdx) -> Option<&ResolvedTransition> {
        self.rows
            .get(event.ordinal())
            .and_then(|row| row.get(state.ordinal()))
            .and_then(Option::as_ref)
    }

    /// The table of one event, indexed by state ordinal.
    pub fn row(&self, event: EventIdx) -> &[Option<ResolvedTransition>] {
        &self.rows[event.ordinal()]
    }

    /// Steps run by `init`.
    pub fn init(&self) -> &[Step] {
        &self.init
    }

    /// Every resolved pair, event-major: all states reacting to the first
    /// event in ordinal order, then the second event, and so on.
    pub fn resolved(&self) -> impl Iterator<Item = &ResolvedTransition> + '_ {
        self.rows.iter().flatten().flatten()
    }
}

/// Serializable view of a compiled machine: ordinals, callbacks, the
/// initial cascade and every resolved chain.
#[cfg(feature = "serde")]
#[derive(Debug, Serialize)]
pub struct TableDump<'a> {
    pub machine: &'a str,
    pub states: Vec<&'a crate::StateNode>,
    pub events: Vec<&'a str>,
    pub callbacks: Vec<&'a crate::Callback>,
    pub init: &'a [Step],
    pub handlers: Vec<&'a ResolvedTransition>,
}

#[cfg(feature = "serde")]
impl<'a> TableDump<'a> {
    pub fn new(machine: &'a crate::Compiled) -> Self {
        Self {
            machine: machine.name(),
            states: machine.tree().iter().map(|(_, node)| node).collect(),
            events: machine.events().iter().map(|(_, name)| name).collect(),
            callbacks: machine.callbacks().iter().map(|(_, cb)| cb).collect(),
            init: machine.table().init(),
            handlers: machine.table().resolved().collect(),
        }
    }
}
