//! The flat intermediate representation handed to the compiler by a front-end.
//!
//! A front-end (the JSON [`document`](crate::document) loader, the `fsm!`
//! macro, or hand-written builder calls) produces a [`MachineIr`]. States refer
//! to their parent by id, so the IR itself can express malformed hierarchies;
//! [`compile`](crate::compile) rejects them.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A complete machine description: states, events and transitions.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MachineIr {
    pub name: String,
    /// Top-level state entered at startup. May be omitted when there is a
    /// single top-level state.
    #[cfg_attr(feature = "serde", serde(default))]
    pub initial: Option<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub events: Vec<String>,
    pub states: Vec<StateDecl>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub transitions: Vec<TransitionDecl>,
}

impl MachineIr {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn initial(mut self, state: impl Into<String>) -> Self {
        self.initial = Some(state.into());
        self
    }

    #[must_use]
    pub fn event(mut self, event: impl Into<String>) -> Self {
        self.events.push(event.into());
        self
    }

    #[must_use]
    pub fn events<I, S>(mut self, events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.events.extend(events.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn state(mut self, state: StateDecl) -> Self {
        self.states.push(state);
        self
    }

    #[must_use]
    pub fn transition(mut self, transition: TransitionDecl) -> Self {
        self.transitions.push(transition);
        self
    }
}

/// One declared state. Declaration order fixes the state ordinal.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StateDecl {
    /// Machine-wide unique id. Front-ends that scope names by nesting use
    /// `/`-separated paths (`A/B`); each segment must be an identifier.
    pub id: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub parent: Option<String>,
    /// Id of the default child; required iff the state has children.
    #[cfg_attr(feature = "serde", serde(default))]
    pub initial: Option<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub entry: Vec<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub exit: Vec<String>,
}

impl StateDecl {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    #[must_use]
    pub fn initial(mut self, child: impl Into<String>) -> Self {
        self.initial = Some(child.into());
        self
    }

    #[must_use]
    pub fn entry(mut self, action: impl Into<String>) -> Self {
        self.entry.push(action.into());
        self
    }

    #[must_use]
    pub fn exit(mut self, action: impl Into<String>) -> Self {
        self.exit.push(action.into());
        self
    }
}

/// A reaction of `state` to `event`. At most one per (state, event) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TransitionDecl {
    pub state: String,
    pub event: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub guard: Option<String>,
    pub branches: Vec<BranchDecl>,
}

impl TransitionDecl {
    pub fn new(state: impl Into<String>, event: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            event: event.into(),
            guard: None,
            branches: Vec::new(),
        }
    }

    /// Shorthand for an unguarded transition with a single branch.
    pub fn to(state: impl Into<String>, event: impl Into<String>, target: TargetDecl) -> Self {
        Self::new(state, event).branch(BranchDecl::new(When::Always, target))
    }

    #[must_use]
    pub fn guard(mut self, guard: impl Into<String>) -> Self {
        self.guard = Some(guard.into());
        self
    }

    #[must_use]
    pub fn branch(mut self, branch: BranchDecl) -> Self {
        self.branches.push(branch);
        self
    }

    /// Appends an action to the most recently added branch.
    #[must_use]
    pub fn action(mut self, action: impl Into<String>) -> Self {
        if let Some(branch) = self.branches.last_mut() {
            branch.actions.push(action.into());
        }
        self
    }
}

/// One outcome of a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BranchDecl {
    #[cfg_attr(feature = "serde", serde(default))]
    pub when: When,
    pub target: TargetDecl,
    #[cfg_attr(feature = "serde", serde(default))]
    pub actions: Vec<String>,
}

impl BranchDecl {
    pub fn new(when: When, target: TargetDecl) -> Self {
        Self {
            when,
            target,
            actions: Vec::new(),
        }
    }

    #[must_use]
    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.actions.push(action.into());
        self
    }
}

/// The guard value a branch is selected on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum When {
    /// Unguarded: the only branch of its transition.
    #[default]
    Always,
    /// Boolean guard returned this value.
    Is(bool),
    /// Selector guard returned this value.
    Case(i64),
    /// Catch-all for every value not matched by an earlier branch.
    Otherwise,
}

impl core::fmt::Display for When {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            When::Always => f.write_str("always"),
            When::Is(value) => write!(f, "{value}"),
            When::Case(value) => write!(f, "case {value}"),
            When::Otherwise => f.write_str("otherwise"),
        }
    }
}

/// Where a branch leads.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum TargetDecl {
    /// Move to the state with this id, cascading into default children.
    State(String),
    /// Complete the defining state: rest in its parent, or terminate the
    /// machine when the defining state is top-level.
    Final,
    /// Run the branch actions without leaving the current state.
    Internal,
}

impl TargetDecl {
    pub fn state(id: impl Into<String>) -> Self {
        TargetDecl::State(id.into())
    }
}
