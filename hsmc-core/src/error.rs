//! Compile-time errors.
//!
//! Every error here is fatal: compilation stops at the first one and nothing
//! is emitted.

use thiserror::Error;

/// Result alias used across the compile pipeline.
pub type Result<T, E = CompileError> = core::result::Result<T, E>;

/// Errors reported while building a machine from its intermediate representation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("machine '{machine}' declares no states")]
    EmptyMachine { machine: String },

    #[error("'{name}' is not a valid {what} name: expected an identifier")]
    InvalidName { what: &'static str, name: String },

    #[error("duplicate state '{state}'")]
    DuplicateState { state: String },

    #[error("states '{first}' and '{second}' both render as label '{label}'")]
    DuplicateLabel {
        label: String,
        first: String,
        second: String,
    },

    #[error("parent '{parent}' of state '{state}' is not a defined state")]
    UnknownParent { state: String, parent: String },

    #[error("state hierarchy contains a cycle through '{state}'")]
    HierarchyCycle { state: String },

    #[error("composite state '{state}' must declare a default child")]
    MissingDefaultChild { state: String },

    #[error("state '{state}' declares default child '{child}' but has no nested states")]
    DefaultChildOnLeaf { state: String, child: String },

    #[error("default child '{child}' of state '{state}' is not a direct child of that state")]
    DefaultChildNotAChild { state: String, child: String },

    #[error("machine has {count} top-level states and no initial state")]
    MissingInitial { count: usize },

    #[error("initial state '{state}' of the machine is not a defined state")]
    UnknownInitial { state: String },

    #[error("initial state '{state}' of the machine is not a top-level state")]
    InitialNotTopLevel { state: String },

    #[error("duplicate event '{event}'")]
    DuplicateEvent { event: String },

    #[error("transition on '{event}' is declared on undefined state '{state}'")]
    UnknownTransitionState { state: String, event: String },

    #[error("transition from state '{state}' references undeclared event '{event}'")]
    UnknownEvent { state: String, event: String },

    #[error("next state '{target}' of transition on '{event}' from state '{state}' is not a defined state")]
    UnknownTarget {
        state: String,
        event: String,
        target: String,
    },

    #[error("state '{state}' declares more than one transition on '{event}'")]
    DuplicateTransition { state: String, event: String },

    #[error("transition on '{event}' from state '{state}' has no branches")]
    NoBranches { state: String, event: String },

    #[error("unguarded transition on '{event}' from state '{state}' must have exactly one unconditional branch")]
    UnguardedBranches { state: String, event: String },

    #[error("guarded transition on '{event}' from state '{state}' has an unconditional branch; use a catch-all instead")]
    UnconditionalGuardedBranch { state: String, event: String },

    #[error("transition on '{event}' from state '{state}' mixes boolean and selector conditions for guard '{guard}'")]
    MixedConditions {
        state: String,
        event: String,
        guard: String,
    },

    #[error("transition on '{event}' from state '{state}' repeats the branch for {condition}")]
    DuplicateBranch {
        state: String,
        event: String,
        condition: String,
    },

    #[error("transition on '{event}' from state '{state}' has a branch after its catch-all branch")]
    BranchAfterCatchAll { state: String, event: String },

    #[error("branches of transition on '{event}' from state '{state}' do not cover guard '{guard}': missing {missing}")]
    NonExhaustiveGuard {
        state: String,
        event: String,
        guard: String,
        missing: String,
    },

    #[error("guard '{guard}' is used both as a boolean and as a selector guard")]
    GuardDomainConflict { guard: String },

    #[error("callback '{name}' is used both as a guard and as an action")]
    CallbackKindConflict { name: String },

    #[error("handlers for '{first_event}' in state '{first_state}' and '{second_event}' in state '{second_state}' would both be named '{name}'")]
    HandlerNameCollision {
        name: String,
        first_state: String,
        first_event: String,
        second_state: String,
        second_event: String,
    },
}
