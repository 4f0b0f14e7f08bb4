//! The nested JSON machine document.
//!
//! ```json
//! {
//!   "name": "test_fsm",
//!   "initial": "A",
//!   "states": [
//!     { "state": "A", "initial": "B", "enter": ["enter_A"],
//!       "transitions": [{ "event": "Z", "condition": "check", "next": "/D" }],
//!       "states": [{ "state": "B" }] }
//!   ]
//! }
//! ```
//!
//! A transition's `next` is either absent (internal), `null` (final), an
//! absolute pointer (`/D/E`), a pointer relative to the declaring state
//! (`.`, `..`, `./X`, `../X`) or the name of a sibling. Transitions of one
//! state on one event are grouped into a single guarded transition.

use std::io::Read;

use serde::{Deserialize, Deserializer};
use thiserror::Error;
use tracing::debug;

use crate::ir::{BranchDecl, MachineIr, StateDecl, TargetDecl, TransitionDecl, When};

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("invalid machine document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("next state '{pointer}' of a transition from state '{state}' is not a valid state pointer")]
    InvalidPointer { state: String, pointer: String },

    #[error("transitions on '{event}' from state '{state}' test different conditions '{first}' and '{second}'")]
    MixedConditions {
        state: String,
        event: String,
        first: String,
        second: String,
    },

    #[error("transition on '{event}' from state '{state}' follows an unconditional transition and can never be taken")]
    Unreachable { state: String, event: String },
}

/// Top level of a machine document.
#[derive(Debug, Clone, Deserialize)]
pub struct Document {
    pub name: String,
    pub initial: String,
    /// Event alphabet; defaults to the events in order of first use.
    #[serde(default)]
    pub events: Option<Vec<String>>,
    pub states: Vec<StateDocument>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StateDocument {
    pub state: String,
    #[serde(default)]
    pub initial: Option<String>,
    #[serde(default)]
    pub enter: Vec<String>,
    #[serde(default)]
    pub exit: Vec<String>,
    #[serde(default)]
    pub transitions: Vec<TransitionDocument>,
    #[serde(default)]
    pub states: Vec<StateDocument>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransitionDocument {
    pub event: String,
    #[serde(default)]
    pub condition: Option<Condition>,
    #[serde(default)]
    pub actions: Vec<String>,
    /// `None`: key absent. `Some(None)`: explicit `null`.
    #[serde(default, deserialize_with = "present")]
    pub next: Option<Option<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Condition {
    Is(String),
    Not { not: String },
}

impl Condition {
    fn split(&self) -> (&str, bool) {
        match self {
            Condition::Is(name) => (name, true),
            Condition::Not { not } => (not, false),
        }
    }
}

fn present<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

/// Parses a JSON document and lowers it to the IR.
pub fn from_str(json: &str) -> Result<MachineIr, DocumentError> {
    serde_json::from_str::<Document>(json)?.into_ir()
}

pub fn from_reader(reader: impl Read) -> Result<MachineIr, DocumentError> {
    serde_json::from_reader::<_, Document>(reader)?.into_ir()
}

impl Document {
    pub fn into_ir(self) -> Result<MachineIr, DocumentError> {
        let mut lowering = Lowering {
            ir: MachineIr::new(self.name).initial(self.initial),
            seen_events: Vec::new(),
        };
        let mut path = Vec::new();
        for state in &self.states {
            lowering.state(state, None, &mut path)?;
        }
        let Lowering {
            mut ir,
            seen_events,
        } = lowering;
        ir.events = self.events.unwrap_or(seen_events);
        debug!(
            machine = %ir.name,
            states = ir.states.len(),
            transitions = ir.transitions.len(),
            "lowered machine document"
        );
        Ok(ir)
    }
}

struct Lowering {
    ir: MachineIr,
    seen_events: Vec<String>,
}

impl Lowering {
    fn state(
        &mut self,
        doc: &StateDocument,
        parent: Option<&str>,
        path: &mut Vec<String>,
    ) -> Result<(), DocumentError> {
        path.push(doc.state.clone());
        let id = path.join("/");

        let mut decl = StateDecl::new(&id);
        decl.parent = parent.map(str::to_string);
        decl.initial = doc.initial.as_ref().map(|child| format!("{id}/{child}"));
        decl.entry = doc.enter.clone();
        decl.exit = doc.exit.clone();
        self.ir.states.push(decl);

        for event in event_order(&doc.transitions) {
            if !self.seen_events.iter().any(|seen| seen == event) {
                self.seen_events.push(event.to_string());
            }
            let group: Vec<&TransitionDocument> = doc
                .transitions
                .iter()
                .filter(|t| t.event == event)
                .collect();
            let decl = group_transitions(&id, event, &group, path)?;
            self.ir.transitions.push(decl);
        }

        for child in &doc.states {
            self.state(child, Some(&id), path)?;
        }
        path.pop();
        Ok(())
    }
}

/// Events of `transitions` in order of first appearance.
fn event_order(transitions: &[TransitionDocument]) -> Vec<&str> {
    let mut events: Vec<&str> = Vec::new();
    for transition in transitions {
        if !events.contains(&transition.event.as_str()) {
            events.push(&transition.event);
        }
    }
    events
}

fn group_transitions(
    state: &str,
    event: &str,
    group: &[&TransitionDocument],
    path: &[String],
) -> Result<TransitionDecl, DocumentError> {
    let mut decl = TransitionDecl::new(state, event);
    let mut unconditional = false;

    for transition in group {
        if unconditional {
            return Err(DocumentError::Unreachable {
                state: state.to_string(),
                event: event.to_string(),
            });
        }
        let when = match &transition.condition {
            None => {
                unconditional = true;
                if decl.branches.is_empty() {
                    When::Always
                } else {
                    When::Otherwise
                }
            }
            Some(condition) => {
                let (name, taken) = condition.split();
                match &decl.guard {
                    Some(guard) if guard != name => {
                        return Err(DocumentError::MixedConditions {
                            state: state.to_string(),
                            event: event.to_string(),
                            first: guard.clone(),
                            second: name.to_string(),
                        });
                    }
                    Some(_) => {}
                    None => decl.guard = Some(name.to_string()),
                }
                When::Is(taken)
            }
        };
        let target = target(state, transition.next.as_ref(), path)?;
        let mut branch = BranchDecl::new(when, target);
        branch.actions = transition.actions.clone();
        decl.branches.push(branch);
    }
    Ok(decl)
}

fn target(
    state: &str,
    next: Option<&Option<String>>,
    path: &[String],
) -> Result<TargetDecl, DocumentError> {
    let pointer = match next {
        None => return Ok(TargetDecl::Internal),
        Some(None) => return Ok(TargetDecl::Final),
        Some(Some(pointer)) => pointer,
    };
    let invalid = || DocumentError::InvalidPointer {
        state: state.to_string(),
        pointer: pointer.clone(),
    };

    let resolved: Vec<String> = if let Some(absolute) = pointer.strip_prefix('/') {
        absolute.split('/').map(str::to_string).collect()
    } else if pointer.starts_with('.') {
        let mut resolved = path.to_vec();
        for segment in pointer.split('/') {
            match segment {
                "." => {}
                // `..` above the top level stays at the top level.
                ".." => {
                    resolved.pop();
                }
                name => resolved.push(name.to_string()),
            }
        }
        resolved
    } else {
        if pointer.contains('/') {
            return Err(invalid());
        }
        let mut resolved = path.to_vec();
        resolved.pop();
        resolved.push(pointer.clone());
        resolved
    };

    if resolved.is_empty() || resolved.iter().any(|segment| segment.is_empty() || segment.starts_with('.')) {
        return Err(invalid());
    }
    Ok(TargetDecl::State(resolved.join("/")))
}
