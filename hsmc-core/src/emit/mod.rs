//! Source emission.
//!
//! Every backend implements [`Backend`]; [`drive`] calls it in one fixed
//! order, so all targets see the same handlers, tables and call sequences.

pub mod c;
pub mod python;
pub mod rust;

use core::fmt;
use core::str::FromStr;
use std::collections::HashMap;

use thiserror::Error;
use tracing::debug;

use crate::callback::CallbackIdx;
use crate::error::{CompileError, Result};
use crate::table::{DispatchTable, ResolvedTransition};
use crate::tree::{EventAlphabet, EventIdx, StateIdx, StateTree, check_name};
use crate::Compiled;

/// Caller-facing emission settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmitOptions {
    prefix: Option<String>,
}

impl EmitOptions {
    /// Overrides the machine name as the identifier prefix of generated
    /// items (`<prefix>_init`, `pub mod <prefix>`, ...).
    ///
    /// # Errors
    ///
    /// Fails when `prefix` is not an identifier.
    pub fn with_prefix(prefix: impl Into<String>) -> Result<Self> {
        let prefix = prefix.into();
        check_name("prefix", &prefix)?;
        Ok(Self {
            prefix: Some(prefix),
        })
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }
}

/// Read-only view of a compiled machine shared by all backends.
pub struct EmitContext<'a> {
    pub machine: &'a Compiled,
    pub prefix: &'a str,
}

impl<'a> EmitContext<'a> {
    pub fn new(machine: &'a Compiled, options: &'a EmitOptions) -> Self {
        Self {
            machine,
            prefix: options.prefix().unwrap_or_else(|| machine.name()),
        }
    }

    pub fn state_label(&self, state: StateIdx) -> &'a str {
        &self.machine.tree().get(state).label
    }

    pub fn state_id(&self, state: StateIdx) -> &'a str {
        &self.machine.tree().get(state).id
    }

    pub fn event_name(&self, event: EventIdx) -> &'a str {
        self.machine.events().name(event)
    }

    pub fn callback_field(&self, callback: CallbackIdx) -> String {
        self.machine.callbacks().get(callback).field_name()
    }

    pub fn handler_name(&self, resolved: &ResolvedTransition) -> String {
        handler_name(
            self.event_name(resolved.event),
            self.state_label(resolved.origin),
        )
    }

    /// Handler names of one event's table, indexed by state ordinal.
    pub fn row_names(&self, event: EventIdx, not_handled: &str) -> Vec<String> {
        self.machine
            .table()
            .row(event)
            .iter()
            .map(|slot| match slot {
                Some(resolved) => self.handler_name(resolved),
                None => not_handled.to_string(),
            })
            .collect()
    }
}

fn handler_name(event: &str, label: &str) -> String {
    format!("handle_{event}_in_{label}")
}

/// Rejects machines where two resolved pairs would render as the same
/// handler function, e.g. event `X` in state `A_in_B` and event `X_in_A` in
/// state `B`.
pub(crate) fn check_handler_names(
    tree: &StateTree,
    events: &EventAlphabet,
    table: &DispatchTable,
) -> Result<()> {
    let mut seen: HashMap<String, &ResolvedTransition> = HashMap::new();
    for resolved in table.resolved() {
        let name = handler_name(events.name(resolved.event), &tree.get(resolved.origin).label);
        if let Some(first) = seen.insert(name.clone(), resolved) {
            return Err(CompileError::HandlerNameCollision {
                name,
                first_state: tree.get(first.origin).id.clone(),
                first_event: events.name(first.event).to_string(),
                second_state: tree.get(resolved.origin).id.clone(),
                second_event: events.name(resolved.event).to_string(),
            });
        }
    }
    Ok(())
}

/// One target language.
pub trait Backend {
    type Output;

    fn preamble(&mut self, cx: &EmitContext<'_>);
    fn state_type(&mut self, cx: &EmitContext<'_>);
    fn event_type(&mut self, cx: &EmitContext<'_>);
    fn callback_table(&mut self, cx: &EmitContext<'_>);
    fn instance_type(&mut self, cx: &EmitContext<'_>);
    /// Called once per resolved (state, event) pair, event-major.
    fn handler(&mut self, cx: &EmitContext<'_>, resolved: &ResolvedTransition);
    fn dispatch_table(&mut self, cx: &EmitContext<'_>, event: EventIdx);
    fn init(&mut self, cx: &EmitContext<'_>);
    fn injector(&mut self, cx: &EmitContext<'_>, event: EventIdx);
    fn finish(self, cx: &EmitContext<'_>) -> Self::Output;
}

/// Runs `backend` over `machine`.
pub fn drive<B: Backend>(mut backend: B, machine: &Compiled, options: &EmitOptions) -> B::Output {
    let cx = EmitContext::new(machine, options);
    backend.preamble(&cx);
    backend.state_type(&cx);
    backend.event_type(&cx);
    backend.callback_table(&cx);
    backend.instance_type(&cx);
    for resolved in machine.table().resolved() {
        backend.handler(&cx, resolved);
    }
    for (event, _) in machine.events().iter() {
        backend.dispatch_table(&cx, event);
    }
    backend.init(&cx);
    for (event, _) in machine.events().iter() {
        backend.injector(&cx, event);
    }
    backend.finish(&cx)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    C,
    Python,
    Rust,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown target language '{0}': expected one of c, python, rust")]
pub struct UnknownLanguage(pub String);

impl FromStr for Language {
    type Err = UnknownLanguage;

    fn from_str(s: &str) -> core::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "c" => Ok(Language::C),
            "python" | "py" => Ok(Language::Python),
            "rust" | "rs" => Ok(Language::Rust),
            _ => Err(UnknownLanguage(s.to_string())),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Language::C => "c",
            Language::Python => "python",
            Language::Rust => "rust",
        })
    }
}

/// Renders `machine` in `language` as one source text.
pub fn emit(language: Language, machine: &Compiled, options: &EmitOptions) -> String {
    debug!(%language, machine = machine.name(), "emitting");
    match language {
        Language::C => drive(c::CBackend::default(), machine, options).to_string(),
        Language::Python => drive(python::PythonBackend::default(), machine, options),
        Language::Rust => drive(rust::RustBackend::default(), machine, options).to_string(),
    }
}
