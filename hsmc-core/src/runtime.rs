//! Reference interpreter for a [`Compiled`] machine.
//!
//! [`Instance`] walks the same dispatch table the emitters render, so its call
//! trace is what every generated machine must reproduce.

use tracing::trace;

use crate::Compiled;
use crate::chain::{Handler, Step};
use crate::ir::When;
use crate::transition::GuardDomain;
use crate::tree::{EventIdx, StateIdx};

/// A value returned by a guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardValue {
    Bool(bool),
    Select(i64),
}

impl GuardValue {
    /// Coerces the value into `domain`: a selector read as boolean is true
    /// when non-zero, a boolean read as selector is `0` or `1`.
    pub fn normalize(self, domain: GuardDomain) -> Self {
        match (self, domain) {
            (GuardValue::Select(v), GuardDomain::Boolean) => GuardValue::Bool(v != 0),
            (GuardValue::Bool(b), GuardDomain::Selector) => GuardValue::Select(i64::from(b)),
            (value, _) => value,
        }
    }

    pub fn matches(self, when: When) -> bool {
        match (when, self) {
            (When::Always | When::Otherwise, _) => true,
            (When::Is(expected), GuardValue::Bool(b)) => expected == b,
            (When::Case(expected), GuardValue::Select(v)) => expected == v,
            _ => false,
        }
    }
}

impl From<bool> for GuardValue {
    fn from(value: bool) -> Self {
        GuardValue::Bool(value)
    }
}

impl From<i64> for GuardValue {
    fn from(value: i64) -> Self {
        GuardValue::Select(value)
    }
}

/// What a callback sees of the instance that invoked it.
pub struct Context<'a, D> {
    /// Current state at the time of the call; `None` once terminated.
    pub state: Option<StateIdx>,
    pub data: &'a mut D,
}

/// Caller-supplied actions and guards, looked up by name.
pub trait Callbacks<D, A = ()> {
    type Error;

    fn action(&mut self, name: &str, cx: Context<'_, D>, arg: &A) -> Result<(), Self::Error>;

    fn guard(&mut self, name: &str, cx: Context<'_, D>, arg: &A)
    -> Result<GuardValue, Self::Error>;
}

/// One running machine: current state, callbacks and user data.
pub struct Instance<'m, C, D> {
    machine: &'m Compiled,
    callbacks: C,
    data: D,
    state: Option<StateIdx>,
}

impl<'m, C, D> Instance<'m, C, D> {
    /// Creates an instance that has not run its initial cascade yet. Until
    /// [`init`](Self::init) is called every injection is a no-op.
    pub fn new(machine: &'m Compiled, callbacks: C, data: D) -> Self {
        Self {
            machine,
            callbacks,
            data,
            state: None,
        }
    }

    pub fn state(&self) -> Option<StateIdx> {
        self.state
    }

    /// Id of the current state, if any.
    pub fn state_id(&self) -> Option<&'m str> {
        let machine = self.machine;
        self.state.map(|s| machine.tree().get(s).id.as_str())
    }

    pub fn is_terminated(&self) -> bool {
        self.state.is_none()
    }

    pub fn callbacks(&self) -> &C {
        &self.callbacks
    }

    pub fn callbacks_mut(&mut self) -> &mut C {
        &mut self.callbacks
    }

    pub fn data(&self) -> &D {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut D {
        &mut self.data
    }

    pub fn into_parts(self) -> (C, D) {
        (self.callbacks, self.data)
    }

    /// Runs the initial cascade.
    pub fn init<A>(&mut self, arg: &A) -> Result<(), C::Error>
    where
        C: Callbacks<D, A>,
    {
        let machine = self.machine;
        self.run(machine.table().init(), arg)
    }

    /// Injects `event`. Returns whether the current state reacted to it;
    /// unhandled events and events after termination change nothing.
    pub fn inject<A>(&mut self, event: EventIdx, arg: &A) -> Result<bool, C::Error>
    where
        C: Callbacks<D, A>,
    {
        let machine = self.machine;
        let Some(state) = self.state else {
            trace!(event = machine.events().name(event), "ignored: no current state");
            return Ok(false);
        };
        let Some(resolved) = machine.table().lookup(state, event) else {
            trace!(
                event = machine.events().name(event),
                state = %machine.tree().get(state).id,
                "not handled"
            );
            return Ok(false);
        };

        match &resolved.handler {
            Handler::Chain(steps) => self.run(steps, arg)?,
            Handler::Guarded {
                guard,
                domain,
                arms,
            } => {
                let name = machine.callbacks().name(*guard);
                let cx = Context {
                    state: self.state,
                    data: &mut self.data,
                };
                let value = self.callbacks.guard(name, cx, arg)?.normalize(*domain);
                trace!(guard = name, ?value, "evaluated guard");
                // Exhaustive branch lists always yield an arm.
                if let Some(arm) = arms.iter().find(|arm| value.matches(arm.when)) {
                    self.run(&arm.steps, arg)?;
                }
            }
        }
        Ok(true)
    }

    fn run<A>(&mut self, steps: &[Step], arg: &A) -> Result<(), C::Error>
    where
        C: Callbacks<D, A>,
    {
        let machine = self.machine;
        for step in steps {
            match *step {
                Step::Call(callback) => {
                    let name = machine.callbacks().name(callback);
                    trace!(action = name, "call");
                    let cx = Context {
                        state: self.state,
                        data: &mut self.data,
                    };
                    self.callbacks.action(name, cx, arg)?;
                }
                Step::SetState(state) => self.state = Some(state),
                Step::Terminate => self.state = None,
            }
        }
        Ok(())
    }
}
