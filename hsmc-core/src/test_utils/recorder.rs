//! Call-recording callbacks with scripted guard answers.

use std::collections::{HashMap, VecDeque};

use thiserror::Error;

use crate::runtime::{Callbacks, Context, GuardValue};

/// Raised by a [`Recorder`] for a callback registered with
/// [`Recorder::fail_on`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("callback '{callback}' failed")]
pub struct RecordedFailure {
    pub callback: String,
}

/// Records every action in call order and answers guards from a script.
///
/// Guards answer from their queued values first, then from their fixed answer,
/// and finally `false`.
///
/// ```rust
/// # #[cfg(feature = "test-utils")]
/// # {
/// use hsmc_core::test_utils::Recorder;
///
/// let recorder = Recorder::new()
///     .answer("check", true)
///     .queue("mode", [1_i64, 2]);
/// assert!(recorder.calls().is_empty());
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    calls: Vec<String>,
    guard_calls: Vec<String>,
    answers: HashMap<String, GuardValue>,
    queued: HashMap<String, VecDeque<GuardValue>>,
    failing: Option<String>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fixed answer for every call of `guard`.
    #[must_use]
    pub fn answer(mut self, guard: &str, value: impl Into<GuardValue>) -> Self {
        self.answers.insert(guard.to_string(), value.into());
        self
    }

    /// One-shot answers consumed in order before the fixed answer.
    #[must_use]
    pub fn queue<V, I>(mut self, guard: &str, values: I) -> Self
    where
        V: Into<GuardValue>,
        I: IntoIterator<Item = V>,
    {
        self.queued
            .entry(guard.to_string())
            .or_default()
            .extend(values.into_iter().map(Into::into));
        self
    }

    /// Makes the named action or guard return an error instead of running.
    #[must_use]
    pub fn fail_on(mut self, callback: &str) -> Self {
        self.failing = Some(callback.to_string());
        self
    }

    pub fn set_answer(&mut self, guard: &str, value: impl Into<GuardValue>) {
        self.answers.insert(guard.to_string(), value.into());
    }

    /// Actions in call order.
    pub fn calls(&self) -> &[String] {
        &self.calls
    }

    /// Guards in call order.
    pub fn guard_calls(&self) -> &[String] {
        &self.guard_calls
    }

    /// Returns the recorded actions and starts a fresh trace.
    pub fn take_calls(&mut self) -> Vec<String> {
        std::mem::take(&mut self.calls)
    }

    fn check(&self, name: &str) -> Result<(), RecordedFailure> {
        match &self.failing {
            Some(failing) if failing == name => Err(RecordedFailure {
                callback: name.to_string(),
            }),
            _ => Ok(()),
        }
    }
}

impl<D, A> Callbacks<D, A> for Recorder {
    type Error = RecordedFailure;

    fn action(&mut self, name: &str, _cx: Context<'_, D>, _arg: &A) -> Result<(), Self::Error> {
        self.check(name)?;
        self.calls.push(name.to_string());
        Ok(())
    }

    fn guard(
        &mut self,
        name: &str,
        _cx: Context<'_, D>,
        _arg: &A,
    ) -> Result<GuardValue, Self::Error> {
        self.check(name)?;
        self.guard_calls.push(name.to_string());
        let queued = self.queued.get_mut(name).and_then(VecDeque::pop_front);
        Ok(queued
            .or_else(|| self.answers.get(name).copied())
            .unwrap_or(GuardValue::Bool(false)))
    }
}
