//! Test utilities for driving compiled machines through the interpreter.
//!
//! Only available with `test` or the `test-utils` feature so production
//! builds carry none of it.

pub mod recorder;

pub use recorder::{RecordedFailure, Recorder};
