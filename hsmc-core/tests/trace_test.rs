//! End-to-end traces through the reference interpreter.

mod common;

use common::{setup_tracing, test_fsm};
use hsmc_core::runtime::Instance;
use hsmc_core::test_utils::Recorder;
use hsmc_core::{Compiled, compile};

struct Driver<'m> {
    machine: &'m Compiled,
    fsm: Instance<'m, Recorder, ()>,
}

impl<'m> Driver<'m> {
    fn start(machine: &'m Compiled, recorder: Recorder) -> (Self, Vec<String>) {
        let mut fsm = Instance::new(machine, recorder, ());
        fsm.init(&()).expect("init");
        let calls = fsm.callbacks_mut().take_calls();
        (Self { machine, fsm }, calls)
    }

    fn send(&mut self, event: &str) -> Vec<String> {
        let event = self.machine.event(event).expect("declared event");
        self.fsm.inject(event, &()).expect("inject");
        self.fsm.callbacks_mut().take_calls()
    }

    fn state(&self) -> Option<&'m str> {
        self.fsm.state_id()
    }
}

#[test]
fn reference_trace() {
    setup_tracing();
    let machine = compile(&test_fsm()).expect("compiles");
    let (mut d, init) = Driver::start(&machine, Recorder::new().answer("check", true));

    assert_eq!(init, ["enter_A", "enter_B"]);
    assert_eq!(d.state(), Some("A/B"));

    assert_eq!(d.send("X"), ["exit_B", "jump", "enter_C"]);
    assert_eq!(d.state(), Some("A/C"));

    assert_eq!(d.send("X"), ["exit_C", "jump", "enter_B"]);
    assert_eq!(d.state(), Some("A/B"));

    assert_eq!(d.send("Z"), ["exit_B", "exit_A", "jump", "enter_D", "enter_E"]);
    assert_eq!(d.state(), Some("D/E"));

    assert_eq!(d.send("X"), ["exit_E", "jump", "enter_F"]);
    assert_eq!(d.state(), Some("D/F"));

    assert_eq!(d.send("Y"), ["exit_F", "jump"]);
    assert_eq!(d.state(), Some("D"));

    assert_eq!(d.send("Y"), ["exit_D", "done"]);
    assert_eq!(d.state(), None);
    assert!(d.fsm.is_terminated());
}

#[test]
fn false_guard_takes_the_other_branch() {
    let machine = compile(&test_fsm()).expect("compiles");
    let (mut d, _) = Driver::start(&machine, Recorder::new().answer("check", false));
    assert_eq!(d.send("Z"), ["exit_B", "exit_A", "jump", "enter_D", "enter_F"]);
    assert_eq!(d.state(), Some("D/F"));
    assert_eq!(d.fsm.callbacks().guard_calls(), ["check"]);
}

#[test]
fn unhandled_events_change_nothing() {
    let machine = compile(&test_fsm()).expect("compiles");
    let (mut d, _) = Driver::start(&machine, Recorder::new());
    assert!(d.send("Y").is_empty());
    assert_eq!(d.state(), Some("A/B"));
}

#[test]
fn terminal_state_ignores_everything() {
    let machine = compile(&test_fsm()).expect("compiles");
    let (mut d, _) = Driver::start(&machine, Recorder::new().answer("check", true));
    d.send("Z");
    assert_eq!(d.send("Y"), ["exit_E", "exit_D", "done"]);
    for event in ["X", "Y", "Z"] {
        assert!(d.send(event).is_empty());
        assert!(d.fsm.is_terminated());
    }
    assert_eq!(d.fsm.callbacks().guard_calls(), ["check"]);
}

#[test]
fn region_completion_rests_in_parent_until_next_event() {
    let machine = compile(&test_fsm()).expect("compiles");
    let (mut d, _) = Driver::start(&machine, Recorder::new().answer("check", false));
    d.send("X");
    assert_eq!(d.send("Y"), ["exit_C", "jump"]);
    assert_eq!(d.state(), Some("A"));
    // A itself still reacts to Z.
    assert_eq!(d.send("Z"), ["exit_A", "jump", "enter_D", "enter_F"]);
}
