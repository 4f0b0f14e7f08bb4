//! Python backend: one module with handler functions, per-event handler
//! lists, a `Callbacks` interface class and an `Fsm` class.

use super::{Backend, EmitContext};
use crate::chain::{Handler, Step};
use crate::ir::When;
use crate::table::ResolvedTransition;
use crate::transition::GuardDomain;
use crate::tree::EventIdx;

const INDENT: &str = "    ";

#[derive(Debug, Default)]
pub struct PythonBackend {
    module: String,
    fsm_class: String,
}

fn line(out: &mut String, depth: usize, text: &str) {
    for _ in 0..depth {
        out.push_str(INDENT);
    }
    out.push_str(text);
    out.push('\n');
}

fn step(cx: &EmitContext<'_>, step: &Step) -> String {
    match *step {
        Step::Call(callback) => format!("fsm.callbacks.{}(fsm, arg)", cx.callback_field(callback)),
        Step::SetState(state) => format!("fsm.state = STATE_{}", cx.state_label(state)),
        Step::Terminate => "fsm.state = INVALID_STATE".to_string(),
    }
}

fn steps(out: &mut String, depth: usize, cx: &EmitContext<'_>, chain: &[Step]) {
    for s in chain {
        line(out, depth, &step(cx, s));
    }
}

impl Backend for PythonBackend {
    type Output = String;

    fn preamble(&mut self, cx: &EmitContext<'_>) {
        line(
            &mut self.module,
            0,
            &format!("\"\"\"A Python implementation of {} FSM\"\"\"\n", cx.prefix),
        );
        line(&mut self.module, 0, "# pylint: disable=invalid-name\n");
    }

    fn state_type(&mut self, cx: &EmitContext<'_>) {
        let out = &mut self.module;
        for (state, node) in cx.machine.tree().iter() {
            line(out, 0, &format!("STATE_{} = {}", node.label, state.ordinal()));
        }
        line(out, 0, &format!("NUM_STATE = {}", cx.machine.tree().len()));
        line(out, 0, "INVALID_STATE = -1\n");
    }

    fn event_type(&mut self, cx: &EmitContext<'_>) {
        let out = &mut self.module;
        for (event, name) in cx.machine.events().iter() {
            line(out, 0, &format!("EVENT_{name} = {}", event.ordinal()));
        }
        line(out, 0, &format!("NUM_EVENT = {}\n", cx.machine.events().len()));
    }

    fn callback_table(&mut self, cx: &EmitContext<'_>) {
        let out = &mut self.module;
        line(out, 0, "class Callbacks():");
        line(
            out,
            1,
            &format!("\"\"\"Interface for {} FSM condition and action callbacks\"\"\"", cx.prefix),
        );
        for (_, callback) in cx.machine.callbacks().iter() {
            let kind = if callback.is_guard() { "condition" } else { "action" };
            line(out, 1, "@staticmethod");
            line(out, 1, &format!("def {}(fsm, arg):", callback.field_name()));
            line(
                out,
                2,
                &format!(
                    "\"\"\"Callback for {} FSM {kind} {}\"\"\"",
                    cx.prefix, callback.name
                ),
            );
            line(out, 2, "raise NotImplementedError");
        }
        line(out, 0, "");
    }

    fn instance_type(&mut self, cx: &EmitContext<'_>) {
        let out = &mut self.fsm_class;
        line(out, 0, "class Fsm():");
        line(out, 1, &format!("\"\"\"A class for {} FSM instances\"\"\"", cx.prefix));
        line(out, 1, "def __init__(self, callbacks=None, data=None, arg=None):");
        line(out, 2, "self.state = INVALID_STATE");
        line(out, 2, "self.callbacks = self if callbacks is None else callbacks");
        line(out, 2, "self.data = self if data is None else data");
        line(out, 2, "initial_transition(self, arg)");

        let out = &mut self.module;
        line(out, 0, "def not_handled(fsm, arg):");
        line(out, 1, "\"\"\"Ignore an event the current state does not react to\"\"\"\n");
    }

    fn handler(&mut self, cx: &EmitContext<'_>, resolved: &ResolvedTransition) {
        let out = &mut self.module;
        line(out, 0, &format!("def {}(fsm, arg):", cx.handler_name(resolved)));
        line(
            out,
            1,
            &format!(
                "\"\"\"Handle event {} in state {}\"\"\"",
                cx.event_name(resolved.event),
                cx.state_id(resolved.origin)
            ),
        );
        match &resolved.handler {
            Handler::Chain(chain) => steps(out, 1, cx, chain),
            Handler::Guarded {
                guard,
                domain,
                arms,
            } => {
                let coerce = match domain {
                    GuardDomain::Boolean => "bool",
                    GuardDomain::Selector => "int",
                };
                line(
                    out,
                    1,
                    &format!(
                        "taken = {coerce}(fsm.callbacks.{}(fsm, arg))",
                        cx.callback_field(*guard)
                    ),
                );
                for arm in arms {
                    let condition = match arm.when {
                        When::Is(true) => "taken".to_string(),
                        When::Is(false) => "not taken".to_string(),
                        When::Case(value) => format!("taken == {value}"),
                        When::Always | When::Otherwise => {
                            steps(out, 1, cx, &arm.steps);
                            continue;
                        }
                    };
                    line(out, 1, &format!("if {condition}:"));
                    steps(out, 2, cx, &arm.steps);
                    line(out, 2, "return");
                }
            }
        }
        line(out, 0, "");
    }

    fn dispatch_table(&mut self, cx: &EmitContext<'_>, event: EventIdx) {
        let out = &mut self.module;
        line(
            out,
            0,
            &format!("TRANSITION_ON_EVENT_{} = [", cx.event_name(event)),
        );
        for name in cx.row_names(event, "not_handled") {
            line(out, 1, &format!("{name},"));
        }
        line(out, 0, "]\n");
    }

    fn init(&mut self, cx: &EmitContext<'_>) {
        let out = &mut self.module;
        line(out, 0, "def initial_transition(fsm, arg):");
        line(out, 1, "\"\"\"Transition into the initial state\"\"\"");
        steps(out, 1, cx, cx.machine.table().init());
        line(out, 0, "");
    }

    fn injector(&mut self, cx: &EmitContext<'_>, event: EventIdx) {
        let name = cx.event_name(event);
        let out = &mut self.fsm_class;
        line(out, 1, &format!("def inject_{name}(self, arg=None):"));
        line(out, 2, &format!("\"\"\"Inject event {name} with event `arg`\"\"\""));
        line(out, 2, "if 0 <= self.state < NUM_STATE:");
        line(out, 3, &format!("TRANSITION_ON_EVENT_{name}[self.state](self, arg)"));
    }

    fn finish(self, _cx: &EmitContext<'_>) -> String {
        let mut module = self.module;
        module.push_str(&self.fsm_class);
        module
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile;
    use crate::emit::{EmitOptions, drive};
    use crate::ir::{BranchDecl, MachineIr, StateDecl, TargetDecl, TransitionDecl};

    fn render(ir: &MachineIr) -> String {
        drive(
            PythonBackend::default(),
            &compile(ir).unwrap(),
            &EmitOptions::default(),
        )
    }

    #[test]
    fn selector_guard_renders_cases_and_fallthrough() {
        let out = render(
            &MachineIr::new("pump")
                .events(["tick"])
                .state(StateDecl::new("idle"))
                .state(StateDecl::new("low"))
                .initial("idle")
                .transition(
                    TransitionDecl::new("idle", "tick")
                        .guard("level")
                        .branch(BranchDecl::new(When::Case(1), TargetDecl::state("low")))
                        .branch(BranchDecl::new(When::Otherwise, TargetDecl::Internal).action("wait")),
                ),
        );
        let expected = "\
def handle_tick_in_idle(fsm, arg):
    \"\"\"Handle event tick in state idle\"\"\"
    taken = int(fsm.callbacks.condition_level(fsm, arg))
    if taken == 1:
        fsm.state = STATE_idle
        fsm.state = STATE_low
        return
    fsm.callbacks.action_wait(fsm, arg)
";
        assert!(out.contains(expected), "{out}");
        assert!(out.contains("TRANSITION_ON_EVENT_tick = [\n    handle_tick_in_idle,\n    not_handled,\n]"));
    }

    #[test]
    fn fsm_class_comes_last_with_injectors() {
        let out = render(
            &MachineIr::new("m")
                .events(["go", "stop"])
                .state(StateDecl::new("a").entry("hello")),
        );
        let class_at = out.find("class Fsm():").unwrap();
        assert!(out.find("def initial_transition").unwrap() < class_at);
        assert!(out[class_at..].contains("    def inject_go(self, arg=None):"));
        assert!(out[class_at..].contains("    def inject_stop(self, arg=None):"));
        assert!(out.contains(
            "def initial_transition(fsm, arg):\n    \"\"\"Transition into the initial state\"\"\"\n    fsm.state = STATE_a\n    fsm.callbacks.action_hello(fsm, arg)\n"
        ));
        assert!(out.contains("TRANSITION_ON_EVENT_go = [\n    not_handled,\n]"));
    }
}
