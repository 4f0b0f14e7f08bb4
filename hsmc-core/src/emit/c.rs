//! C backend: a header declaring the callback record, instance type and entry
//! points, and a source file holding handlers and `inject_fp` tables.

use core::fmt;

use super::{Backend, EmitContext};
use crate::callback::CallbackKind;
use crate::chain::{Handler, Step};
use crate::ir::When;
use crate::table::ResolvedTransition;
use crate::transition::GuardDomain;
use crate::tree::EventIdx;

/// Header and source of one machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CSource {
    pub prefix: String,
    pub header: String,
    pub source: String,
}

impl fmt::Display for CSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "/* {}.h */", self.prefix)?;
        f.write_str(&self.header)?;
        writeln!(f)?;
        writeln!(f, "/* {}.c */", self.prefix)?;
        f.write_str(&self.source)
    }
}

#[derive(Debug, Default)]
pub struct CBackend {
    header: String,
    source: String,
}

fn line(out: &mut String, depth: usize, text: &str) {
    for _ in 0..depth {
        out.push('\t');
    }
    out.push_str(text);
    out.push('\n');
}

fn step(cx: &EmitContext<'_>, step: &Step) -> String {
    match *step {
        Step::Call(callback) => format!("fsm->cb->{}(fsm, arg);", cx.callback_field(callback)),
        Step::SetState(state) => format!("fsm->state = STATE_{};", cx.state_label(state)),
        Step::Terminate => "fsm->state = INVALID_STATE;".to_string(),
    }
}

/// A `long long` literal. `i64::MIN` has no literal form in C.
fn long_long(value: i64) -> String {
    if value == i64::MIN {
        format!("({}LL - 1)", value + 1)
    } else {
        format!("{value}LL")
    }
}

impl Backend for CBackend {
    type Output = CSource;

    fn preamble(&mut self, cx: &EmitContext<'_>) {
        let p = cx.prefix;
        let guard = p.to_ascii_uppercase();
        self.header.push_str(&format!(
            "#ifndef {guard}_H\n#define {guard}_H\n\n\
             typedef struct {p}_tag {p}_t;\n\
             typedef struct {p}_cb_tag {p}_cb_t;\n\n\
             typedef int (*{p}_condition_fp)({p}_t * fsm, void * arg);\n\
             typedef long long (*{p}_selector_fp)({p}_t * fsm, void * arg);\n\
             typedef void (*{p}_action_fp)({p}_t * fsm, void * arg);\n\n"
        ));
        self.source.push_str(&format!(
            "#include \"{p}.h\"\n\n\
             typedef enum state_tag state_e;\n\
             typedef enum event_tag event_e;\n\n"
        ));
    }

    fn state_type(&mut self, cx: &EmitContext<'_>) {
        let out = &mut self.source;
        line(out, 0, "enum state_tag {");
        line(out, 1, "INVALID_STATE = -1,");
        for (state, node) in cx.machine.tree().iter() {
            line(out, 1, &format!("STATE_{} = {},", node.label, state.ordinal()));
        }
        line(out, 1, &format!("NUM_STATE = {}", cx.machine.tree().len()));
        line(out, 0, "};\n");
    }

    fn event_type(&mut self, cx: &EmitContext<'_>) {
        let out = &mut self.source;
        line(out, 0, "enum event_tag {");
        line(out, 1, "INVALID_EVENT = -1,");
        for (event, name) in cx.machine.events().iter() {
            line(out, 1, &format!("EVENT_{name} = {},", event.ordinal()));
        }
        line(out, 1, &format!("NUM_EVENT = {}", cx.machine.events().len()));
        line(out, 0, "};\n");
    }

    fn callback_table(&mut self, cx: &EmitContext<'_>) {
        let p = cx.prefix;
        let out = &mut self.header;
        line(out, 0, &format!("struct {p}_cb_tag {{"));
        for (_, callback) in cx.machine.callbacks().iter() {
            let kind = match callback.kind {
                CallbackKind::Action => "action",
                CallbackKind::Guard(GuardDomain::Boolean) => "condition",
                CallbackKind::Guard(GuardDomain::Selector) => "selector",
            };
            line(out, 1, &format!("{p}_{kind}_fp {};", callback.field_name()));
        }
        line(out, 0, "};\n");
    }

    fn instance_type(&mut self, cx: &EmitContext<'_>) {
        let p = cx.prefix;
        let out = &mut self.header;
        line(out, 0, &format!("struct {p}_tag {{"));
        line(out, 1, &format!("{p}_cb_t * cb;"));
        line(out, 1, "void * data;");
        line(out, 1, "int state;");
        line(out, 0, "};\n");

        let out = &mut self.source;
        line(out, 0, &format!("typedef void (*inject_fp)({p}_t * fsm, void * arg);\n"));
        line(out, 0, &format!("static void not_handled({p}_t * fsm, void * arg) {{"));
        line(out, 1, "/* empty */");
        line(out, 0, "}\n");
    }

    fn handler(&mut self, cx: &EmitContext<'_>, resolved: &ResolvedTransition) {
        let out = &mut self.source;
        line(
            out,
            0,
            &format!(
                "static void {}({}_t * fsm, void * arg) {{",
                cx.handler_name(resolved),
                cx.prefix
            ),
        );
        match &resolved.handler {
            Handler::Chain(steps) => {
                for s in steps {
                    line(out, 1, &step(cx, s));
                }
            }
            Handler::Guarded {
                guard,
                domain,
                arms,
            } => {
                let ty = match domain {
                    GuardDomain::Boolean => "int",
                    GuardDomain::Selector => "long long",
                };
                line(
                    out,
                    1,
                    &format!("{ty} taken = fsm->cb->{}(fsm, arg);", cx.callback_field(*guard)),
                );
                for arm in arms {
                    let condition = match arm.when {
                        When::Is(true) => "taken".to_string(),
                        When::Is(false) => "!taken".to_string(),
                        When::Case(value) => format!("taken == {}", long_long(value)),
                        When::Always | When::Otherwise => {
                            for s in &arm.steps {
                                line(out, 1, &step(cx, s));
                            }
                            continue;
                        }
                    };
                    line(out, 1, &format!("if ({condition}) {{"));
                    for s in &arm.steps {
                        line(out, 2, &step(cx, s));
                    }
                    line(out, 2, "return;");
                    line(out, 1, "}");
                }
            }
        }
        line(out, 0, "}");
    }

    fn dispatch_table(&mut self, cx: &EmitContext<'_>, event: EventIdx) {
        let out = &mut self.source;
        line(out, 0, "");
        line(
            out,
            0,
            &format!(
                "static inject_fp transition_on_event_{}[NUM_STATE] = {{",
                cx.event_name(event)
            ),
        );
        for name in cx.row_names(event, "not_handled") {
            line(out, 1, &format!("{name},"));
        }
        line(out, 0, "};");
    }

    fn init(&mut self, cx: &EmitContext<'_>) {
        let p = cx.prefix;
        let signature = format!("void {p}_init({p}_t * fsm, {p}_cb_t * cb, void * data, void * arg)");
        line(&mut self.header, 0, &format!("extern {signature};"));

        let out = &mut self.source;
        line(out, 0, "");
        line(out, 0, &format!("{signature} {{"));
        line(out, 1, "fsm->cb = cb;");
        line(out, 1, "fsm->data = data;");
        line(out, 1, "fsm->state = INVALID_STATE;");
        for s in cx.machine.table().init() {
            line(out, 1, &step(cx, s));
        }
        line(out, 0, "}");
    }

    fn injector(&mut self, cx: &EmitContext<'_>, event: EventIdx) {
        let p = cx.prefix;
        let name = cx.event_name(event);
        let signature = format!("void {p}_inject_{name}({p}_t * fsm, void * arg)");
        line(&mut self.header, 0, &format!("extern {signature};"));

        let out = &mut self.source;
        line(out, 0, &format!("{signature} {{"));
        line(out, 1, "if ((0 <= fsm->state) && (fsm->state < NUM_STATE)) {");
        line(out, 2, &format!("transition_on_event_{name}[fsm->state](fsm, arg);"));
        line(out, 1, "}");
        line(out, 0, "}");
    }

    fn finish(mut self, cx: &EmitContext<'_>) -> CSource {
        let guard = cx.prefix.to_ascii_uppercase();
        self.header.push_str(&format!("\n#endif /* {guard}_H */\n"));
        self.source.push_str("\n/* EOF */\n");
        CSource {
            prefix: cx.prefix.to_string(),
            header: self.header,
            source: self.source,
        }
    }
}

/// Renders `machine` as a C header and source pair.
pub fn render(machine: &crate::Compiled, options: &super::EmitOptions) -> CSource {
    super::drive(CBackend::default(), machine, options)
}
