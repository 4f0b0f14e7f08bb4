//! The `fsm!` macro.
//!
//! Parses a nested state machine description, lowers it to
//! [`hsmc_core::MachineIr`], compiles it and expands to the Rust backend's
//! output: a `pub mod <name>` holding the `State`/`Event` enums, the
//! `Callbacks` record and the `Fsm` instance type.

use hsmc_core::emit::{rust, EmitOptions};
use hsmc_core::When;
use proc_macro::TokenStream;
use syn::{
    braced, bracketed, parenthesized,
    parse::{Parse, ParseStream},
    punctuated::Punctuated,
    Ident, LitInt, Path, Result, Token,
};

mod lower;

mod keywords {
    syn::custom_keyword!(name);
    syn::custom_keyword!(events);
    syn::custom_keyword!(initial);
    syn::custom_keyword!(state);
    syn::custom_keyword!(on);
    syn::custom_keyword!(entry);
    syn::custom_keyword!(exit);
    syn::custom_keyword!(action);
    syn::custom_keyword!(guard);
}

// Overall structure for the fsm! macro input
#[derive(Debug)]
struct FsmInputAst {
    name: Ident,
    events: Option<Vec<Ident>>,
    initial: Option<Ident>,
    top_level_states: Vec<StateDeclarationAst>,
}

/// Parses an optional `, ` after a header item. Returns whether one was found.
fn header_comma(input: ParseStream) -> Result<bool> {
    if input.peek(Token![,]) {
        input.parse::<Token![,]>()?;
        Ok(true)
    } else {
        Ok(false)
    }
}

impl Parse for FsmInputAst {
    fn parse(input: ParseStream) -> Result<Self> {
        input.parse::<keywords::name>()?;
        input.parse::<Token![:]>()?;
        let name: Ident = input.parse()?;
        let mut separated = header_comma(input)?;

        let events = if separated && input.peek(keywords::events) {
            input.parse::<keywords::events>()?;
            input.parse::<Token![:]>()?;
            let content;
            bracketed!(content in input);
            let names = Punctuated::<Ident, Token![,]>::parse_terminated(&content)?;
            separated = header_comma(input)?;
            Some(names.into_iter().collect())
        } else {
            None
        };

        let initial = if separated && input.peek(keywords::initial) {
            input.parse::<keywords::initial>()?;
            input.parse::<Token![:]>()?;
            let initial: Ident = input.parse()?;
            separated = header_comma(input)?;
            Some(initial)
        } else {
            None
        };

        let mut top_level_states = Vec::new();
        if separated || input.is_empty() {
            while input.peek(keywords::state) {
                top_level_states.push(input.parse()?);
            }
        }
        if !input.is_empty() {
            return Err(input.error(
                "Expected 'events', 'initial', 'state' or end of input after the header",
            ));
        }

        Ok(FsmInputAst {
            name,
            events,
            initial,
            top_level_states,
        })
    }
}

#[derive(Debug)]
struct StateDeclarationAst {
    name: Ident,
    default_child: Option<Ident>,
    body_items: Vec<StateBodyItemAst>,
}

impl StateDeclarationAst {
    fn nested_states(&self) -> impl Iterator<Item = &StateDeclarationAst> {
        self.body_items.iter().filter_map(|item| match item {
            StateBodyItemAst::NestedState(state) => Some(&**state),
            _ => None,
        })
    }

    fn transitions(&self) -> impl Iterator<Item = &TransitionDefinitionAst> {
        self.body_items.iter().filter_map(|item| match item {
            StateBodyItemAst::Transition(transition) => Some(&**transition),
            _ => None,
        })
    }

    fn hooks(&self, exit: bool) -> impl Iterator<Item = &Ident> {
        self.body_items
            .iter()
            .filter_map(move |item| match item {
                StateBodyItemAst::EntryHook(hook) if !exit => Some(hook),
                StateBodyItemAst::ExitHook(hook) if exit => Some(hook),
                _ => None,
            })
            .flat_map(|hook| hook.actions.iter())
    }
}

impl Parse for StateDeclarationAst {
    fn parse(input: ParseStream) -> Result<Self> {
        input.parse::<keywords::state>()?;
        let name: Ident = input.parse()?;

        let content_in_braces;
        braced!(content_in_braces in input);

        let default_child = if content_in_braces.peek(keywords::initial) {
            content_in_braces.parse::<keywords::initial>()?;
            content_in_braces.parse::<Token![:]>()?;
            let child: Ident = content_in_braces.parse()?;
            content_in_braces.parse::<Token![;]>()?;
            Some(child)
        } else {
            None
        };

        let mut body_items = Vec::new();
        while !content_in_braces.is_empty() {
            if content_in_braces.peek(keywords::entry) {
                content_in_braces.parse::<keywords::entry>()?;
                body_items.push(StateBodyItemAst::EntryHook(content_in_braces.parse()?));
            } else if content_in_braces.peek(keywords::exit) {
                content_in_braces.parse::<keywords::exit>()?;
                body_items.push(StateBodyItemAst::ExitHook(content_in_braces.parse()?));
            } else if content_in_braces.peek(keywords::on) {
                body_items.push(StateBodyItemAst::Transition(Box::new(
                    content_in_braces.parse()?,
                )));
            } else if content_in_braces.peek(keywords::state) {
                body_items.push(StateBodyItemAst::NestedState(Box::new(
                    content_in_braces.parse()?,
                )));
            } else if content_in_braces.peek(keywords::initial) {
                return Err(content_in_braces
                    .error("'initial' must be the first item of a state block"));
            } else {
                return Err(content_in_braces.error(
                    "Unexpected token inside state block. Expected 'initial', 'entry', 'exit', 'on', or nested 'state'.",
                ));
            }
        }

        Ok(StateDeclarationAst {
            name,
            default_child,
            body_items,
        })
    }
}

#[derive(Debug)]
enum StateBodyItemAst {
    EntryHook(LifecycleHookAst),
    ExitHook(LifecycleHookAst),
    Transition(Box<TransitionDefinitionAst>),
    NestedState(Box<StateDeclarationAst>),
}

/// `: a, b;` after `entry` or `exit`.
#[derive(Debug)]
struct LifecycleHookAst {
    actions: Punctuated<Ident, Token![,]>,
}

impl Parse for LifecycleHookAst {
    fn parse(input: ParseStream) -> Result<Self> {
        input.parse::<Token![:]>()?;
        let actions = Punctuated::parse_separated_nonempty(input)?;
        input.parse::<Token![;]>()?;
        Ok(LifecycleHookAst { actions })
    }
}

#[derive(Debug)]
enum TargetAst {
    State(Path),
    Final,
}

#[derive(Debug)]
struct TransitionDefinitionAst {
    event_name: Ident,
    guard_clause: Option<GuardConditionAst>,
    target: Option<TargetAst>,
    action_clause: Option<TransitionActionAst>,
}

impl TransitionDefinitionAst {
    fn actions(&self) -> impl Iterator<Item = &Ident> {
        self.action_clause
            .iter()
            .flat_map(|clause| clause.actions.iter())
    }
}

/// Whether the next token is a bracket group starting with `keyword`.
fn peek_bracketed<K: syn::parse::Peek>(input: ParseStream, keyword: K) -> Result<bool> {
    if !input.peek(syn::token::Bracket) {
        return Ok(false);
    }
    let fork = input.fork();
    let content;
    bracketed!(content in fork);
    Ok(content.peek(keyword))
}

impl Parse for TransitionDefinitionAst {
    fn parse(input: ParseStream) -> Result<Self> {
        input.parse::<keywords::on>()?;
        let event_name: Ident = input.parse()?;

        let guard_clause = if peek_bracketed(input, keywords::guard)? {
            Some(input.parse()?)
        } else {
            None
        };

        let target = if input.peek(Token![=>]) {
            input.parse::<Token![=>]>()?;
            if input.peek(Token![final]) {
                input.parse::<Token![final]>()?;
                Some(TargetAst::Final)
            } else {
                Some(TargetAst::State(input.parse()?))
            }
        } else {
            None
        };

        let action_clause = if input.peek(syn::token::Bracket) {
            if !peek_bracketed(input, keywords::action)? {
                return Err(input.error("Expected '[action ...]' after the transition target"));
            }
            Some(input.parse()?)
        } else {
            None
        };

        input.parse::<Token![;]>()?;

        Ok(TransitionDefinitionAst {
            event_name,
            guard_clause,
            target,
            action_clause,
        })
    }
}

/// `[guard g]`, `[guard !g]`, `[guard g(3)]` or `[guard g(_)]`.
#[derive(Debug)]
struct GuardConditionAst {
    name: Ident,
    when: When,
}

impl Parse for GuardConditionAst {
    fn parse(input: ParseStream) -> Result<Self> {
        let content;
        bracketed!(content in input);
        content.parse::<keywords::guard>()?;
        let negated = content.peek(Token![!]);
        if negated {
            content.parse::<Token![!]>()?;
        }
        let name: Ident = content.parse()?;

        let when = if content.peek(syn::token::Paren) {
            if negated {
                return Err(syn::Error::new(
                    name.span(),
                    "a negated guard cannot select a case",
                ));
            }
            let case;
            parenthesized!(case in content);
            let when = if case.peek(Token![_]) {
                case.parse::<Token![_]>()?;
                When::Otherwise
            } else {
                let minus = case.peek(Token![-]);
                if minus {
                    case.parse::<Token![-]>()?;
                }
                let value: i64 = case.parse::<LitInt>()?.base10_parse()?;
                When::Case(if minus { -value } else { value })
            };
            if !case.is_empty() {
                return Err(case.error("Expected a single integer or '_' as the guard case"));
            }
            when
        } else {
            When::Is(!negated)
        };

        if !content.is_empty() {
            return Err(content.error("Unexpected tokens after guard condition inside brackets"));
        }
        Ok(GuardConditionAst { name, when })
    }
}

#[derive(Debug)]
struct TransitionActionAst {
    actions: Punctuated<Ident, Token![,]>,
}

impl Parse for TransitionActionAst {
    fn parse(input: ParseStream) -> Result<Self> {
        let content;
        bracketed!(content in input);
        content.parse::<keywords::action>()?;
        let actions = Punctuated::parse_terminated(&content)?;
        if actions.is_empty() {
            return Err(content.error("Expected at least one action name"));
        }
        Ok(TransitionActionAst { actions })
    }
}

fn expand(ast: &FsmInputAst) -> Result<proc_macro2::TokenStream> {
    let ir = lower::lower(ast)?;
    let compiled =
        hsmc_core::compile(&ir).map_err(|err| syn::Error::new(ast.name.span(), err))?;
    Ok(rust::render(&compiled, &EmitOptions::default()))
}

/// Declares a hierarchical state machine.
///
/// ```ignore
/// hsmc::fsm! {
///     name: door,
///     events: [open, close],
///     initial: closed,
///     state closed {
///         entry: lock;
///         on open [guard allowed] => opened;
///         on open [guard !allowed] [action deny];
///     }
///     state opened {
///         on close => final [action done];
///     }
/// }
/// ```
///
/// Expands to `pub mod door`. Targets resolve against the direct children of
/// the declaring state, then its siblings, then top-level states, then a full
/// `A::B` path. A transition without `=>` runs its actions only.
#[proc_macro]
pub fn fsm(input: TokenStream) -> TokenStream {
    let parsed_ast = match syn::parse::<FsmInputAst>(input) {
        Ok(ast) => ast,
        Err(err) => return err.to_compile_error().into(),
    };
    match expand(&parsed_ast) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_str;

    #[test]
    fn keyword_names_expand_to_valid_rust() {
        use hsmc_core::{MachineIr, StateDecl, TargetDecl, TransitionDecl};

        let machine = hsmc_core::compile(
            &MachineIr::new("match")
                .events(["loop"])
                .state(StateDecl::new("type"))
                .state(StateDecl::new("fn"))
                .initial("type")
                .transition(TransitionDecl::to("type", "loop", TargetDecl::state("fn"))),
        )
        .unwrap();
        let file = syn::parse2::<syn::File>(rust::render(&machine, &EmitOptions::default()))
            .expect("generated module parses");
        assert_eq!(file.items.len(), 1);
    }

    #[test]
    fn parse_header_only() {
        let ast = parse_str::<FsmInputAst>("name: door, events: [open, close], initial: closed,")
            .unwrap();
        assert_eq!(ast.name, "door");
        let events: Vec<String> = ast.events.unwrap().iter().map(ToString::to_string).collect();
        assert_eq!(events, ["open", "close"]);
        assert_eq!(ast.initial.unwrap(), "closed");
        assert!(ast.top_level_states.is_empty());
    }

    #[test]
    fn parse_header_without_optional_items() {
        let ast = parse_str::<FsmInputAst>("name: door, state closed {} state opened {}").unwrap();
        assert!(ast.events.is_none());
        assert!(ast.initial.is_none());
        assert_eq!(ast.top_level_states.len(), 2);
        assert_eq!(ast.top_level_states[1].name, "opened");
    }

    #[test]
    fn parse_missing_comma_in_header() {
        assert!(parse_str::<FsmInputAst>("name: door events: [open]").is_err());
        assert!(parse_str::<FsmInputAst>("name: door state closed {}").is_err());
    }

    #[test]
    fn parse_extra_tokens_after_states() {
        assert!(parse_str::<FsmInputAst>("name: door, state closed {} unexpected").is_err());
    }

    #[test]
    fn parse_state_body() {
        let ast = parse_str::<StateDeclarationAst>(
            "state A { initial: B; entry: enter_A, log; exit: exit_A; state B {} on X => B; }",
        )
        .unwrap();
        assert_eq!(ast.default_child.as_ref().unwrap(), "B");
        let entry: Vec<String> = ast.hooks(false).map(ToString::to_string).collect();
        assert_eq!(entry, ["enter_A", "log"]);
        let exit: Vec<String> = ast.hooks(true).map(ToString::to_string).collect();
        assert_eq!(exit, ["exit_A"]);
        assert_eq!(ast.nested_states().count(), 1);
        assert_eq!(ast.transitions().count(), 1);
    }

    #[test]
    fn parse_initial_after_body_item_is_rejected() {
        let err = parse_str::<StateDeclarationAst>("state A { entry: e; initial: B; }").unwrap_err();
        assert!(err.to_string().contains("first item"));
    }

    #[test]
    fn parse_transition_forms() {
        let t = parse_str::<TransitionDefinitionAst>("on Z [guard check] => D::E [action jump];")
            .unwrap();
        assert_eq!(t.event_name, "Z");
        let guard = t.guard_clause.as_ref().unwrap();
        assert_eq!(guard.name, "check");
        assert_eq!(guard.when, When::Is(true));
        assert!(matches!(&t.target, Some(TargetAst::State(path)) if path.segments.len() == 2));
        assert_eq!(t.actions().map(ToString::to_string).collect::<Vec<_>>(), ["jump"]);

        let t = parse_str::<TransitionDefinitionAst>("on Y => final [action a, b];").unwrap();
        assert!(matches!(t.target, Some(TargetAst::Final)));
        assert_eq!(t.actions().count(), 2);

        let t = parse_str::<TransitionDefinitionAst>("on tick [action count];").unwrap();
        assert!(t.target.is_none());
        assert!(t.guard_clause.is_none());
    }

    #[test]
    fn parse_guard_conditions() {
        let guard = |text: &str| parse_str::<GuardConditionAst>(text).map(|g| g.when);
        assert_eq!(guard("[guard !check]").unwrap(), When::Is(false));
        assert_eq!(guard("[guard level(3)]").unwrap(), When::Case(3));
        assert_eq!(guard("[guard level(-2)]").unwrap(), When::Case(-2));
        assert_eq!(guard("[guard level(_)]").unwrap(), When::Otherwise);
        assert!(guard("[guard !level(1)]").is_err());
        assert!(guard("[guard level(1, 2)]").is_err());
        assert!(guard("[guard a b]").is_err());
    }

    #[test]
    fn parse_rejects_stray_brackets_after_target() {
        assert!(parse_str::<TransitionDefinitionAst>("on X => B [jump];").is_err());
    }

    #[test]
    fn expand_reports_compile_errors() {
        let ast = parse_str::<FsmInputAst>(
            "name: m, events: [go], state a { on go => b; } state b { on stop => a; }",
        )
        .unwrap();
        let err = expand(&ast).unwrap_err();
        assert!(err.to_string().contains("stop"), "{err}");
    }

    #[test]
    fn expand_renders_a_module_named_after_the_machine() {
        let ast = parse_str::<FsmInputAst>(
            "name: lamp, state off { on toggle => on_; } state on_ { on toggle => off; }",
        )
        .unwrap();
        let text = expand(&ast).unwrap().to_string();
        assert!(text.contains("pub mod lamp"), "{text}");
        assert!(text.contains("inject_toggle"));
    }
}
