//! Rust backend.
//!
//! Renders a `pub mod <prefix>` as a token stream, which the `fsm!` macro
//! splices into the caller's crate and the CLI prints as text.
//!
//! Generated machines are generic over the user data `D`, the per-event
//! argument `A` and the callback error `E`; every callback returns a `Result`
//! and failures propagate out of `init` and `inject_*` with `?`.

use proc_macro2::{Ident, Literal, Span, TokenStream};
use quote::{format_ident, quote};

use super::{Backend, EmitContext, EmitOptions, drive};
use crate::Compiled;
use crate::callback::CallbackKind;
use crate::chain::{Handler, Step};
use crate::ir::When;
use crate::table::ResolvedTransition;
use crate::transition::GuardDomain;
use crate::tree::EventIdx;

#[derive(Debug, Default)]
pub struct RustBackend {
    items: Vec<TokenStream>,
    methods: Vec<TokenStream>,
    inject_arms: Vec<TokenStream>,
}

/// Strict and reserved keywords of every edition. `self`, `Self`, `super` and
/// `crate` are missing: they have no raw form and never pass name validation.
const KEYWORDS: &[&str] = &[
    "abstract", "as", "async", "await", "become", "box", "break", "const", "continue", "do",
    "dyn", "else", "enum", "extern", "false", "final", "fn", "for", "gen", "if", "impl", "in",
    "let", "loop", "macro", "match", "mod", "move", "mut", "override", "priv", "pub", "ref",
    "return", "static", "struct", "trait", "true", "try", "type", "typeof", "unsafe", "unsized",
    "use", "virtual", "where", "while", "yield",
];

fn ident(name: &str) -> Ident {
    if KEYWORDS.contains(&name) {
        Ident::new_raw(name, Span::call_site())
    } else {
        format_ident!("{}", name)
    }
}

/// A fieldless enum whose discriminants are the given ordinals.
fn ordinal_enum(name: &Ident, labels: &[&str], ids: &[&str], count: &Ident) -> TokenStream {
    let variants: Vec<Ident> = labels.iter().map(|label| ident(label)).collect();
    let ordinals = (0..labels.len()).map(Literal::usize_unsuffixed);
    let ordinals_again = (0..labels.len()).map(Literal::usize_unsuffixed);
    let len = Literal::usize_unsuffixed(labels.len());
    let repr = if labels.is_empty() {
        quote!()
    } else {
        quote!(#[repr(usize)])
    };
    quote! {
        #[allow(non_camel_case_types)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #repr
        pub enum #name {
            #(#variants = #ordinals,)*
        }

        pub const #count: usize = #len;

        impl #name {
            pub const ALL: [#name; #count] = [#(#name::#variants),*];

            pub const fn ordinal(self) -> usize {
                match self {
                    #(#name::#variants => #ordinals_again,)*
                }
            }

            pub fn from_ordinal(ordinal: usize) -> Option<#name> {
                Self::ALL.get(ordinal).copied()
            }

            pub const fn id(self) -> &'static str {
                match self {
                    #(#name::#variants => #ids,)*
                }
            }
        }
    }
}

fn step(cx: &EmitContext<'_>, step: &Step) -> TokenStream {
    match *step {
        Step::Call(callback) => {
            let field = ident(&cx.callback_field(callback));
            quote!((cb.#field)(fsm, arg)?;)
        }
        Step::SetState(state) => {
            let variant = ident(cx.state_label(state));
            quote!(fsm.state = State::#variant as usize;)
        }
        Step::Terminate => quote!(fsm.state = INVALID_STATE;),
    }
}

fn steps(cx: &EmitContext<'_>, chain: &[Step]) -> TokenStream {
    let rendered = chain.iter().map(|s| step(cx, s));
    quote!(#(#rendered)*)
}

impl Backend for RustBackend {
    type Output = TokenStream;

    fn preamble(&mut self, _cx: &EmitContext<'_>) {
        self.items.push(quote! {
            type InjectFn<D, A, E> = for<'f> fn(&mut Fsm<'f, D, A, E>, &A) -> Result<(), E>;
        });
    }

    fn state_type(&mut self, cx: &EmitContext<'_>) {
        let tree = cx.machine.tree();
        let labels: Vec<&str> = tree.iter().map(|(_, node)| node.label.as_str()).collect();
        let ids: Vec<&str> = tree.iter().map(|(_, node)| node.id.as_str()).collect();
        self.items.push(ordinal_enum(
            &ident("State"),
            &labels,
            &ids,
            &ident("NUM_STATE"),
        ));
        self.items.push(quote! {
            /// Value of the state ordinal before `init` and after termination.
            pub const INVALID_STATE: usize = usize::MAX;
        });
    }

    fn event_type(&mut self, cx: &EmitContext<'_>) {
        let names: Vec<&str> = cx.machine.events().iter().map(|(_, name)| name).collect();
        self.items.push(ordinal_enum(
            &ident("Event"),
            &names,
            &names,
            &ident("NUM_EVENT"),
        ));
    }

    fn callback_table(&mut self, cx: &EmitContext<'_>) {
        let callbacks = cx.machine.callbacks();
        if callbacks.is_empty() {
            self.items.push(quote! {
                pub struct Callbacks<D, A, E>(core::marker::PhantomData<fn(&mut D, &A) -> E>);

                impl<D, A, E> Default for Callbacks<D, A, E> {
                    fn default() -> Self {
                        Self(core::marker::PhantomData)
                    }
                }
            });
            return;
        }
        let fields = callbacks.iter().map(|(_, callback)| {
            let field = ident(&callback.field_name());
            let output = match callback.kind {
                CallbackKind::Action => quote!(()),
                CallbackKind::Guard(GuardDomain::Boolean) => quote!(bool),
                CallbackKind::Guard(GuardDomain::Selector) => quote!(i64),
            };
            quote! {
                pub #field: for<'f> fn(&mut Fsm<'f, D, A, E>, &A) -> Result<#output, E>
            }
        });
        self.items.push(quote! {
            pub struct Callbacks<D, A, E> {
                #(#fields,)*
            }
        });
    }

    fn instance_type(&mut self, _cx: &EmitContext<'_>) {
        self.items.push(quote! {
            pub struct Fsm<'cb, D, A, E> {
                cb: &'cb Callbacks<D, A, E>,
                data: D,
                state: usize,
            }

            impl<'cb, D, A, E> Fsm<'cb, D, A, E> {
                /// Creates an instance; nothing happens until `init`.
                pub fn new(cb: &'cb Callbacks<D, A, E>, data: D) -> Self {
                    Self {
                        cb,
                        data,
                        state: INVALID_STATE,
                    }
                }

                pub fn state(&self) -> Option<State> {
                    State::from_ordinal(self.state)
                }

                pub fn is_terminated(&self) -> bool {
                    self.state >= NUM_STATE
                }

                pub fn data(&self) -> &D {
                    &self.data
                }

                pub fn data_mut(&mut self) -> &mut D {
                    &mut self.data
                }

                pub fn into_data(self) -> D {
                    self.data
                }
            }

            #[allow(dead_code)]
            fn not_handled<D, A, E>(_fsm: &mut Fsm<'_, D, A, E>, _arg: &A) -> Result<(), E> {
                Ok(())
            }
        });
    }

    fn handler(&mut self, cx: &EmitContext<'_>, resolved: &ResolvedTransition) {
        let name = ident(&cx.handler_name(resolved));
        let body = match &resolved.handler {
            Handler::Chain(chain) => steps(cx, chain),
            Handler::Guarded { guard, arms, .. } => {
                let field = ident(&cx.callback_field(*guard));
                let arms = arms.iter().map(|arm| {
                    let pattern = match arm.when {
                        When::Is(value) => quote!(#value),
                        When::Case(value) => {
                            let value = Literal::i64_unsuffixed(value);
                            quote!(#value)
                        }
                        When::Always | When::Otherwise => quote!(_),
                    };
                    let body = steps(cx, &arm.steps);
                    quote!(#pattern => { #body })
                });
                quote! {
                    let taken = (cb.#field)(fsm, arg)?;
                    match taken {
                        #(#arms)*
                    }
                }
            }
        };
        self.items.push(quote! {
            #[allow(non_snake_case, unused_variables, unreachable_patterns)]
            fn #name<D, A, E>(fsm: &mut Fsm<'_, D, A, E>, arg: &A) -> Result<(), E> {
                let cb = fsm.cb;
                #body
                Ok(())
            }
        });
    }

    fn dispatch_table(&mut self, cx: &EmitContext<'_>, event: EventIdx) {
        let table = format_ident!("transition_on_event_{}", cx.event_name(event));
        let row = cx
            .row_names(event, "not_handled")
            .into_iter()
            .map(|name| ident(&name));
        self.items.push(quote! {
            #[allow(non_snake_case)]
            fn #table<D, A, E>() -> [InjectFn<D, A, E>; NUM_STATE] {
                [#(#row::<D, A, E>),*]
            }
        });
    }

    fn init(&mut self, cx: &EmitContext<'_>) {
        let body = steps(cx, cx.machine.table().init());
        self.methods.push(quote! {
            /// Runs the initial cascade.
            #[allow(unused_variables)]
            pub fn init(&mut self, arg: &A) -> Result<(), E> {
                let fsm = self;
                let cb = fsm.cb;
                #body
                Ok(())
            }
        });
    }

    fn injector(&mut self, cx: &EmitContext<'_>, event: EventIdx) {
        let name = cx.event_name(event);
        let method = format_ident!("inject_{}", name);
        let table = format_ident!("transition_on_event_{}", name);
        let variant = ident(name);
        self.methods.push(quote! {
            #[allow(non_snake_case)]
            pub fn #method(&mut self, arg: &A) -> Result<(), E> {
                match #table::<D, A, E>().get(self.state) {
                    Some(handler) => handler(self, arg),
                    None => Ok(()),
                }
            }
        });
        self.inject_arms.push(quote!(Event::#variant => self.#method(arg),));
    }

    fn finish(self, cx: &EmitContext<'_>) -> TokenStream {
        let module = ident(cx.prefix);
        let items = self.items;
        let methods = self.methods;
        let inject_arms = self.inject_arms;
        quote! {
            #[allow(dead_code, non_snake_case, clippy::all)]
            pub mod #module {
                #(#items)*

                impl<'cb, D, A, E> Fsm<'cb, D, A, E> {
                    #(#methods)*

                    pub fn inject(&mut self, event: Event, arg: &A) -> Result<(), E> {
                        match event {
                            #(#inject_arms)*
                        }
                    }
                }
            }
        }
    }
}

/// Renders `machine` as a token stream.
pub fn render(machine: &Compiled, options: &EmitOptions) -> TokenStream {
    drive(RustBackend::default(), machine, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile;
    use crate::ir::{BranchDecl, MachineIr, StateDecl, TargetDecl, TransitionDecl};

    fn squash(tokens: &TokenStream) -> String {
        tokens.to_string().split_whitespace().collect()
    }

    fn machine() -> Compiled {
        compile(
            &MachineIr::new("lamp")
                .events(["toggle"])
                .state(StateDecl::new("off"))
                .state(StateDecl::new("on").entry("light"))
                .initial("off")
                .transition(
                    TransitionDecl::new("off", "toggle")
                        .guard("powered")
                        .branch(BranchDecl::new(When::Is(true), TargetDecl::state("on")))
                        .branch(BranchDecl::new(When::Is(false), TargetDecl::Internal)),
                )
                .transition(TransitionDecl::to("on", "toggle", TargetDecl::state("off"))),
        )
        .unwrap()
    }

    #[test]
    fn module_is_named_after_prefix() {
        let tokens = render(&machine(), &EmitOptions::with_prefix("desk_lamp").unwrap());
        let text = squash(&tokens);
        assert!(text.contains("pubmoddesk_lamp{"));
        assert!(text.contains("pubenumState{off=0,on=1,}"));
        assert!(text.contains("pubconstNUM_STATE:usize=2;"));
        assert!(text.contains("pubconstNUM_EVENT:usize=1;"));
    }

    #[test]
    fn guard_fields_return_their_domain() {
        let text = squash(&render(&machine(), &EmitOptions::default()));
        assert!(text.contains(
            "pubaction_light:for<'f>fn(&mutFsm<'f,D,A,E>,&A)->Result<(),E>"
        ));
        assert!(text.contains(
            "pubcondition_powered:for<'f>fn(&mutFsm<'f,D,A,E>,&A)->Result<bool,E>"
        ));
    }

    #[test]
    fn guarded_handler_matches_once() {
        let text = squash(&render(&machine(), &EmitOptions::default()));
        let expected = "lettaken=(cb.condition_powered)(fsm,arg)?;matchtaken{true=>{fsm.state=State::offasusize;fsm.state=State::onasusize;(cb.action_light)(fsm,arg)?;}false=>{}}";
        assert!(text.contains(expected), "{text}");
        assert!(text.contains("[handle_toggle_in_off::<D,A,E>,handle_toggle_in_on::<D,A,E>]"));
    }

    #[test]
    fn keywords_render_as_raw_identifiers() {
        let compiled = compile(
            &MachineIr::new("match")
                .events(["loop"])
                .state(StateDecl::new("type"))
                .state(StateDecl::new("fn"))
                .initial("type")
                .transition(TransitionDecl::to("type", "loop", TargetDecl::state("fn"))),
        )
        .unwrap();
        let text = squash(&render(&compiled, &EmitOptions::default()));
        assert!(text.contains("pubmodr#match{"), "{text}");
        assert!(text.contains("pubenumState{r#type=0,r#fn=1,}"), "{text}");
        assert!(text.contains("Event::r#loop=>self.inject_loop(arg),"), "{text}");
    }

    #[test]
    fn machine_without_events_or_callbacks_still_renders() {
        let compiled = compile(&MachineIr::new("still").state(StateDecl::new("only"))).unwrap();
        let text = squash(&render(&compiled, &EmitOptions::default()));
        assert!(text.contains("pubenumEvent{}"));
        assert!(text.contains("pubstructCallbacks<D,A,E>(core::marker::PhantomData"));
        assert!(text.contains("matchevent{}"));
    }
}
