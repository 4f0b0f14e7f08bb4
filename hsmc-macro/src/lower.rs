//! Lowering from the parsed DSL to [`MachineIr`].
//!
//! States are numbered in pre-order and identified by their `/`-joined path
//! (`A/B`). Transitions of one state on one event are grouped into a single
//! [`TransitionDecl`] in the order they are written.

use std::collections::{HashMap, HashSet};

use hsmc_core::{BranchDecl, MachineIr, StateDecl, TargetDecl, TransitionDecl, When};
use quote::ToTokens;
use syn::spanned::Spanned;
use syn::{Error, Ident, Path, Result};

use crate::{FsmInputAst, StateDeclarationAst, TargetAst, TransitionDefinitionAst};

struct TmpState<'ast> {
    ast: &'ast StateDeclarationAst,
    id: String,
    parent: Option<usize>,
    children: Vec<usize>,
}

pub(crate) struct TmpStateTree<'ast> {
    states: Vec<TmpState<'ast>>,
    by_id: HashMap<String, usize>,
}

impl<'ast> TmpStateTree<'ast> {
    pub fn build(input: &'ast FsmInputAst) -> Result<Self> {
        let mut tree = Self {
            states: Vec::new(),
            by_id: HashMap::new(),
        };
        tree.process_states(input.top_level_states.iter().collect(), None)?;
        Ok(tree)
    }

    fn process_states(
        &mut self,
        decls: Vec<&'ast StateDeclarationAst>,
        parent: Option<usize>,
    ) -> Result<()> {
        let mut sibling_names = HashSet::new();
        for decl in decls {
            let name = decl.name.to_string();
            if !sibling_names.insert(name.clone()) {
                return Err(Error::new(
                    decl.name.span(),
                    format!("Duplicate state name '{name}' at this level."),
                ));
            }
            let id = match parent {
                Some(parent) => format!("{}/{name}", self.states[parent].id),
                None => name,
            };
            let idx = self.states.len();
            self.by_id.insert(id.clone(), idx);
            self.states.push(TmpState {
                ast: decl,
                id,
                parent,
                children: Vec::new(),
            });
            if let Some(parent) = parent {
                self.states[parent].children.push(idx);
            }
            self.process_states(decl.nested_states().collect(), Some(idx))?;
        }
        Ok(())
    }

    fn default_child(&self, idx: usize) -> Result<Option<String>> {
        let state = &self.states[idx];
        match (&state.ast.default_child, state.children.is_empty()) {
            (None, true) => Ok(None),
            (None, false) => Err(Error::new(
                state.ast.name.span(),
                format!("Compound state '{}' must declare an 'initial' child state.", state.id),
            )),
            (Some(child), true) => Err(Error::new(
                child.span(),
                format!(
                    "State '{}' declares an 'initial' child but has no nested states defined.",
                    state.id
                ),
            )),
            (Some(child), false) => {
                let id = format!("{}/{child}", state.id);
                if self.by_id.contains_key(&id) {
                    Ok(Some(id))
                } else {
                    Err(Error::new(
                        child.span(),
                        format!(
                            "Initial child '{child}' declared for state '{}' is not defined as a direct child of this state.",
                            state.id
                        ),
                    ))
                }
            }
        }
    }

    fn top_level(&self, name: &Ident) -> Result<String> {
        let id = name.to_string();
        match self.by_id.get(&id) {
            Some(&idx) if self.states[idx].parent.is_none() => Ok(id),
            _ => Err(Error::new(
                name.span(),
                format!("Initial state '{id}' is not a top-level state."),
            )),
        }
    }

    /// Resolves a target written inside state `from`: a single name is tried
    /// as a direct child, a sibling and a top-level state; `A::B` is a full
    /// path.
    fn resolve(&self, from: usize, path: &Path) -> Result<String> {
        if path.leading_colon.is_some() {
            return Err(Error::new(
                path.span(),
                "Absolute paths starting with `::` are not supported for transition targets.",
            ));
        }
        let mut segments = Vec::with_capacity(path.segments.len());
        for segment in &path.segments {
            if !segment.arguments.is_empty() {
                return Err(Error::new(
                    segment.arguments.span(),
                    "State paths take no generic arguments.",
                ));
            }
            segments.push(segment.ident.to_string());
        }

        let here = &self.states[from];
        let mut candidates = Vec::new();
        if let [name] = segments.as_slice() {
            candidates.push(format!("{}/{name}", here.id));
            if let Some(parent) = here.parent {
                candidates.push(format!("{}/{name}", self.states[parent].id));
            }
        }
        candidates.push(segments.join("/"));

        candidates
            .into_iter()
            .find(|candidate| self.by_id.contains_key(candidate))
            .ok_or_else(|| {
                Error::new(
                    path.span(),
                    format!(
                        "Transition target state '{}' not found from state '{}'.",
                        path.to_token_stream(),
                        here.id
                    ),
                )
            })
    }

    fn transitions(&self, idx: usize) -> Result<Vec<TransitionDecl>> {
        let mut groups: Vec<(&Ident, Vec<&TransitionDefinitionAst>)> = Vec::new();
        for transition in self.states[idx].ast.transitions() {
            match groups
                .iter_mut()
                .find(|(event, _)| **event == transition.event_name)
            {
                Some((_, group)) => group.push(transition),
                None => groups.push((&transition.event_name, vec![transition])),
            }
        }
        groups
            .into_iter()
            .map(|(event, group)| self.lower_group(idx, event, &group))
            .collect()
    }

    /// One `on EVENT` group. A single unguarded transition is unconditional;
    /// an unguarded one after guarded ones is the catch-all; anything after an
    /// unguarded one can never run.
    fn lower_group(
        &self,
        idx: usize,
        event: &Ident,
        group: &[&TransitionDefinitionAst],
    ) -> Result<TransitionDecl> {
        let state = &self.states[idx];
        let mut decl = TransitionDecl::new(state.id.clone(), event.to_string());
        let mut guard: Option<&Ident> = None;
        let mut closed = false;

        for transition in group {
            if closed {
                return Err(Error::new(
                    transition.event_name.span(),
                    format!(
                        "Unreachable: an unguarded 'on {event}' in state '{}' already handles this event.",
                        state.id
                    ),
                ));
            }
            let when = match &transition.guard_clause {
                None => {
                    closed = true;
                    if guard.is_some() {
                        When::Otherwise
                    } else {
                        When::Always
                    }
                }
                Some(clause) => {
                    match guard {
                        Some(first) if *first != clause.name => {
                            return Err(Error::new(
                                clause.name.span(),
                                format!(
                                    "'on {event}' in state '{}' mixes guards '{first}' and '{}'.",
                                    state.id, clause.name
                                ),
                            ));
                        }
                        Some(_) => {}
                        None => guard = Some(&clause.name),
                    }
                    clause.when
                }
            };
            let target = match &transition.target {
                None => TargetDecl::Internal,
                Some(TargetAst::Final) => TargetDecl::Final,
                Some(TargetAst::State(path)) => TargetDecl::State(self.resolve(idx, path)?),
            };
            let branch = transition
                .actions()
                .fold(BranchDecl::new(when, target), |branch, action| {
                    branch.action(action.to_string())
                });
            decl = decl.branch(branch);
        }

        if let Some(guard) = guard {
            decl = decl.guard(guard.to_string());
        }
        Ok(decl)
    }
}

pub(crate) fn lower(input: &FsmInputAst) -> Result<MachineIr> {
    let tree = TmpStateTree::build(input)?;
    let mut ir = MachineIr::new(input.name.to_string());

    if let Some(initial) = &input.initial {
        ir = ir.initial(tree.top_level(initial)?);
    }

    let mut transitions = Vec::new();
    for (idx, state) in tree.states.iter().enumerate() {
        let mut decl = StateDecl::new(state.id.clone());
        if let Some(parent) = state.parent {
            decl = decl.parent(tree.states[parent].id.clone());
        }
        if let Some(child) = tree.default_child(idx)? {
            decl = decl.initial(child);
        }
        for action in state.ast.hooks(false) {
            decl = decl.entry(action.to_string());
        }
        for action in state.ast.hooks(true) {
            decl = decl.exit(action.to_string());
        }
        ir = ir.state(decl);
        transitions.extend(tree.transitions(idx)?);
    }

    // Without an explicit `events:` list, events are numbered by first use.
    let events: Vec<String> = match &input.events {
        Some(events) => events.iter().map(ToString::to_string).collect(),
        None => {
            let mut seen = Vec::new();
            for transition in &transitions {
                if !seen.contains(&transition.event) {
                    seen.push(transition.event.clone());
                }
            }
            seen
        }
    };
    ir = ir.events(events);

    for transition in transitions {
        ir = ir.transition(transition);
    }
    Ok(ir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_str;

    fn lower_str(dsl: &str) -> Result<MachineIr> {
        lower(&parse_str::<FsmInputAst>(dsl)?)
    }

    #[test]
    fn nested_states_get_path_ids_in_pre_order() {
        let ir = lower_str(
            "name: m, initial: A,
             state A { initial: B; entry: enter_A; state B {} state C {} }
             state D { initial: E; state E {} }",
        )
        .unwrap();
        let ids: Vec<&str> = ir.states.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["A", "A/B", "A/C", "D", "D/E"]);
        assert_eq!(ir.states[0].initial.as_deref(), Some("A/B"));
        assert_eq!(ir.states[0].entry, ["enter_A"]);
        assert_eq!(ir.states[2].parent.as_deref(), Some("A"));
        assert_eq!(ir.initial.as_deref(), Some("A"));
    }

    #[test]
    fn targets_resolve_child_then_sibling_then_top_level() {
        let ir = lower_str(
            "name: m, initial: A,
             state A {
                 initial: B;
                 on go => B;
                 state B { on go => C; on back => A; }
                 state C { on go => D::F; }
             }
             state B {}
             state D { initial: F; state F {} }",
        )
        .unwrap();
        let target = |state: &str, event: &str| {
            let decl = ir
                .transitions
                .iter()
                .find(|t| t.state == state && t.event == event)
                .unwrap();
            decl.branches[0].target.clone()
        };
        assert_eq!(target("A", "go"), TargetDecl::state("A/B"));
        assert_eq!(target("A/B", "go"), TargetDecl::state("A/C"));
        assert_eq!(target("A/B", "back"), TargetDecl::state("A"));
        assert_eq!(target("A/C", "go"), TargetDecl::state("D/F"));
    }

    #[test]
    fn guarded_group_becomes_one_transition() {
        let ir = lower_str(
            "name: m, events: [Z],
             state A {
                 on Z [guard check] => B [action jump];
                 on Z [guard !check] [action stay];
             }
             state B { on Z [guard level(1)] => A; on Z => final; }",
        )
        .unwrap();
        assert_eq!(ir.transitions.len(), 2);

        let a = &ir.transitions[0];
        assert_eq!(a.guard.as_deref(), Some("check"));
        assert_eq!(
            a.branches,
            [
                BranchDecl::new(When::Is(true), TargetDecl::state("B")).action("jump"),
                BranchDecl::new(When::Is(false), TargetDecl::Internal).action("stay"),
            ]
        );

        let b = &ir.transitions[1];
        assert_eq!(b.guard.as_deref(), Some("level"));
        assert_eq!(b.branches[0].when, When::Case(1));
        assert_eq!(b.branches[1].when, When::Otherwise);
        assert_eq!(b.branches[1].target, TargetDecl::Final);
    }

    #[test]
    fn events_default_to_first_use() {
        let ir = lower_str("name: m, state A { on b => A; on a => A; on b [action x]; }");
        // Two unguarded `on b` in one state: the second is unreachable.
        assert!(ir.unwrap_err().to_string().contains("Unreachable"));

        let ir = lower_str("name: m, state A { on b => A; on a => A; }").unwrap();
        assert_eq!(ir.events, ["b", "a"]);
    }

    #[test]
    fn lowering_errors_point_at_the_source() {
        let err = |dsl: &str| lower_str(dsl).unwrap_err().to_string();
        assert!(err("name: m, state A { state B {} }").contains("must declare an 'initial'"));
        assert!(err("name: m, state A { initial: B; }").contains("no nested states"));
        assert!(err("name: m, state A { initial: X; state B {} }").contains("direct child"));
        assert!(err("name: m, state A {} state A {}").contains("Duplicate state name"));
        assert!(err("name: m, state A { on go => Nowhere; }").contains("not found"));
        assert!(err("name: m, initial: B, state A { initial: B; state B {} }")
            .contains("not a top-level state"));
        assert!(err(
            "name: m, state A { on go [guard one] => A; on go [guard two] => A; }"
        )
        .contains("mixes guards"));
    }
}
