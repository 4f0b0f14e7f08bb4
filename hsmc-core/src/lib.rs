// Copyright 2025 0xjcf
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! # hsmc-core
//! Compiles hierarchical state machines into flat dispatch tables and renders
//! them as C, Python or Rust source.
//!
//! The pipeline runs strictly forward:
//! [`ir::MachineIr`] → [`tree::StateTree`] + [`transition::TransitionSet`] →
//! [`table::DispatchTable`] → [`emit`]. All hierarchy resolution happens here,
//! at compile time; generated machines dispatch with one array index per
//! event.

pub mod callback;
pub mod chain;
#[cfg(feature = "serde")]
pub mod document;
pub mod emit;
pub mod error;
pub mod ir;
pub mod resolve;
pub mod runtime;
pub mod table;
pub mod transition;
pub mod tree;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

use tracing::debug;

pub use callback::{Callback, CallbackIdx, CallbackKind, CallbackTable};
pub use chain::{Arm, Handler, Step};
pub use error::{CompileError, Result};
pub use ir::{BranchDecl, MachineIr, StateDecl, TargetDecl, TransitionDecl, When};
pub use table::{DispatchTable, ResolvedTransition};
#[cfg(feature = "serde")]
pub use table::TableDump;
pub use transition::{GuardDomain, TransitionSet};
pub use tree::{EventAlphabet, EventIdx, StateIdx, StateNode, StateTree};

pub mod prelude {
    pub use crate::emit::{Backend, EmitOptions, Language, emit};
    pub use crate::runtime::{Callbacks, Context, GuardValue, Instance};
    pub use crate::{Compiled, MachineIr, compile};
}

/// A fully resolved machine, ready for emission or interpretation.
#[derive(Debug, Clone)]
pub struct Compiled {
    name: String,
    tree: StateTree,
    events: EventAlphabet,
    transitions: TransitionSet,
    callbacks: CallbackTable,
    table: DispatchTable,
}

impl Compiled {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tree(&self) -> &StateTree {
        &self.tree
    }

    pub fn events(&self) -> &EventAlphabet {
        &self.events
    }

    pub fn transitions(&self) -> &TransitionSet {
        &self.transitions
    }

    pub fn callbacks(&self) -> &CallbackTable {
        &self.callbacks
    }

    pub fn table(&self) -> &DispatchTable {
        &self.table
    }

    pub fn state(&self, id: &str) -> Option<StateIdx> {
        self.tree.lookup(id)
    }

    pub fn event(&self, name: &str) -> Option<EventIdx> {
        self.events.lookup(name)
    }
}

/// Validates `ir` and resolves every (state, event) pair.
///
/// # Errors
///
/// Returns the first [`CompileError`] found; nothing is produced on failure.
pub fn compile(ir: &MachineIr) -> Result<Compiled> {
    tree::check_name("machine", &ir.name)?;
    let mut callbacks = CallbackTable::default();
    let tree = StateTree::build(ir, &mut callbacks)?;
    let events = EventAlphabet::build(&ir.events)?;
    let transitions = TransitionSet::build(ir, &tree, &events, &mut callbacks)?;
    debug!(callbacks = callbacks.len(), "registered callbacks");
    let table = DispatchTable::assemble(&tree, &events, &transitions);
    emit::check_handler_names(&tree, &events, &table)?;
    debug!(machine = %ir.name, "compiled");
    Ok(Compiled {
        name: ir.name.clone(),
        tree,
        events,
        transitions,
        callbacks,
        table,
    })
}
