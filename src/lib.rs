//! # hsmc
//! Compiles hierarchical state machines into flat, table-driven code.
//!
//! A machine is described once, either with the [`MachineIr`] builders, as a
//! JSON document (`serde` feature), or inline with [`fsm!`]. [`compile`]
//! resolves the hierarchy into one straight-line chain per
//! `(state, event)` pair; the emitters render that table as C, Python or
//! Rust, and [`Instance`](prelude::Instance) interprets it directly.
//!
//! ```
//! use hsmc::prelude::*;
//! use hsmc::{StateDecl, TargetDecl, TransitionDecl};
//!
//! let ir = MachineIr::new("door")
//!     .initial("closed")
//!     .events(["open", "close"])
//!     .state(StateDecl::new("closed"))
//!     .state(StateDecl::new("opened"))
//!     .transition(TransitionDecl::to("closed", "open", TargetDecl::state("opened")))
//!     .transition(TransitionDecl::to("opened", "close", TargetDecl::state("closed")));
//! let machine = compile(&ir).unwrap();
//! let c = emit(Language::C, &machine, &EmitOptions::default());
//! assert!(c.contains("door_inject_open"));
//! ```

pub use hsmc_core::*;
pub use hsmc_macro::fsm;

pub mod prelude {
    pub use hsmc_core::prelude::*;
    pub use hsmc_macro::fsm;
}
