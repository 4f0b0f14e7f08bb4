//! Performance benchmarks for hsmc
//!
//! Criterion benchmarks for the compile pipeline (hierarchy resolution, chain
//! building, emission) and for dispatch through the interpreter.

pub mod fixtures;

use std::convert::Infallible;

use hsmc_core::runtime::{Callbacks, Context, GuardValue};

/// Callbacks that only count calls. Guards alternate between false and true.
#[derive(Debug, Default)]
pub struct Tally {
    pub actions: u64,
    pub guards: u64,
}

impl<D, A> Callbacks<D, A> for Tally {
    type Error = Infallible;

    fn action(&mut self, _name: &str, _cx: Context<'_, D>, _arg: &A) -> Result<(), Infallible> {
        self.actions += 1;
        Ok(())
    }

    fn guard(
        &mut self,
        _name: &str,
        _cx: Context<'_, D>,
        _arg: &A,
    ) -> Result<GuardValue, Infallible> {
        self.guards += 1;
        Ok(GuardValue::from(self.guards % 2 == 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hsmc_core::compile;
    use hsmc_core::runtime::Instance;

    #[test]
    fn ladder_round_trips_through_every_column() {
        let machine = compile(&fixtures::ladder(3, 4)).unwrap();
        let next = machine.event("next").unwrap();
        let mut fsm = Instance::new(&machine, Tally::default(), ());
        fsm.init(&()).unwrap();
        let start = fsm.state();
        assert_eq!(fsm.state_id(), Some("L0/N1/N2/N3"));

        for _ in 0..3 {
            assert!(fsm.inject(next, &()).unwrap());
        }
        assert_eq!(fsm.state(), start);
        // Four entries on init, then four exits and four entries per step.
        assert_eq!(fsm.callbacks().actions, 4 + 3 * 8);
    }

    #[test]
    fn fixtures_compile() {
        compile(&fixtures::test_fsm()).unwrap();
        for width in [1, 8, 64] {
            compile(&fixtures::ladder(width, 3)).unwrap();
        }
    }
}
