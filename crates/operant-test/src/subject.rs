//! Randomized subject
//!
//! Pokes a chamber's inputs at random, the way an untrained animal would.
//! Seeded, so a failing run can be replayed.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::ScriptedInput;

pub struct RandomSubject {
    rng: StdRng,
    inputs: Vec<Arc<ScriptedInput>>,
    /// Chance per input per call of starting a poke
    poke_probability: f64,
    pokes: u64,
}

impl RandomSubject {
    pub fn new(seed: u64, inputs: Vec<Arc<ScriptedInput>>, poke_probability: f64) -> Self {
        RandomSubject {
            rng: StdRng::seed_from_u64(seed),
            inputs,
            poke_probability: poke_probability.clamp(0.0, 1.0),
            pokes: 0,
        }
    }

    /// Maybe poke some inputs; call once per tick
    pub fn act(&mut self) {
        for input in &self.inputs {
            if self.rng.gen_bool(self.poke_probability) {
                input.poke();
                self.pokes += 1;
            }
        }
    }

    pub fn pokes(&self) -> u64 {
        self.pokes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_pokes() {
        let run = |seed| {
            let input = ScriptedInput::new("np1");
            let mut subject = RandomSubject::new(seed, vec![Arc::clone(&input)], 0.3);
            for _ in 0..100 {
                subject.act();
            }
            (subject.pokes(), input.pending())
        };
        assert_eq!(run(7), run(7));
        assert!(run(7).0 > 0);
    }

    #[test]
    fn test_zero_probability_never_pokes() {
        let input = ScriptedInput::new("np1");
        let mut subject = RandomSubject::new(1, vec![Arc::clone(&input)], 0.0);
        subject.act();
        assert_eq!(input.pending(), 0);
    }
}
