use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::trace;

use crate::error::{Error, Result};
use crate::mdp::Mdp;

/// Result of a single environment step.
#[derive(Debug, Clone, PartialEq)]
pub struct Step<S> {
    pub state: S,
    pub reward: f64,
    pub is_terminal: bool,
}

/// Seeds from `seed` when given, from system entropy otherwise.
pub(crate) fn build_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Samples trajectories from an MDP.
pub struct Environment<'a, M: Mdp> {
    mdp: &'a M,
    rng: StdRng,
    last_state: Option<M::State>,
}

impl<'a, M: Mdp> Environment<'a, M> {
    pub fn new(mdp: &'a M, seed: Option<u64>) -> Environment<'a, M> {
        Environment {
            mdp,
            rng: build_rng(seed),
            last_state: None,
        }
    }

    pub fn mdp(&self) -> &'a M {
        self.mdp
    }

    /// State reached by the latest `start` or `step`.
    pub fn last_state(&self) -> Option<&M::State> {
        self.last_state.as_ref()
    }

    /// Begins an episode in one of the initial states, chosen uniformly.
    pub fn start(&mut self) -> Result<M::State> {
        let initial = self.mdp.initial_states();
        let state = match initial.as_slice() {
            [] => return Err(Error::NoInitialState),
            [only] => only.clone(),
            many => many
                .choose(&mut self.rng)
                .cloned()
                .ok_or(Error::NoInitialState)?,
        };
        self.last_state = Some(state.clone());
        Ok(state)
    }

    /// Takes `action` from the current state and samples the outcome.
    ///
    /// # Panics
    ///
    /// Panics when called before `start`.
    pub fn step(&mut self, action: M::Action) -> Result<Step<M::State>> {
        let state = self
            .last_state
            .as_ref()
            .unwrap_or_else(|| panic!("Environment::step called before start"));
        let transitions = self.mdp.transitions(state, action)?;

        let draw: f64 = self.rng.gen();
        let mut cumulative = 0.0;
        for t in transitions {
            cumulative += t.probability;
            if cumulative >= draw {
                trace!(from = ?state, %action, to = ?t.state, reward = t.reward, "step");
                let is_terminal = self.mdp.is_terminal_state(&t.state);
                self.last_state = Some(t.state.clone());
                return Ok(Step {
                    state: t.state,
                    reward: t.reward,
                    is_terminal,
                });
            }
        }
        Err(Error::ProbabilityMassError {
            state: format!("{state:?}"),
            action: action.to_string(),
            draw,
            total: cumulative,
        })
    }
}
