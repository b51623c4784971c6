use std::fmt;

use approx::abs_diff_eq;

use crate::actions::Action;
use crate::error::{Error, Result};

/// One possible outcome of taking an action in a state.
///
/// Records stored inside an MDP carry a raw, unnormalized `probability`
/// weight. Records handed out by [`Mdp::transitions`] are normalized so the
/// probabilities for a (state, action) pair sum to 1.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition<S> {
    pub state: S,
    pub reward: f64,
    pub probability: f64,
}

impl<S> Transition<S> {
    pub fn new(state: S, reward: f64, probability: f64) -> Transition<S> {
        Transition {
            state,
            reward,
            probability,
        }
    }
}

/// Markov Decision Process - Sutton & Barto 2018.
///
/// Implementations are built through the mutating methods and then shared
/// read-only with policies and environments.
pub trait Mdp {
    type State: Clone + Ord + fmt::Debug;
    type Action: Action;

    /// Normalized outcomes of taking `action` in `state`.
    fn transitions(
        &self,
        state: &Self::State,
        action: Self::Action,
    ) -> Result<Vec<Transition<Self::State>>>;

    /// Registers an outcome with an unnormalized `weight`.
    fn add_transition(
        &mut self,
        state: &Self::State,
        action: Self::Action,
        next_state: &Self::State,
        reward: f64,
        weight: f64,
    ) -> Result<()>;

    /// Makes `state` absorbing. When `default_reward` is given every existing
    /// transition into `state` from another state is rewarded with it.
    fn set_terminal_state(&mut self, state: &Self::State, default_reward: Option<f64>)
        -> Result<()>;

    fn is_terminal_state(&self, state: &Self::State) -> bool;

    fn terminal_states(&self) -> Vec<Self::State>;

    /// Inert cells that are never entered. They take no part in policy
    /// evaluation.
    fn is_wall_state(&self, _state: &Self::State) -> bool {
        false
    }

    fn set_initial_state(&mut self, state: &Self::State) -> Result<()>;

    fn is_initial_state(&self, state: &Self::State) -> bool;

    fn initial_states(&self) -> Vec<Self::State>;

    /// All states of the process.
    fn states(&self) -> Vec<Self::State>;

    /// Actions available from `state`.
    fn actions(&self, state: &Self::State) -> Result<Vec<Self::Action>>;

    /// Probability-weighted reward of taking `action` in `state`.
    fn expected_reward(&self, state: &Self::State, action: Self::Action) -> Result<f64> {
        let transitions = self.transitions(state, action)?;
        if let [single] = transitions.as_slice() {
            return Ok(single.reward);
        }
        Ok(transitions.iter().map(|t| t.probability * t.reward).sum())
    }

    /// Probability of landing in `to` after taking `action` in `from`.
    fn state_transition_probability(
        &self,
        from: &Self::State,
        action: Self::Action,
        to: &Self::State,
    ) -> Result<f64> {
        Ok(self
            .transitions(from, action)?
            .iter()
            .filter(|t| &t.state == to)
            .map(|t| t.probability)
            .sum())
    }
}

/// Divides every raw weight by the total weight of the whole record set.
pub(crate) fn normalize<S: Clone>(records: &[Transition<S>]) -> Vec<Transition<S>> {
    let total: f64 = records.iter().map(|t| t.probability).sum();
    let normalized: Vec<Transition<S>> = records
        .iter()
        .map(|t| Transition::new(t.state.clone(), t.reward, t.probability / total))
        .collect();
    debug_assert!(
        normalized.is_empty()
            || abs_diff_eq!(
                normalized.iter().map(|t| t.probability).sum::<f64>(),
                1.0,
                epsilon = 1e-9
            )
    );
    normalized
}

pub(crate) fn check_weight(weight: f64) -> Result<()> {
    if weight > 0.0 && weight.is_finite() {
        Ok(())
    } else {
        Err(Error::InvalidWeight { weight })
    }
}
