//! Learning agents that act on an [`Environment`](crate::environment::Environment).
//!
//! Every agent follows the same protocol: `start` with the initial state,
//! `step` once per non-terminal transition, `end` with the final reward.
//! Calling `step` or `end` outside of an episode is a caller bug and panics.

use std::collections::{BTreeMap, BTreeSet};

use rand::rngs::StdRng;
use rand::Rng;
use tracing::debug;

use crate::actions::Action;
use crate::environment::build_rng;
use crate::error::{check_unit_interval, Result};

/// Decision maker fed with (reward, state) pairs.
pub trait Agent<S, A> {
    /// First action of an episode.
    fn start(&mut self, state: &S) -> A;

    /// Next action, given the reward of the previous action and the state it
    /// led to.
    fn step(&mut self, reward: f64, next_state: &S) -> A;

    /// Called once the episode is over with the reward of the last action.
    fn end(&mut self, reward: f64);
}

/// Incremental arithmetic mean.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunningMean {
    count: u64,
    mean: f64,
}

impl RunningMean {
    pub fn push(&mut self, value: f64) -> f64 {
        self.count += 1;
        self.mean += (value - self.mean) / self.count as f64;
        self.mean
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn count(&self) -> u64 {
        self.count
    }
}

/// Tabular action values, one row of `A::count()` entries per state.
///
/// Unseen states read as all zeros.
#[derive(Debug, Clone)]
pub struct ActionValues<S, A> {
    table: BTreeMap<S, Vec<f64>>,
    actions: std::marker::PhantomData<A>,
}

impl<S, A> Default for ActionValues<S, A> {
    fn default() -> Self {
        ActionValues {
            table: BTreeMap::new(),
            actions: std::marker::PhantomData,
        }
    }
}

impl<S: Clone + Ord, A: Action> ActionValues<S, A> {
    pub fn new() -> ActionValues<S, A> {
        ActionValues::default()
    }

    pub fn value(&self, state: &S, action: A) -> f64 {
        self.table
            .get(state)
            .map_or(0.0, |row| row[action.id()])
    }

    pub fn value_mut(&mut self, state: &S, action: A) -> &mut f64 {
        let row = self
            .table
            .entry(state.clone())
            .or_insert_with(|| vec![0.0; A::count()]);
        &mut row[action.id()]
    }

    /// Number of states with at least one stored value.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Greedy action. The first action in catalog order wins ties.
    pub fn best_action(&self, state: &S) -> A {
        let mut best = A::all()[0];
        if let Some(row) = self.table.get(state) {
            let mut best_value = row[0];
            for (&action, &value) in A::all().iter().zip(row.iter()).skip(1) {
                if value > best_value {
                    best = action;
                    best_value = value;
                }
            }
        }
        best
    }

    /// ε-soft selection: explores uniformly with probability `epsilon`,
    /// otherwise picks the greedy action.
    pub fn epsilon_greedy(&self, state: &S, epsilon: f64, rng: &mut StdRng) -> A {
        if rng.gen_bool(epsilon) {
            A::all()[rng.gen_range(0..A::count())]
        } else {
            self.best_action(state)
        }
    }
}

/// Acts uniformly at random and tallies the reward it receives.
#[derive(Debug, Clone)]
pub struct RandomAgent {
    rng: StdRng,
    total_reward: f64,
}

impl RandomAgent {
    pub fn new(seed: Option<u64>) -> RandomAgent {
        RandomAgent {
            rng: build_rng(seed),
            total_reward: 0.0,
        }
    }

    /// Reward collected in the current episode.
    pub fn total_reward(&self) -> f64 {
        self.total_reward
    }

    fn random_action<A: Action>(&mut self) -> A {
        A::all()[self.rng.gen_range(0..A::count())]
    }
}

impl<S, A: Action> Agent<S, A> for RandomAgent {
    fn start(&mut self, _state: &S) -> A {
        self.total_reward = 0.0;
        self.random_action()
    }

    fn step(&mut self, reward: f64, _next_state: &S) -> A {
        self.total_reward += reward;
        self.random_action()
    }

    fn end(&mut self, reward: f64) {
        self.total_reward += reward;
    }
}

/// First-visit, on-policy Monte-Carlo control with an ε-soft policy.
///
/// Action values are the running mean of the returns observed after the
/// first visit of each (state, action) pair in every episode.
#[derive(Debug, Clone)]
pub struct MonteCarloAgent<S, A> {
    gamma: f64,
    epsilon: f64,
    rng: StdRng,
    values: ActionValues<S, A>,
    returns: BTreeMap<(S, A), RunningMean>,
    /// (state, action, reward received on arriving in state)
    episode: Vec<(S, A, f64)>,
    first_visit: Vec<bool>,
    visited: BTreeSet<(S, A)>,
}

impl<S: Clone + Ord, A: Action> MonteCarloAgent<S, A> {
    pub fn new(gamma: f64, epsilon: f64, seed: Option<u64>) -> Result<MonteCarloAgent<S, A>> {
        check_unit_interval("gamma", gamma, true)?;
        check_unit_interval("epsilon", epsilon, false)?;
        Ok(MonteCarloAgent {
            gamma,
            epsilon,
            rng: build_rng(seed),
            values: ActionValues::new(),
            returns: BTreeMap::new(),
            episode: Vec::new(),
            first_visit: Vec::new(),
            visited: BTreeSet::new(),
        })
    }

    pub fn values(&self) -> &ActionValues<S, A> {
        &self.values
    }

    pub fn action_value(&self, state: &S, action: A) -> f64 {
        self.values.value(state, action)
    }

    /// Number of first-visit returns averaged into the pair's value.
    pub fn visit_count(&self, state: &S, action: A) -> u64 {
        self.returns
            .get(&(state.clone(), action))
            .map_or(0, RunningMean::count)
    }

    fn record(&mut self, state: &S, action: A, reward: f64) {
        let first = self.visited.insert((state.clone(), action));
        self.episode.push((state.clone(), action, reward));
        self.first_visit.push(first);
    }
}

impl<S: Clone + Ord, A: Action> Agent<S, A> for MonteCarloAgent<S, A> {
    fn start(&mut self, state: &S) -> A {
        self.episode.clear();
        self.first_visit.clear();
        self.visited.clear();

        let action = self.values.epsilon_greedy(state, self.epsilon, &mut self.rng);
        self.record(state, action, 0.0);
        action
    }

    fn step(&mut self, reward: f64, next_state: &S) -> A {
        assert!(!self.episode.is_empty(), "MonteCarloAgent::step called before start");
        let action = self
            .values
            .epsilon_greedy(next_state, self.epsilon, &mut self.rng);
        self.record(next_state, action, reward);
        action
    }

    fn end(&mut self, reward: f64) {
        assert!(!self.episode.is_empty(), "MonteCarloAgent::end called before start");

        let mut g = 0.0;
        let mut next_reward = reward;
        for t in (0..self.episode.len()).rev() {
            g = self.gamma * g + next_reward;
            let (state, action, arrival_reward) = &self.episode[t];
            if self.first_visit[t] {
                let mean = self
                    .returns
                    .entry((state.clone(), *action))
                    .or_default()
                    .push(g);
                *self.values.value_mut(state, *action) = mean;
            }
            next_reward = *arrival_reward;
        }
        debug!(steps = self.episode.len(), episode_return = g, "monte carlo update");

        self.episode.clear();
        self.first_visit.clear();
        self.visited.clear();
    }
}

/// One-step temporal-difference control (SARSA-style TD(0)) with an
/// ε-soft policy.
#[derive(Debug, Clone)]
pub struct Td0Agent<S, A> {
    alpha: f64,
    gamma: f64,
    epsilon: f64,
    rng: StdRng,
    values: ActionValues<S, A>,
    last: Option<(S, A)>,
}

impl<S: Clone + Ord, A: Action> Td0Agent<S, A> {
    pub fn new(
        alpha: f64,
        gamma: f64,
        epsilon: f64,
        seed: Option<u64>,
    ) -> Result<Td0Agent<S, A>> {
        check_unit_interval("alpha", alpha, true)?;
        check_unit_interval("gamma", gamma, true)?;
        check_unit_interval("epsilon", epsilon, false)?;
        Ok(Td0Agent {
            alpha,
            gamma,
            epsilon,
            rng: build_rng(seed),
            values: ActionValues::new(),
            last: None,
        })
    }

    pub fn values(&self) -> &ActionValues<S, A> {
        &self.values
    }

    pub fn action_value(&self, state: &S, action: A) -> f64 {
        self.values.value(state, action)
    }
}

impl<S: Clone + Ord, A: Action> Agent<S, A> for Td0Agent<S, A> {
    fn start(&mut self, state: &S) -> A {
        let action = self.values.epsilon_greedy(state, self.epsilon, &mut self.rng);
        self.last = Some((state.clone(), action));
        action
    }

    fn step(&mut self, reward: f64, next_state: &S) -> A {
        let (state, action) = self
            .last
            .take()
            .unwrap_or_else(|| panic!("Td0Agent::step called before start"));
        let next_action = self
            .values
            .epsilon_greedy(next_state, self.epsilon, &mut self.rng);

        let target = reward + self.gamma * self.values.value(next_state, next_action);
        let q = self.values.value_mut(&state, action);
        *q += self.alpha * (target - *q);

        self.last = Some((next_state.clone(), next_action));
        next_action
    }

    fn end(&mut self, reward: f64) {
        let (state, action) = self
            .last
            .take()
            .unwrap_or_else(|| panic!("Td0Agent::end called before start"));
        let q = self.values.value_mut(&state, action);
        *q += self.alpha * (reward - *q);
    }
}
