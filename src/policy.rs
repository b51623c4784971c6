use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::error::{check_unit_interval, Error, Result};
use crate::mdp::Mdp;

/// Stochastic policy with a tabular value function.
///
/// Built against an MDP whose states and actions no longer change. Terminal
/// and wall states have a value but no action distribution.
pub struct Policy<'a, M: Mdp> {
    mdp: &'a M,
    gamma: f64,
    /// Action distribution of every non-terminal state.
    pi: BTreeMap<M::State, Vec<(M::Action, f64)>>,
    /// Value estimate of every state.
    values: BTreeMap<M::State, f64>,
}

/// Outcome of [`policy_iteration`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyIterationReport {
    /// Number of improvement steps, the last one being the stable one.
    pub improvements: usize,
    /// Total evaluation sweeps over all improvement steps.
    pub sweeps: usize,
}

impl<'a, M: Mdp> Policy<'a, M> {
    /// Uniform random policy over the actions of each non-terminal, non-wall
    /// state. Terminal and wall states keep a fixed value of 0.
    pub fn new(mdp: &'a M, gamma: f64) -> Result<Policy<'a, M>> {
        check_unit_interval("gamma", gamma, true)?;
        let mut pi = BTreeMap::new();
        let mut values = BTreeMap::new();
        for state in mdp.states() {
            if !mdp.is_terminal_state(&state) && !mdp.is_wall_state(&state) {
                let actions = mdp.actions(&state)?;
                let p = 1.0 / actions.len() as f64;
                pi.insert(state.clone(), actions.into_iter().map(|a| (a, p)).collect());
            }
            values.insert(state, 0.0);
        }
        Ok(Policy {
            mdp,
            gamma,
            pi,
            values,
        })
    }

    pub fn mdp(&self) -> &'a M {
        self.mdp
    }

    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    /// Current value estimate of `state`.
    pub fn value_function(&self, state: &M::State) -> Option<f64> {
        self.values.get(state).copied()
    }

    /// Action distribution of `state`, `None` for terminal or unknown states.
    pub fn action_probabilities(&self, state: &M::State) -> Option<&[(M::Action, f64)]> {
        self.pi.get(state).map(Vec::as_slice)
    }

    /// Expected return of taking `action` in `state` and following the
    /// current value estimates afterwards.
    pub fn action_value(&self, state: &M::State, action: M::Action) -> Result<f64> {
        let mut q = 0.0;
        for t in self.mdp.transitions(state, action)? {
            let next = self
                .values
                .get(&t.state)
                .ok_or_else(|| Error::unknown_state(&t.state))?;
            q += t.probability * (t.reward + self.gamma * next);
        }
        Ok(q)
    }

    /// One synchronous Bellman expectation sweep.
    ///
    /// Every update reads the values of the previous sweep. Returns the
    /// largest absolute change of any state value.
    pub fn policy_evaluation(&mut self) -> Result<f64> {
        let mut updated = self.values.clone();
        let mut delta: f64 = 0.0;
        for (state, distribution) in &self.pi {
            let mut value = 0.0;
            for &(action, p) in distribution {
                value += p * self.action_value(state, action)?;
            }
            let old = self.values[state];
            delta = delta.max((value - old).abs());
            updated.insert(state.clone(), value);
        }
        self.values = updated;
        debug!(delta, "policy evaluation sweep");
        Ok(delta)
    }

    /// Makes the policy greedy with respect to the current values.
    ///
    /// Actions tied for the best action value share the probability mass
    /// equally. Ties use exact float equality. Returns whether any
    /// probability changed.
    pub fn update_policy(&mut self) -> Result<bool> {
        let mut greedy = BTreeMap::new();
        for (state, distribution) in &self.pi {
            let mut q_values = Vec::with_capacity(distribution.len());
            for &(action, _) in distribution {
                q_values.push((action, self.action_value(state, action)?));
            }
            let best = q_values
                .iter()
                .map(|(_, q)| *q)
                .fold(f64::NEG_INFINITY, f64::max);
            let winners = q_values.iter().filter(|(_, q)| *q == best).count();
            let share = 1.0 / winners as f64;
            let updated: Vec<(M::Action, f64)> = q_values
                .into_iter()
                .map(|(a, q)| (a, if q == best { share } else { 0.0 }))
                .collect();
            greedy.insert(state.clone(), updated);
        }
        let changed = greedy != self.pi;
        self.pi = greedy;
        Ok(changed)
    }
}

/// Repeats evaluation sweeps until the residual drops below `theta`.
///
/// Stops after `max_sweeps` sweeps even if not converged. Returns the number
/// of sweeps performed.
pub fn evaluate_policy<M: Mdp>(
    policy: &mut Policy<'_, M>,
    theta: f64,
    max_sweeps: usize,
) -> Result<usize> {
    let mut sweeps = 0;
    while sweeps < max_sweeps {
        sweeps += 1;
        if policy.policy_evaluation()? < theta {
            return Ok(sweeps);
        }
    }
    warn!(max_sweeps, theta, "policy evaluation did not converge");
    Ok(sweeps)
}

/// Policy iteration: evaluate to convergence, greedify, repeat until the
/// policy is stable.
pub fn policy_iteration<M: Mdp>(
    policy: &mut Policy<'_, M>,
    theta: f64,
    max_sweeps: usize,
) -> Result<PolicyIterationReport> {
    let mut report = PolicyIterationReport {
        improvements: 0,
        sweeps: 0,
    };
    loop {
        report.sweeps += evaluate_policy(policy, theta, max_sweeps)?;
        report.improvements += 1;
        if !policy.update_policy()? {
            break;
        }
    }
    info!(
        improvements = report.improvements,
        sweeps = report.sweeps,
        "policy iteration converged"
    );
    Ok(report)
}
