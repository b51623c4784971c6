use std::fmt;
use std::io;

use serde::Serialize;
use statrs::statistics::{Data, Distribution, Max, Min};
use tracing::{debug, warn};

use crate::agents::Agent;
use crate::environment::Environment;
use crate::error::{Error, Result};
use crate::mdp::Mdp;

/// Outcome of a single episode.
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeResult<S> {
    pub total_reward: f64,
    pub total_steps: usize,
    pub reached_terminal_state: bool,
    pub last_state: S,
}

/// Runs agents against an environment with a per-episode step budget.
#[derive(Debug, Clone, Copy)]
pub struct Experiment {
    max_steps: usize,
}

impl Experiment {
    /// Every episode takes at most `max_steps` steps, which must be at
    /// least one.
    pub fn new(max_steps: usize) -> Result<Experiment> {
        if max_steps == 0 {
            return Err(Error::InvalidParameter {
                name: "max_steps",
                value: 0.0,
            });
        }
        Ok(Experiment { max_steps })
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    /// Plays one episode. An episode that exhausts the step budget is still
    /// closed with `agent.end` so the agent is ready for the next one.
    pub fn run_episode<M, G>(
        &self,
        env: &mut Environment<'_, M>,
        agent: &mut G,
    ) -> Result<EpisodeResult<M::State>>
    where
        M: Mdp,
        G: Agent<M::State, M::Action>,
    {
        let mut state = env.start()?;
        let mut action = agent.start(&state);
        let mut total_reward = 0.0;
        let mut total_steps = 0;

        loop {
            let step = env.step(action)?;
            total_steps += 1;
            total_reward += step.reward;
            state = step.state;

            if step.is_terminal {
                agent.end(step.reward);
                return Ok(EpisodeResult {
                    total_reward,
                    total_steps,
                    reached_terminal_state: true,
                    last_state: state,
                });
            }
            if total_steps >= self.max_steps {
                warn!(max_steps = self.max_steps, last_state = ?state, "episode truncated");
                agent.end(step.reward);
                return Ok(EpisodeResult {
                    total_reward,
                    total_steps,
                    reached_terminal_state: false,
                    last_state: state,
                });
            }
            action = agent.step(step.reward, &state);
        }
    }

    /// Plays `episodes` episodes in sequence.
    pub fn run<M, G>(
        &self,
        env: &mut Environment<'_, M>,
        agent: &mut G,
        episodes: usize,
    ) -> Result<Vec<EpisodeResult<M::State>>>
    where
        M: Mdp,
        G: Agent<M::State, M::Action>,
    {
        let mut results = Vec::with_capacity(episodes);
        for episode in 0..episodes {
            let result = self.run_episode(env, agent)?;
            debug!(
                episode,
                steps = result.total_steps,
                reward = result.total_reward,
                "episode finished"
            );
            results.push(result);
        }
        Ok(results)
    }
}

/// Aggregate statistics over a batch of episodes.
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeSummary {
    pub episodes: usize,
    pub min_steps: f64,
    pub max_steps: f64,
    pub mean_steps: f64,
    pub mean_reward: f64,
    /// Fraction of episodes that ended in a terminal state.
    pub success_rate: f64,
}

impl EpisodeSummary {
    /// Returns `None` for an empty batch.
    pub fn from_results<S>(results: &[EpisodeResult<S>]) -> Option<EpisodeSummary> {
        if results.is_empty() {
            return None;
        }
        let steps = Data::new(
            results
                .iter()
                .map(|r| r.total_steps as f64)
                .collect::<Vec<f64>>(),
        );
        let rewards = Data::new(results.iter().map(|r| r.total_reward).collect::<Vec<f64>>());
        let successes = results.iter().filter(|r| r.reached_terminal_state).count();

        Some(EpisodeSummary {
            episodes: results.len(),
            min_steps: steps.min(),
            max_steps: steps.max(),
            mean_steps: steps.mean()?,
            mean_reward: rewards.mean()?,
            success_rate: successes as f64 / results.len() as f64,
        })
    }
}

impl fmt::Display for EpisodeSummary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "Episodes:     {}", self.episodes)?;
        writeln!(
            f,
            "Steps:        min {:.0}, max {:.0}, mean {:.2}",
            self.min_steps, self.max_steps, self.mean_steps
        )?;
        writeln!(f, "Mean reward:  {:.2}", self.mean_reward)?;
        write!(f, "Success rate: {:.1}%", 100.0 * self.success_rate)
    }
}

#[derive(Serialize)]
struct ResultRow {
    episode: usize,
    total_reward: f64,
    total_steps: usize,
    reached_terminal_state: bool,
    last_state: String,
}

/// Writes one CSV row per episode, with a header.
pub fn write_results_csv<W: io::Write, S: fmt::Display>(
    writer: W,
    results: &[EpisodeResult<S>],
) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for (episode, result) in results.iter().enumerate() {
        csv_writer.serialize(ResultRow {
            episode,
            total_reward: result.total_reward,
            total_steps: result.total_steps,
            reached_terminal_state: result.reached_terminal_state,
            last_state: result.last_state.to_string(),
        })?;
    }
    csv_writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{FourWayAction, TwoWayAction};
    use crate::agents::{MonteCarloAgent, RandomAgent, Td0Agent};
    use crate::graph::GraphMdp;
    use crate::gridworld::{GridMdp, GridState};
    use approx::assert_abs_diff_eq;

    fn corner_grid() -> GridMdp<FourWayAction> {
        let mut g = GridMdp::new(4, 4)
            .with_cost_of_living(-1.0)
            .with_bounds_penalty(-1.0);
        g.set_terminal_state(&GridState::new(3, 3), None).unwrap();
        g.set_initial_state(&GridState::new(0, 0)).unwrap();
        g
    }

    fn result(steps: usize, reward: f64, reached: bool) -> EpisodeResult<GridState> {
        EpisodeResult {
            total_reward: reward,
            total_steps: steps,
            reached_terminal_state: reached,
            last_state: GridState::new(0, 0),
        }
    }

    #[test]
    fn random_agent_episodes() {
        // Arrange
        let g = corner_grid();
        let mut env = Environment::new(&g, Some(17));
        let mut agent = RandomAgent::new(Some(18));
        let experiment = Experiment::new(500).unwrap();
        // Act
        let results = experiment.run(&mut env, &mut agent, 20).unwrap();
        // Assert
        assert_eq!(results.len(), 20);
        for r in &results {
            assert!(r.total_steps >= 6 && r.total_steps <= 500);
            assert_eq!(r.total_reward, -(r.total_steps as f64));
            if r.reached_terminal_state {
                assert_eq!(r.last_state, GridState::new(3, 3));
            }
        }
        let last = results.last().unwrap();
        assert_eq!(agent.total_reward(), last.total_reward);
    }

    #[test]
    fn truncated_episode_ends_agent() {
        // Arrange: the agent can never reach the terminal state.
        let mut g: GraphMdp<&str, TwoWayAction> = GraphMdp::new();
        g.add_transition(&"A", TwoWayAction::Left, &"A", -1.0, 1.0).unwrap();
        g.add_transition(&"A", TwoWayAction::Right, &"A", -1.0, 1.0).unwrap();
        g.add_transition(&"B", TwoWayAction::Left, &"A", 0.0, 1.0).unwrap();
        g.set_terminal_state(&"B", None).unwrap();
        g.set_initial_state(&"A").unwrap();
        let mut env = Environment::new(&g, Some(1));
        let mut agent = Td0Agent::new(0.5, 1.0, 0.1, Some(2)).unwrap();
        let experiment = Experiment::new(10).unwrap();
        // Act
        let first = experiment.run_episode(&mut env, &mut agent).unwrap();
        let second = experiment.run_episode(&mut env, &mut agent).unwrap();
        // Assert
        assert_eq!(first.total_steps, 10);
        assert!(!first.reached_terminal_state);
        assert_eq!(first.total_reward, -10.0);
        assert_eq!(second.last_state, "A");
    }

    #[test]
    fn monte_carlo_learns_short_path() {
        // Arrange
        let g = corner_grid();
        let mut env = Environment::new(&g, Some(3));
        let mut agent = MonteCarloAgent::new(1.0, 0.1, Some(4)).unwrap();
        let experiment = Experiment::new(1000).unwrap();
        // Act
        let results = experiment.run(&mut env, &mut agent, 300).unwrap();
        // Assert
        assert_eq!(results.len(), 300);
        let early = EpisodeSummary::from_results(&results[..30]).unwrap();
        let late = EpisodeSummary::from_results(&results[270..]).unwrap();
        assert!(late.mean_steps < early.mean_steps);
    }

    #[test]
    fn zero_step_budget_is_rejected() {
        assert!(matches!(
            Experiment::new(0),
            Err(Error::InvalidParameter {
                name: "max_steps",
                ..
            })
        ));
        assert_eq!(Experiment::new(1).unwrap().max_steps(), 1);
    }

    #[test]
    fn single_step_budget_takes_one_step() {
        let g = corner_grid();
        let mut env = Environment::new(&g, Some(5));
        let mut agent = RandomAgent::new(Some(6));
        let result = Experiment::new(1)
            .unwrap()
            .run_episode(&mut env, &mut agent)
            .unwrap();
        assert_eq!(result.total_steps, 1);
        assert!(!result.reached_terminal_state);
    }

    #[test]
    fn summary_statistics() {
        let results = vec![
            result(4, -4.0, true),
            result(10, -10.0, false),
            result(7, -1.0, true),
        ];
        let summary = EpisodeSummary::from_results(&results).unwrap();
        assert_eq!(summary.episodes, 3);
        assert_eq!(summary.min_steps, 4.0);
        assert_eq!(summary.max_steps, 10.0);
        assert_abs_diff_eq!(summary.mean_steps, 7.0, epsilon = 1e-12);
        assert_abs_diff_eq!(summary.mean_reward, -5.0, epsilon = 1e-12);
        assert_abs_diff_eq!(summary.success_rate, 2.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn summary_of_nothing() {
        let results: Vec<EpisodeResult<GridState>> = Vec::new();
        assert_eq!(EpisodeSummary::from_results(&results), None);
    }

    #[test]
    fn results_as_csv() {
        // Arrange
        let results = vec![result(4, -4.0, true), result(10, -10.5, false)];
        let mut buffer = Vec::new();
        // Act
        write_results_csv(&mut buffer, &results).unwrap();
        // Assert
        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "episode,total_reward,total_steps,reached_terminal_state,last_state",
                "0,-4.0,4,true,\"(0,0)\"",
                "1,-10.5,10,false,\"(0,0)\"",
            ]
        );
    }
}
