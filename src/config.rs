//! TOML configuration for the `gridmdp` binary.

use std::path::Path;

use config_file::FromConfigFile;
use serde::Deserialize;

use crate::actions::GridAction;
use crate::error::{Error, Result};
use crate::gridworld::{GridMdp, GridState};
use crate::mdp::Mdp;

/// Hold information read from the TOML configuration file.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct GridConfig {
    pub grid: GridSettings,
    #[serde(default)]
    pub solver: SolverSettings,
    #[serde(default)]
    pub agent: AgentSettings,
    #[serde(default)]
    pub experiment: ExperimentSettings,
}

/// Movement model of the grid.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MoveSet {
    #[default]
    FourWay,
    King,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct WallSettings {
    pub cell: (usize, usize),
    #[serde(default = "default_penalty")]
    pub penalty: f64,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct GridSettings {
    pub rows: usize,
    pub columns: usize,
    #[serde(default = "default_penalty")]
    pub cost_of_living: f64,
    #[serde(default = "default_penalty")]
    pub bounds_penalty: f64,
    #[serde(default)]
    pub moves: MoveSet,
    #[serde(default)]
    pub terminal: Vec<(usize, usize)>,
    #[serde(default)]
    pub initial: Vec<(usize, usize)>,
    #[serde(default)]
    pub walls: Vec<WallSettings>,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct SolverSettings {
    pub gamma: f64,
    /// Residual below which policy evaluation stops.
    pub theta: f64,
    pub max_sweeps: usize,
}

impl Default for SolverSettings {
    fn default() -> Self {
        SolverSettings {
            gamma: 1.0,
            theta: 1e-5,
            max_sweeps: 10_000,
        }
    }
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    #[default]
    Random,
    MonteCarlo,
    Td0,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct AgentSettings {
    pub kind: AgentKind,
    pub epsilon: f64,
    pub alpha: f64,
    pub gamma: f64,
}

impl Default for AgentSettings {
    fn default() -> Self {
        AgentSettings {
            kind: AgentKind::Random,
            epsilon: 0.1,
            alpha: 0.2,
            gamma: 1.0,
        }
    }
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct ExperimentSettings {
    pub episodes: usize,
    pub max_steps: usize,
    pub seed: Option<u64>,
}

impl Default for ExperimentSettings {
    fn default() -> Self {
        ExperimentSettings {
            episodes: 200,
            max_steps: 1000,
            seed: None,
        }
    }
}

fn default_penalty() -> f64 {
    -1.0
}

impl GridConfig {
    pub fn from_path(path: &Path) -> Result<GridConfig> {
        GridConfig::from_config_file(path).map_err(|e| Error::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Builds the grid with its walls, terminal and initial cells.
    pub fn build_mdp<A: GridAction>(&self) -> Result<GridMdp<A>> {
        let settings = &self.grid;
        let mut mdp = GridMdp::new(settings.rows, settings.columns)
            .with_cost_of_living(settings.cost_of_living)
            .with_bounds_penalty(settings.bounds_penalty);
        for wall in &settings.walls {
            mdp.set_wall_state(&GridState::from(wall.cell), wall.penalty)?;
        }
        for &cell in &settings.terminal {
            mdp.set_terminal_state(&GridState::from(cell), None)?;
        }
        for &cell in &settings.initial {
            mdp.set_initial_state(&GridState::from(cell))?;
        }
        Ok(mdp)
    }
}
