use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Write};
use std::marker::PhantomData;

use tracing::debug;

use crate::actions::{FourWayAction, GridAction};
use crate::error::{Error, Result};
use crate::mdp::{check_weight, normalize, Mdp, Transition};
use crate::policy::Policy;

/// A cell of the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GridState {
    pub row: usize,
    pub column: usize,
}

impl GridState {
    pub fn new(row: usize, column: usize) -> GridState {
        GridState { row, column }
    }
}

impl From<(usize, usize)> for GridState {
    fn from((row, column): (usize, usize)) -> Self {
        GridState { row, column }
    }
}

impl fmt::Display for GridState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({},{})", self.row, self.column)
    }
}

/// Iterates the cells of a grid in row-major order.
struct CellIterator {
    row: usize,
    column: usize,
    rows: usize,
    columns: usize,
}

impl CellIterator {
    fn new(rows: usize, columns: usize) -> CellIterator {
        CellIterator {
            row: 0,
            column: 0,
            rows,
            columns,
        }
    }
}

impl Iterator for CellIterator {
    type Item = GridState;

    fn next(&mut self) -> Option<Self::Item> {
        if self.row >= self.rows || self.columns == 0 {
            return None;
        }
        let state = GridState::new(self.row, self.column);
        if self.column + 1 < self.columns {
            self.column += 1;
        } else {
            self.column = 0;
            self.row += 1;
        }
        Some(state)
    }
}

/// Dense grid MDP with structural movement dynamics.
///
/// Without an explicit transition an action moves one cell along its
/// displacement and pays `cost_of_living`. Moves leaving the grid bounce back
/// with `bounds_penalty`, moves into a wall bounce back with that wall's
/// penalty. Explicit transitions added with `add_transition` override the
/// structural move for their (state, action) pair.
#[derive(Debug, Clone)]
pub struct GridMdp<A: GridAction = FourWayAction> {
    rows: usize,
    columns: usize,
    cost_of_living: f64,
    bounds_penalty: f64,
    /// Raw (unnormalized) explicit transitions.
    dynamics: BTreeMap<(GridState, A), Vec<Transition<GridState>>>,
    /// Terminal cells with their optional arrival reward.
    terminal: BTreeMap<GridState, Option<f64>>,
    /// Wall cells with their bounce penalty.
    walls: BTreeMap<GridState, f64>,
    initial: BTreeSet<GridState>,
    actions: PhantomData<A>,
}

impl<A: GridAction> GridMdp<A> {
    /// Creates a grid where every move is free and edges bounce for free.
    pub fn new(rows: usize, columns: usize) -> GridMdp<A> {
        GridMdp {
            rows,
            columns,
            cost_of_living: 0.0,
            bounds_penalty: 0.0,
            dynamics: BTreeMap::new(),
            terminal: BTreeMap::new(),
            walls: BTreeMap::new(),
            initial: BTreeSet::new(),
            actions: PhantomData,
        }
    }

    /// Reward paid by every structural move that stays inside the grid.
    pub fn with_cost_of_living(mut self, reward: f64) -> GridMdp<A> {
        self.cost_of_living = reward;
        self
    }

    /// Reward paid when a structural move would leave the grid.
    pub fn with_bounds_penalty(mut self, reward: f64) -> GridMdp<A> {
        self.bounds_penalty = reward;
        self
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn cost_of_living(&self) -> f64 {
        self.cost_of_living
    }

    pub fn bounds_penalty(&self) -> f64 {
        self.bounds_penalty
    }

    fn check_cell(&self, state: &GridState) -> Result<()> {
        if state.row < self.rows && state.column < self.columns {
            Ok(())
        } else {
            Err(Error::unknown_state(state))
        }
    }

    /// Marks `state` as a wall.
    ///
    /// Existing transitions landing on the wall are redirected to their
    /// source with `penalty` reward, keeping their weight.
    pub fn set_wall_state(&mut self, state: &GridState, penalty: f64) -> Result<()> {
        self.check_cell(state)?;
        if self.is_terminal_state(state) {
            return Err(Error::marking(state, "a terminal state cannot be a wall"));
        }
        if self.is_initial_state(state) {
            return Err(Error::marking(state, "an initial state cannot be a wall"));
        }

        let mut redirected = 0;
        for ((source, _), records) in self.dynamics.iter_mut() {
            for t in records.iter_mut().filter(|t| t.state == *state) {
                t.state = *source;
                t.reward = penalty;
                redirected += 1;
            }
        }
        debug!(%state, penalty, redirected, "marked wall");

        self.walls.insert(*state, penalty);
        Ok(())
    }

    pub fn wall_states(&self) -> Vec<GridState> {
        self.walls.keys().copied().collect()
    }

    /// The move taken when no explicit transition exists.
    fn transition_default(&self, state: &GridState, action: A) -> Transition<GridState> {
        if self.is_terminal_state(state) {
            return Transition::new(*state, 0.0, 1.0);
        }
        let (d_row, d_col) = action.displacement();
        let row = state.row.checked_add_signed(d_row).filter(|&r| r < self.rows);
        let column = state
            .column
            .checked_add_signed(d_col)
            .filter(|&c| c < self.columns);
        let target = match (row, column) {
            (Some(row), Some(column)) => GridState::new(row, column),
            _ => return Transition::new(*state, self.bounds_penalty, 1.0),
        };
        if let Some(&penalty) = self.walls.get(&target) {
            return Transition::new(*state, penalty, 1.0);
        }
        let reward = match self.terminal.get(&target) {
            Some(Some(arrival)) => *arrival,
            _ => self.cost_of_living,
        };
        Transition::new(target, reward, 1.0)
    }

    /// Values of every cell as a `rows x columns` array.
    pub fn value_grid(&self, policy: &Policy<'_, GridMdp<A>>) -> ndarray::Array2<f64> {
        ndarray::Array2::from_shape_fn((self.rows, self.columns), |(row, column)| {
            policy
                .value_function(&GridState::new(row, column))
                .unwrap_or(0.0)
        })
    }

    /// Text map of the most probable actions of `policy` in each cell.
    ///
    /// Walls print as `#`, terminal cells as `T`.
    pub fn render_policy(&self, policy: &Policy<'_, GridMdp<A>>) -> String {
        let width = A::count();
        let mut out = String::new();
        for row in 0..self.rows {
            for column in 0..self.columns {
                let state = GridState::new(row, column);
                let cell = if self.is_wall_state(&state) {
                    "#".to_string()
                } else if self.is_terminal_state(&state) {
                    "T".to_string()
                } else {
                    policy
                        .action_probabilities(&state)
                        .map(best_arrows)
                        .unwrap_or_default()
                };
                let _ = write!(out, "{cell:^width$}|");
            }
            out.push('\n');
        }
        out
    }
}

fn best_arrows<A: GridAction>(probabilities: &[(A, f64)]) -> String {
    let best = probabilities
        .iter()
        .map(|(_, p)| *p)
        .fold(f64::NEG_INFINITY, f64::max);
    probabilities
        .iter()
        .filter(|(_, p)| *p == best)
        .map(|(a, _)| a.arrow())
        .collect()
}

impl<A: GridAction> Mdp for GridMdp<A> {
    type State = GridState;
    type Action = A;

    fn transitions(&self, state: &GridState, action: A) -> Result<Vec<Transition<GridState>>> {
        self.check_cell(state)?;
        match self.dynamics.get(&(*state, action)) {
            Some(records) if !records.is_empty() => Ok(normalize(records)),
            _ => Ok(vec![self.transition_default(state, action)]),
        }
    }

    fn add_transition(
        &mut self,
        state: &GridState,
        action: A,
        next_state: &GridState,
        reward: f64,
        weight: f64,
    ) -> Result<()> {
        self.check_cell(state)?;
        self.check_cell(next_state)?;
        if self.is_terminal_state(state) {
            return Err(Error::InvalidTransitionTarget {
                state: state.to_string(),
            });
        }
        if self.is_wall_state(state) {
            return Err(Error::marking(state, "a wall has no outgoing transitions"));
        }
        check_weight(weight)?;

        let record = match self.walls.get(next_state) {
            Some(&penalty) => Transition::new(*state, penalty, weight),
            None => Transition::new(*next_state, reward, weight),
        };
        self.dynamics.entry((*state, action)).or_default().push(record);
        Ok(())
    }

    fn set_terminal_state(
        &mut self,
        state: &GridState,
        default_reward: Option<f64>,
    ) -> Result<()> {
        self.check_cell(state)?;
        if self.is_terminal_state(state) {
            return Ok(());
        }
        if self.is_wall_state(state) {
            return Err(Error::marking(state, "a wall cannot be terminal"));
        }
        if self.is_initial_state(state) {
            return Err(Error::marking(state, "an initial state cannot be terminal"));
        }

        for &action in A::all() {
            self.dynamics
                .insert((*state, action), vec![Transition::new(*state, 0.0, 1.0)]);
        }

        if let Some(reward) = default_reward {
            for ((source, _), records) in self.dynamics.iter_mut() {
                if source == state {
                    continue;
                }
                for t in records.iter_mut().filter(|t| t.state == *state) {
                    t.reward = reward;
                }
            }
        }

        self.terminal.insert(*state, default_reward);
        Ok(())
    }

    fn is_terminal_state(&self, state: &GridState) -> bool {
        self.terminal.contains_key(state)
    }

    fn terminal_states(&self) -> Vec<GridState> {
        self.terminal.keys().copied().collect()
    }

    fn is_wall_state(&self, state: &GridState) -> bool {
        self.walls.contains_key(state)
    }

    fn set_initial_state(&mut self, state: &GridState) -> Result<()> {
        self.check_cell(state)?;
        if self.is_wall_state(state) {
            return Err(Error::marking(state, "a wall cannot be initial"));
        }
        if self.is_terminal_state(state) {
            return Err(Error::marking(state, "a terminal state cannot be initial"));
        }
        self.initial.insert(*state);
        Ok(())
    }

    fn is_initial_state(&self, state: &GridState) -> bool {
        self.initial.contains(state)
    }

    fn initial_states(&self) -> Vec<GridState> {
        self.initial.iter().copied().collect()
    }

    fn states(&self) -> Vec<GridState> {
        CellIterator::new(self.rows, self.columns).collect()
    }

    fn actions(&self, state: &GridState) -> Result<Vec<A>> {
        self.check_cell(state)?;
        Ok(A::all().to_vec())
    }

    fn state_transition_probability(
        &self,
        from: &GridState,
        action: A,
        to: &GridState,
    ) -> Result<f64> {
        self.check_cell(from)?;
        match self.dynamics.get(&(*from, action)) {
            Some(records) if !records.is_empty() => Ok(normalize(records)
                .iter()
                .filter(|t| t.state == *to)
                .map(|t| t.probability)
                .sum()),
            _ => {
                let default = self.transition_default(from, action);
                Ok(if default.state == *to { 1.0 } else { 0.0 })
            }
        }
    }
}
