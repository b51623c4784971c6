//! Finite Markov decision processes, generalized policy iteration and
//! tabular learning agents.

pub mod actions;
pub mod agents;
pub mod config;
pub mod environment;
pub mod error;
pub mod experiment;
pub mod graph;
pub mod gridworld;
pub mod mdp;
pub mod policy;

pub use actions::{Action, FourWayAction, GridAction, KingAction, TwoWayAction};
pub use error::{Error, Result};
pub use gridworld::{GridMdp, GridState};
pub use mdp::{Mdp, Transition};
