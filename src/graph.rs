use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Write};

use tracing::debug;

use crate::actions::Action;
use crate::error::{Error, Result};
use crate::mdp::{check_weight, normalize, Mdp, Transition};

/// Weighted edge leaving a vertex.
#[derive(Debug, Clone)]
struct Edge<A> {
    target: usize,
    action: A,
    reward: f64,
    weight: f64,
}

/// MDP over arbitrary states, stored as a directed multigraph.
///
/// Vertices are appended on first sight of a state and never removed.
/// `out_edges[v]` holds every transition leaving vertex `v`.
#[derive(Debug, Clone)]
pub struct GraphMdp<S, A> {
    vertices: Vec<S>,
    index: BTreeMap<S, usize>,
    out_edges: Vec<Vec<Edge<A>>>,
    terminal: BTreeSet<S>,
    initial: BTreeSet<S>,
}

impl<S, A> Default for GraphMdp<S, A> {
    fn default() -> Self {
        GraphMdp {
            vertices: Vec::new(),
            index: BTreeMap::new(),
            out_edges: Vec::new(),
            terminal: BTreeSet::new(),
            initial: BTreeSet::new(),
        }
    }
}

impl<S, A> GraphMdp<S, A>
where
    S: Clone + Ord + fmt::Debug,
    A: Action,
{
    pub fn new() -> GraphMdp<S, A> {
        GraphMdp::default()
    }

    /// Number of registered transitions, terminal self-loops included.
    pub fn edge_count(&self) -> usize {
        self.out_edges.iter().map(Vec::len).sum()
    }

    fn vertex(&self, state: &S) -> Result<usize> {
        self.index
            .get(state)
            .copied()
            .ok_or_else(|| Error::unknown_state(state))
    }

    fn get_or_create_vertex(&mut self, state: &S) -> usize {
        if let Some(&v) = self.index.get(state) {
            return v;
        }
        let v = self.vertices.len();
        self.vertices.push(state.clone());
        self.out_edges.push(Vec::new());
        self.index.insert(state.clone(), v);
        v
    }

    /// Renders the graph in GraphViz DOT format.
    pub fn to_graphviz(&self) -> String {
        let mut dot = String::from("digraph {\n");
        for (v, state) in self.vertices.iter().enumerate() {
            let label = format!("{state:?}").replace('"', "\\\"");
            let _ = writeln!(dot, "    {v} [label=\"{label}\"];");
        }
        for (v, edges) in self.out_edges.iter().enumerate() {
            for e in edges {
                let _ = writeln!(
                    dot,
                    "    {v} -> {} [label=\"{}\", weight=\"{}\"];",
                    e.target, e.action, e.weight
                );
            }
        }
        dot.push_str("}\n");
        dot
    }
}

impl<S, A> Mdp for GraphMdp<S, A>
where
    S: Clone + Ord + fmt::Debug,
    A: Action,
{
    type State = S;
    type Action = A;

    fn transitions(&self, state: &S, action: A) -> Result<Vec<Transition<S>>> {
        let v = self.vertex(state)?;
        let raw: Vec<Transition<S>> = self.out_edges[v]
            .iter()
            .filter(|e| e.action == action)
            .map(|e| Transition::new(self.vertices[e.target].clone(), e.reward, e.weight))
            .collect();
        if raw.is_empty() {
            return Err(Error::InvalidAction {
                action: action.to_string(),
                reason: format!("no transition leaves {state:?} with this action"),
            });
        }
        Ok(normalize(&raw))
    }

    fn add_transition(
        &mut self,
        state: &S,
        action: A,
        next_state: &S,
        reward: f64,
        weight: f64,
    ) -> Result<()> {
        if self.is_terminal_state(state) {
            return Err(Error::InvalidTransitionTarget {
                state: format!("{state:?}"),
            });
        }
        check_weight(weight)?;
        let source = self.get_or_create_vertex(state);
        let target = self.get_or_create_vertex(next_state);
        self.out_edges[source].push(Edge {
            target,
            action,
            reward,
            weight,
        });
        Ok(())
    }

    fn set_terminal_state(&mut self, state: &S, default_reward: Option<f64>) -> Result<()> {
        if self.is_terminal_state(state) {
            return Ok(());
        }
        if self.is_initial_state(state) {
            return Err(Error::marking(state, "an initial state cannot be terminal"));
        }
        let v = self.vertex(state)?;

        self.out_edges[v] = A::all()
            .iter()
            .map(|&action| Edge {
                target: v,
                action,
                reward: 0.0,
                weight: 1.0,
            })
            .collect();

        if let Some(reward) = default_reward {
            let mut rewritten = 0;
            for (source, edges) in self.out_edges.iter_mut().enumerate() {
                if source == v {
                    continue;
                }
                for e in edges.iter_mut().filter(|e| e.target == v) {
                    e.reward = reward;
                    rewritten += 1;
                }
            }
            debug!(?state, reward, rewritten, "rewrote rewards into terminal state");
        }

        self.terminal.insert(state.clone());
        Ok(())
    }

    fn is_terminal_state(&self, state: &S) -> bool {
        self.terminal.contains(state)
    }

    fn terminal_states(&self) -> Vec<S> {
        self.terminal.iter().cloned().collect()
    }

    fn set_initial_state(&mut self, state: &S) -> Result<()> {
        self.vertex(state)?;
        if self.is_terminal_state(state) {
            return Err(Error::marking(state, "a terminal state cannot be initial"));
        }
        self.initial.insert(state.clone());
        Ok(())
    }

    fn is_initial_state(&self, state: &S) -> bool {
        self.initial.contains(state)
    }

    fn initial_states(&self) -> Vec<S> {
        self.initial.iter().cloned().collect()
    }

    fn states(&self) -> Vec<S> {
        self.index.keys().cloned().collect()
    }

    fn actions(&self, state: &S) -> Result<Vec<A>> {
        let v = self.vertex(state)?;
        let actions: BTreeSet<A> = self.out_edges[v].iter().map(|e| e.action).collect();
        Ok(actions.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::TwoWayAction;
    use approx::assert_abs_diff_eq;
    use test_case::test_case;

    type Graph = GraphMdp<String, TwoWayAction>;

    fn s(name: &str) -> String {
        name.to_string()
    }

    fn chain(names: &[&str]) -> Graph {
        let mut g = Graph::new();
        for pair in names.windows(2) {
            g.add_transition(&s(pair[0]), TwoWayAction::Right, &s(pair[1]), 10.0, 1.0)
                .unwrap();
        }
        g
    }

    #[test]
    fn empty_graph_knows_no_states() {
        let g = Graph::new();
        assert!(g.states().is_empty());
        assert!(matches!(
            g.actions(&s("ANY")),
            Err(Error::UnknownState { .. })
        ));
        assert!(matches!(
            g.transitions(&s("ANY"), TwoWayAction::Right),
            Err(Error::UnknownState { .. })
        ));
    }

    #[test]
    fn states_are_an_unordered_set() {
        // Arrange
        let mut g = Graph::new();
        g.add_transition(&s("C"), TwoWayAction::Right, &s("terminal"), 1.0, 1.0)
            .unwrap();
        g.add_transition(&s("A"), TwoWayAction::Right, &s("B"), 0.0, 1.0)
            .unwrap();
        g.add_transition(&s("B"), TwoWayAction::Right, &s("C"), 0.0, 1.0)
            .unwrap();
        g.set_terminal_state(&s("terminal"), None).unwrap();
        // Act
        let states: BTreeSet<String> = g.states().into_iter().collect();
        // Assert
        let expected: BTreeSet<String> = ["A", "B", "C", "terminal"].iter().map(|n| s(n)).collect();
        assert_eq!(states, expected);
    }

    #[test]
    fn terminal_state_self_loops() {
        // Arrange
        let mut g = chain(&["BAD", "A", "B", "C", "D", "E", "GOOD"]);
        let terminal = s("BAD");
        assert!(!g.is_terminal_state(&terminal));
        assert!(matches!(
            g.set_terminal_state(&s("ANY"), Some(0.0)),
            Err(Error::UnknownState { .. })
        ));
        // Act
        g.set_terminal_state(&terminal, Some(-10.0)).unwrap();
        // Assert
        assert!(g.is_terminal_state(&terminal));
        for &a in TwoWayAction::all() {
            let transitions = g.transitions(&terminal, a).unwrap();
            assert_eq!(transitions, vec![Transition::new(terminal.clone(), 0.0, 1.0)]);
        }
        assert!(matches!(
            g.add_transition(&terminal, TwoWayAction::Left, &s("A"), 1.0, 1.0),
            Err(Error::InvalidTransitionTarget { .. })
        ));

        g.set_terminal_state(&s("GOOD"), Some(0.0)).unwrap();
        assert_eq!(g.terminal_states(), vec![s("BAD"), s("GOOD")]);
    }

    #[test]
    fn terminal_default_reward_rewrites_incoming_edges() {
        // Arrange
        let mut g = chain(&["A", "B", "C"]);
        g.add_transition(&s("A"), TwoWayAction::Left, &s("C"), 3.0, 1.0)
            .unwrap();
        // Act
        g.set_terminal_state(&s("C"), Some(-5.0)).unwrap();
        // Assert
        let from_b = g.transitions(&s("B"), TwoWayAction::Right).unwrap();
        assert_eq!(from_b, vec![Transition::new(s("C"), -5.0, 1.0)]);
        let from_a = g.transitions(&s("A"), TwoWayAction::Left).unwrap();
        assert_eq!(from_a, vec![Transition::new(s("C"), -5.0, 1.0)]);
        let untouched = g.transitions(&s("A"), TwoWayAction::Right).unwrap();
        assert_eq!(untouched, vec![Transition::new(s("B"), 10.0, 1.0)]);
        assert_eq!(g.edge_count(), 5);
    }

    #[test]
    fn single_transition() {
        let mut g = Graph::new();
        g.add_transition(&s("A"), TwoWayAction::Right, &s("B"), 0.0, 1.0)
            .unwrap();
        let transitions = g.transitions(&s("A"), TwoWayAction::Right).unwrap();
        assert_eq!(transitions, vec![Transition::new(s("B"), 0.0, 1.0)]);
    }

    #[test]
    fn repeated_transitions_accumulate() {
        // Arrange
        let mut g = Graph::new();
        g.add_transition(&s("A"), TwoWayAction::Right, &s("B"), 10.0, 1.0)
            .unwrap();
        g.add_transition(&s("A"), TwoWayAction::Right, &s("B"), 10.0, 1.0)
            .unwrap();
        // Act
        let transitions = g.transitions(&s("A"), TwoWayAction::Right).unwrap();
        // Assert
        assert_eq!(transitions.len(), 2);
        for t in &transitions {
            assert_eq!(t.state, s("B"));
            assert_abs_diff_eq!(t.reward, 10.0);
            assert_abs_diff_eq!(t.probability, 0.5);
        }
        assert_eq!(g.actions(&s("A")).unwrap(), vec![TwoWayAction::Right]);

        g.add_transition(&s("A"), TwoWayAction::Left, &s("B"), 10.0, 1.0)
            .unwrap();
        assert_eq!(
            g.actions(&s("A")).unwrap(),
            vec![TwoWayAction::Left, TwoWayAction::Right]
        );
        assert!(g.actions(&s("B")).unwrap().is_empty());
    }

    #[test]
    fn missing_action_is_invalid() {
        let g = chain(&["A", "B"]);
        assert!(matches!(
            g.transitions(&s("A"), TwoWayAction::Left),
            Err(Error::InvalidAction { .. })
        ));
    }

    #[test]
    fn transition_probability_sums_matching_outcomes() {
        let mut g = Graph::new();
        g.add_transition(&s("A"), TwoWayAction::Right, &s("A"), 10.0, 3.0)
            .unwrap();
        g.add_transition(&s("A"), TwoWayAction::Right, &s("B"), 10.0, 1.0)
            .unwrap();
        g.add_transition(&s("A"), TwoWayAction::Right, &s("B"), 10.0, 1.0)
            .unwrap();
        let p = g
            .state_transition_probability(&s("A"), TwoWayAction::Right, &s("B"))
            .unwrap();
        assert_abs_diff_eq!(p, 0.4, epsilon = 1e-12);
        let p = g
            .state_transition_probability(&s("A"), TwoWayAction::Right, &s("C"))
            .unwrap();
        assert_eq!(p, 0.0);
    }

    #[test]
    fn expected_reward_is_weighted_average() {
        // Arrange
        let mut g = Graph::new();
        g.add_transition(&s("A"), TwoWayAction::Left, &s("A"), -10.0, 0.25)
            .unwrap();
        g.add_transition(&s("A"), TwoWayAction::Left, &s("B"), 50.0, 0.50)
            .unwrap();
        g.add_transition(&s("A"), TwoWayAction::Left, &s("C"), 5.0, 0.25)
            .unwrap();
        g.add_transition(&s("A"), TwoWayAction::Right, &s("C"), 7.5, 2.0)
            .unwrap();
        // Act
        let stochastic = g.expected_reward(&s("A"), TwoWayAction::Left).unwrap();
        let single = g.expected_reward(&s("A"), TwoWayAction::Right).unwrap();
        // Assert
        assert_abs_diff_eq!(stochastic, -10.0 * 0.25 + 50.0 * 0.5 + 5.0 * 0.25, epsilon = 1e-12);
        assert_eq!(single, 7.5);
    }

    #[test_case(&[1.0], &[1.0]; "Single outcome")]
    #[test_case(&[2.0, 2.0], &[0.5, 0.5]; "Equal weights")]
    #[test_case(&[1.0, 2.0, 5.0], &[0.125, 0.25, 0.625]; "Uneven weights")]
    fn normalization_sums_to_one(weights: &[f64], expected: &[f64]) {
        let mut g = Graph::new();
        for (i, w) in weights.iter().enumerate() {
            g.add_transition(&s("A"), TwoWayAction::Right, &format!("T{i}"), 0.0, *w)
                .unwrap();
        }
        let transitions = g.transitions(&s("A"), TwoWayAction::Right).unwrap();
        let total: f64 = transitions.iter().map(|t| t.probability).sum();
        assert_abs_diff_eq!(total, 1.0, epsilon = 1e-9);
        for (t, p) in transitions.iter().zip(expected) {
            assert_abs_diff_eq!(t.probability, *p, epsilon = 1e-12);
        }
    }

    #[test]
    fn invalid_weight_is_rejected() {
        let mut g = Graph::new();
        assert!(matches!(
            g.add_transition(&s("A"), TwoWayAction::Right, &s("B"), 0.0, 0.0),
            Err(Error::InvalidWeight { .. })
        ));
        assert!(g.states().is_empty());
    }

    #[test]
    fn initial_marking() {
        let mut g = chain(&["A", "B"]);
        g.set_terminal_state(&s("B"), None).unwrap();
        g.set_initial_state(&s("A")).unwrap();
        assert!(g.is_initial_state(&s("A")));
        assert_eq!(g.initial_states(), vec![s("A")]);
        assert!(matches!(
            g.set_initial_state(&s("B")),
            Err(Error::InvalidStateMarking { .. })
        ));
        assert!(matches!(
            g.set_initial_state(&s("Z")),
            Err(Error::UnknownState { .. })
        ));
        assert!(matches!(
            g.set_terminal_state(&s("A"), None),
            Err(Error::InvalidStateMarking { .. })
        ));
        assert!(!g.is_terminal_state(&s("A")));
    }

    #[test]
    fn graphviz_lists_vertices_and_edges() {
        let g = chain(&["A", "B"]);
        let dot = g.to_graphviz();
        assert!(dot.starts_with("digraph {"));
        assert!(dot.contains("0 [label=\"\\\"A\\\"\"];"));
        assert!(dot.contains("0 -> 1 [label=\"RIGHT\", weight=\"1\"];"));
    }
}
