use std::fmt;
use std::hash::Hash;

use crate::error::{Error, Result};

/// A finite, statically enumerable action set.
///
/// Every catalog maps its actions onto the dense id range `[0, count())`
/// in the order returned by `all()`.
pub trait Action: Copy + Eq + Ord + Hash + fmt::Debug + fmt::Display + 'static {
    /// All actions of the catalog, ordered by id.
    fn all() -> &'static [Self];

    /// Dense integer id of the action.
    fn id(&self) -> usize;

    fn count() -> usize {
        Self::all().len()
    }

    /// Looks up an action by its id.
    fn from_id(id: usize) -> Result<Self> {
        Self::all().get(id).copied().ok_or_else(|| Error::InvalidAction {
            action: format!("id {id}"),
            reason: format!("catalog has {} actions", Self::count()),
        })
    }
}

/// An action that moves an agent across a grid.
pub trait GridAction: Action {
    /// Row and column displacement of the move.
    fn displacement(&self) -> (isize, isize);

    /// Single character used when printing a policy.
    fn arrow(&self) -> char;
}

/// Von Neumann neighbourhood moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FourWayAction {
    Left,
    Up,
    Right,
    Down,
}

static FOUR_WAY: [FourWayAction; 4] = [
    FourWayAction::Left,
    FourWayAction::Up,
    FourWayAction::Right,
    FourWayAction::Down,
];

impl Action for FourWayAction {
    fn all() -> &'static [Self] {
        &FOUR_WAY
    }

    fn id(&self) -> usize {
        *self as usize
    }
}

impl GridAction for FourWayAction {
    fn displacement(&self) -> (isize, isize) {
        match self {
            FourWayAction::Left => (0, -1),
            FourWayAction::Up => (-1, 0),
            FourWayAction::Right => (0, 1),
            FourWayAction::Down => (1, 0),
        }
    }

    fn arrow(&self) -> char {
        match self {
            FourWayAction::Left => '←',
            FourWayAction::Up => '↑',
            FourWayAction::Right => '→',
            FourWayAction::Down => '↓',
        }
    }
}

impl fmt::Display for FourWayAction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            FourWayAction::Left => "LEFT",
            FourWayAction::Up => "UP",
            FourWayAction::Right => "RIGHT",
            FourWayAction::Down => "DOWN",
        };
        write!(f, "{name}")
    }
}

/// King moves: the von Neumann moves plus the four diagonals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KingAction {
    Left,
    Up,
    Right,
    Down,
    UpLeft,
    UpRight,
    DownRight,
    DownLeft,
}

static KING: [KingAction; 8] = [
    KingAction::Left,
    KingAction::Up,
    KingAction::Right,
    KingAction::Down,
    KingAction::UpLeft,
    KingAction::UpRight,
    KingAction::DownRight,
    KingAction::DownLeft,
];

impl Action for KingAction {
    fn all() -> &'static [Self] {
        &KING
    }

    fn id(&self) -> usize {
        *self as usize
    }
}

impl GridAction for KingAction {
    fn displacement(&self) -> (isize, isize) {
        match self {
            KingAction::Left => (0, -1),
            KingAction::Up => (-1, 0),
            KingAction::Right => (0, 1),
            KingAction::Down => (1, 0),
            KingAction::UpLeft => (-1, -1),
            KingAction::UpRight => (-1, 1),
            KingAction::DownRight => (1, 1),
            KingAction::DownLeft => (1, -1),
        }
    }

    fn arrow(&self) -> char {
        match self {
            KingAction::Left => '←',
            KingAction::Up => '↑',
            KingAction::Right => '→',
            KingAction::Down => '↓',
            KingAction::UpLeft => '↖',
            KingAction::UpRight => '↗',
            KingAction::DownRight => '↘',
            KingAction::DownLeft => '↙',
        }
    }
}

impl fmt::Display for KingAction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            KingAction::Left => "LEFT",
            KingAction::Up => "UP",
            KingAction::Right => "RIGHT",
            KingAction::Down => "DOWN",
            KingAction::UpLeft => "UP_LEFT",
            KingAction::UpRight => "UP_RIGHT",
            KingAction::DownRight => "DOWN_RIGHT",
            KingAction::DownLeft => "DOWN_LEFT",
        };
        write!(f, "{name}")
    }
}

/// Moves along a chain, e.g. the random walk of Sutton & Barto example 6.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TwoWayAction {
    Left,
    Right,
}

static TWO_WAY: [TwoWayAction; 2] = [TwoWayAction::Left, TwoWayAction::Right];

impl Action for TwoWayAction {
    fn all() -> &'static [Self] {
        &TWO_WAY
    }

    fn id(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for TwoWayAction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TwoWayAction::Left => write!(f, "LEFT"),
            TwoWayAction::Right => write!(f, "RIGHT"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn ids_are_dense<A: Action>() {
        for (i, a) in A::all().iter().enumerate() {
            assert_eq!(a.id(), i);
            assert_eq!(A::from_id(i).unwrap(), *a);
        }
    }

    #[test]
    fn catalogs_have_dense_ids() {
        ids_are_dense::<FourWayAction>();
        ids_are_dense::<KingAction>();
        ids_are_dense::<TwoWayAction>();
        assert_eq!(FourWayAction::count(), 4);
        assert_eq!(KingAction::count(), 8);
        assert_eq!(TwoWayAction::count(), 2);
    }

    #[test]
    fn out_of_range_id_is_invalid_action() {
        let err = FourWayAction::from_id(4).unwrap_err();
        assert!(matches!(err, Error::InvalidAction { .. }));
    }

    #[test_case(FourWayAction::Left, "LEFT"; "Left")]
    #[test_case(FourWayAction::Up, "UP"; "Up")]
    #[test_case(FourWayAction::Right, "RIGHT"; "Right")]
    #[test_case(FourWayAction::Down, "DOWN"; "Down")]
    fn four_way_names(action: FourWayAction, name: &str) {
        assert_eq!(action.to_string(), name);
    }

    #[test]
    fn king_moves_cover_the_neighbourhood() {
        let mut moves: Vec<(isize, isize)> =
            KingAction::all().iter().map(|a| a.displacement()).collect();
        moves.sort();
        moves.dedup();
        assert_eq!(moves.len(), 8);
        assert!(!moves.contains(&(0, 0)));
        for (dr, dc) in moves {
            assert!(dr.abs() <= 1 && dc.abs() <= 1);
        }
    }
}
