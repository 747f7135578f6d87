use crate::grid::state::Position;

/// Number of discrete actions available to the agent
pub const NUM_ACTIONS: usize = 4;

/// Direction the agent moves in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Up,
    Down,
    Left,
    Right,
}

impl Action {
    /// All actions in index order
    pub const ALL: [Action; NUM_ACTIONS] = [Action::Up, Action::Down, Action::Left, Action::Right];

    /// Convert a policy output index into an action
    ///
    /// Out-of-range indices map to `None`.
    pub fn from_index(idx: usize) -> Option<Self> {
        Self::ALL.get(idx).copied()
    }

    pub fn index(&self) -> usize {
        match self {
            Action::Up => 0,
            Action::Down => 1,
            Action::Left => 2,
            Action::Right => 3,
        }
    }

    /// Returns the delta (drow, dcol) for moving in this direction
    pub fn delta(&self) -> (i32, i32) {
        match self {
            Action::Up => (-1, 0),
            Action::Down => (1, 0),
            Action::Left => (0, -1),
            Action::Right => (0, 1),
        }
    }

    /// Apply the move, staying in place when it would leave the grid
    pub fn apply(&self, pos: Position, nrows: usize, ncols: usize) -> Position {
        let (dr, dc) = self.delta();
        let row = pos.row as i32 + dr;
        let col = pos.col as i32 + dc;
        if row < 0 || col < 0 || row >= nrows as i32 || col >= ncols as i32 {
            pos
        } else {
            Position::new(row as usize, col as usize)
        }
    }
}
