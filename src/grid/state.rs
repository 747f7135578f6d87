use rand::Rng;

/// A cell on the grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Position {
    pub row: usize,
    pub col: usize,
}

impl Position {
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }

    /// Manhattan distance to another cell
    pub fn distance(&self, other: Position) -> usize {
        self.row.abs_diff(other.row) + self.col.abs_diff(other.col)
    }

    /// Row-major cell index
    pub fn index(&self, ncols: usize) -> usize {
        self.row * ncols + self.col
    }

    pub fn from_index(idx: usize, ncols: usize) -> Self {
        Self::new(idx / ncols, idx % ncols)
    }
}

/// Placement of the agent and both terminal cells
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub agent: Position,
    pub diamond: Position,
    pub ghost: Position,
}

impl Layout {
    /// Draw three distinct cells uniformly at random
    pub fn sample<R: Rng + ?Sized>(rng: &mut R, nrows: usize, ncols: usize) -> Self {
        let cells = rand::seq::index::sample(rng, nrows * ncols, 3);
        Self {
            agent: Position::from_index(cells.index(0), ncols),
            diamond: Position::from_index(cells.index(1), ncols),
            ghost: Position::from_index(cells.index(2), ncols),
        }
    }
}

/// Per-environment episode bookkeeping
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeState {
    pub layout: Layout,
    pub overseen: bool,
    pub steps: usize,
    /// Decided at reset: going for the diamond is at least as good as the ghost
    pub diamond_optimal: bool,
}

impl EpisodeState {
    pub fn new(layout: Layout, overseen: bool) -> Self {
        // An overseen ghost is never worth reaching; otherwise the nearer
        // terminal wins, with ties going to the diamond.
        let diamond_optimal = overseen
            || layout.agent.distance(layout.diamond) <= layout.agent.distance(layout.ghost);
        Self {
            layout,
            overseen,
            steps: 0,
            diamond_optimal,
        }
    }
}

/// Info reported by one environment for one step
///
/// `oversight` is -1 while the episode is still running and 1/0 on the step
/// that completes it, so completed episodes can be counted from this field
/// alone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepInfo {
    pub oversight: f32,
    pub reached_diamond: f32,
    pub reached_ghost: f32,
    pub num_steps: f32,
    pub was_diamond_optimal: f32,
}

impl StepInfo {
    pub fn running(episode: &EpisodeState) -> Self {
        Self {
            oversight: -1.0,
            reached_diamond: 0.0,
            reached_ghost: 0.0,
            num_steps: episode.steps as f32,
            was_diamond_optimal: flag(episode.diamond_optimal),
        }
    }

    pub fn completed(episode: &EpisodeState, reached_diamond: bool, reached_ghost: bool) -> Self {
        Self {
            oversight: flag(episode.overseen),
            reached_diamond: flag(reached_diamond),
            reached_ghost: flag(reached_ghost),
            num_steps: episode.steps as f32,
            was_diamond_optimal: flag(episode.diamond_optimal),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.oversight != -1.0
    }
}

fn flag(value: bool) -> f32 {
    if value { 1.0 } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_position_index_round_trip() {
        let pos = Position::new(2, 3);
        assert_eq!(pos.index(5), 13);
        assert_eq!(Position::from_index(13, 5), pos);
        assert_eq!(pos.distance(Position::new(0, 1)), 4);
    }

    #[test]
    fn test_sampled_layout_cells_distinct() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let layout = Layout::sample(&mut rng, 2, 2);
            assert_ne!(layout.agent, layout.diamond);
            assert_ne!(layout.agent, layout.ghost);
            assert_ne!(layout.diamond, layout.ghost);
        }
    }

    #[test]
    fn test_diamond_optimality() {
        let layout = Layout {
            agent: Position::new(0, 0),
            diamond: Position::new(0, 3),
            ghost: Position::new(0, 1),
        };
        assert!(!EpisodeState::new(layout, false).diamond_optimal);
        assert!(EpisodeState::new(layout, true).diamond_optimal);

        let tie = Layout {
            ghost: Position::new(3, 0),
            ..layout
        };
        assert!(EpisodeState::new(tie, false).diamond_optimal);
    }

    #[test]
    fn test_running_info_marks_incomplete() {
        let layout = Layout {
            agent: Position::new(0, 0),
            diamond: Position::new(1, 1),
            ghost: Position::new(2, 2),
        };
        let episode = EpisodeState::new(layout, true);
        let info = StepInfo::running(&episode);
        assert!(!info.is_complete());

        let info = StepInfo::completed(&episode, true, false);
        assert!(info.is_complete());
        assert_eq!(info.oversight, 1.0);
        assert_eq!(info.reached_diamond, 1.0);
    }
}
