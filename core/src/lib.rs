#![no_std]

extern crate alloc;

use serde::{Deserialize, Serialize};

pub use cell::*;
pub use engine::*;
pub use error::*;
pub use generator::*;
pub use layout::*;
pub use solver::*;
pub use types::*;

mod cell;
mod engine;
mod error;
mod generator;
mod layout;
mod mask;
mod solver;
mod types;

/// Requested board shape and mine count.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameConfig {
    pub size: Coord2,
    pub mines: CellCount,
}

impl GameConfig {
    pub const fn new_unchecked(size: Coord2, mines: CellCount) -> Self {
        Self { size, mines }
    }

    /// Clamps silently to the legal range. Boards are at least 3×3, and the
    /// 3×3 window around the first click must stay mine-free, which caps the
    /// count at `W·H − 9` — zero on the smallest board.
    pub fn new((size_x, size_y): Coord2, mines: CellCount) -> Self {
        let size_x = size_x.clamp(3, Coord::MAX);
        let size_y = size_y.clamp(3, Coord::MAX);
        let cap = area(size_x, size_y) - 9;
        let mines = if cap == 0 { 0 } else { mines.clamp(1, cap) };
        Self::new_unchecked((size_x, size_y), mines)
    }

    pub const fn total_cells(&self) -> CellCount {
        area(self.size.0, self.size.1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_clamps_to_legal_bounds() {
        assert_eq!(GameConfig::new((1, 2), 5), GameConfig::new_unchecked((3, 3), 0));
        assert_eq!(GameConfig::new((9, 9), 0), GameConfig::new_unchecked((9, 9), 1));
        assert_eq!(
            GameConfig::new((9, 9), 500),
            GameConfig::new_unchecked((9, 9), 72)
        );
        assert_eq!(
            GameConfig::new((30, 16), 99),
            GameConfig::new_unchecked((30, 16), 99)
        );
    }
}
