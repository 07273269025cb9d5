use core::ops::Index;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::*;

/// The hidden mine bitmap for one game.
///
/// Holds one bit per cell plus the total count. The count is authoritative:
/// perturbation during generation moves mines around but never changes it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MineLayout {
    mines: Array2<bool>,
    count: CellCount,
}

impl MineLayout {
    pub(crate) fn from_parts(mines: Array2<bool>, count: CellCount) -> Self {
        Self { mines, count }
    }

    /// Builds a layout with mines at exactly the given coordinates.
    pub fn from_mine_coords(size: Coord2, coords: &[Coord2]) -> Result<Self> {
        let mut mines: Array2<bool> = Array2::default(size.nd());
        let mut count = 0;
        for &pos in coords {
            if pos.0 >= size.0 || pos.1 >= size.1 {
                return Err(GameError::InvalidCoords);
            }
            if !mines[pos.nd()] {
                mines[pos.nd()] = true;
                count += 1;
            }
        }
        Ok(Self { mines, count })
    }

    pub fn game_config(&self) -> GameConfig {
        GameConfig::new_unchecked(self.size(), self.count)
    }

    pub fn validate_coords(&self, coords: Coord2) -> Result<Coord2> {
        let size = self.size();
        if coords.0 < size.0 && coords.1 < size.1 {
            Ok(coords)
        } else {
            Err(GameError::InvalidCoords)
        }
    }

    pub fn size(&self) -> Coord2 {
        self.mines.bounds()
    }

    pub fn mine_count(&self) -> CellCount {
        self.count
    }

    pub fn total_cells(&self) -> CellCount {
        self.mines.len().try_into().unwrap()
    }

    pub fn safe_cell_count(&self) -> CellCount {
        self.total_cells() - self.count
    }

    pub fn contains_mine(&self, coords: Coord2) -> bool {
        self.mines[coords.nd()]
    }

    pub fn adjacent_mine_count(&self, coords: Coord2) -> u8 {
        self.mines
            .iter_neighbors(coords)
            .filter(|&pos| self[pos])
            .count()
            .try_into()
            .unwrap()
    }

    pub fn iter_neighbors(&self, coords: Coord2) -> NeighborIter {
        self.mines.iter_neighbors(coords)
    }

    /// Moves a single mine bit; the count is kept in balance by the caller
    /// always pairing additions with removals.
    pub(crate) fn set_mine(&mut self, coords: Coord2, mine: bool) {
        let slot = &mut self.mines[coords.nd()];
        if *slot != mine {
            *slot = mine;
            if mine {
                self.count += 1;
            } else {
                self.count -= 1;
            }
        }
    }
}

impl Index<Coord2> for MineLayout {
    type Output = bool;

    fn index(&self, coords: Coord2) -> &Self::Output {
        &self.mines[coords.nd()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_mine_coords_dedupes_and_counts() {
        let layout = MineLayout::from_mine_coords((4, 4), &[(0, 0), (3, 1), (0, 0)]).unwrap();
        assert_eq!(layout.mine_count(), 2);
        assert!(layout.contains_mine((0, 0)));
        assert_eq!(layout.safe_cell_count(), 14);
    }

    #[test]
    fn from_mine_coords_rejects_out_of_range() {
        assert_eq!(
            MineLayout::from_mine_coords((2, 2), &[(2, 0)]),
            Err(GameError::InvalidCoords)
        );
    }

    #[test]
    fn adjacent_counts_clip_at_edges() {
        let layout = MineLayout::from_mine_coords((3, 3), &[(0, 0), (1, 0)]).unwrap();
        assert_eq!(layout.adjacent_mine_count((0, 1)), 2);
        assert_eq!(layout.adjacent_mine_count((2, 2)), 0);
        assert_eq!(layout.adjacent_mine_count((0, 0)), 1);
    }

    #[test]
    fn moving_a_mine_keeps_the_count() {
        let mut layout = MineLayout::from_mine_coords((3, 3), &[(1, 1)]).unwrap();
        layout.set_mine((1, 1), false);
        layout.set_mine((2, 2), true);
        assert_eq!(layout.mine_count(), 1);
        assert!(layout.contains_mine((2, 2)));
    }
}
