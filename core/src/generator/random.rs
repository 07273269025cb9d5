use ndarray::Array2;
use rand::prelude::*;

use crate::*;

/// Purely random placement that keeps the 3×3 window around the starting
/// click free of mines, so the first reveal always flood-fills.
#[derive(Clone, Debug, PartialEq)]
pub struct RandomLayoutGenerator {
    seed: u64,
    start: Coord2,
}

impl RandomLayoutGenerator {
    pub fn new(seed: u64, start: Coord2) -> Self {
        Self { seed, start }
    }
}

impl LayoutGenerator for RandomLayoutGenerator {
    fn generate(self, config: GameConfig) -> MineLayout {
        let mut rng = SmallRng::seed_from_u64(self.seed);
        place_mines(&mut rng, config, self.start)
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
enum Reserved {
    Window,
    StartOnly,
    Nothing,
}

pub(crate) fn place_mines(rng: &mut SmallRng, config: GameConfig, start: Coord2) -> MineLayout {
    let total_cells = config.total_cells();

    // optimize for full boards
    if config.mines >= total_cells {
        if config.mines > total_cells {
            log::warn!(
                "layout already full, generated anyway, requested {} but only fits {}",
                config.mines,
                total_cells
            );
        }
        return MineLayout::from_parts(
            Array2::from_elem(config.size.nd(), true),
            total_cells,
        );
    }

    let reserved = if config.mines + 9 <= total_cells {
        Reserved::Window
    } else if config.mines + 1 <= total_cells {
        log::warn!("cannot keep the start window clear, fallback to a safe start cell");
        Reserved::StartOnly
    } else {
        log::warn!("cannot keep the start cell clear, fallback to fully random");
        Reserved::Nothing
    };

    let mut mines: Array2<bool> = Array2::default(config.size.nd());
    let mut reserved_cells: CellCount = 0;
    match reserved {
        Reserved::Nothing => {}
        Reserved::StartOnly => {
            mines[start.nd()] = true;
            reserved_cells = 1;
        }
        Reserved::Window => {
            mines[start.nd()] = true;
            reserved_cells = 1;
            for coords in mines.iter_neighbors(start) {
                mines[coords.nd()] = true;
                reserved_cells += 1;
            }
        }
    }

    let mut free_cells = total_cells - reserved_cells;
    let mut mines_placed: CellCount = 0;
    {
        let cells = mines.as_slice_mut().expect("layout should be standard");
        while mines_placed < config.mines {
            if free_cells == 0 {
                break;
            }
            let mut place: CellCount = rng.random_range(0..free_cells);
            for (i, cell) in cells.iter_mut().enumerate() {
                let i = i as CellCount;
                if *cell {
                    place += 1;
                }
                if i == place {
                    *cell = true;
                    mines_placed += 1;
                    free_cells -= 1;
                    break;
                }
            }
        }
    }

    // undo the reservation
    match reserved {
        Reserved::Nothing => {}
        Reserved::StartOnly => {
            mines[start.nd()] = false;
        }
        Reserved::Window => {
            mines[start.nd()] = false;
            for coords in mines.iter_neighbors(start) {
                mines[coords.nd()] = false;
            }
        }
    }

    // double check mine count
    let count = mines.iter().filter(|&&cell| cell).count() as CellCount;
    if count != config.mines {
        log::warn!(
            "generated layout count mismatch, actual: {}, requested: {}",
            count,
            config.mines
        );
    }
    MineLayout::from_parts(mines, count)
}
