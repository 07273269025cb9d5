//! Mine-preserving layout edits that hand the stalled solver new
//! information.
//!
//! One perturbation picks a random stored constraint as the target region and
//! tries to saturate it: either every mine inside moves out, or outside mines
//! move in until the region is full. Both extremes turn the target into a
//! constraint the saturation rule can fire on. A partial swap covers dense
//! boards where neither full move fits.

use alloc::vec::Vec;

use ndarray::Array2;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use smallvec::SmallVec;

use crate::*;

pub(crate) fn perturb(
    layout: &mut MineLayout,
    opened: &Array2<bool>,
    start: Coord2,
    rng: &mut SmallRng,
    board: &mut SolveBoard,
    store: &ConstraintStore,
) -> Option<ChangeList> {
    let target = *store.get(store.pick_random(rng)?);

    // Triage every cell outside the safe window. Hidden squares that border
    // something already opened give the solver the most to chew on; squares
    // the player has already seen are touched only as a last resort.
    let (w, h) = board.size();
    let mut near = Vec::new();
    let mut isolated = Vec::new();
    let mut last_resort = Vec::new();
    for x in 0..w {
        for y in 0..h {
            let coords = (x, y);
            if in_window(start, coords) {
                continue;
            }
            match board.get(coords) {
                Cell::Hidden => {
                    if has_opened_neighbor(opened, coords) {
                        near.push(coords);
                    } else {
                        isolated.push(coords);
                    }
                }
                _ if opened[coords.nd()] => last_resort.push(coords),
                _ => {}
            }
        }
    }
    near.shuffle(rng);
    isolated.shuffle(rng);
    last_resort.shuffle(rng);

    // Capacity survey inside the target's masked region.
    let mut region_full: SmallVec<[Coord2; 9]> = SmallVec::new();
    let mut region_empty: SmallVec<[Coord2; 9]> = SmallVec::new();
    for coords in target.cells() {
        if layout.contains_mine(coords) {
            region_full.push(coords);
        } else {
            region_empty.push(coords);
        }
    }
    let nfull = region_full.len();
    let nempty = region_empty.len();
    debug_assert!(nfull > 0 && nempty > 0, "saturated constraint in the store");

    // Walk the classes best first, collecting swap partners until one side
    // can satisfy the target region.
    let mut to_empty = Vec::new();
    let mut to_fill = Vec::new();
    for &coords in near.iter().chain(&isolated).chain(&last_resort) {
        if target.covers(coords) {
            continue;
        }
        if layout.contains_mine(coords) {
            to_empty.push(coords);
        } else {
            to_fill.push(coords);
        }
        if to_empty.len() == nempty || to_fill.len() == nfull {
            break;
        }
    }

    let mut changes = ChangeList::new();
    if to_fill.len() >= nfull {
        // Relocate every mine inside the region to the outside.
        for &coords in &region_full {
            changes.push(LayoutChange { coords, delta: -1 });
        }
        for &coords in &to_fill[..nfull] {
            changes.push(LayoutChange { coords, delta: 1 });
        }
    } else if to_empty.len() >= nempty {
        // Pull outside mines in until the region is completely full.
        for &coords in &to_empty[..nempty] {
            changes.push(LayoutChange { coords, delta: -1 });
        }
        for &coords in &region_empty {
            changes.push(LayoutChange { coords, delta: 1 });
        }
    } else {
        // Partial swap: as many pairs as both sides can offer.
        region_empty.shuffle(rng);
        let pairs = to_empty.len().min(region_empty.len());
        if pairs == 0 {
            return None;
        }
        for i in 0..pairs {
            changes.push(LayoutChange {
                coords: to_empty[i],
                delta: -1,
            });
            changes.push(LayoutChange {
                coords: region_empty[i],
                delta: 1,
            });
        }
    }

    apply(layout, board, &changes);
    Some(changes)
}

fn has_opened_neighbor(opened: &Array2<bool>, coords: Coord2) -> bool {
    opened
        .iter_neighbors(coords)
        .any(|pos| opened[pos.nd()])
}

/// Commits the changes to the hidden layout, then refreshes every display
/// the moved mines can influence so opened numbers stay truthful.
fn apply(layout: &mut MineLayout, board: &mut SolveBoard, changes: &ChangeList) {
    for change in changes {
        layout.set_mine(change.coords, change.delta > 0);
    }

    for change in changes {
        let coords = change.coords;
        match board.get(coords) {
            Cell::Revealed(_) if layout.contains_mine(coords) => {
                board.set(coords, Cell::Flagged);
            }
            Cell::Flagged if !layout.contains_mine(coords) => {
                board.set(coords, Cell::Revealed(layout.adjacent_mine_count(coords)));
            }
            _ => {}
        }
        for pos in board.iter_neighbors(coords) {
            if board.get(pos).is_revealed() {
                board.set(pos, Cell::Revealed(layout.adjacent_mine_count(pos)));
            }
        }
    }
}
