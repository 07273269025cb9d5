//! Deductive solving over 3×3 window constraints.
//!
//! One session walks two work-lists: squares that entered a known state feed
//! fresh constraints and refine the ones covering them, and queued constraints
//! fire the saturation and pairwise wing rules. When both run dry the global
//! mine count closes the remainder, or the oracle is asked to perturb the
//! hidden layout.

use alloc::collections::VecDeque;
use alloc::vec::Vec;

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::mask;
use crate::*;

pub use store::{Constraint, ConstraintStore};

mod store;

/// How far the disjoint-union closure will search by default; stores holding
/// more constraints skip the closure entirely.
pub const DEFAULT_CLOSURE_CAP: usize = 10;

/// Result of asking the hidden layout about one square.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OpenResult {
    Count(u8),
    Mine,
}

/// One mine moved during a perturbation: `delta` +1 added, −1 removed.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutChange {
    pub coords: Coord2,
    pub delta: i8,
}

pub type ChangeList = SmallVec<[LayoutChange; 8]>;

/// The hidden-layout context the solver opens squares through. The generation
/// context also edits the layout on request; [`LayoutOracle`] never does,
/// which makes it the reference solvability check.
pub trait MineOracle {
    fn open(&mut self, coords: Coord2) -> OpenResult;

    fn request_perturbation(
        &mut self,
        board: &mut SolveBoard,
        store: &mut ConstraintStore,
    ) -> Option<ChangeList>;
}

/// Read-only oracle over a fixed layout.
pub struct LayoutOracle<'a> {
    layout: &'a MineLayout,
}

impl<'a> LayoutOracle<'a> {
    pub fn new(layout: &'a MineLayout) -> Self {
        Self { layout }
    }
}

impl MineOracle for LayoutOracle<'_> {
    fn open(&mut self, coords: Coord2) -> OpenResult {
        if self.layout.contains_mine(coords) {
            OpenResult::Mine
        } else {
            OpenResult::Count(self.layout.adjacent_mine_count(coords))
        }
    }

    fn request_perturbation(
        &mut self,
        _board: &mut SolveBoard,
        _store: &mut ConstraintStore,
    ) -> Option<ChangeList> {
        None
    }
}

/// The solver-facing board: the visible grid plus running counters over it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SolveBoard {
    cells: Array2<Cell>,
    hidden: CellCount,
    flagged: CellCount,
}

impl SolveBoard {
    pub fn new(size: Coord2) -> Self {
        Self {
            cells: Array2::default(size.nd()),
            hidden: area(size.0, size.1),
            flagged: 0,
        }
    }

    pub fn size(&self) -> Coord2 {
        self.cells.bounds()
    }

    pub fn get(&self, coords: Coord2) -> Cell {
        self.cells[coords.nd()]
    }

    pub fn set(&mut self, coords: Coord2, cell: Cell) {
        let slot = &mut self.cells[coords.nd()];
        let old = *slot;
        if old == cell {
            return;
        }
        *slot = cell;
        match old {
            Cell::Hidden => self.hidden -= 1,
            Cell::Flagged => self.flagged -= 1,
            _ => {}
        }
        match cell {
            Cell::Hidden => self.hidden += 1,
            Cell::Flagged => self.flagged += 1,
            _ => {}
        }
    }

    pub fn hidden_count(&self) -> CellCount {
        self.hidden
    }

    pub fn flagged_count(&self) -> CellCount {
        self.flagged
    }

    pub fn iter_neighbors(&self, coords: Coord2) -> NeighborIter {
        self.cells.iter_neighbors(coords)
    }

    pub fn hidden_cells(&self) -> impl Iterator<Item = Coord2> + '_ {
        let (w, h) = self.size();
        (0..w)
            .flat_map(move |x| (0..h).map(move |y| (x, y)))
            .filter(move |&coords| self.get(coords).is_hidden())
    }
}

/// Result of one solver session.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolveOutcome {
    /// Every non-mine square was opened; `perturbations` counts the layout
    /// edits the oracle made along the way (0 = untouched layout).
    Solved { perturbations: u32 },
    /// No rule fires and no perturbation is available.
    Stalled,
}

impl SolveOutcome {
    pub const fn is_clean(self) -> bool {
        matches!(self, Self::Solved { perturbations: 0 })
    }
}

enum Step {
    Done,
    Progress,
    Stuck,
}

#[derive(Debug)]
pub struct Solver {
    store: ConstraintStore,
    squares: VecDeque<Coord2>,
    closure_cap: usize,
    perturbations: u32,
}

impl Default for Solver {
    fn default() -> Self {
        Self::new()
    }
}

impl Solver {
    pub fn new() -> Self {
        Self::with_closure_cap(DEFAULT_CLOSURE_CAP)
    }

    pub fn with_closure_cap(closure_cap: usize) -> Self {
        Self {
            store: ConstraintStore::new(),
            squares: VecDeque::new(),
            closure_cap,
            perturbations: 0,
        }
    }

    /// Runs one session to completion. Constraints never outlive a session;
    /// the board keeps whatever the session deduced.
    pub fn solve(
        &mut self,
        board: &mut SolveBoard,
        total_mines: CellCount,
        oracle: &mut dyn MineOracle,
    ) -> SolveOutcome {
        self.store.clear();
        self.squares.clear();
        self.perturbations = 0;

        let (w, h) = board.size();
        for x in 0..w {
            for y in 0..h {
                if !board.get((x, y)).is_hidden() {
                    self.squares.push_back((x, y));
                }
            }
        }

        loop {
            if let Some(coords) = self.squares.pop_front() {
                self.drain_square(board, coords);
                continue;
            }
            if let Some(slot) = self.store.pop_work() {
                self.process_constraint(board, oracle, slot);
                continue;
            }
            match self.global_step(board, total_mines, oracle) {
                Step::Done => {
                    return SolveOutcome::Solved {
                        perturbations: self.perturbations,
                    };
                }
                Step::Progress => {}
                Step::Stuck => match oracle.request_perturbation(board, &mut self.store) {
                    Some(changes) => {
                        self.perturbations += 1;
                        log::debug!(
                            "perturbation #{} touched {} squares",
                            self.perturbations,
                            changes.len()
                        );
                        self.absorb_changes(&changes);
                    }
                    None => return SolveOutcome::Stalled,
                },
            }
        }
    }

    /// A square entered a known state: derive a constraint from its number
    /// and strip it out of every constraint that still covers it.
    fn drain_square(&mut self, board: &SolveBoard, coords: Coord2) {
        let (x, y) = (coords.0 as i16, coords.1 as i16);
        let cell = board.get(coords);
        let flagged = cell.is_flagged();

        if let Cell::Revealed(value) = cell {
            let mut neighbor_mask = 0u16;
            let mut flagged_neighbors = 0u8;
            for pos in board.iter_neighbors(coords) {
                match board.get(pos) {
                    Cell::Hidden => {
                        neighbor_mask |=
                            mask::bit_at(pos.0 as i16 - (x - 1), pos.1 as i16 - (y - 1));
                    }
                    Cell::Flagged => flagged_neighbors += 1,
                    _ => {}
                }
            }
            debug_assert!(flagged_neighbors <= value);
            self.store.add(
                x - 1,
                y - 1,
                neighbor_mask,
                value.saturating_sub(flagged_neighbors),
            );
        } else if !flagged {
            // still hidden: a perturbation re-enqueued it without opening
            return;
        }

        for slot in self.store.containing_cell(coords) {
            let c = *self.store.get(slot);
            let bit = mask::align(1, x - c.x, y - c.y);
            debug_assert_ne!(bit, 0);
            let mut mines = c.mines;
            if flagged {
                debug_assert!(mines > 0);
                mines = mines.saturating_sub(1);
            }
            self.store.remove(slot);
            self.store.add(c.x, c.y, c.mask & !bit, mines);
        }
    }

    fn process_constraint(
        &mut self,
        board: &mut SolveBoard,
        oracle: &mut dyn MineOracle,
        slot: u32,
    ) {
        let s = *self.store.get(slot);

        if s.mines == 0 || s.mines == s.cell_count() {
            let cells: SmallVec<[Coord2; 9]> = s.cells().collect();
            if s.mines == 0 {
                for pos in cells {
                    self.open_square(board, oracle, pos);
                }
            } else {
                for pos in cells {
                    self.flag_square(board, pos);
                }
            }
            return;
        }

        for other in self.store.overlapping_with(s.x, s.y, s.mask) {
            if other == slot {
                continue;
            }
            let o = *self.store.get(other);
            let o_in_s = mask::align(o.mask, o.x - s.x, o.y - s.y);
            let s_in_o = mask::align(s.mask, s.x - o.x, s.y - o.y);
            let wing_s = s.mask & !o_in_s;
            let wing_o = o.mask & !s_in_o;
            let count_s = wing_s.count_ones() as i16;
            let count_o = wing_o.count_ones() as i16;
            let diff = s.mines as i16 - o.mines as i16;

            if count_s == diff {
                // s's surplus fills its wing: wing of s all mines, wing of o
                // all safe
                self.apply_wing(board, oracle, &s, wing_s, &o, wing_o);
                return;
            }
            if count_o == -diff {
                self.apply_wing(board, oracle, &o, wing_o, &s, wing_s);
                return;
            }
            if count_s == 0 && count_o != 0 {
                // s ⊆ o: the leftover cells of o hold the leftover mines
                debug_assert!(o.mines >= s.mines);
                self.store.remove(other);
                self.store
                    .add(o.x, o.y, wing_o, o.mines.saturating_sub(s.mines));
                return;
            }
            if count_o == 0 && count_s != 0 {
                debug_assert!(s.mines >= o.mines);
                self.store.remove(slot);
                self.store
                    .add(s.x, s.y, wing_s, s.mines.saturating_sub(o.mines));
                return;
            }
        }
    }

    fn apply_wing(
        &mut self,
        board: &mut SolveBoard,
        oracle: &mut dyn MineOracle,
        mined: &Constraint,
        mined_wing: u16,
        safe: &Constraint,
        safe_wing: u16,
    ) {
        let to_flag: SmallVec<[Coord2; 9]> = mask::cells(mined.x, mined.y, mined_wing).collect();
        let to_open: SmallVec<[Coord2; 9]> = mask::cells(safe.x, safe.y, safe_wing).collect();
        for pos in to_flag {
            self.flag_square(board, pos);
        }
        for pos in to_open {
            self.open_square(board, oracle, pos);
        }
    }

    /// When both work-lists are empty: finish via the total mine count, or
    /// search for a disjoint union of constraints that pins down every square
    /// outside it.
    fn global_step(
        &mut self,
        board: &mut SolveBoard,
        total_mines: CellCount,
        oracle: &mut dyn MineOracle,
    ) -> Step {
        let squares_left = i32::from(board.hidden_count());
        if squares_left == 0 {
            return Step::Done;
        }
        let mines_left = i32::from(total_mines) - i32::from(board.flagged_count());
        debug_assert!(mines_left >= 0);

        if mines_left <= 0 || mines_left == squares_left {
            let targets: Vec<Coord2> = board.hidden_cells().collect();
            for coords in targets {
                if mines_left <= 0 {
                    self.open_square(board, oracle, coords);
                } else {
                    self.flag_square(board, coords);
                }
            }
            return Step::Progress;
        }

        if self.store.len() > self.closure_cap {
            return Step::Stuck;
        }
        let order: Vec<u32> = self.store.live().to_vec();
        let mut chosen = Vec::new();
        match find_disjoint_cover(&self.store, &order, 0, 0, 0, mines_left, squares_left, &mut chosen) {
            Some(outside_mined) => {
                let targets: Vec<Coord2> = board
                    .hidden_cells()
                    .filter(|&coords| {
                        !chosen
                            .iter()
                            .any(|&slot| self.store.get(slot).covers(coords))
                    })
                    .collect();
                debug_assert!(!targets.is_empty());
                for coords in targets {
                    if outside_mined {
                        self.flag_square(board, coords);
                    } else {
                        self.open_square(board, oracle, coords);
                    }
                }
                Step::Progress
            }
            None => Step::Stuck,
        }
    }

    fn open_square(&mut self, board: &mut SolveBoard, oracle: &mut dyn MineOracle, coords: Coord2) {
        if !board.get(coords).is_hidden() {
            return;
        }
        match oracle.open(coords) {
            OpenResult::Count(value) => {
                board.set(coords, Cell::Revealed(value));
                log::trace!("opened {:?} showing {}", coords, value);
            }
            OpenResult::Mine => {
                debug_assert!(false, "deduced-safe square {coords:?} holds a mine");
                log::error!("deduced-safe square {:?} holds a mine", coords);
                board.set(coords, Cell::Flagged);
            }
        }
        self.squares.push_back(coords);
    }

    fn flag_square(&mut self, board: &mut SolveBoard, coords: Coord2) {
        if !board.get(coords).is_hidden() {
            return;
        }
        board.set(coords, Cell::Flagged);
        log::trace!("flagged {:?}", coords);
        self.squares.push_back(coords);
    }

    /// Folds a perturbation's change list back into the session: removed
    /// mines may now carry a number worth a fresh constraint, and every
    /// constraint covering a changed square shifts its count by the delta.
    fn absorb_changes(&mut self, changes: &ChangeList) {
        for change in changes {
            if change.delta < 0 {
                self.squares.push_back(change.coords);
            }
            for slot in self.store.containing_cell(change.coords) {
                self.store.adjust_mines(slot, change.delta);
                self.store.enqueue(slot);
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn find_disjoint_cover(
    store: &ConstraintStore,
    order: &[u32],
    start: usize,
    sum_mines: i32,
    sum_cells: i32,
    mines_left: i32,
    squares_left: i32,
    chosen: &mut Vec<u32>,
) -> Option<bool> {
    if !chosen.is_empty() {
        let outside_cells = squares_left - sum_cells;
        let outside_mines = mines_left - sum_mines;
        debug_assert!(outside_cells >= 0 && outside_mines >= 0);
        if outside_cells > 0 {
            if outside_mines == 0 {
                return Some(false);
            }
            if outside_mines == outside_cells {
                return Some(true);
            }
        }
    }
    for i in start..order.len() {
        let cand = store.get(order[i]);
        if chosen
            .iter()
            .any(|&slot| constraints_overlap(store.get(slot), cand))
        {
            continue;
        }
        chosen.push(order[i]);
        let found = find_disjoint_cover(
            store,
            order,
            i + 1,
            sum_mines + i32::from(cand.mines),
            sum_cells + cand.mask.count_ones() as i32,
            mines_left,
            squares_left,
            chosen,
        );
        if found.is_some() {
            return found;
        }
        chosen.pop();
    }
    None
}

fn constraints_overlap(a: &Constraint, b: &Constraint) -> bool {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    dx.abs() < 3 && dy.abs() < 3 && a.mask & mask::align(b.mask, dx, dy) != 0
}

/// Reference solvability check: can a perfect logical player clear `layout`
/// starting from `start` alone, without ever guessing?
pub fn check_solvable(layout: &MineLayout, start: Coord2) -> SolveOutcome {
    if layout.validate_coords(start).is_err() || layout.contains_mine(start) {
        return SolveOutcome::Stalled;
    }
    let mut board = SolveBoard::new(layout.size());
    let mut oracle = LayoutOracle::new(layout);
    if let OpenResult::Count(value) = oracle.open(start) {
        board.set(start, Cell::Revealed(value));
    }
    let mut solver = Solver::new();
    solver.solve(&mut board, layout.mine_count(), &mut oracle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solved_board(layout: &MineLayout, start: Coord2) -> (SolveOutcome, SolveBoard) {
        let mut board = SolveBoard::new(layout.size());
        let mut oracle = LayoutOracle::new(layout);
        if let OpenResult::Count(value) = oracle.open(start) {
            board.set(start, Cell::Revealed(value));
        }
        let mut solver = Solver::new();
        let outcome = solver.solve(&mut board, layout.mine_count(), &mut oracle);
        (outcome, board)
    }

    #[test]
    fn saturation_chain_clears_a_strip() {
        let layout = MineLayout::from_mine_coords((3, 1), &[(0, 0)]).unwrap();
        let (outcome, board) = solved_board(&layout, (2, 0));

        assert!(outcome.is_clean());
        assert_eq!(board.get((2, 0)), Cell::Revealed(0));
        assert_eq!(board.get((1, 0)), Cell::Revealed(1));
        assert_eq!(board.get((0, 0)), Cell::Flagged);
        assert_eq!(board.hidden_count(), 0);
    }

    #[test]
    fn two_candidates_one_mine_stalls() {
        // A 3×2 with the mine in one of two symmetric corner cells cannot be
        // decided without guessing.
        let layout = MineLayout::from_mine_coords((3, 2), &[(2, 1)]).unwrap();
        assert_eq!(check_solvable(&layout, (0, 0)), SolveOutcome::Stalled);
    }

    #[test]
    fn starting_on_a_mine_stalls() {
        let layout = MineLayout::from_mine_coords((3, 3), &[(1, 1)]).unwrap();
        assert_eq!(check_solvable(&layout, (1, 1)), SolveOutcome::Stalled);
    }

    #[test]
    fn wing_rule_flags_the_surplus_cell() {
        // {a, b} holds one mine and {a, b, c} holds two: c must be a mine.
        let layout = MineLayout::from_mine_coords((4, 1), &[(0, 0), (2, 0)]).unwrap();
        let mut board = SolveBoard::new((4, 1));
        let mut oracle = LayoutOracle::new(&layout);
        let mut solver = Solver::new();

        solver.store.add(0, 0, 0b011, 1).unwrap();
        let wide = solver.store.add(0, 0, 0b111, 2).unwrap();
        solver.process_constraint(&mut board, &mut oracle, wide);

        assert_eq!(board.get((2, 0)), Cell::Flagged);
    }

    #[test]
    fn equal_count_subset_opens_the_difference() {
        // {a, b}: 1 inside {a, b, c}: 1 — the leftover cell c is safe.
        let layout = MineLayout::from_mine_coords((5, 1), &[]).unwrap();
        let mut board = SolveBoard::new((5, 1));
        let mut oracle = LayoutOracle::new(&layout);
        let mut solver = Solver::new();

        let inner = solver.store.add(0, 0, 0b011, 1).unwrap();
        solver.store.add(0, 0, 0b111, 1).unwrap();
        solver.process_constraint(&mut board, &mut oracle, inner);

        assert_eq!(board.get((2, 0)), Cell::Revealed(0));
    }

    #[test]
    fn subset_rule_refines_the_wider_constraint() {
        // {a, b}: 1 inside the square {a, b, c, d}: 2 leaves {c, d}: 1,
        // with nothing decided on the board yet.
        let layout = MineLayout::from_mine_coords((3, 3), &[]).unwrap();
        let mut board = SolveBoard::new((3, 3));
        let mut oracle = LayoutOracle::new(&layout);
        let mut solver = Solver::new();

        let inner = solver.store.add(0, 0, 0b000_000_011, 1).unwrap();
        solver.store.add(0, 0, 0b000_011_011, 2).unwrap();
        solver.process_constraint(&mut board, &mut oracle, inner);

        assert_eq!(board.hidden_count(), 9);
        assert_eq!(solver.store.len(), 2);
        let refined = solver.store.containing_cell((0, 1));
        assert_eq!(refined.len(), 1);
        let c = solver.store.get(refined[0]);
        assert_eq!((c.x, c.y, c.mask, c.mines), (0, 1, 0b011, 1));
    }

    #[test]
    fn disjoint_union_closure_opens_the_leftover_cell() {
        // Cells 0..7 in a strip; {0, 2} and {4, 6} each hold one mine, two
        // mines total, so the uncovered cell 3 must be safe.
        let layout = MineLayout::from_mine_coords((7, 1), &[(0, 0), (6, 0)]).unwrap();
        let mut board = SolveBoard::new((7, 1));
        board.set((1, 0), Cell::Revealed(1));
        board.set((5, 0), Cell::Revealed(1));
        let mut oracle = LayoutOracle::new(&layout);
        let mut solver = Solver::new();
        solver.store.add(0, 0, 0b101, 1).unwrap();
        solver.store.add(4, 0, 0b101, 1).unwrap();

        let step = solver.global_step(&mut board, 2, &mut oracle);

        assert!(matches!(step, Step::Progress));
        assert_eq!(board.get((3, 0)), Cell::Revealed(0));
        // The cells inside the union stay undecided.
        assert_eq!(board.get((0, 0)), Cell::Hidden);
        assert_eq!(board.get((4, 0)), Cell::Hidden);
    }

    #[test]
    fn closure_skips_oversized_stores() {
        let layout = MineLayout::from_mine_coords((40, 1), &[(0, 0)]).unwrap();
        let mut board = SolveBoard::new((40, 1));
        let mut oracle = LayoutOracle::new(&layout);
        let mut solver = Solver::with_closure_cap(2);
        solver.store.add(0, 0, 0b101, 1).unwrap();
        solver.store.add(8, 0, 0b101, 1).unwrap();
        solver.store.add(16, 0, 0b101, 1).unwrap();

        assert!(matches!(
            solver.global_step(&mut board, 10, &mut oracle),
            Step::Stuck
        ));
    }

    #[test]
    fn global_count_flags_when_mines_fill_the_remainder() {
        let layout = MineLayout::from_mine_coords((4, 1), &[(0, 0), (1, 0)]).unwrap();
        let mut board = SolveBoard::new((4, 1));
        board.set((2, 0), Cell::Revealed(2));
        board.set((3, 0), Cell::Revealed(0));
        let mut oracle = LayoutOracle::new(&layout);
        let mut solver = Solver::new();

        assert!(matches!(
            solver.global_step(&mut board, 2, &mut oracle),
            Step::Progress
        ));
        assert_eq!(board.get((0, 0)), Cell::Flagged);
        assert_eq!(board.get((1, 0)), Cell::Flagged);
    }

    #[test]
    fn solve_board_counters_track_transitions() {
        let mut board = SolveBoard::new((2, 2));
        assert_eq!(board.hidden_count(), 4);

        board.set((0, 0), Cell::Flagged);
        assert_eq!((board.hidden_count(), board.flagged_count()), (3, 1));

        board.set((0, 0), Cell::Revealed(1));
        assert_eq!((board.hidden_count(), board.flagged_count()), (3, 0));

        board.set((1, 1), Cell::Revealed(0));
        assert_eq!((board.hidden_count(), board.flagged_count()), (2, 0));
    }
}
