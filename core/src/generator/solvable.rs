use ndarray::Array2;
use rand::prelude::*;

use super::perturb::perturb;
use super::random::place_mines;
use crate::*;

pub const DEFAULT_GENERATION_ATTEMPTS: u32 = 1000;

/// Generation strategy that keeps a random layout only if the deductive
/// solver can clear it from the first click without guessing. When deduction
/// stalls the hidden layout is perturbed in place rather than re-rolled, so
/// the safe window and everything already opened stay as they are.
#[derive(Clone, Debug, PartialEq)]
pub struct SolvableLayoutGenerator {
    seed: u64,
    start: Coord2,
    max_attempts: u32,
    closure_cap: usize,
}

impl SolvableLayoutGenerator {
    pub fn new(seed: u64, start: Coord2) -> Self {
        Self {
            seed,
            start,
            max_attempts: DEFAULT_GENERATION_ATTEMPTS,
            closure_cap: DEFAULT_CLOSURE_CAP,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_closure_cap(mut self, closure_cap: usize) -> Self {
        self.closure_cap = closure_cap;
        self
    }
}

/// Oracle the solver talks to while a layout is being validated: it opens
/// squares from the hidden layout and edits that layout when asked. Opening
/// resets the perturbation allowance; a run of fruitless perturbations longer
/// than the board's longer side aborts the layout.
struct GenOracle<'a> {
    layout: &'a mut MineLayout,
    opened: Array2<bool>,
    start: Coord2,
    rng: &'a mut SmallRng,
    perturbs_since_open: u16,
    perturb_limit: u16,
}

impl<'a> GenOracle<'a> {
    fn new(layout: &'a mut MineLayout, start: Coord2, rng: &'a mut SmallRng) -> Self {
        let (w, h) = layout.size();
        Self {
            opened: Array2::default((w, h).nd()),
            layout,
            start,
            rng,
            perturbs_since_open: 0,
            perturb_limit: u16::from(w.max(h)),
        }
    }
}

impl MineOracle for GenOracle<'_> {
    fn open(&mut self, coords: Coord2) -> OpenResult {
        if self.layout.contains_mine(coords) {
            return OpenResult::Mine;
        }
        self.opened[coords.nd()] = true;
        self.perturbs_since_open = 0;
        OpenResult::Count(self.layout.adjacent_mine_count(coords))
    }

    fn request_perturbation(
        &mut self,
        board: &mut SolveBoard,
        store: &mut ConstraintStore,
    ) -> Option<ChangeList> {
        self.perturbs_since_open += 1;
        if self.perturbs_since_open > self.perturb_limit {
            log::debug!("layout abandoned: {} perturbations without an open", self.perturb_limit);
            return None;
        }
        perturb(self.layout, &self.opened, self.start, self.rng, board, store)
    }
}

impl LayoutGenerator for SolvableLayoutGenerator {
    fn generate(self, config: GameConfig) -> MineLayout {
        let mut rng = SmallRng::seed_from_u64(self.seed);

        for attempt in 0..self.max_attempts {
            let mut layout = place_mines(&mut rng, config, self.start);
            let total_mines = layout.mine_count();
            let mut previous: Option<u32> = None;

            loop {
                let mut board = SolveBoard::new(config.size);
                let mut solver = Solver::with_closure_cap(self.closure_cap);
                let mut oracle = GenOracle::new(&mut layout, self.start, &mut rng);
                match oracle.open(self.start) {
                    OpenResult::Count(value) => board.set(self.start, Cell::Revealed(value)),
                    // only reachable when the config was too dense to reserve
                    // the window; hand the layout back unvalidated
                    OpenResult::Mine => {
                        drop(oracle);
                        return layout;
                    }
                }
                let outcome = solver.solve(&mut board, total_mines, &mut oracle);
                drop(oracle);

                match outcome {
                    // a zero-perturbation run IS the reference solve: the
                    // layout is certified and can be handed out
                    SolveOutcome::Solved { perturbations: 0 } => {
                        log::debug!("solvable layout found on attempt {}", attempt + 1);
                        return layout;
                    }
                    SolveOutcome::Stalled => break,
                    // solved with help: the mutated layout must re-validate
                    // from scratch, and a line that stops improving is dead
                    SolveOutcome::Solved { perturbations } => match previous {
                        Some(best) if perturbations >= best => break,
                        _ => previous = Some(perturbations),
                    },
                }
            }
        }

        log::warn!(
            "no solvable layout within {} attempts, returning an unvalidated one",
            self.max_attempts
        );
        place_mines(&mut rng, config, self.start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn beginner_boards_validate_quickly() {
        let config = GameConfig::new((9, 9), 10);
        let layout = SolvableLayoutGenerator::new(42, (4, 4)).generate(config);

        assert_eq!(layout.mine_count(), 10);
        assert!(check_solvable(&layout, (4, 4)).is_clean());
    }

    #[test]
    fn generation_is_deterministic() {
        let config = GameConfig::new((16, 16), 40);
        let a = SolvableLayoutGenerator::new(7, (8, 8)).generate(config);
        let b = SolvableLayoutGenerator::new(7, (8, 8)).generate(config);
        assert_eq!(a, b);
    }

    #[test]
    fn dense_boards_still_terminate() {
        // Density ~0.44; validation regularly needs the perturber here.
        let config = GameConfig::new((8, 8), 28);
        for seed in 0..4 {
            let layout = SolvableLayoutGenerator::new(seed, (4, 4))
                .with_max_attempts(50)
                .generate(config);
            assert_eq!(layout.mine_count(), 28);
        }
    }

    #[test]
    fn zero_mine_configs_solve_trivially() {
        // 3×3 clamps any requested count to zero; the empty layout must
        // validate on the first attempt.
        let config = GameConfig::new((3, 3), 1);
        assert_eq!(config.mines, 0);
        let layout = SolvableLayoutGenerator::new(0, (0, 0)).generate(config);
        assert_eq!(layout.mine_count(), 0);
        assert!(check_solvable(&layout, (0, 0)).is_clean());
    }
}
