use alloc::collections::{BTreeSet, VecDeque};
use alloc::vec::Vec;
use core::num::Saturating;
use core::ops::BitOr;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::*;

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum EngineState {
    Ready,
    Active,
    Won,
    Lost,
}

impl EngineState {
    pub const fn is_ready(self) -> bool {
        matches!(self, Self::Ready)
    }

    pub const fn is_finished(self) -> bool {
        matches!(self, Self::Won | Self::Lost)
    }
}

impl Default for EngineState {
    fn default() -> Self {
        Self::Ready
    }
}

/// Outcome of a flag-type action.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum MarkOutcome {
    NoChange,
    Changed,
}

impl MarkOutcome {
    /// Whether this outcome could have caused an update to the game
    pub const fn has_update(self) -> bool {
        matches!(self, Self::Changed)
    }
}

/// Outcome of a reveal-type action.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum RevealOutcome {
    NoChange,
    Revealed,
    HitMine,
    Won,
}

impl RevealOutcome {
    /// Whether this outcome could have caused an update to the game
    pub const fn has_update(self) -> bool {
        !matches!(self, Self::NoChange)
    }
}

/// Used to merge outcomes when multi-opening
impl BitOr for RevealOutcome {
    type Output = RevealOutcome;

    fn bitor(self, rhs: Self) -> Self::Output {
        use RevealOutcome::*;
        match (self, rhs) {
            // hitting a mine has priority
            (HitMine, _) => HitMine,
            (_, HitMine) => HitMine,
            // then winning
            (Won, _) => Won,
            (_, Won) => Won,
            // then plain reveals
            (Revealed, _) => Revealed,
            (_, Revealed) => Revealed,
            (NoChange, NoChange) => NoChange,
        }
    }
}

/// Notification for one externally-visible state change. Events queue up in
/// order and the host drains them after each action; handlers therefore never
/// re-enter the engine mid-move.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum GameEvent {
    Started,
    MinesGenerated,
    CellRevealed { coords: Coord2, value: u8 },
    CellFlagged { coords: Coord2, flagged: bool },
    Won,
    Lost { coords: Coord2 },
}

/// Represents one game from configuration to win or loss.
///
/// The mine layout does not exist until the first reveal: that click becomes
/// the safe window the generator builds around, and with `ensure_solvable`
/// the layout is additionally validated by the deductive solver.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlayEngine {
    config: GameConfig,
    seed: u64,
    ensure_solvable: bool,
    generate_on_reveal: bool,
    layout: Option<MineLayout>,
    board: Array2<Cell>,
    revealed_count: Saturating<CellCount>,
    flagged_count: Saturating<CellCount>,
    state: EngineState,
    triggered_mine: Option<Coord2>,
    events: VecDeque<GameEvent>,
}

impl PlayEngine {
    /// Engine over a pre-built layout; generation is skipped entirely.
    pub fn new(layout: MineLayout) -> Self {
        let config = layout.game_config();
        let mut engine = Self {
            config,
            seed: 0,
            ensure_solvable: false,
            generate_on_reveal: false,
            layout: Some(layout),
            board: Array2::default(config.size.nd()),
            revealed_count: Saturating(0),
            flagged_count: Saturating(0),
            state: Default::default(),
            triggered_mine: None,
            events: VecDeque::new(),
        };
        engine.events.push_back(GameEvent::Started);
        engine.events.push_back(GameEvent::MinesGenerated);
        engine
    }

    /// Fresh game with deferred mine placement.
    pub fn new_game(config: GameConfig, seed: u64, ensure_solvable: bool) -> Self {
        let mut engine = Self {
            config,
            seed,
            ensure_solvable,
            generate_on_reveal: true,
            layout: None,
            board: Array2::default(config.size.nd()),
            revealed_count: Saturating(0),
            flagged_count: Saturating(0),
            state: Default::default(),
            triggered_mine: None,
            events: VecDeque::new(),
        };
        engine.events.push_back(GameEvent::Started);
        engine
    }

    /// Back to a fresh board with the same parameters. A generated game rolls
    /// new mines on the next first click; an explicit layout is kept.
    pub fn reset(&mut self) {
        self.board = Array2::default(self.config.size.nd());
        self.revealed_count = Saturating(0);
        self.flagged_count = Saturating(0);
        self.state = Default::default();
        self.triggered_mine = None;
        self.events.clear();
        if self.generate_on_reveal {
            self.layout = None;
        }
        self.events.push_back(GameEvent::Started);
        if self.layout.is_some() {
            self.events.push_back(GameEvent::MinesGenerated);
        }
    }

    pub fn config(&self) -> GameConfig {
        self.config
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_finished()
    }

    pub fn size(&self) -> Coord2 {
        self.config.size
    }

    pub fn total_mines(&self) -> CellCount {
        self.layout
            .as_ref()
            .map_or(self.config.mines, MineLayout::mine_count)
    }

    /// How many mines have not been flagged yet
    pub fn mines_left(&self) -> isize {
        (self.total_mines() as isize) - (self.flagged_count.0 as isize)
    }

    pub fn flag_count(&self) -> CellCount {
        self.flagged_count.0
    }

    pub fn cell_at(&self, coords: Coord2) -> Cell {
        self.board[coords.nd()]
    }

    pub fn is_revealed(&self, coords: Coord2) -> bool {
        self.cell_at(coords).is_revealed()
    }

    pub fn is_flagged(&self, coords: Coord2) -> bool {
        self.cell_at(coords).is_flagged()
    }

    pub fn is_hidden(&self, coords: Coord2) -> bool {
        self.cell_at(coords).is_hidden()
    }

    pub fn has_mine_at(&self, coords: Coord2) -> bool {
        self.layout
            .as_ref()
            .is_some_and(|layout| layout.contains_mine(coords))
    }

    pub fn mine_layout(&self) -> Option<&MineLayout> {
        self.layout.as_ref()
    }

    pub fn triggered_mine(&self) -> Option<Coord2> {
        self.triggered_mine
    }

    /// Drains the pending notifications in the order they were produced.
    pub fn take_events(&mut self) -> Vec<GameEvent> {
        self.events.drain(..).collect()
    }

    pub fn can_interact_at(&self, coords: Coord2) -> bool {
        use Cell::*;

        if self.state.is_finished() || self.validate_coords(coords).is_err() {
            return false;
        }

        match self.cell_at(coords) {
            Hidden | Flagged => true,
            Revealed(count) if count == 0 => false,
            Revealed(count) => {
                let mut adjacent_flag_count = 0;
                for pos in self.board.iter_neighbors(coords) {
                    match self.board[pos.nd()] {
                        Flagged => adjacent_flag_count += 1,
                        Revealed(_) => continue,
                        _ => return true,
                    }
                }
                adjacent_flag_count != count
            }
            _ => false,
        }
    }

    pub fn can_chord_reveal_at(&self, coords: Coord2) -> bool {
        if self.state.is_finished() || self.validate_coords(coords).is_err() {
            return false;
        }
        if let Cell::Revealed(count) = self.cell_at(coords) {
            count == self.count_flagged_neighbors(coords)
        } else {
            false
        }
    }

    /// Opens a hidden square. The first reveal of a game triggers mine
    /// generation with this square as the safe click, so it always lands on
    /// a zero and flood-fills.
    pub fn reveal(&mut self, coords: Coord2) -> RevealOutcome {
        let Ok(coords) = self.validate_coords(coords) else {
            return RevealOutcome::NoChange;
        };
        if self.check_not_finished().is_err() || !self.cell_at(coords).is_hidden() {
            return RevealOutcome::NoChange;
        }
        self.ensure_layout(coords);
        self.reveal_single_cell(coords)
    }

    /// Cycles `Hidden` ⇄ `Flagged` on a not-yet-opened square.
    pub fn toggle_flag(&mut self, coords: Coord2) -> MarkOutcome {
        use Cell::*;

        let Ok(coords) = self.validate_coords(coords) else {
            return MarkOutcome::NoChange;
        };
        if self.check_not_finished().is_err() {
            return MarkOutcome::NoChange;
        }

        match self.board[coords.nd()] {
            Hidden => {
                self.board[coords.nd()] = Flagged;
                self.flagged_count += 1;
                self.events.push_back(GameEvent::CellFlagged {
                    coords,
                    flagged: true,
                });
                MarkOutcome::Changed
            }
            Flagged => {
                self.board[coords.nd()] = Hidden;
                self.flagged_count -= 1;
                self.events.push_back(GameEvent::CellFlagged {
                    coords,
                    flagged: false,
                });
                MarkOutcome::Changed
            }
            _ => MarkOutcome::NoChange,
        }
    }

    /// Opens every unflagged neighbor of a number whose flag count matches.
    pub fn chord_reveal(&mut self, coords: Coord2) -> RevealOutcome {
        use RevealOutcome::*;

        let Ok(coords) = self.validate_coords(coords) else {
            return NoChange;
        };
        if self.check_not_finished().is_err() {
            return NoChange;
        }
        let Cell::Revealed(count) = self.cell_at(coords) else {
            return NoChange;
        };
        if count != self.count_flagged_neighbors(coords) {
            return NoChange;
        }

        let neighbors: Vec<Coord2> = self.board.iter_neighbors(coords).collect();
        neighbors
            .into_iter()
            .map(|neighbor| {
                if self.cell_at(neighbor).is_hidden() {
                    self.reveal_single_cell(neighbor)
                } else {
                    NoChange
                }
            })
            .reduce(BitOr::bitor)
            .unwrap_or(NoChange)
    }

    /// Flags every unrevealed neighbor of a number when they are exactly as
    /// many as the number demands.
    pub fn chord_flag(&mut self, coords: Coord2) -> MarkOutcome {
        use MarkOutcome::*;

        let Ok(coords) = self.validate_coords(coords) else {
            return NoChange;
        };
        if self.check_not_finished().is_err() {
            return NoChange;
        }
        let Cell::Revealed(count) = self.cell_at(coords) else {
            return NoChange;
        };
        if count != self.count_unrevealed_neighbors(coords) {
            return NoChange;
        }

        let neighbors: Vec<Coord2> = self.board.iter_neighbors(coords).collect();
        let mut updated = false;
        for pos in neighbors {
            if self.board[pos.nd()].is_hidden() {
                self.board[pos.nd()] = Cell::Flagged;
                self.flagged_count += 1;
                self.events.push_back(GameEvent::CellFlagged {
                    coords: pos,
                    flagged: true,
                });
                updated = true;
            }
        }

        if updated { Changed } else { NoChange }
    }

    fn validate_coords(&self, coords: Coord2) -> Result<Coord2> {
        if coords.0 < self.config.size.0 && coords.1 < self.config.size.1 {
            Ok(coords)
        } else {
            Err(GameError::InvalidCoords)
        }
    }

    fn check_not_finished(&self) -> Result<()> {
        if self.state.is_finished() {
            Err(GameError::AlreadyEnded)
        } else {
            Ok(())
        }
    }

    fn ensure_layout(&mut self, first_click: Coord2) {
        if self.layout.is_some() {
            return;
        }
        log::debug!(
            "generating mines for {:?}, first click {:?}, solvable: {}",
            self.config.size,
            first_click,
            self.ensure_solvable
        );
        let layout = if self.ensure_solvable {
            SolvableLayoutGenerator::new(self.seed, first_click).generate(self.config)
        } else {
            RandomLayoutGenerator::new(self.seed, first_click).generate(self.config)
        };
        self.layout = Some(layout);
        self.events.push_back(GameEvent::MinesGenerated);
    }

    /// Opens a single square and flood-fills from zeros.
    fn reveal_single_cell(&mut self, coords: Coord2) -> RevealOutcome {
        use Cell::*;

        let layout = self.layout.as_ref().expect("revealing without a layout");
        let cell = self.board[coords.nd()];
        let has_mine = layout.contains_mine(coords);

        match (cell, has_mine) {
            (Hidden, true) => {
                self.board[coords.nd()] = Exploded;
                self.triggered_mine = Some(coords);
                self.finish_game(false, coords);
                RevealOutcome::HitMine
            }
            (Hidden, false) => {
                let value = layout.adjacent_mine_count(coords);
                self.board[coords.nd()] = Revealed(value);
                self.revealed_count += 1;
                self.events.push_back(GameEvent::CellRevealed { coords, value });
                log::debug!("revealed {:?}, adjacent mines: {}", coords, value);

                if value == 0 {
                    let mut visited = BTreeSet::from([coords]);
                    let mut to_visit: VecDeque<_> = self
                        .board
                        .iter_neighbors(coords)
                        .filter(|&pos| self.board[pos.nd()].is_hidden())
                        .collect();

                    while let Some(visit) = to_visit.pop_front() {
                        if !visited.insert(visit) {
                            continue;
                        }

                        // flagged or already-open squares block the fill
                        if !self.board[visit.nd()].is_hidden() {
                            continue;
                        }

                        let visit_value = layout.adjacent_mine_count(visit);
                        self.board[visit.nd()] = Revealed(visit_value);
                        self.revealed_count += 1;
                        self.events.push_back(GameEvent::CellRevealed {
                            coords: visit,
                            value: visit_value,
                        });
                        log::trace!("flood revealed {:?}, adjacent mines: {}", visit, visit_value);

                        if visit_value == 0 {
                            to_visit.extend(
                                self.board
                                    .iter_neighbors(visit)
                                    .filter(|&pos| self.board[pos.nd()].is_hidden())
                                    .filter(|pos| !visited.contains(pos)),
                            );
                        }
                    }
                }

                if self.revealed_count == Saturating(layout.safe_cell_count()) {
                    self.finish_game(true, coords);
                    RevealOutcome::Won
                } else {
                    self.mark_started();
                    RevealOutcome::Revealed
                }
            }
            _ => RevealOutcome::NoChange,
        }
    }

    fn mark_started(&mut self) {
        if matches!(self.state, EngineState::Ready) {
            self.state = EngineState::Active;
        }
    }

    fn finish_game(&mut self, won: bool, trigger: Coord2) {
        if self.state.is_finished() {
            return;
        }
        self.state = if won {
            EngineState::Won
        } else {
            EngineState::Lost
        };
        if won {
            self.triggered_mine = None;
        }
        self.settle_board(won);
        self.events.push_back(if won {
            GameEvent::Won
        } else {
            GameEvent::Lost { coords: trigger }
        });
    }

    /// After a win every remaining mine is auto-flagged; after a loss mines
    /// and wrong flags are exposed.
    fn settle_board(&mut self, won: bool) {
        use Cell::*;

        let Some(layout) = self.layout.as_ref() else {
            return;
        };
        let (x_end, y_end) = layout.size();
        for x in 0..x_end {
            for y in 0..y_end {
                let coords = (x, y);
                let cell = self.board[coords.nd()];
                if layout.contains_mine(coords) {
                    if cell == Hidden {
                        if won {
                            self.board[coords.nd()] = Flagged;
                            self.flagged_count += 1;
                            self.events.push_back(GameEvent::CellFlagged {
                                coords,
                                flagged: true,
                            });
                        } else {
                            self.board[coords.nd()] = Mine;
                        }
                    }
                } else if cell == Flagged {
                    self.board[coords.nd()] = IncorrectFlag;
                }
            }
        }
    }

    fn count_flagged_neighbors(&self, coords: Coord2) -> u8 {
        self.board
            .iter_neighbors(coords)
            .filter(|&pos| self.board[pos.nd()].is_flagged())
            .count()
            .try_into()
            .unwrap()
    }

    fn count_unrevealed_neighbors(&self, coords: Coord2) -> u8 {
        self.board
            .iter_neighbors(coords)
            .filter(|&pos| self.board[pos.nd()].is_unrevealed())
            .count()
            .try_into()
            .unwrap()
    }
}
