use std::collections::VecDeque;
use std::sync::mpsc::Sender;

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::engine::movement::{apply, noop_movements, score_increment};
use crate::engine::{
    compute_move, has_changed, is_game_over, spawn_random_tile, Direction, Grid,
    GridTileMovement, Score, Snapshot, UndoStack, DEFAULT_MAX_UNDO_DEPTH, GRID_SIZE,
};
use crate::error::{Error, Result};
use crate::events::{Event, EventSource};
use crate::store::{GameStore, Persister, UserData};

pub const DEFAULT_INITIAL_TILES: usize = 2;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PresenterConfig {
    /// Number of moves that can be undone before the oldest is forgotten.
    pub max_undo_depth: usize,
    /// Number of tiles placed on the board when a new game starts.
    pub initial_tiles: usize,
}

impl Default for PresenterConfig {
    fn default() -> Self {
        Self {
            max_undo_depth: DEFAULT_MAX_UNDO_DEPTH,
            initial_tiles: DEFAULT_INITIAL_TILES,
        }
    }
}

impl PresenterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_undo_depth == 0 {
            return Err(Error::InvalidConfig(
                "max_undo_depth must be at least 1".into(),
            ));
        }
        if self.initial_tiles == 0 || self.initial_tiles > GRID_SIZE * GRID_SIZE {
            return Err(Error::InvalidConfig(format!(
                "initial_tiles must be between 1 and {}",
                GRID_SIZE * GRID_SIZE
            )));
        }
        Ok(())
    }
}

/// GameUiState is everything a front-end needs to draw the board after an event.
#[derive(Clone, Debug, PartialEq)]
pub struct GameUiState {
    pub movements: Vec<GridTileMovement>,
    pub current_score: Score,
    pub best_score: Score,
    pub is_game_over: bool,
    pub can_undo: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub enum UiState {
    /// Nothing has been loaded yet.
    Nothing,
    Loading,
    Ready(GameUiState),
}

/// StateSink receives every state the presenter emits, in order.
pub trait StateSink {
    fn emit(&mut self, state: &UiState) -> Result<()>;
}

impl StateSink for Vec<UiState> {
    fn emit(&mut self, state: &UiState) -> Result<()> {
        self.push(state.clone());
        Ok(())
    }
}

impl StateSink for Sender<UiState> {
    fn emit(&mut self, state: &UiState) -> Result<()> {
        self.send(state.clone()).map_err(|_| Error::StateSinkClosed)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Phase {
    Uninitialized,
    Loading,
    Ready,
}

/// SessionSnapshot captures a whole session, undo history included, so it can outlive the
/// process.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub grid: Grid,
    pub current_score: Score,
    pub best_score: Score,
    /// Oldest first.
    pub history: Vec<Snapshot>,
}

struct Game {
    grid: Grid,
    movements: Vec<GridTileMovement>,
    current_score: Score,
    best_score: Score,
    is_game_over: bool,
    can_undo: bool,
    history: UndoStack,
}

impl Game {
    fn new(max_undo_depth: usize) -> Self {
        Self {
            grid: Grid::empty(),
            movements: Vec::new(),
            current_score: 0,
            best_score: 0,
            is_game_over: false,
            can_undo: false,
            history: UndoStack::new(max_undo_depth),
        }
    }

    /// Replaces the board without animating it.
    fn reset_to(&mut self, grid: Grid, current_score: Score, best_score: Score) {
        self.movements = noop_movements(&grid);
        self.is_game_over = is_game_over(&grid);
        self.grid = grid;
        self.current_score = current_score;
        self.best_score = best_score;
        self.can_undo = !self.history.is_empty();
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            grid: self.grid.clone(),
            current_score: self.current_score,
            best_score: self.best_score,
        }
    }

    fn ui_state(&self) -> GameUiState {
        GameUiState {
            movements: self.movements.clone(),
            current_score: self.current_score,
            best_score: self.best_score,
            is_game_over: self.is_game_over,
            can_undo: self.can_undo,
        }
    }
}

/// Presenter owns a game in progress and applies player events to it one at a time.
///
/// Every accepted event emits a new [`UiState`] to the sink and then queues a save of the game,
/// unless the game is over; a finished board is never saved as resumable.
pub struct Presenter {
    config: PresenterConfig,
    rng: Box<dyn RngCore>,
    persister: Persister,
    phase: Phase,
    game: Game,
    deferred: VecDeque<Event>,
}

impl Presenter {
    /// Creates a presenter backed by `store`. Nothing is read until a [`Event::Load`] arrives.
    pub fn new(
        config: PresenterConfig,
        store: impl GameStore + Send + 'static,
        rng: impl RngCore + 'static,
    ) -> Result<Self> {
        config.validate()?;
        let game = Game::new(config.max_undo_depth);
        Ok(Self {
            config,
            rng: Box::new(rng),
            persister: Persister::spawn(store)?,
            phase: Phase::Uninitialized,
            game,
            deferred: VecDeque::new(),
        })
    }

    /// Rebuilds a presenter from an exported session. The result is already loaded.
    pub fn restore(
        snapshot: SessionSnapshot,
        config: PresenterConfig,
        store: impl GameStore + Send + 'static,
        rng: impl RngCore + 'static,
    ) -> Result<Self> {
        let mut presenter = Self::new(config, store, rng)?;
        for entry in snapshot.history {
            presenter.game.history.push(entry);
        }
        presenter
            .game
            .reset_to(snapshot.grid, snapshot.current_score, snapshot.best_score);
        presenter.phase = Phase::Ready;
        log::info!(
            "restored session with {} of {} undo entries",
            presenter.game.history.len(),
            presenter.game.history.capacity()
        );
        Ok(presenter)
    }

    /// Exports the whole session, or None if no game has been loaded.
    pub fn export(&self) -> Option<SessionSnapshot> {
        if self.phase != Phase::Ready {
            return None;
        }
        Some(SessionSnapshot {
            grid: self.game.grid.clone(),
            current_score: self.game.current_score,
            best_score: self.game.best_score,
            history: self.game.history.iter().cloned().collect(),
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn config(&self) -> &PresenterConfig {
        &self.config
    }

    pub fn grid(&self) -> &Grid {
        &self.game.grid
    }

    pub fn state(&self) -> UiState {
        match self.phase {
            Phase::Uninitialized => UiState::Nothing,
            Phase::Loading => UiState::Loading,
            Phase::Ready => UiState::Ready(self.game.ui_state()),
        }
    }

    /// Waits until every queued save has reached the store.
    pub fn flush(&self) -> Result<()> {
        self.persister.flush()
    }

    /// Handles events from `source` until it is exhausted.
    pub fn run(&mut self, source: &impl EventSource, sink: &mut impl StateSink) -> Result<()> {
        while let Some(event) = source.next_event()? {
            self.handle(event, sink)?;
        }
        Ok(())
    }

    /// Applies a single event. Events that need a board and arrive before the game is loaded are
    /// held back and replayed, in order, right after the load completes.
    pub fn handle(&mut self, event: Event, sink: &mut impl StateSink) -> Result<()> {
        log::trace!("handling {}", event);
        match (self.phase, event) {
            (_, Event::Load) => self.load(sink),
            (Phase::Ready, Event::Move(direction)) => self.move_tiles(direction, sink),
            (Phase::Ready, Event::StartNewGame) => self.start_new_game(sink),
            (Phase::Ready, Event::Undo) => self.undo(sink),
            (phase, event) => {
                log::debug!("deferring {} while {:?}", event, phase);
                self.deferred.push_back(event);
                Ok(())
            }
        }
    }
}

// event handlers
impl Presenter {
    fn load(&mut self, sink: &mut impl StateSink) -> Result<()> {
        if self.phase == Phase::Ready {
            return self.emit(sink);
        }

        self.phase = Phase::Loading;
        sink.emit(&UiState::Loading)?;

        let data = match self.persister.fetch() {
            Ok(data) => data,
            Err(Error::PersisterGone) => return Err(Error::PersisterGone),
            Err(e) => {
                log::warn!("unable to read saved game, starting over: {}", e);
                UserData::default()
            }
        };

        self.phase = Phase::Ready;
        self.game.best_score = data.best_score;
        match data.grid {
            None => {
                log::info!("no saved game, starting a new one");
                self.start_new_game(sink)?;
            }
            Some(grid) => {
                log::info!("resuming saved game at score {}", data.current_score);
                self.game.history.clear();
                self.game.reset_to(grid, data.current_score, data.best_score);
                self.emit(sink)?;
            }
        }

        while let Some(event) = self.deferred.pop_front() {
            self.handle(event, sink)?;
        }
        Ok(())
    }

    fn start_new_game(&mut self, sink: &mut impl StateSink) -> Result<()> {
        let mut grid = Grid::empty();
        let mut movements = Vec::with_capacity(self.config.initial_tiles);
        for _ in 0..self.config.initial_tiles {
            // spawn into the grid as it stands so every tile gets its own cell
            if let Some(spawned) = spawn_random_tile(&grid, &mut *self.rng) {
                apply(&mut grid, &spawned);
                movements.push(spawned);
            }
        }

        let game = &mut self.game;
        game.history.clear();
        game.can_undo = false;
        game.current_score = 0;
        game.is_game_over = is_game_over(&grid);
        game.grid = grid;
        game.movements = movements;
        log::info!("started new game");

        self.emit(sink)?;
        self.save();
        Ok(())
    }

    fn move_tiles(&mut self, direction: Direction, sink: &mut impl StateSink) -> Result<()> {
        let (mut grid, mut movements) = compute_move(&self.game.grid, direction);
        if !has_changed(&movements) {
            log::trace!("moving {} changed nothing", direction);
            return Ok(());
        }

        let snapshot = self.game.snapshot();
        self.game.history.push(snapshot);

        let game = &mut self.game;
        game.current_score = game.current_score.saturating_add(score_increment(&movements));
        game.best_score = game.best_score.max(game.current_score);

        if let Some(spawned) = spawn_random_tile(&grid, &mut *self.rng) {
            log::trace!("spawned {}", spawned.to);
            apply(&mut grid, &spawned);
            movements.push(spawned);
        }
        // stable: only pushes added tiles behind everything else
        movements.sort_by_key(|m| m.is_add());

        log::trace!("board after moving {}:\n{}", direction, grid);
        game.is_game_over = is_game_over(&grid);
        game.grid = grid;
        game.movements = movements;
        game.can_undo = !game.history.is_empty();
        log::debug!(
            "moved {}: score {} best {} game over {}",
            direction,
            game.current_score,
            game.best_score,
            game.is_game_over
        );

        self.emit(sink)?;
        self.save();
        Ok(())
    }

    /// Panics if there is nothing to undo; callers must honour `can_undo`.
    fn undo(&mut self, sink: &mut impl StateSink) -> Result<()> {
        assert!(self.game.can_undo, "undo requested while can_undo is false");
        let previous = match self.game.history.pop() {
            Some(previous) => previous,
            None => unreachable!("can_undo is only set while history is non-empty"),
        };
        self.game
            .reset_to(previous.grid, previous.current_score, previous.best_score);
        log::debug!(
            "undid move, {} more available",
            self.game.history.len()
        );

        self.emit(sink)?;
        self.save();
        Ok(())
    }

    fn emit(&self, sink: &mut impl StateSink) -> Result<()> {
        sink.emit(&self.state())
    }

    /// Queues a save of the current game unless it is over. Failures are the store's concern and
    /// only get logged.
    fn save(&self) {
        if self.game.is_game_over {
            log::debug!("game over, not saving");
            return;
        }
        let data = UserData {
            grid: Some(self.game.grid.clone()),
            current_score: self.game.current_score,
            best_score: self.game.best_score,
        };
        if let Err(e) = self.persister.update(data) {
            log::error!("unable to queue save: {}", e);
        }
    }
}
