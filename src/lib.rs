//! Rules engine and game-state presenter for the 2048 sliding-tile puzzle.
//!
//! [`engine`] holds the pure grid computations, [`presenter::Presenter`] sequences player
//! [`events::Event`]s against them, and [`store`] persists the resumable game.

pub mod engine;
pub mod error;
pub mod events;
pub mod presenter;
pub mod store;

pub use error::{Error, Result};
pub use events::{Event, EventBus, EventSender, EventSource};
pub use presenter::{
    GameUiState, Phase, Presenter, PresenterConfig, SessionSnapshot, StateSink, UiState,
};
pub use store::{GameStore, JsonFileStore, MemoryStore, Persister, UserData};
