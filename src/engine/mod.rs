pub mod grid;
pub mod history;
pub mod movement;

pub use grid::{
    Cell, Direction, Grid, GridTile, Score, Tile, TileId, Values, GRID_SIZE, MAX_TILE_VALUE,
};
pub use history::{Snapshot, UndoStack, DEFAULT_MAX_UNDO_DEPTH};
pub use movement::{
    compute_move, has_changed, is_game_over, spawn_random_tile, GridTileMovement,
};
