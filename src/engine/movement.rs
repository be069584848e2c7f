use rand::distributions::Distribution;
use rand::distributions::WeightedIndex;
use rand::seq::IteratorRandom;
use rand::Rng;

use super::grid::{Cell, Direction, Grid, GridTile, Score, Tile, GRID_SIZE};

const NEW_CARD_CHOICES: [u32; 2] = [2, 4];
const NEW_CARD_WEIGHTS: [u8; 2] = [9, 1];

/// GridTileMovement describes what happened to a single tile during a move.
///
/// A movement without a `from` is a tile that came into existence, either spawned or produced by
/// a merge. A movement whose `from` and `to` share a cell is a tile that stayed put.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct GridTileMovement {
    pub from: Option<GridTile>,
    pub to: GridTile,
}

impl GridTileMovement {
    pub fn noop(grid_tile: GridTile) -> Self {
        Self {
            from: Some(grid_tile),
            to: grid_tile,
        }
    }

    pub fn shift(from: GridTile, to: GridTile) -> Self {
        Self {
            from: Some(from),
            to,
        }
    }

    pub fn add(grid_tile: GridTile) -> Self {
        Self {
            from: None,
            to: grid_tile,
        }
    }

    pub fn is_add(&self) -> bool {
        self.from.is_none()
    }

    pub fn is_noop(&self) -> bool {
        matches!(self.from, Some(from) if from.cell == self.to.cell)
    }
}

impl std::fmt::Display for GridTileMovement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.from {
            None => write!(f, "add({0})", self.to),
            Some(from) if from.cell == self.to.cell => write!(f, "noop({0})", self.to),
            Some(from) => write!(f, "shift({0} -> {1})", from, self.to.cell),
        }
    }
}

/// Scan is the per-row cursor state of the westward compaction.
///
/// Slots to the left of the cursor are always packed, so whenever both a mergeable tile and a gap
/// are tracked the tile sits immediately before the gap.
#[derive(Clone, Copy, Debug, PartialEq)]
enum Scan {
    /// Nothing seen yet.
    Start,
    /// No gap so far; the tile at `tile` may still absorb an equal neighbour.
    Tile { tile: usize },
    /// The next tile lands on `empty`; nothing before it can merge.
    Gap { empty: usize },
    /// The next tile lands on `empty` unless it merges into `tile`.
    TileGap { tile: usize, empty: usize },
}

/// Slides every row of an already-rotated grid westward. Cells recorded in `movements` are
/// mapped back through `rotations` so they refer to the caller's grid.
fn slide_rows(
    rows: &mut [[Option<Tile>; GRID_SIZE]; GRID_SIZE],
    rotations: usize,
    movements: &mut Vec<GridTileMovement>,
) {
    for (row_idx, row) in rows.iter_mut().enumerate() {
        let at = |col: usize| Cell::rotated(row_idx, col, rotations);
        let mut scan = Scan::Start;
        for col in 0..GRID_SIZE {
            let current = match row[col] {
                None => {
                    scan = match scan {
                        Scan::Start => Scan::Gap { empty: col },
                        Scan::Tile { tile } => Scan::TileGap { tile, empty: col },
                        pending => pending,
                    };
                    continue;
                }
                Some(tile) => tile,
            };
            let from = GridTile::new(at(col), current);

            scan = match scan {
                Scan::Start => {
                    movements.push(GridTileMovement::noop(from));
                    Scan::Tile { tile: col }
                }
                Scan::Gap { empty } => {
                    movements.push(GridTileMovement::shift(from, GridTile::new(at(empty), current)));
                    row[empty] = Some(current);
                    row[col] = None;
                    Scan::TileGap {
                        tile: empty,
                        empty: empty + 1,
                    }
                }
                Scan::Tile { tile } | Scan::TileGap { tile, .. }
                    if row[tile].map_or(false, |t| t.can_merge_with(&current)) =>
                {
                    let merged = current.doubled();
                    movements.push(GridTileMovement::shift(from, GridTile::new(at(tile), current)));
                    movements.push(GridTileMovement::add(GridTile::new(at(tile), merged)));
                    row[tile] = Some(merged);
                    row[col] = None;
                    // a merged tile never merges again during the same move
                    match scan {
                        Scan::TileGap { empty, .. } => Scan::Gap { empty },
                        _ => Scan::Gap { empty: col },
                    }
                }
                Scan::Tile { tile } => {
                    movements.push(GridTileMovement::noop(from));
                    Scan::Tile { tile: tile + 1 }
                }
                Scan::TileGap { tile, empty } => {
                    movements.push(GridTileMovement::shift(from, GridTile::new(at(empty), current)));
                    row[empty] = Some(current);
                    row[col] = None;
                    Scan::TileGap {
                        tile: tile + 1,
                        empty: empty + 1,
                    }
                }
            };
        }
    }
}

/// Computes the result of sliding `grid` towards `direction`.
///
/// The grid is rotated so that every direction becomes a westward slide, each row is compacted
/// and merged left to right, and the result is rotated back. Movements are listed in scan order.
pub fn compute_move(grid: &Grid, direction: Direction) -> (Grid, Vec<GridTileMovement>) {
    let rotations = direction.rotations();
    let mut rows = *grid.rotate(rotations).rows();
    let mut movements = Vec::with_capacity(GRID_SIZE * GRID_SIZE);
    slide_rows(&mut rows, rotations, &mut movements);
    let moved = Grid::from_rows(rows).rotate((4 - rotations) % 4);
    (moved, movements)
}

/// Reports whether any tile appeared or moved to a different cell.
pub fn has_changed(movements: &[GridTileMovement]) -> bool {
    movements.iter().any(|m| !m.is_noop())
}

/// The game is over once no direction changes the grid.
pub fn is_game_over(grid: &Grid) -> bool {
    Direction::ALL
        .iter()
        .all(|direction| !has_changed(&compute_move(grid, *direction).1))
}

/// Sum of the values of every tile that came into existence, saturating at `Score::MAX`.
pub fn score_increment(movements: &[GridTileMovement]) -> Score {
    movements
        .iter()
        .filter(|m| m.is_add())
        .fold(0, |total: Score, m| total.saturating_add(m.to.tile.num()))
}

/// Picks a random empty cell and places a 2 (90%) or a 4 (10%) there. Returns None if the grid is
/// full. The grid itself is left untouched; apply the returned movement with [`apply`].
pub fn spawn_random_tile<R: Rng + ?Sized>(grid: &Grid, rng: &mut R) -> Option<GridTileMovement> {
    let cell = grid.empty_cells().choose(rng)?;
    let weights =
        WeightedIndex::new(NEW_CARD_WEIGHTS).expect("NEW_CARD_WEIGHTS should never be empty");
    let num = NEW_CARD_CHOICES[weights.sample(rng)];
    Some(GridTileMovement::add(GridTile::new(cell, Tile::new(num))))
}

/// Writes the destination tile of `movement` into `grid`.
pub fn apply(grid: &mut Grid, movement: &GridTileMovement) {
    grid.set(movement.to.cell, Some(movement.to.tile));
}

/// Describes every tile of `grid` as staying where it is.
pub fn noop_movements(grid: &Grid) -> Vec<GridTileMovement> {
    grid.tiles().map(GridTileMovement::noop).collect()
}
