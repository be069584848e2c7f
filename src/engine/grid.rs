use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const GRID_SIZE: usize = 4;

pub type Score = u32;

/// The largest tile value. Tiles at this value no longer merge, so doubling never leaves `u32`.
pub const MAX_TILE_VALUE: u32 = 1 << 30;

/// Cell is a (row, col) location on the grid.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct Cell {
    pub row: usize,
    pub col: usize,
}

impl Cell {
    pub fn new(row: usize, col: usize) -> Self {
        debug_assert!(row < GRID_SIZE && col < GRID_SIZE, "cell out of bounds");
        Self { row, col }
    }

    /// Maps a position on a grid rotated by `rotations` quarter turns back onto the unrotated
    /// grid.
    pub(crate) fn rotated(row: usize, col: usize, rotations: usize) -> Cell {
        let max = GRID_SIZE - 1;
        match rotations % 4 {
            0 => Cell::new(row, col),
            1 => Cell::new(max - col, row),
            2 => Cell::new(max - row, max - col),
            _ => Cell::new(col, max - row),
        }
    }

    /// All cells in row-major order.
    pub fn all() -> impl Iterator<Item = Cell> {
        (0..GRID_SIZE).flat_map(|row| (0..GRID_SIZE).map(move |col| Cell { row, col }))
    }
}

impl std::fmt::Display for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cell({0},{1})", self.row, self.col)
    }
}

/// Direction represents the direction the player slides the tiles.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Direction {
    North,
    South,
    East,
    West,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::North,
        Direction::South,
        Direction::East,
        Direction::West,
    ];

    /// The number of quarter turns that turn a slide in this direction into a westward slide.
    pub(crate) fn rotations(&self) -> usize {
        match self {
            Direction::West => 0,
            Direction::South => 1,
            Direction::East => 2,
            Direction::North => 3,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Direction::North => "north",
            Direction::South => "south",
            Direction::East => "east",
            Direction::West => "west",
        };
        write!(f, "{}", s)
    }
}

static NEXT_TILE_ID: AtomicU64 = AtomicU64::new(1);

/// TileId identifies a tile across moves so front-ends can track it. It has no meaning to the
/// engine itself.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct TileId(u64);

impl TileId {
    fn next() -> Self {
        TileId(NEXT_TILE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Tile {
    num: u32,
    id: TileId,
}

impl Tile {
    /// Creates a tile with a fresh id.
    pub fn new(num: u32) -> Self {
        debug_assert!(is_valid_value(num), "invalid tile value {}", num);
        Self {
            num,
            id: TileId::next(),
        }
    }

    pub fn num(&self) -> u32 {
        self.num
    }

    pub fn id(&self) -> TileId {
        self.id
    }

    /// Whether sliding `other` into this tile merges them.
    pub fn can_merge_with(&self, other: &Tile) -> bool {
        self.num == other.num && self.num < MAX_TILE_VALUE
    }

    /// The tile produced by merging this tile with an equal one.
    pub fn doubled(&self) -> Self {
        Tile::new(self.num * 2)
    }
}

impl std::fmt::Display for Tile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.num)
    }
}

fn is_valid_value(num: u32) -> bool {
    (2..=MAX_TILE_VALUE).contains(&num) && num.is_power_of_two()
}

/// GridTile is a tile bound to its location.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct GridTile {
    pub cell: Cell,
    pub tile: Tile,
}

impl GridTile {
    pub fn new(cell: Cell, tile: Tile) -> Self {
        Self { cell, tile }
    }
}

impl std::fmt::Display for GridTile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{0}@{1}", self.tile, self.cell)
    }
}

/// Values is the id-less view of a grid used for persistence and comparisons.
pub type Values = [[Option<u32>; GRID_SIZE]; GRID_SIZE];

/// Grid is the 4x4 board of optional tiles.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Vec<Option<u32>>>", into = "Vec<Vec<Option<u32>>>")]
pub struct Grid {
    slots: [[Option<Tile>; GRID_SIZE]; GRID_SIZE],
}

impl Grid {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a grid of fresh tiles from plain values, rejecting anything that is not a power of
    /// two between 2 and [`MAX_TILE_VALUE`].
    pub fn from_values(values: Values) -> Result<Self> {
        let mut grid = Grid::empty();
        for cell in Cell::all() {
            if let Some(num) = values[cell.row][cell.col] {
                if !is_valid_value(num) {
                    return Err(Error::InvalidTileValue(num));
                }
                grid.set(cell, Some(Tile::new(num)));
            }
        }
        Ok(grid)
    }

    pub fn values(&self) -> Values {
        let mut values = [[None; GRID_SIZE]; GRID_SIZE];
        for cell in Cell::all() {
            values[cell.row][cell.col] = self.get(cell).map(|t| t.num());
        }
        values
    }

    pub fn get(&self, cell: Cell) -> Option<Tile> {
        self.slots[cell.row][cell.col]
    }

    pub fn set(&mut self, cell: Cell, tile: Option<Tile>) {
        self.slots[cell.row][cell.col] = tile;
    }

    pub(crate) fn rows(&self) -> &[[Option<Tile>; GRID_SIZE]; GRID_SIZE] {
        &self.slots
    }

    pub(crate) fn from_rows(slots: [[Option<Tile>; GRID_SIZE]; GRID_SIZE]) -> Self {
        Self { slots }
    }

    /// Occupied cells in row-major order.
    pub fn tiles(&self) -> impl Iterator<Item = GridTile> + '_ {
        Cell::all().filter_map(|cell| self.get(cell).map(|tile| GridTile::new(cell, tile)))
    }

    pub fn empty_cells(&self) -> impl Iterator<Item = Cell> + '_ {
        Cell::all().filter(|cell| self.get(*cell).is_none())
    }

    pub fn is_empty(&self) -> bool {
        self.tiles().next().is_none()
    }

    /// Returns the grid rotated by `rotations` quarter turns, using the same cell mapping the
    /// movement engine uses to normalize every direction to a westward slide.
    pub fn rotate(&self, rotations: usize) -> Grid {
        let mut rotated = Grid::empty();
        for cell in Cell::all() {
            rotated.set(cell, self.get(Cell::rotated(cell.row, cell.col, rotations)));
        }
        rotated
    }
}

impl std::fmt::Display for Grid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for row in self.slots.iter() {
            for slot in row.iter() {
                match slot {
                    Some(tile) => write!(f, "{:>6}", tile.num())?,
                    None => write!(f, "{:>6}", ".")?,
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

impl TryFrom<Vec<Vec<Option<u32>>>> for Grid {
    type Error = Error;

    fn try_from(rows: Vec<Vec<Option<u32>>>) -> Result<Self> {
        if rows.len() != GRID_SIZE {
            return Err(Error::InvalidGridShape {
                expected: GRID_SIZE,
                found: rows.len(),
            });
        }
        let mut values: Values = [[None; GRID_SIZE]; GRID_SIZE];
        for (row, cols) in rows.into_iter().enumerate() {
            if cols.len() != GRID_SIZE {
                return Err(Error::InvalidGridShape {
                    expected: GRID_SIZE,
                    found: cols.len(),
                });
            }
            for (col, value) in cols.into_iter().enumerate() {
                values[row][col] = value;
            }
        }
        Grid::from_values(values)
    }
}

impl From<Grid> for Vec<Vec<Option<u32>>> {
    fn from(grid: Grid) -> Self {
        grid.values().iter().map(|row| row.to_vec()).collect()
    }
}

#[cfg(test)]
mod test {
    use rstest::*;

    use super::*;

    #[rstest]
    #[case::identity(0, Cell::new(0, 1), Cell::new(0, 1))]
    #[case::quarter(1, Cell::new(0, 1), Cell::new(2, 0))]
    #[case::half(2, Cell::new(0, 1), Cell::new(3, 2))]
    #[case::three_quarters(3, Cell::new(0, 1), Cell::new(1, 3))]
    fn rotated_cell(#[case] rotations: usize, #[case] cell: Cell, #[case] expected: Cell) {
        assert_eq!(Cell::rotated(cell.row, cell.col, rotations), expected);
    }

    #[test]
    fn rotate_back_is_identity() {
        let grid = Grid::from_values([
            [Some(2), None, None, Some(4)],
            [None, Some(8), None, None],
            [None, None, None, Some(16)],
            [Some(32), None, Some(64), None],
        ])
        .unwrap();
        for r in 0..4 {
            assert_eq!(grid.rotate(r).rotate((4 - r) % 4), grid, "rotations {}", r);
        }
    }

    #[test]
    fn north_rotation_puts_last_column_first() {
        let grid = Grid::from_values([
            [None, None, None, Some(2)],
            [None, None, None, Some(4)],
            [None, None, None, Some(8)],
            [None, None, None, Some(16)],
        ])
        .unwrap();
        let rotated = grid.rotate(Direction::North.rotations());
        assert_eq!(
            rotated.values()[0],
            [Some(2), Some(4), Some(8), Some(16)]
        );
    }

    #[rstest]
    #[case::zero(0)]
    #[case::one(1)]
    #[case::three(3)]
    #[case::six(6)]
    #[case::past_max(MAX_TILE_VALUE * 2)]
    fn from_values_rejects_invalid(#[case] value: u32) {
        let mut values: Values = [[None; GRID_SIZE]; GRID_SIZE];
        values[1][2] = Some(value);
        assert!(matches!(
            Grid::from_values(values),
            Err(Error::InvalidTileValue(v)) if v == value
        ));
    }

    #[test]
    fn doubled_tile_has_new_id() {
        let tile = Tile::new(8);
        let doubled = tile.doubled();
        assert_eq!(doubled.num(), 16);
        assert_ne!(doubled.id(), tile.id());
    }

    #[test]
    fn json_shape() {
        let grid = Grid::from_values([
            [Some(2), None, None, None],
            [None; GRID_SIZE],
            [None; GRID_SIZE],
            [None, None, None, Some(2048)],
        ])
        .unwrap();
        let encoded = serde_json::to_string(&grid).unwrap();
        assert_eq!(
            encoded,
            "[[2,null,null,null],[null,null,null,null],[null,null,null,null],[null,null,null,2048]]"
        );
        let decoded: Grid = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.values(), grid.values());
    }

    #[test]
    fn json_rejects_oversized_tiles() {
        let decoded = serde_json::from_str::<Grid>(
            "[[2147483648,2147483648,null,null],[null,null,null,null],[null,null,null,null],[null,null,null,null]]",
        );
        assert!(matches!(
            decoded.map_err(|e| e.to_string()),
            Err(msg) if msg.contains("2147483648")
        ));
    }

    #[test]
    fn max_tiles_do_not_merge() {
        let max = Tile::new(MAX_TILE_VALUE);
        let half = Tile::new(MAX_TILE_VALUE / 2);
        assert!(!max.can_merge_with(&Tile::new(MAX_TILE_VALUE)));
        assert!(half.can_merge_with(&Tile::new(MAX_TILE_VALUE / 2)));
        assert_eq!(half.doubled().num(), MAX_TILE_VALUE);
    }

    #[test]
    fn json_rejects_wrong_shape() {
        let decoded = serde_json::from_str::<Grid>("[[2,null,null,null]]");
        assert!(decoded.is_err());
    }
}
