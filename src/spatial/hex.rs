//! Hex coordinate system for the game map
//!
//! The map is a toroidal grid of `cols x rows` cells addressed by an opaque
//! [`MapPos`]. Rows are skewed so that the six neighbors of (col, row) are
//! reached with the offsets listed on [`Direction::offset`].

use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Opaque cell address on the wrapping map
#[derive(
    Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[display(fmt = "{}", _0)]
pub struct MapPos(pub u32);

/// The six hex directions, in clockwise order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Direction {
    Right,
    DownRight,
    Down,
    Left,
    UpLeft,
    Up,
}

impl Direction {
    pub const ALL: [Direction; 6] = [
        Direction::Right,
        Direction::DownRight,
        Direction::Down,
        Direction::Left,
        Direction::UpLeft,
        Direction::Up,
    ];

    /// Column/row offset of one step in this direction
    pub fn offset(&self) -> (i32, i32) {
        match self {
            Direction::Right => (1, 0),
            Direction::DownRight => (1, 1),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
            Direction::UpLeft => (-1, -1),
            Direction::Up => (0, -1),
        }
    }

    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn from_index(index: usize) -> Direction {
        Self::ALL[index % 6]
    }

    /// Opposite direction
    pub fn reverse(&self) -> Direction {
        Self::from_index(self.index() + 3)
    }

    /// Rotate clockwise by `steps`
    pub fn rotate(&self, steps: usize) -> Direction {
        Self::from_index(self.index() + steps)
    }

    /// All six directions clockwise, starting at `self`
    pub fn cycle_from(&self) -> [Direction; 6] {
        let mut dirs = Self::ALL;
        dirs.rotate_left(self.index());
        dirs
    }
}

/// Dimensions of the wrapping map plus all position arithmetic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MapGeometry {
    cols: u32,
    rows: u32,
}

impl MapGeometry {
    /// Zero dimensions are raised to one
    pub fn new(cols: u32, rows: u32) -> Self {
        Self {
            cols: cols.max(1),
            rows: rows.max(1),
        }
    }

    pub fn cols(&self) -> u32 {
        self.cols
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    pub fn tile_count(&self) -> u32 {
        self.cols * self.rows
    }

    /// Position of (col, row); any integer wraps onto the map
    pub fn pos(&self, col: i32, row: i32) -> MapPos {
        let c = col.rem_euclid(self.cols as i32) as u32;
        let r = row.rem_euclid(self.rows as i32) as u32;
        MapPos(r * self.cols + c)
    }

    pub fn col(&self, pos: MapPos) -> i32 {
        (pos.0 % self.cols) as i32
    }

    pub fn row(&self, pos: MapPos) -> i32 {
        ((pos.0 / self.cols) % self.rows) as i32
    }

    /// Step once in `dir`
    pub fn move_pos(&self, pos: MapPos, dir: Direction) -> MapPos {
        let (dc, dr) = dir.offset();
        self.move_by(pos, dc, dr)
    }

    /// Shift by an arbitrary offset
    pub fn move_by(&self, pos: MapPos, dc: i32, dr: i32) -> MapPos {
        self.pos(self.col(pos) + dc, self.row(pos) + dr)
    }

    pub fn move_n(&self, pos: MapPos, dir: Direction, steps: u32) -> MapPos {
        let (dc, dr) = dir.offset();
        self.move_by(pos, dc * steps as i32, dr * steps as i32)
    }

    pub fn neighbors(&self, pos: MapPos) -> [MapPos; 6] {
        Direction::ALL.map(|dir| self.move_pos(pos, dir))
    }

    /// Flag position belonging to a building at `pos`
    pub fn flag_of_building(&self, pos: MapPos) -> MapPos {
        self.move_pos(pos, Direction::DownRight)
    }

    /// Building position belonging to a flag at `pos`
    pub fn building_of_flag(&self, pos: MapPos) -> MapPos {
        self.move_pos(pos, Direction::UpLeft)
    }

    /// Shortest signed column/row offset from `from` to `to` across the wrap
    pub fn delta(&self, from: MapPos, to: MapPos) -> (i32, i32) {
        (
            wrapped_delta(self.col(to) - self.col(from), self.cols as i32),
            wrapped_delta(self.row(to) - self.row(from), self.rows as i32),
        )
    }

    /// Number of steps on the hex grid between two positions
    ///
    /// When both offsets point the same way a diagonal step covers one of
    /// each, so the larger offset wins; otherwise the steps add up.
    pub fn distance(&self, a: MapPos, b: MapPos) -> u32 {
        let (dc, dr) = self.delta(a, b);
        if (dc >= 0) == (dr >= 0) {
            dc.unsigned_abs().max(dr.unsigned_abs())
        } else {
            dc.unsigned_abs() + dr.unsigned_abs()
        }
    }

    /// Direction leading from `from` to the adjacent cell `to`
    pub fn direction_to(&self, from: MapPos, to: MapPos) -> Option<Direction> {
        Direction::ALL
            .into_iter()
            .find(|dir| self.move_pos(from, *dir) == to)
    }

    /// Position halfway along the straight line between two positions
    pub fn halfway(&self, a: MapPos, b: MapPos) -> MapPos {
        let (dc, dr) = self.delta(a, b);
        self.move_by(a, dc / 2, dr / 2)
    }
}

fn wrapped_delta(d: i32, size: i32) -> i32 {
    let d = d.rem_euclid(size);
    if d > size / 2 {
        d - size
    } else {
        d
    }
}
