//! The molecule lattice and seeded, duplicate-free coordinate allocation.
//!
//! Every random choice goes through a [`CoordinateAllocator`] built from an explicit seed, so
//! the same seed and the same occupied cells always produce the same allocation. Phases derive
//! their own streams with [`derive_seed`].

use std::collections::HashSet;
use std::fmt;

use log::debug;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::errors::{GridError, ReactionError};

/// A cell of the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridCoordinate {
    pub col: usize,
    pub row: usize,
}

impl GridCoordinate {
    pub const fn new(col: usize, row: usize) -> Self {
        Self { col, row }
    }
}

impl fmt::Display for GridCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.col, self.row)
    }
}

/// Dimensions of a `cols x rows` grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawGridSize")]
pub struct GridSize {
    cols: usize,
    rows: usize,
}

#[derive(Deserialize)]
struct RawGridSize {
    cols: usize,
    rows: usize,
}

impl TryFrom<RawGridSize> for GridSize {
    type Error = ReactionError;

    fn try_from(raw: RawGridSize) -> Result<Self, Self::Error> {
        Self::new(raw.cols, raw.rows)
    }
}

impl GridSize {
    /// # Errors
    /// Returns `ReactionError::InvalidGrid` when the grid has no cells.
    pub fn new(cols: usize, rows: usize) -> Result<Self, ReactionError> {
        if cols == 0 || rows == 0 || cols.checked_mul(rows).is_none() {
            return Err(ReactionError::InvalidGrid { cols, rows });
        }
        Ok(Self { cols, rows })
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cell_count(&self) -> usize {
        self.cols * self.rows
    }

    pub fn contains(&self, coordinate: GridCoordinate) -> bool {
        coordinate.col < self.cols && coordinate.row < self.rows
    }

    /// All cells in row-major order.
    pub fn coordinates(&self) -> impl Iterator<Item = GridCoordinate> + '_ {
        (0..self.rows).flat_map(move |row| (0..self.cols).map(move |col| GridCoordinate::new(col, row)))
    }
}

impl Default for GridSize {
    fn default() -> Self {
        Self { cols: 10, rows: 10 }
    }
}

/// Mixes a base seed with a stream index (splitmix64) so that every phase gets an
/// independent, reproducible generator.
pub fn derive_seed(seed: u64, stream: u64) -> u64 {
    let mut z = seed ^ stream.wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Draws cells from a grid with a seeded generator.
#[derive(Debug, Clone)]
pub struct CoordinateAllocator {
    size: GridSize,
    rng: ChaCha8Rng,
}

impl CoordinateAllocator {
    pub fn new(size: GridSize, seed: u64) -> Self {
        Self {
            size,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn size(&self) -> GridSize {
        self.size
    }

    /// Cells not in `excluding`, row-major.
    pub fn free_cells(&self, excluding: &[GridCoordinate]) -> Vec<GridCoordinate> {
        let occupied: HashSet<&GridCoordinate> = excluding.iter().collect();
        self.size
            .coordinates()
            .filter(|coordinate| !occupied.contains(coordinate))
            .collect()
    }

    /// Draws `count` distinct cells uniformly from those not in `excluding`.
    ///
    /// # Errors
    /// Returns `GridError::CapacityExceeded` when fewer than `count` cells are free. Nothing is
    /// drawn in that case.
    pub fn add_random(
        &mut self,
        count: usize,
        excluding: &[GridCoordinate],
    ) -> Result<Vec<GridCoordinate>, GridError> {
        let mut free = self.free_cells(excluding);
        if count > free.len() {
            return Err(GridError::CapacityExceeded {
                requested: count,
                available: free.len(),
            });
        }
        let (chosen, _) = free.partial_shuffle(&mut self.rng, count);
        Ok(chosen.to_vec())
    }

    /// Like [`add_random`](Self::add_random) but draws at most the number of free cells.
    pub fn add_random_clamped(&mut self, count: usize, excluding: &[GridCoordinate]) -> Vec<GridCoordinate> {
        let mut free = self.free_cells(excluding);
        let count = if count > free.len() {
            debug!("clamping allocation of {count} cells to {} free", free.len());
            free.len()
        } else {
            count
        };
        let (chosen, _) = free.partial_shuffle(&mut self.rng, count);
        chosen.to_vec()
    }

    /// Every cell of the grid in a reproducible random order.
    pub fn shuffled_full_grid(&mut self) -> Vec<GridCoordinate> {
        let mut cells: Vec<GridCoordinate> = self.size.coordinates().collect();
        cells.shuffle(&mut self.rng);
        cells
    }
}
