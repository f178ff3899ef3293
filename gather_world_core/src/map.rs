use std::ops::{Index, IndexMut, Range};

use serde::{Deserialize, Serialize};

use crate::Position;

/// Represents errors that can occur within the grid operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GridError {
    #[error("Coordinates ({x}, {y}) are out of bounds for grid size ({width}, {height})")]
    OutOfBounds {
        x: usize,
        y: usize,
        width: usize,
        height: usize,
    },
}

/// A generic 2D grid structure.
///
/// Stores elements of type `T` in a flat vector using row-major order.
/// Cells are addressed by [`Position`]; the outermost ring of cells is the
/// border, everything else is the interior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grid<T> {
    width: usize,
    height: usize,
    cells: Vec<T>,
}

impl<T> Grid<T> {
    /// Creates a new grid with the specified dimensions, filled with default values.
    ///
    /// # Panics
    ///
    /// Panics if `width * height` overflows `usize`.
    pub fn new(width: usize, height: usize) -> Self
    where
        T: Default + Clone,
    {
        let size = width.checked_mul(height).expect("Grid size overflow");
        Grid {
            width,
            height,
            cells: vec![T::default(); size],
        }
    }

    /// Returns the width of the grid.
    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Returns the height of the grid.
    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Converts a position to a flat vector index.
    ///
    /// Returns `None` if the position is out of bounds.
    #[inline]
    fn index_of(&self, pos: Position) -> Option<usize> {
        if self.is_valid(pos) {
            Some(pos.y * self.width + pos.x)
        } else {
            None
        }
    }

    /// Checks if the given position is within the grid boundaries.
    #[inline]
    pub fn is_valid(&self, pos: Position) -> bool {
        pos.x < self.width && pos.y < self.height
    }

    /// Checks if the position lies strictly inside the border ring.
    #[inline]
    pub fn is_interior(&self, pos: Position) -> bool {
        pos.x > 0 && pos.y > 0 && pos.x + 1 < self.width && pos.y + 1 < self.height
    }

    /// Gets an immutable reference to the cell at the given position.
    pub fn get(&self, pos: Position) -> Option<&T> {
        self.index_of(pos).and_then(|index| self.cells.get(index))
    }

    /// Gets a mutable reference to the cell at the given position.
    pub fn get_mut(&mut self, pos: Position) -> Option<&mut T> {
        let index = self.index_of(pos)?;
        self.cells.get_mut(index)
    }

    /// Sets the value of the cell at the given position.
    ///
    /// Returns `Err(GridError::OutOfBounds)` if the position is invalid.
    pub fn set(&mut self, pos: Position, value: T) -> Result<(), GridError> {
        let index = self.index_of(pos).ok_or(GridError::OutOfBounds {
            x: pos.x,
            y: pos.y,
            width: self.width,
            height: self.height,
        })?;
        self.cells[index] = value;
        Ok(())
    }

    /// Overwrites every border cell with `value`.
    pub fn fill_border(&mut self, value: T)
    where
        T: Clone,
    {
        let (width, height) = (self.width, self.height);
        for (index, cell) in self.cells.iter_mut().enumerate() {
            let (x, y) = (index % width, index / width);
            if x == 0 || y == 0 || x + 1 == width || y + 1 == height {
                *cell = value.clone();
            }
        }
    }

    /// Overwrites the cells of row `y` whose column falls in `columns`.
    /// Cells outside the grid are skipped. Returns how many cells were written.
    pub fn fill_row(&mut self, y: usize, columns: Range<usize>, value: T) -> usize
    where
        T: Clone,
    {
        if y >= self.height {
            return 0;
        }
        let end = columns.end.min(self.width);
        let start = columns.start.min(end);
        let row = y * self.width;
        for cell in &mut self.cells[row + start..row + end] {
            *cell = value.clone();
        }
        end - start
    }

    /// Returns an iterator over the cells of the grid in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.cells.iter()
    }

    /// Returns an iterator that yields `(Position, &T)` for each cell.
    pub fn enumerate(&self) -> impl Iterator<Item = (Position, &T)> {
        let width = self.width;
        self.cells
            .iter()
            .enumerate()
            .map(move |(index, cell)| (Position::new(index % width, index / width), cell))
    }
}

impl<T> Index<Position> for Grid<T> {
    type Output = T;

    #[inline]
    fn index(&self, pos: Position) -> &Self::Output {
        match self.index_of(pos) {
            Some(idx) => &self.cells[idx],
            None => panic!(
                "Grid index ({}, {}) out of bounds for grid size ({}, {})",
                pos.x, pos.y, self.width, self.height
            ),
        }
    }
}

impl<T> IndexMut<Position> for Grid<T> {
    #[inline]
    fn index_mut(&mut self, pos: Position) -> &mut Self::Output {
        let (width, height) = (self.width, self.height);
        match self.index_of(pos) {
            Some(idx) => &mut self.cells[idx],
            None => panic!(
                "Grid index ({}, {}) out of bounds for grid size ({}, {})",
                pos.x, pos.y, width, height
            ),
        }
    }
}
