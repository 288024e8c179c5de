//! In-memory sheet grid.

use std::sync::{Arc, Mutex};

use crate::error::Result;
use crate::errinput;

/// A resident sheet under its single exclusion lock. All mutation, commit,
/// and shape-reading operations hold the lock.
pub type SharedSheet = Arc<Mutex<MemSheet>>;

/// A resizable two-dimensional grid of cells, row-major, indexed 1-based.
///
/// The grid may grow on out-of-shape writes but never shrinks below the
/// shape it was created with. The empty string denotes an unset cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemSheet {
    rows: usize,
    cols: usize,
    cells: Vec<String>,
}

impl MemSheet {
    /// Creates an empty sheet of the given shape.
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            cells: vec![String::new(); rows * cols],
        }
    }

    /// Rebuilds a sheet from a row-major cell slice with the stored column
    /// count; the row count follows from the length.
    pub fn from_content(content: Vec<String>, columns: usize) -> Result<Self> {
        if columns == 0 {
            return errinput!("column count must be positive");
        }
        if content.is_empty() || content.len() % columns != 0 {
            return errinput!(
                "content length {} is not a positive multiple of {columns} columns",
                content.len()
            );
        }
        Ok(Self {
            rows: content.len() / columns,
            cols: columns,
            cells: content,
        })
    }

    /// Current shape as (rows, cols).
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// The cell at 1-based (row, col), or the empty string outside the
    /// current shape.
    pub fn get(&self, row: usize, col: usize) -> &str {
        if row == 0 || col == 0 || row > self.rows || col > self.cols {
            return "";
        }
        &self.cells[(row - 1) * self.cols + (col - 1)]
    }

    /// Sets the cell at 1-based (row, col), growing the grid when the
    /// coordinates fall outside the current shape.
    pub fn set(&mut self, row: usize, col: usize, value: String) -> Result<()> {
        if row == 0 || col == 0 {
            return errinput!("cell coordinates are 1-based, got ({row}, {col})");
        }
        if row > self.rows || col > self.cols {
            self.grow(row.max(self.rows), col.max(self.cols));
        }
        self.cells[(row - 1) * self.cols + (col - 1)] = value;
        Ok(())
    }

    /// Row-major materialization of the grid.
    pub fn to_content(&self) -> Vec<String> {
        self.cells.clone()
    }

    fn grow(&mut self, rows: usize, cols: usize) {
        if cols == self.cols {
            self.cells.resize(rows * cols, String::new());
        } else {
            // Column growth changes the row stride, so re-lay the cells out.
            let mut cells = vec![String::new(); rows * cols];
            for r in 0..self.rows {
                for c in 0..self.cols {
                    cells[r * cols + c] =
                        std::mem::take(&mut self.cells[r * self.cols + c]);
                }
            }
            self.cells = cells;
        }
        self.rows = rows;
        self.cols = cols;
    }
}
