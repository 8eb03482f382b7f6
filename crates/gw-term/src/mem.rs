// SPDX-License-Identifier: MIT
//
// MemoryBackend — a plain in-memory grid.
//
// The simplest possible Backend: a flat row-major Vec of cells with
// bounds-checked reads and writes and a no-op commit. It is the
// innermost backend for headless use — tests flush a buffered backend
// into one of these and assert on what arrived — and doubles as a
// capture target for screenshot-style assertions.

use crate::backend::{Backend, BackendError, BoundsPolicy, Result};
use crate::cell::Cell;
use crate::geom::Size;

/// An in-memory grid backend.
///
/// Flat `Vec<Cell>` with row-major indexing: `index = y * cols + x`.
/// Rows are contiguous so left-to-right scans are linear.
///
/// # Examples
///
/// ```
/// use gw_term::backend::Backend;
/// use gw_term::cell::{Cell, ColorAttr};
/// use gw_term::mem::MemoryBackend;
///
/// let mut grid = MemoryBackend::new(80, 24);
/// grid.write_cell(5, 3, Cell::new('X', ColorAttr::DEFAULT))?;
/// assert_eq!(grid.read_cell(5, 3)?.ch, 'X');
/// # Ok::<(), gw_term::backend::BackendError>(())
/// ```
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    size: Size,
    cells: Vec<Cell>,
    policy: BoundsPolicy,
}

impl MemoryBackend {
    /// Create a grid filled with blank cells.
    #[must_use]
    pub fn new(cols: u16, rows: u16) -> Self {
        Self::with_policy(cols, rows, BoundsPolicy::default())
    }

    /// Create a grid with an explicit out-of-range policy.
    #[must_use]
    pub fn with_policy(cols: u16, rows: u16, policy: BoundsPolicy) -> Self {
        let size = Size::new(cols, rows);
        Self {
            size,
            cells: vec![Cell::BLANK; size.area()],
            policy,
        }
    }

    #[inline]
    fn index(&self, x: u16, y: u16) -> usize {
        y as usize * self.size.cols as usize + x as usize
    }

    /// One row's characters as a `String` — for assertions and debugging.
    ///
    /// Returns `None` if `y` is out of range.
    #[must_use]
    pub fn row_string(&self, y: u16) -> Option<String> {
        if y >= self.size.rows {
            return None;
        }
        let start = self.index(0, y);
        let end = start + self.size.cols as usize;
        Some(self.cells[start..end].iter().map(|c| c.ch).collect())
    }

    /// Reset every cell to blank.
    pub fn clear(&mut self) {
        self.cells.fill(Cell::BLANK);
    }
}

impl Backend for MemoryBackend {
    fn size(&self) -> Size {
        self.size
    }

    fn write_cell(&mut self, x: u16, y: u16, cell: Cell) -> Result<()> {
        if self.policy.admit(self.size, x, y)? {
            let idx = self.index(x, y);
            self.cells[idx] = cell;
        }
        Ok(())
    }

    fn read_cell(&self, x: u16, y: u16) -> Result<Cell> {
        if self.size.contains(x, y) {
            Ok(self.cells[self.index(x, y)])
        } else {
            // Reads have nothing meaningful to return out of range, so
            // this errors regardless of the write policy.
            Err(BackendError::OutOfRange {
                x,
                y,
                cols: self.size.cols,
                rows: self.size.rows,
            })
        }
    }

    /// Resize the grid, clearing all content.
    fn resize(&mut self, cols: u16, rows: u16) {
        self.size = Size::new(cols, rows);
        self.cells.clear();
        self.cells.resize(self.size.area(), Cell::BLANK);
    }

    fn commit(&mut self) -> Result<()> {
        Ok(())
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
