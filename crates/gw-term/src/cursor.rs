// SPDX-License-Identifier: MIT
//
// CursorBackend — a buffered backend with a virtual cursor.
//
// Devices without an addressable hardware cursor (or chains where the
// hardware cursor is reserved for something else) still need to show the
// user where input goes. The virtual cursor does it with color: just
// before the buffer flushes, the cursor cell's attribute nibbles are
// swapped in the shadow state; just after, they are swapped back. The
// inverted cell is what reaches the wrapped backend, while the stored
// state ends the commit bit-identical to how it started.
//
// Because the toggle-back leaves `current != flushed` at the cursor
// position, the next commit naturally re-forwards the cell — which is
// exactly what un-draws the old cursor after it moves.

use std::time::Duration;

use crate::backend::{Backend, Result};
use crate::buffer::BufferedBackend;
use crate::cell::Cell;
use crate::geom::Size;
use crate::input::KeyEvent;

/// A [`BufferedBackend`] that renders a virtual cursor during commit.
///
/// # Examples
///
/// ```
/// use gw_term::backend::Backend;
/// use gw_term::buffer::BufferedBackend;
/// use gw_term::cursor::CursorBackend;
/// use gw_term::mem::MemoryBackend;
///
/// let buf = BufferedBackend::covering(MemoryBackend::new(80, 24));
/// let mut screen = CursorBackend::new(buf);
/// screen.show_cursor(10, 5)?;
/// screen.commit()?; // the cell at (10, 5) flushes color-inverted
/// assert!(screen.cursor_visible());
/// # Ok::<(), gw_term::backend::BackendError>(())
/// ```
#[derive(Debug)]
pub struct CursorBackend<B: Backend> {
    buffer: BufferedBackend<B>,
    cursor: (u16, u16),
    visible: bool,
}

impl<B: Backend> CursorBackend<B> {
    /// Wrap a buffered backend. The cursor starts hidden at the origin.
    #[must_use]
    pub const fn new(buffer: BufferedBackend<B>) -> Self {
        Self {
            buffer,
            cursor: (0, 0),
            visible: false,
        }
    }

    /// The wrapped buffered backend.
    #[inline]
    pub const fn buffer(&self) -> &BufferedBackend<B> {
        &self.buffer
    }

    /// The wrapped buffered backend, mutably.
    #[inline]
    pub const fn buffer_mut(&mut self) -> &mut BufferedBackend<B> {
        &mut self.buffer
    }

    /// Swap the attribute nibbles of the cursor cell in the shadow
    /// state. Applied symmetrically around a flush; a cursor that fell
    /// out of range (device shrank) is silently left alone — the write
    /// would be dropped anyway.
    fn toggle_cursor_cell(&mut self) {
        let (x, y) = self.cursor;
        if let Ok(cell) = self.buffer.read_cell(x, y) {
            // The buffer's own policy governs this write; an error here
            // would mean the read itself should have failed.
            let _ = self.buffer.write_cell(x, y, cell.inverted());
        }
    }

    fn flush_with_cursor(&mut self, all: bool) -> Result<()> {
        if self.visible {
            self.toggle_cursor_cell();
        }
        let result = if all {
            self.buffer.force_redraw()
        } else {
            self.buffer.commit()
        };
        if self.visible {
            self.toggle_cursor_cell();
        }
        result
    }
}

impl<B: Backend> Backend for CursorBackend<B> {
    fn size(&self) -> Size {
        self.buffer.size()
    }

    fn write_cell(&mut self, x: u16, y: u16, cell: Cell) -> Result<()> {
        self.buffer.write_cell(x, y, cell)
    }

    fn read_cell(&self, x: u16, y: u16) -> Result<Cell> {
        self.buffer.read_cell(x, y)
    }

    fn resize(&mut self, cols: u16, rows: u16) {
        self.buffer.resize(cols, rows);
    }

    fn commit(&mut self) -> Result<()> {
        self.flush_with_cursor(false)
    }

    fn force_redraw(&mut self) -> Result<()> {
        self.flush_with_cursor(true)
    }

    fn read_event(&mut self) -> Result<KeyEvent> {
        self.buffer.read_event()
    }

    fn poll_event(&mut self, timeout: Duration) -> Result<Option<KeyEvent>> {
        self.buffer.poll_event(timeout)
    }

    fn detect_resize(&mut self) -> bool {
        self.buffer.detect_resize()
    }

    /// Show the virtual cursor at `(x, y)`.
    ///
    /// An out-of-range position records the cursor as hidden instead of
    /// failing the caller — callers routinely request the cursor right
    /// after a shrink, before placement has caught up.
    fn show_cursor(&mut self, x: u16, y: u16) -> Result<()> {
        if self.buffer.size().contains(x, y) {
            self.cursor = (x, y);
            self.visible = true;
        } else {
            self.visible = false;
        }
        Ok(())
    }

    fn hide_cursor(&mut self) -> Result<()> {
        self.visible = false;
        Ok(())
    }

    fn cursor_position(&self) -> Option<(u16, u16)> {
        Some(self.cursor)
    }

    fn cursor_visible(&self) -> bool {
        self.visible
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
