// SPDX-License-Identifier: MIT
//
// The Backend trait — the character-cell grid contract.
//
// Every layer in the rendering chain (in-memory grid, differential
// buffer, console device) implements this one interface, so layers
// compose transparently: a frame writing into a buffered backend cannot
// tell whether the buffer flushes into another buffer, a memory grid,
// or the real terminal.
//
// Required operations: bounds-checked cell write, resize, commit.
// Everything else — cell read, key input, cursor control, device resize
// detection — is optional and defaults to an "unsupported" error or a
// conservative no-op. Asking a backend for a capability it doesn't have
// is a composition bug and is always surfaced, never silently absorbed.
//
// Coordinate validation is centralized in `BoundsPolicy::admit`: one
// bounds check, one policy decision. The default policy drops
// out-of-range writes silently because partial off-screen writes during
// a resize race must not take down rendering.

use std::time::Duration;

use crate::cell::Cell;
use crate::geom::Size;
use crate::input::KeyEvent;

// ─── Errors ─────────────────────────────────────────────────────────────────

/// Error type for all backend operations.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// A coordinate fell outside the grid. Only surfaced under
    /// [`BoundsPolicy::Strict`]; the default policy drops the write.
    #[error("cell ({x}, {y}) is outside the {cols}x{rows} grid")]
    OutOfRange { x: u16, y: u16, cols: u16, rows: u16 },

    /// The backend was asked for a capability it does not implement
    /// (e.g. a cell read on the write-only console device). Always
    /// surfaced: it indicates a composition error, not a runtime
    /// condition.
    #[error("backend does not support {0}")]
    Unsupported(&'static str),

    /// Device I/O failed.
    #[error("device I/O failed")]
    Io(#[from] std::io::Error),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, BackendError>;

// ─── BoundsPolicy ───────────────────────────────────────────────────────────

/// What a backend does with an out-of-range coordinate.
///
/// A backend-level mode fixed at construction, not a per-call choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BoundsPolicy {
    /// Silently ignore the operation (the default). Writes that land
    /// outside newly shrunk bounds during a resize race are dropped,
    /// not errored.
    #[default]
    Ignore,
    /// Surface [`BackendError::OutOfRange`].
    Strict,
}

impl BoundsPolicy {
    /// Validate `(x, y)` against `size`.
    ///
    /// Returns `Ok(true)` when the coordinate is in range, `Ok(false)`
    /// when it is out of range and should be skipped, and
    /// `Err(OutOfRange)` under [`Strict`](Self::Strict).
    ///
    /// # Errors
    ///
    /// [`BackendError::OutOfRange`] in strict mode.
    #[inline]
    pub fn admit(self, size: Size, x: u16, y: u16) -> Result<bool> {
        if size.contains(x, y) {
            Ok(true)
        } else {
            match self {
                Self::Ignore => Ok(false),
                Self::Strict => Err(BackendError::OutOfRange {
                    x,
                    y,
                    cols: size.cols,
                    rows: size.rows,
                }),
            }
        }
    }
}

// ─── Backend ────────────────────────────────────────────────────────────────

/// The character-cell grid contract.
///
/// Implementors must provide cell writes, resize, and commit. The
/// optional operations default to [`BackendError::Unsupported`] or a
/// conservative no-op, so a minimal grid implements exactly three
/// methods.
pub trait Backend {
    /// Current grid dimensions.
    fn size(&self) -> Size;

    /// Write one cell at `(x, y)`.
    ///
    /// Out-of-range coordinates are handled per the backend's
    /// [`BoundsPolicy`].
    ///
    /// # Errors
    ///
    /// [`BackendError::OutOfRange`] in strict mode; I/O errors from
    /// device-facing backends.
    fn write_cell(&mut self, x: u16, y: u16, cell: Cell) -> Result<()>;

    /// Read the cell at `(x, y)`.
    ///
    /// # Errors
    ///
    /// [`BackendError::Unsupported`] for write-only backends (the
    /// default); [`BackendError::OutOfRange`] for any out-of-range read
    /// regardless of policy — there is nothing meaningful to return.
    fn read_cell(&self, x: u16, y: u16) -> Result<Cell> {
        let _ = (x, y);
        Err(BackendError::Unsupported("read_cell"))
    }

    /// Change the grid dimensions.
    ///
    /// Composed backends propagate this depth-first: the wrapped
    /// (device-facing) grid learns of the change before the wrapping
    /// shadow buffer grows.
    fn resize(&mut self, cols: u16, rows: u16);

    /// Propagate pending changes to the next layer or device.
    ///
    /// # Errors
    ///
    /// I/O errors from device-facing backends.
    fn commit(&mut self) -> Result<()>;

    /// Like [`commit`](Self::commit), but unconditional: buffering
    /// backends forward every cell regardless of whether it changed.
    /// Non-buffering backends fall back to a plain commit.
    ///
    /// # Errors
    ///
    /// Same as [`commit`](Self::commit).
    fn force_redraw(&mut self) -> Result<()> {
        self.commit()
    }

    /// Block until the next key event arrives.
    ///
    /// # Errors
    ///
    /// [`BackendError::Unsupported`] for backends with no input source
    /// (the default); I/O errors from the device.
    fn read_event(&mut self) -> Result<KeyEvent> {
        Err(BackendError::Unsupported("read_event"))
    }

    /// Wait up to `timeout` for a key event.
    ///
    /// Returns `Ok(None)` when the timeout elapses with no input.
    ///
    /// # Errors
    ///
    /// [`BackendError::Unsupported`] for backends with no input source
    /// (the default); I/O errors from the device.
    fn poll_event(&mut self, timeout: Duration) -> Result<Option<KeyEvent>> {
        let _ = timeout;
        Err(BackendError::Unsupported("poll_event"))
    }

    /// Check whether the underlying device changed size since the last
    /// call. Cheap enough to poll every redraw tick. Backends with no
    /// device below them report `false`.
    fn detect_resize(&mut self) -> bool {
        false
    }

    /// Make the cursor visible at `(x, y)`.
    ///
    /// An out-of-range position records the cursor as hidden rather
    /// than failing the caller.
    ///
    /// # Errors
    ///
    /// [`BackendError::Unsupported`] for backends without cursor
    /// support (the default); I/O errors from the device.
    fn show_cursor(&mut self, x: u16, y: u16) -> Result<()> {
        let _ = (x, y);
        Err(BackendError::Unsupported("show_cursor"))
    }

    /// Hide the cursor.
    ///
    /// # Errors
    ///
    /// [`BackendError::Unsupported`] for backends without cursor
    /// support (the default); I/O errors from the device.
    fn hide_cursor(&mut self) -> Result<()> {
        Err(BackendError::Unsupported("hide_cursor"))
    }

    /// The cursor position, if this backend tracks one.
    fn cursor_position(&self) -> Option<(u16, u16)> {
        None
    }

    /// Whether the cursor is currently visible.
    fn cursor_visible(&self) -> bool {
        false
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
