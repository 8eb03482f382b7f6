// SPDX-License-Identifier: MIT
//
// The Window trait — what a widget must provide to live in the registry.
//
// A window owns its rectangle and its content. The registry
// (`WindowManager`) owns the windows, decides when placement reruns,
// builds a `Frame` over each visible window's rectangle, and routes
// keyboard input to the focused one. Concrete widgets — a framed panel,
// a status bar, a dialog — differ only in how they place and draw
// themselves.

use gw_term::backend::Result;
use gw_term::frame::Frame;
use gw_term::geom::{Rect, Size};
use gw_term::input::KeyEvent;

/// Handle for a registered window.
///
/// Stable for the life of the registry — windows are registered once at
/// startup and never removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowId(pub(crate) usize);

/// A positionable, drawable widget.
pub trait Window {
    /// Recompute this window's rectangle from the current device
    /// dimensions.
    ///
    /// Called by the registry whenever placement is dirty — at startup
    /// and after every device resize. Typical implementations derive
    /// half-width panels, full-width bars, or centered dialogs from
    /// `device`.
    fn place(&mut self, device: Size);

    /// The window's current rectangle on the screen backend.
    fn rect(&self) -> Rect;

    /// Draw the window's content into a frame covering
    /// [`rect`](Self::rect).
    ///
    /// # Errors
    ///
    /// Propagates backend write errors.
    fn draw(&mut self, frame: &mut Frame<'_>) -> Result<()>;

    /// Handle one key event.
    ///
    /// Returning `Some(command)` hands the string to the host loop to
    /// interpret as a command line; `None` means the key was consumed
    /// (or ignored) here.
    fn on_key(&mut self, key: &KeyEvent) -> Option<String> {
        let _ = key;
        None
    }

    /// Whether this window participates in keyboard focus cycling.
    /// Fixed at construction by convention.
    fn can_focus(&self) -> bool {
        false
    }

    /// Where this window wants the cursor, frame-relative, or `None`
    /// to keep it hidden. Queried for the focused window after every
    /// redraw pass.
    fn cursor(&self) -> Option<(u16, u16)> {
        None
    }
}
