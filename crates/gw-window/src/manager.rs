// SPDX-License-Identifier: MIT
//
// WindowManager — the window registry, placement protocol, and focus.
//
// One registry owns every window for the life of the process, in
// creation order. It runs the per-tick redraw protocol against the
// shared screen backend:
//
//   1. Poll the device for a resize; a resize marks placement dirty.
//   2. If placement is dirty, ask every window to replace itself from
//      the current device size, in list order.
//   3. If nothing requested a redraw and placement is clean, skip the
//      tick entirely — idle frames cost nothing.
//   4. Draw every visible window in list order, then flush the screen:
//      a forced full flush when placement just changed (the shadow
//      state across moved windows can't be trusted), the differential
//      commit otherwise.
//   5. Restore the focused window's cursor.
//
// Focus is a single index into the registry. Cycling walks forward,
// wraps past the tail, and stops on the next window that accepts
// focus. With zero focusable windows the cycle is a no-op — focus is
// left unchanged rather than spinning.

use gw_term::backend::{Backend, Result};
use gw_term::frame::Frame;
use gw_term::input::KeyEvent;

use crate::window::{Window, WindowId};

struct Entry {
    window: Box<dyn Window>,
    visible: bool,
}

/// The process-wide window registry.
///
/// Created once at startup, handed by reference through the main loop,
/// torn down at shutdown. Windows register in creation order and live
/// as long as the registry.
pub struct WindowManager {
    entries: Vec<Entry>,
    focus: Option<usize>,
    placement_dirty: bool,
    redraw_requested: bool,
}

impl Default for WindowManager {
    fn default() -> Self {
        Self::new()
    }
}

impl WindowManager {
    /// Create an empty registry. The first redraw pass places and
    /// draws everything.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            focus: None,
            placement_dirty: true,
            redraw_requested: true,
        }
    }

    /// Register a window. Windows draw in registration order, so later
    /// windows paint over earlier ones where they overlap.
    ///
    /// The first focusable window registered receives the initial
    /// focus.
    pub fn add(&mut self, window: Box<dyn Window>) -> WindowId {
        let id = WindowId(self.entries.len());
        if self.focus.is_none() && window.can_focus() {
            self.focus = Some(id.0);
        }
        self.entries.push(Entry {
            window,
            visible: true,
        });
        self.placement_dirty = true;
        self.redraw_requested = true;
        id
    }

    /// Number of registered windows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Borrow a window.
    #[must_use]
    pub fn window(&self, id: WindowId) -> Option<&dyn Window> {
        self.entries.get(id.0).map(|e| &*e.window)
    }

    /// Borrow a window mutably (host-side state updates).
    pub fn window_mut(&mut self, id: WindowId) -> Option<&mut (dyn Window + 'static)> {
        self.entries.get_mut(id.0).map(move |e| &mut *e.window)
    }

    // ── Visibility ──────────────────────────────────────────────────────

    /// Make a window visible and request a redraw pass.
    pub fn show(&mut self, id: WindowId) {
        if let Some(entry) = self.entries.get_mut(id.0) {
            if !entry.visible {
                entry.visible = true;
                self.redraw_requested = true;
            }
        }
    }

    /// Hide a window and request a redraw pass.
    pub fn hide(&mut self, id: WindowId) {
        if let Some(entry) = self.entries.get_mut(id.0) {
            if entry.visible {
                entry.visible = false;
                self.redraw_requested = true;
            }
        }
    }

    /// Whether a window is currently visible.
    #[must_use]
    pub fn is_visible(&self, id: WindowId) -> bool {
        self.entries.get(id.0).is_some_and(|e| e.visible)
    }

    // ── Redraw requests ─────────────────────────────────────────────────

    /// Request a draw on the next [`redraw`](Self::redraw) pass.
    pub fn request_redraw(&mut self) {
        self.redraw_requested = true;
    }

    /// Force placement to rerun on the next pass.
    pub fn request_placement(&mut self) {
        self.placement_dirty = true;
    }

    // ── Focus ───────────────────────────────────────────────────────────

    /// The focused window, if any.
    #[must_use]
    pub fn focused(&self) -> Option<WindowId> {
        self.focus.map(WindowId)
    }

    /// Whether the given window holds keyboard focus.
    #[must_use]
    pub fn is_focused(&self, id: WindowId) -> bool {
        self.focus == Some(id.0)
    }

    /// Move focus to a specific window. Returns `false` (focus
    /// unchanged) if the window does not accept focus.
    pub fn focus(&mut self, id: WindowId) -> bool {
        match self.entries.get(id.0) {
            Some(entry) if entry.window.can_focus() => {
                if self.focus != Some(id.0) {
                    self.focus = Some(id.0);
                    self.redraw_requested = true;
                }
                true
            }
            _ => false,
        }
    }

    /// Advance focus to the next focusable window, wrapping past the
    /// tail to the head.
    ///
    /// With zero focusable windows this is a no-op: focus is left
    /// unchanged. (The alternative — spinning until one appears — can
    /// never terminate.)
    pub fn focus_next(&mut self) {
        if self.entries.is_empty() {
            return;
        }

        let start = self.focus.map_or(0, |f| f + 1);
        for step in 0..self.entries.len() {
            let idx = (start + step) % self.entries.len();
            if self.entries[idx].window.can_focus() {
                if self.focus != Some(idx) {
                    tracing::trace!(from = ?self.focus, to = idx, "focus moved");
                    self.focus = Some(idx);
                    self.redraw_requested = true;
                }
                return;
            }
        }
        // No focusable window exists — leave focus untouched.
    }

    // ── Input ───────────────────────────────────────────────────────────

    /// Route one key event to the focused window.
    ///
    /// Any state change a window makes in response warrants a redraw,
    /// so one is requested unconditionally. Returns the window's
    /// command string, if it produced one, for the host loop to
    /// interpret.
    pub fn dispatch_key(&mut self, key: &KeyEvent) -> Option<String> {
        let idx = self.focus?;
        self.redraw_requested = true;
        self.entries[idx].window.on_key(key)
    }

    // ── Redraw protocol ─────────────────────────────────────────────────

    /// Run one redraw pass against the screen backend.
    ///
    /// See the module docs for the protocol. Cheap when idle: with no
    /// resize, no placement change, and no redraw request, this returns
    /// without touching the backend beyond the resize poll.
    ///
    /// # Errors
    ///
    /// Propagates backend write/commit errors.
    pub fn redraw(&mut self, screen: &mut dyn Backend) -> Result<()> {
        if screen.detect_resize() {
            self.placement_dirty = true;
        }

        let device = screen.size();
        let placed = self.placement_dirty;
        if placed {
            tracing::debug!(cols = device.cols, rows = device.rows, "placing windows");
            for entry in &mut self.entries {
                entry.window.place(device);
            }
            self.placement_dirty = false;
        }

        if !placed && !self.redraw_requested {
            return Ok(());
        }

        for entry in &mut self.entries {
            if entry.visible {
                let mut frame = Frame::new(screen, entry.window.rect());
                entry.window.draw(&mut frame)?;
            }
        }

        if placed {
            screen.force_redraw()?;
        } else {
            screen.commit()?;
        }

        self.restore_cursor(screen)?;
        self.redraw_requested = false;
        Ok(())
    }

    /// Draw one window (if visible) and commit the screen.
    ///
    /// The targeted counterpart of a full pass, for hosts that know
    /// only one window changed.
    ///
    /// # Errors
    ///
    /// Propagates backend write/commit errors.
    pub fn redraw_window(&mut self, id: WindowId, screen: &mut dyn Backend) -> Result<()> {
        let Some(entry) = self.entries.get_mut(id.0) else {
            return Ok(());
        };
        if entry.visible {
            let mut frame = Frame::new(screen, entry.window.rect());
            entry.window.draw(&mut frame)?;
            screen.commit()?;
            self.restore_cursor(screen)?;
        }
        Ok(())
    }

    /// Park the screen cursor where the focused window wants it, or
    /// hide it when there is nothing to park.
    fn restore_cursor(&self, screen: &mut dyn Backend) -> Result<()> {
        let focused = self
            .focus
            .map(|idx| &self.entries[idx])
            .filter(|e| e.visible);

        if let Some(entry) = focused {
            if let Some((cx, cy)) = entry.window.cursor() {
                let rect = entry.window.rect();
                return screen.show_cursor(rect.x.saturating_add(cx), rect.y.saturating_add(cy));
            }
        }
        screen.hide_cursor()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
