// SPDX-License-Identifier: MIT
//
// BufferedBackend — the differential double buffer.
//
// The central performance mechanism of the engine. Every cell holds a
// shadow pair: the value most recently written (`current`) and the value
// most recently forwarded to the wrapped backend (`flushed`). Writes are
// pure memory stores — no I/O, O(1) each, and only the final value of an
// overwritten cell ever reaches the device. Commit walks the grid and
// forwards exactly the cells whose current value differs from what was
// last flushed, so redraw cost is proportional to the number of *changed*
// cells, not to the grid area. Whole-window repaints happen on every
// keypress in the worst case; this is what makes them cheap.
//
// The buffer is mounted on its wrapped backend at an offset. The offset
// survives resizes and changes only on an explicit reposition.
//
// Storage is a flat row-major Vec of shadow pairs, over-allocated with a
// doubling growth rule: a dimension-growing resize sequence costs
// O(log n) reallocations, and shrinking never reallocates. Cells exposed
// by growth start with `flushed = None` — "never forwarded" — so the
// first real content drawn there always reaches the wrapped backend.

use std::time::Duration;

use crate::backend::{Backend, BackendError, BoundsPolicy, Result};
use crate::cell::Cell;
use crate::geom::{Rect, Size};
use crate::input::KeyEvent;

// ─── Shadow pair ────────────────────────────────────────────────────────────

/// Per-cell shadow state: what was written vs. what was forwarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Slot {
    /// The most recently written value.
    current: Cell,
    /// The value last forwarded to the wrapped backend; `None` until the
    /// cell has been forwarded at least once.
    flushed: Option<Cell>,
}

impl Slot {
    /// A never-written, never-forwarded cell.
    const VACANT: Self = Self {
        current: Cell::BLANK,
        flushed: None,
    };

    #[inline]
    fn dirty(self) -> bool {
        self.flushed != Some(self.current)
    }
}

// ─── BufferedBackend ────────────────────────────────────────────────────────

/// A differential double buffer mounted on another backend.
///
/// Wraps any [`Backend`] and presents the same contract; `commit`
/// forwards only changed cells, translated by the mount offset, then
/// commits the wrapped backend.
///
/// # Examples
///
/// ```
/// use gw_term::backend::Backend;
/// use gw_term::buffer::BufferedBackend;
/// use gw_term::cell::{Cell, ColorAttr};
/// use gw_term::mem::MemoryBackend;
///
/// let mut buf = BufferedBackend::covering(MemoryBackend::new(80, 24));
/// buf.write_cell(0, 0, Cell::new('H', ColorAttr::DEFAULT))?;
/// buf.write_cell(1, 0, Cell::new('I', ColorAttr::DEFAULT))?;
/// buf.commit()?;
/// assert_eq!(buf.inner().read_cell(0, 0)?.ch, 'H');
/// # Ok::<(), gw_term::backend::BackendError>(())
/// ```
#[derive(Debug)]
pub struct BufferedBackend<B: Backend> {
    inner: B,
    /// Where this buffer is mounted on the wrapped backend.
    offset: (u16, u16),
    size: Size,
    /// Flat row-major shadow pairs. `len() >= size.area()`; entries past
    /// the logical area are spare capacity from the doubling rule.
    slots: Vec<Slot>,
    policy: BoundsPolicy,
}

impl<B: Backend> BufferedBackend<B> {
    /// Mount a buffer on `inner` at the given placement rectangle.
    #[must_use]
    pub fn new(inner: B, placement: Rect) -> Self {
        let size = placement.size();
        Self {
            inner,
            offset: (placement.x, placement.y),
            size,
            slots: vec![Slot::VACANT; size.area().max(1)],
            policy: BoundsPolicy::default(),
        }
    }

    /// Mount a buffer covering the whole of `inner` at the origin.
    #[must_use]
    pub fn covering(inner: B) -> Self {
        let size = inner.size();
        Self::new(inner, size.to_rect())
    }

    /// Set the out-of-range policy (builder style).
    #[must_use]
    pub fn with_policy(mut self, policy: BoundsPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The wrapped backend.
    #[inline]
    pub fn inner(&self) -> &B {
        &self.inner
    }

    /// The wrapped backend, mutably.
    #[inline]
    pub fn inner_mut(&mut self) -> &mut B {
        &mut self.inner
    }

    /// Consume the buffer and return the wrapped backend.
    pub fn into_inner(self) -> B {
        self.inner
    }

    /// The mount offset on the wrapped backend.
    #[inline]
    #[must_use]
    pub const fn offset(&self) -> (u16, u16) {
        self.offset
    }

    /// Move the mount offset. This is the only way the offset changes —
    /// it is invariant across resizes.
    pub const fn reposition(&mut self, x: u16, y: u16) {
        self.offset = (x, y);
    }

    #[inline]
    fn index(&self, x: u16, y: u16) -> usize {
        y as usize * self.size.cols as usize + x as usize
    }

    /// Forward every dirty cell (or, when `all` is set, every cell) to
    /// the wrapped backend and sync the shadow state.
    fn flush_cells(&mut self, all: bool) -> Result<()> {
        let (ox, oy) = self.offset;
        let mut forwarded = 0usize;

        for y in 0..self.size.rows {
            for x in 0..self.size.cols {
                let idx = self.index(x, y);
                let slot = self.slots[idx];
                if all || slot.dirty() {
                    self.inner
                        .write_cell(ox.saturating_add(x), oy.saturating_add(y), slot.current)?;
                    self.slots[idx].flushed = Some(slot.current);
                    forwarded += 1;
                }
            }
        }

        tracing::trace!(forwarded, total = self.size.area(), all, "buffer flush");
        self.inner.commit()
    }
}

impl<B: Backend> Backend for BufferedBackend<B> {
    fn size(&self) -> Size {
        self.size
    }

    fn write_cell(&mut self, x: u16, y: u16, cell: Cell) -> Result<()> {
        if self.policy.admit(self.size, x, y)? {
            let idx = self.index(x, y);
            self.slots[idx].current = cell;
        }
        Ok(())
    }

    fn read_cell(&self, x: u16, y: u16) -> Result<Cell> {
        if self.size.contains(x, y) {
            Ok(self.slots[self.index(x, y)].current)
        } else {
            Err(BackendError::OutOfRange {
                x,
                y,
                cols: self.size.cols,
                rows: self.size.rows,
            })
        }
    }

    /// Resize the buffer, preserving content at unchanged coordinates.
    ///
    /// The wrapped backend is told first (depth-first propagation: the
    /// device-facing grid learns of a geometry change before the shadow
    /// buffer grows). Storage only grows, by doubling; shrinking keeps
    /// the allocation.
    fn resize(&mut self, cols: u16, rows: u16) {
        self.inner.resize(cols, rows);

        let old = self.size;
        let new = Size::new(cols, rows);
        let needed = new.area();
        let copy_cols = old.cols.min(new.cols);
        let copy_rows = old.rows.min(new.rows);

        let old_idx = |x: u16, y: u16| y as usize * old.cols as usize + x as usize;
        let new_idx = |x: u16, y: u16| y as usize * new.cols as usize + x as usize;

        if needed > self.slots.len() {
            // Grow: fresh allocation at the next doubling step, row copy.
            let mut cap = self.slots.len().max(1);
            while cap < needed {
                cap *= 2;
            }
            let mut next = vec![Slot::VACANT; cap];
            for y in 0..copy_rows {
                for x in 0..copy_cols {
                    next[new_idx(x, y)] = self.slots[old_idx(x, y)];
                }
            }
            self.slots = next;
        } else {
            // Reuse the allocation, remapping rows in place. Direction
            // matters: narrowing moves cells to lower indices (scan
            // forward), widening to higher ones (scan backward).
            if new.cols <= old.cols {
                for y in 0..copy_rows {
                    for x in 0..copy_cols {
                        self.slots[new_idx(x, y)] = self.slots[old_idx(x, y)];
                    }
                }
            } else {
                for y in (0..copy_rows).rev() {
                    for x in (0..copy_cols).rev() {
                        self.slots[new_idx(x, y)] = self.slots[old_idx(x, y)];
                    }
                }
            }
            // Vacate every position of the new grid that wasn't copied —
            // it holds stale bytes from the old layout.
            for y in 0..new.rows {
                for x in 0..new.cols {
                    if x >= copy_cols || y >= copy_rows {
                        self.slots[new_idx(x, y)] = Slot::VACANT;
                    }
                }
            }
        }

        self.size = new;
    }

    /// Forward every changed cell, then commit the wrapped backend.
    ///
    /// After this returns, `current == flushed` for every cell: an
    /// immediate second commit forwards nothing.
    fn commit(&mut self) -> Result<()> {
        self.flush_cells(false)
    }

    /// Forward every cell unconditionally, then commit the wrapped
    /// backend.
    ///
    /// Used for full-screen repaints (e.g. after window repositioning)
    /// where the shadow state across a moved region cannot be trusted.
    fn force_redraw(&mut self) -> Result<()> {
        self.flush_cells(true)
    }

    fn read_event(&mut self) -> Result<KeyEvent> {
        self.inner.read_event()
    }

    fn poll_event(&mut self, timeout: Duration) -> Result<Option<KeyEvent>> {
        self.inner.poll_event(timeout)
    }

    /// Poll the wrapped backend for a device resize; when one happened,
    /// grow this buffer to the device's new dimensions (the mount offset
    /// is untouched).
    fn detect_resize(&mut self) -> bool {
        if self.inner.detect_resize() {
            let size = self.inner.size();
            self.resize(size.cols, size.rows);
            true
        } else {
            false
        }
    }

    fn show_cursor(&mut self, x: u16, y: u16) -> Result<()> {
        let (ox, oy) = self.offset;
        self.inner
            .show_cursor(ox.saturating_add(x), oy.saturating_add(y))
    }

    fn hide_cursor(&mut self) -> Result<()> {
        self.inner.hide_cursor()
    }

    fn cursor_position(&self) -> Option<(u16, u16)> {
        self.inner.cursor_position()
    }

    fn cursor_visible(&self) -> bool {
        self.inner.cursor_visible()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::cell::{Color, ColorAttr};
    use crate::mem::MemoryBackend;

    /// Backend that records every forwarded write and commit.
    struct Recorder {
        grid: MemoryBackend,
        writes: Vec<(u16, u16, Cell)>,
        commits: usize,
    }

    impl Recorder {
        fn new(cols: u16, rows: u16) -> Self {
            Self {
                grid: MemoryBackend::new(cols, rows),
                writes: Vec::new(),
                commits: 0,
            }
        }
    }

    impl Backend for Recorder {
        fn size(&self) -> Size {
            self.grid.size()
        }

        fn write_cell(&mut self, x: u16, y: u16, cell: Cell) -> Result<()> {
            self.writes.push((x, y, cell));
            self.grid.write_cell(x, y, cell)
        }

        fn read_cell(&self, x: u16, y: u16) -> Result<Cell> {
            self.grid.read_cell(x, y)
        }

        fn resize(&mut self, cols: u16, rows: u16) {
            self.grid.resize(cols, rows);
        }

        fn commit(&mut self) -> Result<()> {
            self.commits += 1;
            Ok(())
        }
    }

    fn cell(ch: char) -> Cell {
        Cell::new(ch, ColorAttr::DEFAULT)
    }

    fn styled(ch: char) -> Cell {
        Cell::new(ch, ColorAttr::new(Color::White, Color::Blue))
    }

    // ── Diff correctness ────────────────────────────────────────────────

    #[test]
    fn commit_forwards_only_changed_cells() {
        let mut buf = BufferedBackend::covering(Recorder::new(10, 3));
        buf.commit().unwrap();
        buf.inner_mut().writes.clear();

        buf.write_cell(2, 1, cell('A')).unwrap();
        buf.write_cell(7, 2, cell('B')).unwrap();
        buf.commit().unwrap();

        let writes = &buf.inner().writes;
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0], (2, 1, cell('A')));
        assert_eq!(writes[1], (7, 2, cell('B')));
    }

    #[test]
    fn overwrites_before_commit_forward_final_value_once() {
        let mut buf = BufferedBackend::covering(Recorder::new(5, 1));
        buf.commit().unwrap();
        buf.inner_mut().writes.clear();

        buf.write_cell(0, 0, cell('a')).unwrap();
        buf.write_cell(0, 0, cell('b')).unwrap();
        buf.write_cell(0, 0, cell('c')).unwrap();
        buf.commit().unwrap();

        assert_eq!(buf.inner().writes, vec![(0, 0, cell('c'))]);
    }

    #[test]
    fn rewriting_same_value_forwards_nothing() {
        let mut buf = BufferedBackend::covering(Recorder::new(5, 1));
        buf.write_cell(1, 0, cell('x')).unwrap();
        buf.commit().unwrap();
        buf.inner_mut().writes.clear();

        // Same value again: not a change.
        buf.write_cell(1, 0, cell('x')).unwrap();
        buf.commit().unwrap();

        assert!(buf.inner().writes.is_empty());
    }

    #[test]
    fn attr_only_change_is_forwarded() {
        let mut buf = BufferedBackend::covering(Recorder::new(5, 1));
        buf.write_cell(0, 0, cell('x')).unwrap();
        buf.commit().unwrap();
        buf.inner_mut().writes.clear();

        buf.write_cell(0, 0, styled('x')).unwrap();
        buf.commit().unwrap();

        assert_eq!(buf.inner().writes, vec![(0, 0, styled('x'))]);
    }

    // ── Idempotence ─────────────────────────────────────────────────────

    #[test]
    fn second_commit_forwards_nothing() {
        let mut buf = BufferedBackend::covering(Recorder::new(10, 3));
        buf.write_cell(3, 1, cell('Z')).unwrap();
        buf.commit().unwrap();
        buf.inner_mut().writes.clear();

        buf.commit().unwrap();

        assert!(buf.inner().writes.is_empty());
        // The wrapped backend is still committed each time.
        assert_eq!(buf.inner().commits, 2);
    }

    // ── First commit / vacant state ─────────────────────────────────────

    #[test]
    fn first_commit_forwards_everything() {
        // Every slot starts never-forwarded, so the first commit pushes
        // the full (blank) grid down.
        let mut buf = BufferedBackend::covering(Recorder::new(4, 2));
        buf.commit().unwrap();
        assert_eq!(buf.inner().writes.len(), 8);
    }

    // ── forceRedraw completeness ────────────────────────────────────────

    #[test]
    fn force_redraw_forwards_every_cell_once() {
        let mut buf = BufferedBackend::covering(Recorder::new(6, 2));
        buf.write_cell(0, 0, cell('q')).unwrap();
        buf.commit().unwrap();
        buf.inner_mut().writes.clear();

        buf.force_redraw().unwrap();
        assert_eq!(buf.inner().writes.len(), 12);

        // And the shadow state is synced: nothing left to flush.
        buf.inner_mut().writes.clear();
        buf.commit().unwrap();
        assert!(buf.inner().writes.is_empty());
    }

    // ── Offset mounting ─────────────────────────────────────────────────

    #[test]
    fn writes_are_translated_by_the_mount_offset() {
        let mut buf = BufferedBackend::new(Recorder::new(20, 10), Rect::new(5, 3, 4, 2));
        buf.write_cell(0, 0, cell('#')).unwrap();
        buf.write_cell(3, 1, cell('%')).unwrap();
        buf.commit().unwrap();

        let writes = &buf.inner().writes;
        assert!(writes.contains(&(5, 3, cell('#'))));
        assert!(writes.contains(&(8, 4, cell('%'))));
    }

    #[test]
    fn reposition_moves_the_offset() {
        let mut buf = BufferedBackend::new(Recorder::new(20, 10), Rect::new(0, 0, 3, 1));
        assert_eq!(buf.offset(), (0, 0));
        buf.reposition(10, 5);
        assert_eq!(buf.offset(), (10, 5));

        buf.write_cell(0, 0, cell('@')).unwrap();
        buf.commit().unwrap();
        assert!(buf.inner().writes.contains(&(10, 5, cell('@'))));
    }

    #[test]
    fn resize_does_not_move_the_offset() {
        let mut buf = BufferedBackend::new(Recorder::new(40, 20), Rect::new(7, 2, 5, 5));
        buf.resize(9, 9);
        assert_eq!(buf.offset(), (7, 2));
    }

    // ── Bounds policy ───────────────────────────────────────────────────

    #[test]
    fn out_of_range_write_ignored_by_default() {
        let mut buf = BufferedBackend::covering(Recorder::new(5, 2));
        buf.commit().unwrap();
        buf.inner_mut().writes.clear();

        buf.write_cell(5, 0, cell('X')).unwrap();
        buf.write_cell(0, 2, cell('X')).unwrap();
        buf.commit().unwrap();
        assert!(buf.inner().writes.is_empty());
    }

    #[test]
    fn out_of_range_write_errors_when_strict() {
        let mut buf = BufferedBackend::covering(Recorder::new(5, 2))
            .with_policy(BoundsPolicy::Strict);
        assert!(matches!(
            buf.write_cell(5, 0, cell('X')),
            Err(BackendError::OutOfRange { .. })
        ));
    }

    #[test]
    fn read_cell_returns_current_value() {
        let mut buf = BufferedBackend::covering(Recorder::new(5, 2));
        buf.write_cell(2, 1, styled('k')).unwrap();
        // Readable before any commit — reads see the current half.
        assert_eq!(buf.read_cell(2, 1).unwrap(), styled('k'));
        assert!(buf.read_cell(5, 0).is_err());
    }

    // ── Growth invariant ────────────────────────────────────────────────

    #[test]
    fn grow_preserves_content_at_unchanged_coordinates() {
        let mut buf = BufferedBackend::covering(Recorder::new(4, 3));
        buf.write_cell(0, 0, cell('a')).unwrap();
        buf.write_cell(3, 2, cell('b')).unwrap();
        buf.write_cell(1, 1, styled('c')).unwrap();

        buf.resize(10, 8);

        assert_eq!(buf.size(), Size::new(10, 8));
        assert_eq!(buf.read_cell(0, 0).unwrap(), cell('a'));
        assert_eq!(buf.read_cell(3, 2).unwrap(), cell('b'));
        assert_eq!(buf.read_cell(1, 1).unwrap(), styled('c'));
        // Newly exposed region reads blank.
        assert_eq!(buf.read_cell(9, 7).unwrap(), Cell::BLANK);
    }

    #[test]
    fn repeated_growth_keeps_capacity_sufficient() {
        let mut buf = BufferedBackend::covering(Recorder::new(2, 2));
        for step in 1..=6u16 {
            let side = 2 + step * 3;
            buf.resize(side, side);
            assert_eq!(buf.size().area(), usize::from(side) * usize::from(side));
            assert!(buf.slots.len() >= buf.size().area());
        }
    }

    #[test]
    fn capacity_doubles_rather_than_tracking_area() {
        let mut buf = BufferedBackend::covering(Recorder::new(4, 2)); // 8 slots
        buf.resize(5, 2); // 10 needed → doubles to 16
        assert_eq!(buf.slots.len(), 16);
        buf.resize(5, 3); // 15 needed → still fits
        assert_eq!(buf.slots.len(), 16);
        buf.resize(5, 4); // 20 needed → doubles to 32
        assert_eq!(buf.slots.len(), 32);
    }

    #[test]
    fn shrink_never_reallocates() {
        let mut buf = BufferedBackend::covering(Recorder::new(10, 10));
        let cap = buf.slots.len();
        buf.resize(3, 3);
        assert_eq!(buf.slots.len(), cap);
        buf.resize(8, 8);
        assert_eq!(buf.slots.len(), cap);
    }

    #[test]
    fn shrink_then_grow_preserves_surviving_content() {
        let mut buf = BufferedBackend::covering(Recorder::new(10, 4));
        buf.write_cell(1, 1, cell('k')).unwrap();
        buf.write_cell(9, 3, cell('z')).unwrap();

        buf.resize(5, 2); // 'z' is gone, 'k' survives
        assert_eq!(buf.read_cell(1, 1).unwrap(), cell('k'));

        buf.resize(10, 4); // region re-exposed, blank again
        assert_eq!(buf.read_cell(1, 1).unwrap(), cell('k'));
        assert_eq!(buf.read_cell(9, 3).unwrap(), Cell::BLANK);
    }

    #[test]
    fn widening_within_capacity_remaps_rows() {
        // 3x4 = 12 slots. Resize to 5x2 = 10 — fits in place but the
        // rows must shift to higher indices (backward remap).
        let mut buf = BufferedBackend::covering(Recorder::new(3, 4));
        buf.write_cell(0, 0, cell('a')).unwrap();
        buf.write_cell(2, 0, cell('b')).unwrap();
        buf.write_cell(1, 1, cell('c')).unwrap();

        buf.resize(5, 2);

        assert_eq!(buf.read_cell(0, 0).unwrap(), cell('a'));
        assert_eq!(buf.read_cell(2, 0).unwrap(), cell('b'));
        assert_eq!(buf.read_cell(1, 1).unwrap(), cell('c'));
        // Newly exposed columns are blank, not stale row-2 data.
        assert_eq!(buf.read_cell(3, 0).unwrap(), Cell::BLANK);
        assert_eq!(buf.read_cell(4, 1).unwrap(), Cell::BLANK);
    }

    #[test]
    fn newly_exposed_region_is_flushed_on_next_commit() {
        let mut buf = BufferedBackend::covering(Recorder::new(3, 1));
        buf.commit().unwrap();
        buf.inner_mut().writes.clear();

        buf.resize(6, 1);
        buf.commit().unwrap();

        // The three new cells were never forwarded — they differ from
        // "nothing drawn yet" and must flush even though blank.
        let new_cols: Vec<u16> = buf
            .inner()
            .writes
            .iter()
            .map(|&(x, _, _)| x)
            .collect();
        assert_eq!(new_cols, vec![3, 4, 5]);
    }

    // ── Resize propagation ──────────────────────────────────────────────

    #[test]
    fn resize_reaches_the_wrapped_backend_first() {
        let mut buf = BufferedBackend::covering(Recorder::new(4, 4));
        buf.resize(8, 8);
        assert_eq!(buf.inner().size(), Size::new(8, 8));
    }

    // ── End to end: 10×3 grid, "HI" at (0,0) ────────────────────────────

    #[test]
    fn scenario_hi_then_identical_hi() {
        let attr = ColorAttr::from_raw(0x0F); // white on black
        let mut buf = BufferedBackend::covering(Recorder::new(10, 3));
        buf.commit().unwrap(); // settle the vacant grid
        buf.inner_mut().writes.clear();

        buf.write_cell(0, 0, Cell::new('H', attr)).unwrap();
        buf.write_cell(1, 0, Cell::new('I', attr)).unwrap();
        buf.commit().unwrap();

        assert_eq!(
            buf.inner().writes,
            vec![(0, 0, Cell::new('H', attr)), (1, 0, Cell::new('I', attr))]
        );

        // The same "HI" again, same attribute: zero forwarded writes.
        buf.inner_mut().writes.clear();
        buf.write_cell(0, 0, Cell::new('H', attr)).unwrap();
        buf.write_cell(1, 0, Cell::new('I', attr)).unwrap();
        buf.commit().unwrap();
        assert_eq!(buf.inner().writes, vec![]);
    }

    // ── Stacked buffers ─────────────────────────────────────────────────

    #[test]
    fn buffers_compose_transparently() {
        // A buffer over a buffer over a recorder: the middle layer
        // absorbs the diff, the innermost sees one write per change.
        let inner = BufferedBackend::covering(Recorder::new(6, 2));
        let mut outer = BufferedBackend::covering(inner);
        outer.commit().unwrap();
        outer.inner_mut().inner_mut().writes.clear();

        outer.write_cell(2, 0, cell('m')).unwrap();
        outer.commit().unwrap();

        assert_eq!(outer.inner().inner().writes, vec![(2, 0, cell('m'))]);
    }
}
