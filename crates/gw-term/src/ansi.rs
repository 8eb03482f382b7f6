// SPDX-License-Identifier: MIT
//
// ANSI escape sequence generation.
//
// Pure functions that write escape sequences to any `impl Write`. No
// state, no decisions about when to emit — that's the console backend's
// job. This module just knows the byte-level encoding of every terminal
// command the engine needs.
//
// All cursor positions are 0-indexed in our API and converted to
// 1-indexed for the terminal (ANSI CUP uses 1-based coordinates).
//
// All functions return `io::Result` propagated from the underlying
// writer. In practice they never fail when writing to the console's
// staging buffer (backed by a Vec).

use std::io::{self, Write};

use crate::cell::{Color, ColorAttr};

// ─── Cursor ─────────────────────────────────────────────────────────────────

/// Move the cursor to `(x, y)` using the CUP (Cursor Position) sequence.
#[inline]
pub fn cursor_to(w: &mut impl Write, x: u16, y: u16) -> io::Result<()> {
    write!(w, "\x1b[{};{}H", y + 1, x + 1)
}

/// Hide the cursor (DECTCEM reset).
#[inline]
pub fn cursor_hide(w: &mut impl Write) -> io::Result<()> {
    w.write_all(b"\x1b[?25l")
}

/// Show the cursor (DECTCEM set).
#[inline]
pub fn cursor_show(w: &mut impl Write) -> io::Result<()> {
    w.write_all(b"\x1b[?25h")
}

// ─── Screen ─────────────────────────────────────────────────────────────────

/// Clear the entire screen (ED 2).
#[inline]
pub fn clear_screen(w: &mut impl Write) -> io::Result<()> {
    w.write_all(b"\x1b[2J")
}

/// Reset all SGR attributes to terminal defaults (SGR 0).
#[inline]
pub fn reset(w: &mut impl Write) -> io::Result<()> {
    w.write_all(b"\x1b[0m")
}

/// Enter the alternate screen buffer (DEC Private Mode 1049).
///
/// The alternate screen preserves the original terminal content; exiting
/// restores it, which is what makes a full-screen application
/// non-destructive.
#[inline]
pub fn enter_alt_screen(w: &mut impl Write) -> io::Result<()> {
    w.write_all(b"\x1b[?1049h")
}

/// Exit the alternate screen buffer and restore original content.
#[inline]
pub fn exit_alt_screen(w: &mut impl Write) -> io::Result<()> {
    w.write_all(b"\x1b[?1049l")
}

// ─── Synchronized Output ────────────────────────────────────────────────────

/// Begin synchronized output (DEC Private Mode 2026).
///
/// The terminal buffers everything until [`end_sync`], so a frame's runs
/// land on screen at once instead of tearing.
#[inline]
pub fn begin_sync(w: &mut impl Write) -> io::Result<()> {
    w.write_all(b"\x1b[?2026h")
}

/// End synchronized output — the terminal renders the buffered frame.
#[inline]
pub fn end_sync(w: &mut impl Write) -> io::Result<()> {
    w.write_all(b"\x1b[?2026l")
}

// ─── Color Attribute ────────────────────────────────────────────────────────

/// Translate a palette index to the ANSI color ordering.
///
/// The palette packs channels attribute-style (blue = bit 0, red =
/// bit 2); ANSI SGR orders them the other way around (red = bit 0,
/// blue = bit 2). Swap the two channel bits, keep green and the
/// brightness bit.
#[inline]
#[must_use]
const fn ansi_index(color: Color) -> u8 {
    let idx = color.index();
    let bright = idx & 0b1000;
    let rgb = idx & 0b0111;
    bright | (rgb & 0b010) | ((rgb & 0b001) << 2) | ((rgb & 0b100) >> 2)
}

/// SGR parameter for a palette color as a foreground.
///
/// Dim colors use 30–37; bright colors use the 90–97 AIX extension,
/// which every contemporary terminal understands.
#[inline]
#[must_use]
const fn fg_code(color: Color) -> u8 {
    let idx = ansi_index(color);
    if idx < 8 { 30 + idx } else { 90 + (idx - 8) }
}

/// SGR parameter for a palette color as a background (40–47 / 100–107).
#[inline]
#[must_use]
const fn bg_code(color: Color) -> u8 {
    let idx = ansi_index(color);
    if idx < 8 { 40 + idx } else { 100 + (idx - 8) }
}

/// Emit the full SGR sequence for a packed attribute.
///
/// Both halves are always emitted in one CSI sequence
/// (`\x1b[<fg>;<bg>m`) — deciding whether emission is needed at all is
/// the caller's state tracking, not this module's.
pub fn sgr_attr(w: &mut impl Write, attr: ColorAttr) -> io::Result<()> {
    write!(w, "\x1b[{};{}m", fg_code(attr.fg()), bg_code(attr.bg()))
}

// ─── Tests ──────────────────────────────────────────────────────────────────
