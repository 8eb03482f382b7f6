// SPDX-License-Identifier: MIT
//
// Terminal input parser — raw stdin bytes to key events.
//
// Handles the input this engine actually consumes: keys. That means
//
// - printable characters, including multi-byte UTF-8
// - control characters (Ctrl+letter, Enter, Tab, Backspace)
// - legacy CSI sequences (arrows, Home/End, paging, Delete, F-keys)
//   with xterm modifier parameters
// - SS3 sequences (F1–F4 and arrows from application-mode terminals)
// - Alt+key (ESC followed by a printable character)
//
// The parser keeps a small internal byte buffer because escape
// sequences can span multiple `read()` calls. Feed bytes with
// [`Parser::advance`]; after a short timeout with no new bytes, call
// [`Parser::flush`] to emit a pending lone ESC as a real Escape
// keypress — a bare 0x1B is ambiguous until we know nothing follows it.

use bitflags::bitflags;

// ─── Key Types ──────────────────────────────────────────────────────────────

bitflags! {
    /// Keyboard modifier flags.
    ///
    /// Matches the xterm CSI modifier encoding (`param = 1 + bitmask`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
    pub struct Modifiers: u8 {
        const SHIFT = 0b0000_0001;
        const ALT   = 0b0000_0010;
        const CTRL  = 0b0000_0100;
    }
}

/// Identity of a key.
///
/// Printable characters use [`Char`](KeyCode::Char); named keys have
/// dedicated variants; function keys F1–F12 use [`F`](KeyCode::F).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyCode {
    /// A Unicode character (printable).
    Char(char),
    Enter,
    Tab,
    Backspace,
    Escape,
    Delete,
    Insert,
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    PageUp,
    PageDown,
    /// F1 through F12.
    F(u8),
}

/// A keyboard event: key identity plus active modifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyEvent {
    /// Which key was pressed.
    pub code: KeyCode,
    /// Active modifier keys.
    pub modifiers: Modifiers,
}

impl KeyEvent {
    /// Create a key event.
    #[inline]
    #[must_use]
    pub const fn new(code: KeyCode, modifiers: Modifiers) -> Self {
        Self { code, modifiers }
    }

    /// A key event with no modifiers.
    #[inline]
    #[must_use]
    pub const fn plain(code: KeyCode) -> Self {
        Self::new(code, Modifiers::empty())
    }

    /// The printable character, if this event is an unmodified
    /// character key (Shift is allowed — it's already folded into the
    /// character itself).
    #[must_use]
    pub fn printable(self) -> Option<char> {
        match self.code {
            KeyCode::Char(ch)
                if !self.modifiers.intersects(Modifiers::CTRL | Modifiers::ALT) =>
            {
                Some(ch)
            }
            _ => None,
        }
    }
}

impl From<KeyCode> for KeyEvent {
    fn from(code: KeyCode) -> Self {
        Self::plain(code)
    }
}

// ─── Parser ─────────────────────────────────────────────────────────────────

/// Outcome of trying to parse one event from the front of the buffer.
enum Step {
    /// An event was parsed; consume this many bytes.
    Event(KeyEvent, usize),
    /// Recognized but uninteresting bytes; consume and continue.
    Skip(usize),
    /// Not enough bytes yet — wait for more input.
    Incomplete,
}

/// Incremental key event parser.
///
/// # Examples
///
/// ```
/// use gw_term::input::{KeyCode, Parser};
///
/// let mut parser = Parser::new();
/// let events = parser.advance(b"a\x1b[A");
/// assert_eq!(events[0].code, KeyCode::Char('a'));
/// assert_eq!(events[1].code, KeyCode::Up);
/// ```
#[derive(Debug, Default)]
pub struct Parser {
    /// Accumulated raw bytes waiting to be parsed.
    buf: Vec<u8>,
}

impl Parser {
    /// Create an empty parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Whether bytes are buffered waiting for a sequence to complete.
    #[inline]
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.buf.is_empty()
    }

    /// Feed raw bytes and collect every complete key event.
    ///
    /// Incomplete trailing sequences stay buffered for the next call.
    pub fn advance(&mut self, bytes: &[u8]) -> Vec<KeyEvent> {
        self.buf.extend_from_slice(bytes);
        let mut events = Vec::new();

        while !self.buf.is_empty() {
            match parse_one(&self.buf) {
                Step::Event(event, consumed) => {
                    self.buf.drain(..consumed);
                    events.push(event);
                }
                Step::Skip(consumed) => {
                    self.buf.drain(..consumed);
                }
                Step::Incomplete => break,
            }
        }

        events
    }

    /// Resolve pending bytes after an input lull.
    ///
    /// A buffered lone ESC becomes a real Escape keypress; anything
    /// after it is re-parsed as ordinary input. A partial UTF-8
    /// character that never completed is dropped.
    pub fn flush(&mut self) -> Vec<KeyEvent> {
        if self.buf.is_empty() {
            return Vec::new();
        }

        let pending = std::mem::take(&mut self.buf);
        let mut events = Vec::new();

        if pending[0] == 0x1b {
            events.push(KeyEvent::plain(KeyCode::Escape));
            events.extend(self.advance(&pending[1..]));
        }
        // Non-ESC pending bytes are a truncated UTF-8 sequence that will
        // never complete — discard.

        events
    }
}

// ─── Byte-Level Parsing ─────────────────────────────────────────────────────

/// Decode xterm's CSI modifier parameter (`param = 1 + bitmask`).
fn modifiers_from_param(param: u16) -> Modifiers {
    let bits = param.saturating_sub(1);
    let mut mods = Modifiers::empty();
    if bits & 1 != 0 {
        mods |= Modifiers::SHIFT;
    }
    if bits & 2 != 0 {
        mods |= Modifiers::ALT;
    }
    if bits & 4 != 0 {
        mods |= Modifiers::CTRL;
    }
    mods
}

/// Try to parse one event from the front of `buf`.
fn parse_one(buf: &[u8]) -> Step {
    match buf[0] {
        0x1b => parse_escape(buf),
        b'\r' | b'\n' => Step::Event(KeyEvent::plain(KeyCode::Enter), 1),
        b'\t' => Step::Event(KeyEvent::plain(KeyCode::Tab), 1),
        0x7f | 0x08 => Step::Event(KeyEvent::plain(KeyCode::Backspace), 1),
        // Ctrl+letter: 0x01..0x1A maps to a..z.
        b @ 0x01..=0x1a => Step::Event(
            KeyEvent::new(KeyCode::Char((b + 0x60) as char), Modifiers::CTRL),
            1,
        ),
        // Remaining C0 controls we don't map.
        0x00 | 0x1c..=0x1f => Step::Skip(1),
        // Printable ASCII and UTF-8.
        _ => parse_char(buf, Modifiers::empty()),
    }
}

/// Parse a sequence starting with ESC.
fn parse_escape(buf: &[u8]) -> Step {
    if buf.len() < 2 {
        // Lone ESC: ambiguous until more bytes arrive (or a timeout
        // flushes it as the Escape key).
        return Step::Incomplete;
    }

    match buf[1] {
        b'[' => parse_csi(buf),
        b'O' => parse_ss3(buf),
        // ESC ESC: the first one is a real Escape keypress.
        0x1b => Step::Event(KeyEvent::plain(KeyCode::Escape), 1),
        // Alt+key: ESC followed by an ordinary byte.
        _ => match parse_char(&buf[1..], Modifiers::ALT) {
            Step::Event(event, consumed) => Step::Event(event, consumed + 1),
            Step::Skip(consumed) => Step::Skip(consumed + 1),
            Step::Incomplete => Step::Incomplete,
        },
    }
}

/// Parse a CSI sequence: `ESC [ params final`.
fn parse_csi(buf: &[u8]) -> Step {
    // Find the final byte (0x40..=0x7E ends a CSI sequence).
    let Some(end) = buf[2..].iter().position(|&b| (0x40..=0x7e).contains(&b)) else {
        return Step::Incomplete;
    };
    let final_byte = buf[2 + end];
    let consumed = 2 + end + 1;

    // Parameters: semicolon-separated decimal numbers between the
    // introducer and the final byte. Parsed straight off the bytes —
    // no intermediate String.
    let mut params = [0u16; 4];
    let mut count = 0;
    let mut current: Option<u16> = None;
    for &b in &buf[2..2 + end] {
        match b {
            b'0'..=b'9' => {
                let digit = u16::from(b - b'0');
                current = Some(current.unwrap_or(0).saturating_mul(10).saturating_add(digit));
            }
            b';' => {
                if count < params.len() {
                    params[count] = current.take().unwrap_or(0);
                    count += 1;
                }
                current = None;
            }
            // Unknown intermediate byte (private-mode sequences etc.)
            // — not a key, drop the whole sequence.
            _ => return Step::Skip(consumed),
        }
    }
    if let Some(value) = current {
        if count < params.len() {
            params[count] = value;
            count += 1;
        }
    }

    // The modifier parameter is the second one when present.
    let mods = if count >= 2 {
        modifiers_from_param(params[1])
    } else {
        Modifiers::empty()
    };

    let code = match final_byte {
        b'A' => Some(KeyCode::Up),
        b'B' => Some(KeyCode::Down),
        b'C' => Some(KeyCode::Right),
        b'D' => Some(KeyCode::Left),
        b'H' => Some(KeyCode::Home),
        b'F' => Some(KeyCode::End),
        b'~' => tilde_keycode(if count >= 1 { params[0] } else { 0 }),
        _ => None,
    };

    match code {
        Some(code) => Step::Event(KeyEvent::new(code, mods), consumed),
        None => Step::Skip(consumed),
    }
}

/// Key identity for `CSI <n> ~` editing/function sequences.
const fn tilde_keycode(param: u16) -> Option<KeyCode> {
    match param {
        1 | 7 => Some(KeyCode::Home),
        2 => Some(KeyCode::Insert),
        3 => Some(KeyCode::Delete),
        4 | 8 => Some(KeyCode::End),
        5 => Some(KeyCode::PageUp),
        6 => Some(KeyCode::PageDown),
        11 => Some(KeyCode::F(1)),
        12 => Some(KeyCode::F(2)),
        13 => Some(KeyCode::F(3)),
        14 => Some(KeyCode::F(4)),
        15 => Some(KeyCode::F(5)),
        17 => Some(KeyCode::F(6)),
        18 => Some(KeyCode::F(7)),
        19 => Some(KeyCode::F(8)),
        20 => Some(KeyCode::F(9)),
        21 => Some(KeyCode::F(10)),
        23 => Some(KeyCode::F(11)),
        24 => Some(KeyCode::F(12)),
        _ => None,
    }
}

/// Parse an SS3 sequence: `ESC O final` (application-mode keys, F1–F4).
fn parse_ss3(buf: &[u8]) -> Step {
    if buf.len() < 3 {
        return Step::Incomplete;
    }
    let code = match buf[2] {
        b'A' => Some(KeyCode::Up),
        b'B' => Some(KeyCode::Down),
        b'C' => Some(KeyCode::Right),
        b'D' => Some(KeyCode::Left),
        b'H' => Some(KeyCode::Home),
        b'F' => Some(KeyCode::End),
        b'P' => Some(KeyCode::F(1)),
        b'Q' => Some(KeyCode::F(2)),
        b'R' => Some(KeyCode::F(3)),
        b'S' => Some(KeyCode::F(4)),
        _ => None,
    };
    match code {
        Some(code) => Step::Event(KeyEvent::plain(code), 3),
        None => Step::Skip(3),
    }
}

/// Parse one character (ASCII or multi-byte UTF-8) with the given
/// modifiers already applied (used for Alt chords).
fn parse_char(buf: &[u8], mods: Modifiers) -> Step {
    let first = buf[0];

    // Control bytes reached via Alt (ESC CR, ESC TAB, ...) keep their
    // named-key identity with ALT added.
    if first < 0x20 || first == 0x7f {
        return match parse_one(buf) {
            Step::Event(event, consumed) => {
                Step::Event(KeyEvent::new(event.code, event.modifiers | mods), consumed)
            }
            other => other,
        };
    }

    let len = utf8_len(first);
    if len == 0 {
        // Continuation byte in lead position — garbage, skip it.
        return Step::Skip(1);
    }
    if buf.len() < len {
        return Step::Incomplete;
    }

    match std::str::from_utf8(&buf[..len]) {
        Ok(s) => {
            // len > 0 guarantees at least one char.
            let ch = s.chars().next().unwrap_or('\u{fffd}');
            Step::Event(KeyEvent::new(KeyCode::Char(ch), mods), len)
        }
        Err(_) => Step::Skip(1),
    }
}

/// Expected byte length of a UTF-8 sequence from its lead byte.
/// Returns 0 for continuation/invalid lead bytes.
const fn utf8_len(lead: u8) -> usize {
    match lead {
        0x00..=0x7f => 1,
        0xc0..=0xdf => 2,
        0xe0..=0xef => 3,
        0xf0..=0xf7 => 4,
        _ => 0,
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(bytes: &[u8]) -> Vec<KeyEvent> {
        Parser::new().advance(bytes)
    }

    // ── Plain characters ────────────────────────────────────────────────

    #[test]
    fn ascii_char() {
        let events = parse(b"a");
        assert_eq!(events, vec![KeyEvent::plain(KeyCode::Char('a'))]);
    }

    #[test]
    fn multiple_chars() {
        let events = parse(b"hi");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].code, KeyCode::Char('h'));
        assert_eq!(events[1].code, KeyCode::Char('i'));
    }

    #[test]
    fn utf8_two_byte() {
        let events = parse("é".as_bytes());
        assert_eq!(events, vec![KeyEvent::plain(KeyCode::Char('é'))]);
    }

    #[test]
    fn utf8_three_byte() {
        let events = parse("€".as_bytes());
        assert_eq!(events, vec![KeyEvent::plain(KeyCode::Char('€'))]);
    }

    #[test]
    fn utf8_split_across_reads() {
        let bytes = "é".as_bytes();
        let mut parser = Parser::new();
        assert!(parser.advance(&bytes[..1]).is_empty());
        assert!(parser.has_pending());
        let events = parser.advance(&bytes[1..]);
        assert_eq!(events, vec![KeyEvent::plain(KeyCode::Char('é'))]);
        assert!(!parser.has_pending());
    }

    #[test]
    fn stray_continuation_byte_skipped() {
        let events = parse(&[0x80, b'x']);
        assert_eq!(events, vec![KeyEvent::plain(KeyCode::Char('x'))]);
    }

    // ── Control characters ──────────────────────────────────────────────

    #[test]
    fn enter_tab_backspace() {
        assert_eq!(parse(b"\r")[0].code, KeyCode::Enter);
        assert_eq!(parse(b"\t")[0].code, KeyCode::Tab);
        assert_eq!(parse(&[0x7f])[0].code, KeyCode::Backspace);
        assert_eq!(parse(&[0x08])[0].code, KeyCode::Backspace);
    }

    #[test]
    fn ctrl_letter() {
        let events = parse(&[0x01]); // Ctrl+A
        assert_eq!(
            events,
            vec![KeyEvent::new(KeyCode::Char('a'), Modifiers::CTRL)]
        );
    }

    #[test]
    fn ctrl_x() {
        let events = parse(&[0x18]);
        assert_eq!(
            events,
            vec![KeyEvent::new(KeyCode::Char('x'), Modifiers::CTRL)]
        );
    }

    // ── CSI sequences ───────────────────────────────────────────────────

    #[test]
    fn arrow_keys() {
        assert_eq!(parse(b"\x1b[A")[0].code, KeyCode::Up);
        assert_eq!(parse(b"\x1b[B")[0].code, KeyCode::Down);
        assert_eq!(parse(b"\x1b[C")[0].code, KeyCode::Right);
        assert_eq!(parse(b"\x1b[D")[0].code, KeyCode::Left);
    }

    #[test]
    fn home_end() {
        assert_eq!(parse(b"\x1b[H")[0].code, KeyCode::Home);
        assert_eq!(parse(b"\x1b[F")[0].code, KeyCode::End);
        assert_eq!(parse(b"\x1b[1~")[0].code, KeyCode::Home);
        assert_eq!(parse(b"\x1b[4~")[0].code, KeyCode::End);
    }

    #[test]
    fn editing_keys() {
        assert_eq!(parse(b"\x1b[2~")[0].code, KeyCode::Insert);
        assert_eq!(parse(b"\x1b[3~")[0].code, KeyCode::Delete);
        assert_eq!(parse(b"\x1b[5~")[0].code, KeyCode::PageUp);
        assert_eq!(parse(b"\x1b[6~")[0].code, KeyCode::PageDown);
    }

    #[test]
    fn function_keys_tilde() {
        assert_eq!(parse(b"\x1b[11~")[0].code, KeyCode::F(1));
        assert_eq!(parse(b"\x1b[15~")[0].code, KeyCode::F(5));
        assert_eq!(parse(b"\x1b[24~")[0].code, KeyCode::F(12));
    }

    #[test]
    fn csi_with_modifier_param() {
        // CSI 1;5A = Ctrl+Up
        let events = parse(b"\x1b[1;5A");
        assert_eq!(events, vec![KeyEvent::new(KeyCode::Up, Modifiers::CTRL)]);
    }

    #[test]
    fn csi_shift_modifier() {
        // CSI 1;2C = Shift+Right
        let events = parse(b"\x1b[1;2C");
        assert_eq!(
            events,
            vec![KeyEvent::new(KeyCode::Right, Modifiers::SHIFT)]
        );
    }

    #[test]
    fn modified_delete() {
        // CSI 3;5~ = Ctrl+Delete
        let events = parse(b"\x1b[3;5~");
        assert_eq!(
            events,
            vec![KeyEvent::new(KeyCode::Delete, Modifiers::CTRL)]
        );
    }

    #[test]
    fn incomplete_csi_is_pending() {
        let mut parser = Parser::new();
        assert!(parser.advance(b"\x1b[1;5").is_empty());
        assert!(parser.has_pending());
        let events = parser.advance(b"A");
        assert_eq!(events, vec![KeyEvent::new(KeyCode::Up, Modifiers::CTRL)]);
    }

    #[test]
    fn unknown_csi_skipped() {
        // CSI ? 25 l (private mode report) is not a key.
        let events = parse(b"\x1b[?25lx");
        assert_eq!(events, vec![KeyEvent::plain(KeyCode::Char('x'))]);
    }

    #[test]
    fn unknown_tilde_param_skipped() {
        let events = parse(b"\x1b[99~y");
        assert_eq!(events, vec![KeyEvent::plain(KeyCode::Char('y'))]);
    }

    // ── SS3 sequences ───────────────────────────────────────────────────

    #[test]
    fn ss3_function_keys() {
        assert_eq!(parse(b"\x1bOP")[0].code, KeyCode::F(1));
        assert_eq!(parse(b"\x1bOQ")[0].code, KeyCode::F(2));
        assert_eq!(parse(b"\x1bOR")[0].code, KeyCode::F(3));
        assert_eq!(parse(b"\x1bOS")[0].code, KeyCode::F(4));
    }

    #[test]
    fn ss3_arrows() {
        assert_eq!(parse(b"\x1bOA")[0].code, KeyCode::Up);
        assert_eq!(parse(b"\x1bOD")[0].code, KeyCode::Left);
    }

    // ── Escape disambiguation ───────────────────────────────────────────

    #[test]
    fn lone_esc_is_pending_until_flush() {
        let mut parser = Parser::new();
        assert!(parser.advance(b"\x1b").is_empty());
        assert!(parser.has_pending());

        let events = parser.flush();
        assert_eq!(events, vec![KeyEvent::plain(KeyCode::Escape)]);
        assert!(!parser.has_pending());
    }

    #[test]
    fn double_esc_yields_escape() {
        let events = parse(b"\x1b\x1b[A");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].code, KeyCode::Escape);
        assert_eq!(events[1].code, KeyCode::Up);
    }

    #[test]
    fn flush_with_empty_buffer_is_empty() {
        let mut parser = Parser::new();
        assert!(parser.flush().is_empty());
    }

    #[test]
    fn flush_reparses_trailing_bytes() {
        let mut parser = Parser::new();
        // ESC then 'a' would normally be Alt+a, but if they arrive in
        // one chunk that's exactly what it is — so build the pending
        // state byte by byte with an incomplete CSI instead.
        parser.advance(b"\x1b");
        let events = parser.flush();
        assert_eq!(events, vec![KeyEvent::plain(KeyCode::Escape)]);
    }

    // ── Alt chords ──────────────────────────────────────────────────────

    #[test]
    fn alt_char() {
        let events = parse(b"\x1bx");
        assert_eq!(events, vec![KeyEvent::new(KeyCode::Char('x'), Modifiers::ALT)]);
    }

    #[test]
    fn alt_enter() {
        let events = parse(b"\x1b\r");
        assert_eq!(events, vec![KeyEvent::new(KeyCode::Enter, Modifiers::ALT)]);
    }

    #[test]
    fn alt_utf8_char() {
        let mut bytes = vec![0x1b];
        bytes.extend_from_slice("ø".as_bytes());
        let events = parse(&bytes);
        assert_eq!(events, vec![KeyEvent::new(KeyCode::Char('ø'), Modifiers::ALT)]);
    }

    // ── KeyEvent helpers ────────────────────────────────────────────────

    #[test]
    fn printable_plain_char() {
        assert_eq!(KeyEvent::plain(KeyCode::Char('q')).printable(), Some('q'));
    }

    #[test]
    fn printable_excludes_ctrl_and_alt() {
        assert_eq!(
            KeyEvent::new(KeyCode::Char('q'), Modifiers::CTRL).printable(),
            None
        );
        assert_eq!(
            KeyEvent::new(KeyCode::Char('q'), Modifiers::ALT).printable(),
            None
        );
    }

    #[test]
    fn printable_allows_shift() {
        assert_eq!(
            KeyEvent::new(KeyCode::Char('Q'), Modifiers::SHIFT).printable(),
            Some('Q')
        );
    }

    #[test]
    fn printable_excludes_named_keys() {
        assert_eq!(KeyEvent::plain(KeyCode::Enter).printable(), None);
    }

    // ── Mixed streams ───────────────────────────────────────────────────

    #[test]
    fn mixed_stream() {
        let events = parse(b"ab\x1b[C\rz");
        let codes: Vec<KeyCode> = events.iter().map(|e| e.code).collect();
        assert_eq!(
            codes,
            vec![
                KeyCode::Char('a'),
                KeyCode::Char('b'),
                KeyCode::Right,
                KeyCode::Enter,
                KeyCode::Char('z'),
            ]
        );
    }
}
