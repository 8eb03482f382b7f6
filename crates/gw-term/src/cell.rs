// SPDX-License-Identifier: MIT
//
// Cell — the atomic unit of grid state.
//
// Every position on a backend grid is one Cell: a character plus a packed
// color attribute. The whole rendering pipeline exists to produce, diff,
// and flush these.
//
// The color model is the classic 16-color palette with the attribute
// packed into one byte: foreground index in the low nibble, background
// index in the high nibble. Packing matters beyond compactness — the
// virtual cursor is rendered by swapping the two nibbles of one cell's
// attribute for the duration of a single flush, so the inversion must be
// a pure byte operation.
//
// Size: 8 bytes per cell (4-byte char + 1-byte attr + padding), Copy.
// A 200×50 grid is 10,000 cells = 80 KB per buffer half — trivial.

// ─── Color ──────────────────────────────────────────────────────────────────

/// One of the 16 palette colors, in standard attribute order.
///
/// The discriminant is the 4-bit palette index: indices 0–7 are the dim
/// colors, 8–15 the bright ones. This ordering is load-bearing — it is
/// what gets packed into [`ColorAttr`] nibbles and mapped to SGR codes
/// by the console backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Color {
    Black = 0,
    Blue = 1,
    Green = 2,
    Cyan = 3,
    Red = 4,
    Magenta = 5,
    Brown = 6,
    LightGray = 7,
    DarkGray = 8,
    LightBlue = 9,
    LightGreen = 10,
    LightCyan = 11,
    LightRed = 12,
    LightMagenta = 13,
    Yellow = 14,
    White = 15,
}

impl Color {
    /// The 4-bit palette index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u8 {
        self as u8
    }

    /// Color for a 4-bit palette index. Only the low nibble is used.
    #[must_use]
    pub const fn from_index(idx: u8) -> Self {
        match idx & 0x0F {
            0 => Self::Black,
            1 => Self::Blue,
            2 => Self::Green,
            3 => Self::Cyan,
            4 => Self::Red,
            5 => Self::Magenta,
            6 => Self::Brown,
            7 => Self::LightGray,
            8 => Self::DarkGray,
            9 => Self::LightBlue,
            10 => Self::LightGreen,
            11 => Self::LightCyan,
            12 => Self::LightRed,
            13 => Self::LightMagenta,
            14 => Self::Yellow,
            _ => Self::White,
        }
    }

    /// Whether this is one of the bright colors (index ≥ 8).
    #[inline]
    #[must_use]
    pub const fn is_bright(self) -> bool {
        self.index() >= 8
    }
}

// ─── ColorAttr ──────────────────────────────────────────────────────────────

/// A packed color attribute: 4-bit foreground + 4-bit background.
///
/// Layout: `bg << 4 | fg`. The default is light gray on black — the
/// terminal's resting state.
///
/// ```
/// use gw_term::cell::{Color, ColorAttr};
///
/// let attr = ColorAttr::new(Color::Yellow, Color::Blue);
/// assert_eq!(attr.fg(), Color::Yellow);
/// assert_eq!(attr.bg(), Color::Blue);
/// assert_eq!(attr.swapped().fg(), Color::Blue);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColorAttr(u8);

impl ColorAttr {
    /// Light gray on black — the default attribute.
    pub const DEFAULT: Self = Self::new(Color::LightGray, Color::Black);

    /// Pack a foreground and background color.
    #[inline]
    #[must_use]
    pub const fn new(fg: Color, bg: Color) -> Self {
        Self(bg.index() << 4 | fg.index())
    }

    /// Reinterpret a raw packed byte.
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: u8) -> Self {
        Self(raw)
    }

    /// The raw packed byte (`bg << 4 | fg`).
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u8 {
        self.0
    }

    /// The foreground color (low nibble).
    #[inline]
    #[must_use]
    pub const fn fg(self) -> Color {
        Color::from_index(self.0 & 0x0F)
    }

    /// The background color (high nibble).
    #[inline]
    #[must_use]
    pub const fn bg(self) -> Color {
        Color::from_index(self.0 >> 4)
    }

    /// The attribute with foreground and background exchanged.
    ///
    /// This is the virtual cursor's inversion primitive: applied once
    /// before a flush and once after, it leaves the cell bit-identical.
    #[inline]
    #[must_use]
    pub const fn swapped(self) -> Self {
        Self(self.0 << 4 | self.0 >> 4)
    }

    /// Replace the foreground, keeping the background.
    #[inline]
    #[must_use]
    pub const fn with_fg(self, fg: Color) -> Self {
        Self(self.0 & 0xF0 | fg.index())
    }

    /// Replace the background, keeping the foreground.
    #[inline]
    #[must_use]
    pub const fn with_bg(self, bg: Color) -> Self {
        Self(bg.index() << 4 | self.0 & 0x0F)
    }
}

impl Default for ColorAttr {
    #[inline]
    fn default() -> Self {
        Self::DEFAULT
    }
}

// ─── Cell ───────────────────────────────────────────────────────────────────

/// One grid cell: a character plus its packed color attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cell {
    /// The character to display.
    pub ch: char,
    /// Packed foreground/background attribute.
    pub attr: ColorAttr,
}

impl Cell {
    /// A blank cell: space with the default attribute.
    pub const BLANK: Self = Self {
        ch: ' ',
        attr: ColorAttr::DEFAULT,
    };

    /// Create a cell.
    #[inline]
    #[must_use]
    pub const fn new(ch: char, attr: ColorAttr) -> Self {
        Self { ch, attr }
    }

    /// A space cell carrying the given attribute (background fill).
    #[inline]
    #[must_use]
    pub const fn blank(attr: ColorAttr) -> Self {
        Self { ch: ' ', attr }
    }

    /// The cell with its attribute nibbles exchanged.
    #[inline]
    #[must_use]
    pub const fn inverted(self) -> Self {
        Self {
            ch: self.ch,
            attr: self.attr.swapped(),
        }
    }
}

impl Default for Cell {
    #[inline]
    fn default() -> Self {
        Self::BLANK
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
