// SPDX-License-Identifier: MIT
//
// ConsoleBackend — the real-terminal device adapter.
//
// Safety: this module necessarily uses `unsafe` for termios (tcgetattr,
// tcsetattr), ioctl (TIOCGWINSZ), isatty, poll and raw fd reads/writes.
// These are the standard POSIX interfaces for terminal control — there
// is no safe alternative. Each unsafe block is minimal.
#![allow(unsafe_code)]
//
// The console backend sits at the bottom of every chain: cell writes
// arrive (usually pre-diffed by a buffered backend above), get coalesced
// into runs, and each run becomes at most three escape sequences plus
// its literal text — an SGR only when the attribute actually changed,
// a cursor reposition only when the run doesn't start where the device
// cursor already is, and a one-time cursor hide when a visible cursor
// would flicker under the batch. Everything is staged in memory and
// flushed to the terminal in a single write per commit.
//
// The module also owns the terminal's raw state: termios raw mode, the
// alternate screen, and a panic hook that writes a pre-built restore
// sequence straight to fd 1 so a panic mid-frame never leaves the
// user's shell broken.

use std::io::{self, Write};
use std::time::Duration;
#[cfg(unix)]
use std::time::Instant;

use std::collections::VecDeque;
#[cfg(unix)]
use std::sync::Mutex;
use std::sync::Once;

use crate::ansi;
use crate::backend::{Backend, BackendError, BoundsPolicy, Result};
use crate::caching::{Run, RunCache};
use crate::cell::{Cell, ColorAttr};
use crate::geom::Size;
use crate::input::{KeyEvent, Parser};

// ─── Device Queries ─────────────────────────────────────────────────────────

/// Query the live terminal size via `ioctl(TIOCGWINSZ)`.
///
/// Returns `None` if stdout is not a terminal or the query fails.
#[cfg(unix)]
#[must_use]
pub fn device_size() -> Option<Size> {
    let mut ws: libc::winsize = unsafe { std::mem::zeroed() };
    let result = unsafe { libc::ioctl(libc::STDOUT_FILENO, libc::TIOCGWINSZ, &mut ws) };

    if result == 0 && ws.ws_col > 0 && ws.ws_row > 0 {
        Some(Size::new(ws.ws_col, ws.ws_row))
    } else {
        None
    }
}

#[cfg(not(unix))]
#[must_use]
pub fn device_size() -> Option<Size> {
    None
}

/// Whether stdin is connected to a terminal.
#[cfg(unix)]
#[must_use]
pub fn is_tty() -> bool {
    unsafe { libc::isatty(libc::STDIN_FILENO) != 0 }
}

#[cfg(not(unix))]
#[must_use]
pub fn is_tty() -> bool {
    false
}

// ─── Panic-Safe Restore ─────────────────────────────────────────────────────

/// Restore sequence for emergency use: reset attributes, show the
/// cursor, exit the alternate screen. Alternate-screen exit is last so
/// the restored shell content appears clean.
const EMERGENCY_RESTORE: &[u8] = b"\x1b[0m\x1b[?25h\x1b[?1049l";

/// Global backup of the original termios for the panic hook, which has
/// no access to the `ConsoleBackend` instance.
#[cfg(unix)]
static TERMIOS_BACKUP: Mutex<Option<libc::termios>> = Mutex::new(None);

/// Panic hook guard — installed at most once per process.
static PANIC_HOOK_INSTALLED: Once = Once::new();

/// Write the restore sequence directly to stdout's file descriptor,
/// bypassing Rust's stdout lock (the panic may hold it mid-flush).
fn emergency_restore() {
    #[cfg(unix)]
    unsafe {
        let _ = libc::write(
            libc::STDOUT_FILENO,
            EMERGENCY_RESTORE.as_ptr().cast::<libc::c_void>(),
            EMERGENCY_RESTORE.len(),
        );
    }

    #[cfg(not(unix))]
    {
        let _ = io::stdout().write_all(EMERGENCY_RESTORE);
        let _ = io::stdout().flush();
    }
}

#[cfg(unix)]
fn restore_termios_from_backup() {
    if let Ok(guard) = TERMIOS_BACKUP.lock() {
        if let Some(ref original) = *guard {
            unsafe {
                let _ = libc::tcsetattr(libc::STDIN_FILENO, libc::TCSANOW, original);
            }
        }
    }
}

/// Install a panic hook that restores the terminal before the error
/// prints. Without it, a panic in raw mode leaves no echo, no line
/// editing, and an unreadable error message.
fn install_panic_hook() {
    PANIC_HOOK_INSTALLED.call_once(|| {
        let original = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            emergency_restore();

            #[cfg(unix)]
            restore_termios_from_backup();

            original(info);
        }));
    });
}

// ─── Device Cursor ──────────────────────────────────────────────────────────

/// The hardware cursor's staged state.
///
/// `Suppressed` is the third state that prevents per-cell flicker: a
/// visible cursor is hidden once before a frame's batch writes and
/// restored exactly once when the frame ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeviceCursor {
    Hidden,
    Visible(u16, u16),
    Suppressed(u16, u16),
}

// ─── ConsoleBackend ─────────────────────────────────────────────────────────

/// Escape-sequence disambiguation timeout: a lone ESC older than this
/// is a real Escape keypress, not the start of a sequence.
const ESC_TIMEOUT_MS: i32 = 10;

/// Read chunk size. A keypress is 1–6 bytes; a held-down arrow key
/// autorepeating fits comfortably.
const READ_BUF_SIZE: usize = 1024;

/// The terminal device backend.
///
/// Write-only as a grid (cell reads are a composition error — put a
/// buffered backend above it if you need reads), with key input, cursor
/// control, and device resize detection.
///
/// [`enter`](Self::enter) switches the terminal to raw mode and the
/// alternate screen; the terminal is restored on [`leave`](Self::leave),
/// on drop, and on panic.
pub struct ConsoleBackend {
    size: Size,
    policy: BoundsPolicy,
    /// ANSI bytes staged for the in-flight frame; one write per commit.
    staged: Vec<u8>,
    runs: RunCache,
    /// Attribute last sent to the device; SGR is emitted only on change.
    last_attr: Option<ColorAttr>,
    /// Where the device cursor ended up after the last emitted run.
    write_pos: Option<(u16, u16)>,
    cursor: DeviceCursor,
    /// Whether the staged buffer currently holds an open synchronized
    /// frame (begin_sync emitted, end_sync pending).
    in_frame: bool,
    parser: Parser,
    events: VecDeque<KeyEvent>,
    #[cfg(unix)]
    original_termios: Option<libc::termios>,
    active: bool,
}

impl ConsoleBackend {
    /// Create a backend sized to the live device, falling back to 80×24
    /// when stdout is not a terminal (tests, pipes).
    ///
    /// Does **not** touch the terminal — call [`enter`](Self::enter) to
    /// switch to raw mode and the alternate screen.
    ///
    /// # Errors
    ///
    /// Currently infallible; returns `Result` so device probing can
    /// fail here in the future without an API break.
    pub fn new() -> io::Result<Self> {
        Ok(Self::with_size_inner(
            device_size().unwrap_or(Size::new(80, 24)),
        ))
    }

    /// Create a backend with explicit dimensions, for harnesses with no
    /// controlling terminal.
    #[must_use]
    pub fn with_size(cols: u16, rows: u16) -> Self {
        Self::with_size_inner(Size::new(cols, rows))
    }

    fn with_size_inner(size: Size) -> Self {
        Self {
            size,
            policy: BoundsPolicy::default(),
            staged: Vec::with_capacity(4096),
            runs: RunCache::new(),
            last_attr: None,
            write_pos: None,
            cursor: DeviceCursor::Hidden,
            in_frame: false,
            parser: Parser::new(),
            events: VecDeque::new(),
            #[cfg(unix)]
            original_termios: None,
            active: false,
        }
    }

    /// Set the out-of-range policy (builder style).
    #[must_use]
    pub fn with_policy(mut self, policy: BoundsPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Whether the terminal is in raw/alternate-screen mode.
    #[inline]
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// Switch the terminal to raw mode and the alternate screen, hide
    /// the cursor, and clear. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if raw mode or terminal output fails.
    pub fn enter(&mut self) -> io::Result<()> {
        if self.active {
            return Ok(());
        }

        install_panic_hook();
        self.enable_raw_mode()?;

        let stdout = io::stdout();
        let mut lock = stdout.lock();
        ansi::enter_alt_screen(&mut lock)?;
        ansi::cursor_hide(&mut lock)?;
        ansi::clear_screen(&mut lock)?;
        lock.flush()?;

        self.cursor = DeviceCursor::Hidden;
        self.active = true;
        tracing::debug!(cols = self.size.cols, rows = self.size.rows, "console entered");
        Ok(())
    }

    /// Restore the terminal: attributes reset, cursor shown, original
    /// screen content back, raw mode off. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if terminal output or termios restore fails.
    pub fn leave(&mut self) -> io::Result<()> {
        if !self.active {
            return Ok(());
        }

        let stdout = io::stdout();
        let mut lock = stdout.lock();
        ansi::reset(&mut lock)?;
        ansi::cursor_show(&mut lock)?;
        ansi::exit_alt_screen(&mut lock)?;
        lock.flush()?;
        drop(lock);

        self.disable_raw_mode()?;
        self.active = false;
        tracing::debug!("console left");
        Ok(())
    }

    /// The staged-but-unflushed ANSI bytes (for tests and debugging).
    #[inline]
    #[must_use]
    pub fn staged_bytes(&self) -> &[u8] {
        &self.staged
    }

    /// Close the in-flight frame and write the staged bytes to an
    /// arbitrary writer instead of the terminal.
    ///
    /// # Errors
    ///
    /// Returns an error if writing to `w` fails.
    pub fn flush_to(&mut self, w: &mut impl Write) -> Result<()> {
        self.end_frame()?;
        if !self.staged.is_empty() {
            w.write_all(&self.staged).map_err(BackendError::Io)?;
            w.flush().map_err(BackendError::Io)?;
            self.staged.clear();
        }
        Ok(())
    }

    // ── Frame assembly ──────────────────────────────────────────────────

    /// Stage one run: SGR if the attribute changed, reposition if the
    /// run is not contiguous with the last write, then the literal text.
    fn emit_run(&mut self, run: &Run) -> io::Result<()> {
        if !self.in_frame {
            ansi::begin_sync(&mut self.staged)?;
            self.in_frame = true;
        }

        // A visible hardware cursor would flicker under batch writes —
        // hide it once for the duration of the frame.
        if let DeviceCursor::Visible(cx, cy) = self.cursor {
            ansi::cursor_hide(&mut self.staged)?;
            self.cursor = DeviceCursor::Suppressed(cx, cy);
        }

        if self.last_attr != Some(run.attr) {
            ansi::sgr_attr(&mut self.staged, run.attr)?;
            self.last_attr = Some(run.attr);
        }

        if self.write_pos != Some((run.x, run.y)) {
            ansi::cursor_to(&mut self.staged, run.x, run.y)?;
        }

        self.staged.extend_from_slice(run.text.as_bytes());
        self.write_pos = Some((run.end(), run.y));
        Ok(())
    }

    /// Flush the open run and close the synchronized frame, restoring a
    /// suppressed cursor exactly once.
    fn end_frame(&mut self) -> Result<()> {
        if let Some(run) = self.runs.take() {
            self.emit_run(&run)?;
        }

        if let DeviceCursor::Suppressed(cx, cy) = self.cursor {
            ansi::cursor_to(&mut self.staged, cx, cy).map_err(BackendError::Io)?;
            ansi::cursor_show(&mut self.staged).map_err(BackendError::Io)?;
            self.cursor = DeviceCursor::Visible(cx, cy);
            self.write_pos = Some((cx, cy));
        }

        if self.in_frame {
            ansi::end_sync(&mut self.staged).map_err(BackendError::Io)?;
            self.in_frame = false;
        }
        Ok(())
    }

    /// Write the staged bytes to the terminal in one syscall.
    fn flush_staged(&mut self) -> Result<()> {
        if self.staged.is_empty() {
            return Ok(());
        }
        tracing::trace!(bytes = self.staged.len(), "console flush");
        let mut stdout = io::stdout().lock();
        stdout.write_all(&self.staged).map_err(BackendError::Io)?;
        stdout.flush().map_err(BackendError::Io)?;
        self.staged.clear();
        Ok(())
    }

    // ── Raw mode (termios) ──────────────────────────────────────────────

    #[cfg(unix)]
    fn enable_raw_mode(&mut self) -> io::Result<()> {
        use std::os::unix::io::AsRawFd;

        if !is_tty() {
            return Ok(());
        }

        let fd = io::stdin().as_raw_fd();

        unsafe {
            let mut termios: libc::termios = std::mem::zeroed();
            if libc::tcgetattr(fd, &raw mut termios) != 0 {
                return Err(io::Error::last_os_error());
            }

            self.original_termios = Some(termios);
            if let Ok(mut guard) = TERMIOS_BACKUP.lock() {
                *guard = Some(termios);
            }

            // cfmakeraw equivalent: no line buffering, no echo, no
            // signal keys, 8-bit chars.
            termios.c_iflag &= !(libc::IGNBRK
                | libc::BRKINT
                | libc::PARMRK
                | libc::ISTRIP
                | libc::INLCR
                | libc::IGNCR
                | libc::ICRNL
                | libc::IXON);
            termios.c_oflag &= !libc::OPOST;
            termios.c_lflag &=
                !(libc::ECHO | libc::ECHONL | libc::ICANON | libc::ISIG | libc::IEXTEN);
            termios.c_cflag &= !(libc::CSIZE | libc::PARENB);
            termios.c_cflag |= libc::CS8;

            // VMIN=1, VTIME=0: read() blocks until at least one byte.
            termios.c_cc[libc::VMIN] = 1;
            termios.c_cc[libc::VTIME] = 0;

            if libc::tcsetattr(fd, libc::TCSAFLUSH, &raw const termios) != 0 {
                return Err(io::Error::last_os_error());
            }
        }

        Ok(())
    }

    #[cfg(not(unix))]
    fn enable_raw_mode(&mut self) -> io::Result<()> {
        Ok(())
    }

    #[cfg(unix)]
    fn disable_raw_mode(&mut self) -> io::Result<()> {
        if let Some(ref original) = self.original_termios {
            use std::os::unix::io::AsRawFd;
            let fd = io::stdin().as_raw_fd();

            unsafe {
                if libc::tcsetattr(fd, libc::TCSAFLUSH, original) != 0 {
                    return Err(io::Error::last_os_error());
                }
            }

            if let Ok(mut guard) = TERMIOS_BACKUP.lock() {
                *guard = None;
            }
            self.original_termios = None;
        }

        Ok(())
    }

    #[cfg(not(unix))]
    fn disable_raw_mode(&mut self) -> io::Result<()> {
        Ok(())
    }

    // ── Input plumbing ──────────────────────────────────────────────────

    /// Wait for stdin readability, read a chunk, and feed the parser.
    /// `timeout_ms < 0` blocks indefinitely. Returns `false` on timeout.
    #[cfg(unix)]
    fn pump_input(&mut self, timeout_ms: i32) -> Result<bool> {
        use std::os::unix::io::AsRawFd;

        let fd = io::stdin().as_raw_fd();
        let ready = unsafe {
            let mut pfd = libc::pollfd {
                fd,
                events: libc::POLLIN,
                revents: 0,
            };
            libc::poll(&raw mut pfd, 1, timeout_ms)
        };

        if ready < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                // EINTR (e.g. SIGWINCH landed) — not input, not an error.
                return Ok(false);
            }
            return Err(BackendError::Io(err));
        }
        if ready == 0 {
            return Ok(false);
        }

        let mut buf = [0u8; READ_BUF_SIZE];
        let n = unsafe { libc::read(fd, buf.as_mut_ptr().cast(), buf.len()) };
        if n < 0 {
            return Err(BackendError::Io(io::Error::last_os_error()));
        }
        if n == 0 {
            return Err(BackendError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "stdin closed",
            )));
        }

        #[allow(clippy::cast_sign_loss)] // n > 0 checked above.
        self.events.extend(self.parser.advance(&buf[..n as usize]));
        Ok(true)
    }

    #[cfg(not(unix))]
    fn pump_input(&mut self, _timeout_ms: i32) -> Result<bool> {
        use std::io::Read;

        let mut buf = [0u8; READ_BUF_SIZE];
        let n = io::stdin().lock().read(&mut buf).map_err(BackendError::Io)?;
        if n == 0 {
            return Err(BackendError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "stdin closed",
            )));
        }
        self.events.extend(self.parser.advance(&buf[..n]));
        Ok(true)
    }
}

impl Backend for ConsoleBackend {
    fn size(&self) -> Size {
        self.size
    }

    fn write_cell(&mut self, x: u16, y: u16, cell: Cell) -> Result<()> {
        if self.policy.admit(self.size, x, y)? {
            if let Some(completed) = self.runs.push(x, y, cell.ch, cell.attr) {
                self.emit_run(&completed)?;
            }
        }
        Ok(())
    }

    // read_cell deliberately keeps the default: the console is
    // write-only, and asking it to read is a composition error.

    /// Update the stored dimensions. The real device cannot be resized
    /// from here; this records what the device already became.
    fn resize(&mut self, cols: u16, rows: u16) {
        self.size = Size::new(cols, rows);
    }

    fn commit(&mut self) -> Result<()> {
        self.end_frame()?;
        self.flush_staged()
    }

    fn read_event(&mut self) -> Result<KeyEvent> {
        loop {
            if let Some(event) = self.events.pop_front() {
                return Ok(event);
            }

            // A pending lone ESC caps the wait so it can resolve into a
            // real Escape keypress.
            let timeout = if self.parser.has_pending() {
                ESC_TIMEOUT_MS
            } else {
                -1
            };

            if !self.pump_input(timeout)? && self.parser.has_pending() {
                self.events.extend(self.parser.flush());
            }
        }
    }

    #[cfg(unix)]
    fn poll_event(&mut self, timeout: Duration) -> Result<Option<KeyEvent>> {
        let deadline = Instant::now() + timeout;

        loop {
            if let Some(event) = self.events.pop_front() {
                return Ok(Some(event));
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                self.events.extend(self.parser.flush());
                return Ok(self.events.pop_front());
            }

            #[allow(clippy::cast_possible_truncation)]
            let mut wait = remaining.as_millis().min(i32::MAX as u128) as i32;
            if self.parser.has_pending() {
                wait = wait.min(ESC_TIMEOUT_MS);
            }

            if !self.pump_input(wait)? && self.parser.has_pending() {
                self.events.extend(self.parser.flush());
            }
        }
    }

    #[cfg(not(unix))]
    fn poll_event(&mut self, _timeout: Duration) -> Result<Option<KeyEvent>> {
        Err(BackendError::Unsupported("poll_event"))
    }

    /// Compare the remembered size against the live device size.
    ///
    /// On mismatch the stored size is updated and `true` is returned so
    /// global placement can rerun; positional and attribute assumptions
    /// about the device are dropped (the terminal reflowed). Cheap
    /// enough to call every redraw tick.
    fn detect_resize(&mut self) -> bool {
        let Some(live) = device_size() else {
            return false;
        };
        if live == self.size {
            return false;
        }

        tracing::debug!(
            old_cols = self.size.cols,
            old_rows = self.size.rows,
            cols = live.cols,
            rows = live.rows,
            "device resized"
        );
        self.size = live;
        self.write_pos = None;
        self.last_attr = None;
        true
    }

    fn show_cursor(&mut self, x: u16, y: u16) -> Result<()> {
        if !self.size.contains(x, y) {
            return self.hide_cursor();
        }

        ansi::cursor_to(&mut self.staged, x, y).map_err(BackendError::Io)?;
        ansi::cursor_show(&mut self.staged).map_err(BackendError::Io)?;
        self.cursor = DeviceCursor::Visible(x, y);
        self.write_pos = Some((x, y));
        self.flush_staged()
    }

    fn hide_cursor(&mut self) -> Result<()> {
        if !matches!(self.cursor, DeviceCursor::Hidden) {
            ansi::cursor_hide(&mut self.staged).map_err(BackendError::Io)?;
            self.cursor = DeviceCursor::Hidden;
        }
        self.flush_staged()
    }

    fn cursor_position(&self) -> Option<(u16, u16)> {
        match self.cursor {
            DeviceCursor::Hidden => None,
            DeviceCursor::Visible(x, y) | DeviceCursor::Suppressed(x, y) => Some((x, y)),
        }
    }

    fn cursor_visible(&self) -> bool {
        matches!(
            self.cursor,
            DeviceCursor::Visible(..) | DeviceCursor::Suppressed(..)
        )
    }
}

impl Drop for ConsoleBackend {
    fn drop(&mut self) {
        if self.active {
            let _ = self.leave();
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
