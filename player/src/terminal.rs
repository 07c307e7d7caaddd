//! Terminal ownership: raw mode, alternate screen, input polling and the
//! restore path shared by normal exit, panics and termination signals.

use std::io::{self, BufWriter, Stdout, Write};
use std::panic;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossterm::event::{self, Event, KeyEvent, KeyEventKind};
use crossterm::{cursor, terminal};

/// Set while this process has the terminal in raw mode.
static TERMINAL_ACTIVE: AtomicBool = AtomicBool::new(false);

/// Fallback when the terminal size cannot be queried.
const FALLBACK_SIZE: (u16, u16) = (80, 24);

/// What the playback loop needs from a terminal.
pub trait TerminalIo {
    /// Columns and rows.
    fn size(&self) -> (u16, u16);

    /// One pending key press, without blocking.
    fn poll_key(&mut self) -> io::Result<Option<KeyEvent>>;

    /// Clear the screen and draw `block` from the top-left corner.
    fn present(&mut self, block: &str) -> io::Result<()>;
}

/// Stdout/stdin through crossterm.
pub struct CrosstermIo {
    out: BufWriter<Stdout>,
}

impl CrosstermIo {
    pub fn new() -> Self {
        Self {
            out: BufWriter::with_capacity(256 * 1024, io::stdout()),
        }
    }
}

impl Default for CrosstermIo {
    fn default() -> Self {
        Self::new()
    }
}

impl TerminalIo for CrosstermIo {
    fn size(&self) -> (u16, u16) {
        terminal::size().unwrap_or(FALLBACK_SIZE)
    }

    fn poll_key(&mut self) -> io::Result<Option<KeyEvent>> {
        while event::poll(Duration::ZERO)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    return Ok(Some(key));
                }
            }
        }
        Ok(None)
    }

    fn present(&mut self, block: &str) -> io::Result<()> {
        self.out.write_all(b"\x1b[2J\x1b[H")?;
        // raw mode turns off output post-processing, so rows need an explicit CR
        for (i, line) in block.split('\n').enumerate() {
            if i > 0 {
                self.out.write_all(b"\r\n")?;
            }
            self.out.write_all(line.as_bytes())?;
        }
        self.out.flush()
    }
}

/// Raw mode + alternate screen + hidden cursor for as long as the guard lives.
pub struct TerminalGuard {
    _private: (),
}

impl TerminalGuard {
    pub fn acquire() -> io::Result<Self> {
        install_panic_hook();

        terminal::enable_raw_mode()?;
        TERMINAL_ACTIVE.store(true, Ordering::SeqCst);
        let guard = Self { _private: () };
        crossterm::execute!(io::stdout(), terminal::EnterAlternateScreen, cursor::Hide)?;
        Ok(guard)
    }

    /// Restore now instead of at drop. Later calls and the drop are no-ops.
    pub fn release(&mut self) -> io::Result<()> {
        restore_terminal()
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = restore_terminal();
    }
}

/// Undo everything `TerminalGuard::acquire` did. Runs at most once per
/// acquisition no matter how many exit paths call it.
pub fn restore_terminal() -> io::Result<()> {
    if !TERMINAL_ACTIVE.swap(false, Ordering::SeqCst) {
        return Ok(());
    }
    let mut stdout = io::stdout();
    stdout.write_all(b"\x1b[0m")?;
    crossterm::execute!(stdout, cursor::Show, terminal::LeaveAlternateScreen)?;
    terminal::disable_raw_mode()
}

fn install_panic_hook() {
    static HOOK_INSTALLED: AtomicBool = AtomicBool::new(false);
    if HOOK_INSTALLED.swap(true, Ordering::SeqCst) {
        return;
    }

    let original_hook = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        let _ = restore_terminal();
        original_hook(info);
    }));
}

/// Exit status when a second termination signal arrives before the loop
/// has noticed the first.
const FORCED_EXIT_STATUS: i32 = 130;

/// Flag raised by SIGINT, SIGTERM or SIGQUIT, checked by the playback loop at
/// the top of every iteration.
#[derive(Clone, Debug, Default)]
pub struct ShutdownSignal {
    flag: Arc<AtomicBool>,
}

impl ShutdownSignal {
    /// Route the termination signals into a fresh flag. Install only once
    /// something polls the flag: until then the default actions stay in place.
    ///
    /// A repeated signal exits the process outright, so a stalled read
    /// cannot make the player unkillable.
    pub fn register() -> io::Result<Self> {
        let signal = Self::default();
        for &sig in signal_hook::consts::TERM_SIGNALS {
            // the conditional exit must run before the flag is set
            signal_hook::flag::register_conditional_shutdown(sig, FORCED_EXIT_STATUS, Arc::clone(&signal.flag))?;
            signal_hook::flag::register(sig, Arc::clone(&signal.flag))?;
        }
        Ok(signal)
    }

    pub fn triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }
}
