use anyhow::Result;
use std::io::{self, BufRead, IsTerminal};
use std::path::Path;
use zeroize::Zeroizing;

pub const PASSWORD_ENV: &str = "SOLLET_RECOVER_PASSWORD";

/// Where passphrase attempts come from.
pub enum PasswordSource {
    /// SOLLET_RECOVER_PASSWORD="supersecret" sollet-recover
    ///
    /// One attempt per store.
    Env(Zeroizing<String>),
    /// printf "first try\nsecond try\n" | sollet-recover
    ///
    /// One line per attempt; EOF gives up on the store.
    Piped,
    /// Interactive (TTY); an empty answer gives up on the store.
    Prompt,
}

impl PasswordSource {
    pub fn detect() -> Self {
        if let Ok(pw) = std::env::var(PASSWORD_ENV) {
            if !pw.is_empty() {
                return PasswordSource::Env(Zeroizing::new(pw));
            }
        }

        if !io::stdin().is_terminal() {
            return PasswordSource::Piped;
        }

        PasswordSource::Prompt
    }

    /// The passphrase for attempt number `attempt` on `store`, or `None` to stop trying.
    pub fn next(&self, store: &Path, attempt: usize) -> Result<Option<Zeroizing<String>>> {
        match self {
            PasswordSource::Env(pw) => Ok((attempt == 0).then(|| pw.clone())),
            PasswordSource::Piped => {
                let mut pw = Zeroizing::new(String::new());
                if io::stdin().lock().read_line(&mut pw)? == 0 {
                    return Ok(None);
                }
                trim_newline(&mut pw);
                Ok(Some(pw))
            }
            PasswordSource::Prompt => {
                let pw = Zeroizing::new(rpassword::prompt_password(format!(
                    "Password for {}: ",
                    store.display()
                ))?);
                Ok((!pw.is_empty()).then_some(pw))
            }
        }
    }
}

fn trim_newline(s: &mut String) {
    while s.ends_with('\n') || s.ends_with('\r') {
        s.pop();
    }
}

/// Terminal settings saved before prompting, so an interrupt mid-prompt does
/// not leave the terminal with echo off.
#[cfg(unix)]
pub struct TerminalState {
    tty: std::fs::File,
    saved: libc::termios,
}

#[cfg(unix)]
impl TerminalState {
    /// Saves the controlling terminal's settings. `None` without a terminal.
    pub fn capture() -> Option<Self> {
        let tty = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open("/dev/tty")
            .ok()?;
        Self::from_file(tty)
    }

    fn from_file(tty: std::fs::File) -> Option<Self> {
        use std::os::unix::io::AsRawFd;

        // SAFETY: termios is plain data and is filled in by tcgetattr before use.
        let mut saved: libc::termios = unsafe { std::mem::zeroed() };
        // SAFETY: the descriptor stays open for the lifetime of `tty`.
        if unsafe { libc::tcgetattr(tty.as_raw_fd(), &mut saved) } != 0 {
            return None;
        }
        Some(Self { tty, saved })
    }

    pub fn restore(&self) {
        use std::os::unix::io::AsRawFd;

        // SAFETY: the descriptor is owned by `self` and `saved` came from tcgetattr.
        unsafe {
            libc::tcsetattr(self.tty.as_raw_fd(), libc::TCSANOW, &self.saved);
        }
    }
}

#[cfg(not(unix))]
pub struct TerminalState;

#[cfg(not(unix))]
impl TerminalState {
    pub fn capture() -> Option<Self> {
        Some(Self)
    }

    pub fn restore(&self) {}
}
