//! Terminal device operations and low-level terminal control.
//!
//! This module provides:
//! - The [`TerminalDevice`] abstraction the status query runs against
//! - [`Tty`], the real device backed by a terminal file descriptor (`/dev/tty` or
//!   a handle on stdout)
//! - [`RawModeGuard`], which disables echo and canonical input and restores the
//!   saved attributes when dropped, whatever path leaves the raw-mode section

use std::fs::{File, OpenOptions};
use std::io::{self, IsTerminal, Read, Write};
use std::ops::{Deref, DerefMut};
use std::os::fd::AsFd;
use std::os::unix::io::AsRawFd;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{trace, warn};
use nix::poll::{PollFd, PollFlags, poll};
use nix::unistd::{getpgrp, tcgetpgrp};
use termios::{ECHO, ICANON, TCSANOW, Termios, tcsetattr};

/// A terminal the status query can talk to.
///
/// Everything the query needs from the operating system goes through this
/// trait, so the protocol can be exercised against a scripted device.
pub trait TerminalDevice {
    /// Snapshot of the terminal attributes.
    type Attributes: Clone;

    /// Whether the device is a real terminal.
    fn is_terminal(&self) -> bool;

    /// Whether the calling process is in the foreground process group of the
    /// terminal. Background processes must not steal the terminal's input.
    fn is_foreground(&self) -> bool;

    /// Read the current terminal attributes.
    ///
    /// # Errors
    ///
    /// Returns an error if the attributes cannot be read.
    fn attributes(&self) -> io::Result<Self::Attributes>;

    /// Apply terminal attributes immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if the attributes cannot be applied.
    fn set_attributes(&mut self, attributes: &Self::Attributes) -> io::Result<()>;

    /// Derive attributes with echo and canonical (line-buffered) input disabled.
    fn raw_attributes(attributes: &Self::Attributes) -> Self::Attributes;

    /// Write and flush `buf`.
    ///
    /// # Errors
    ///
    /// Returns an error if writing to the device fails.
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()>;

    /// Wait until a byte can be read or `timeout` elapses. Returns `Ok(false)` on
    /// timeout.
    ///
    /// # Errors
    ///
    /// Returns an error of kind [`io::ErrorKind::Interrupted`] when a signal
    /// interrupts the wait, or any other error if waiting fails.
    fn wait_readable(&mut self, timeout: Duration) -> io::Result<bool>;

    /// Read a single byte.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails or the device reached end of file.
    fn read_byte(&mut self) -> io::Result<u8>;
}

/// A terminal backed by a file descriptor.
#[derive(Debug)]
pub struct Tty {
    file: File,
}

impl Tty {
    /// Opens the controlling terminal (`/dev/tty`) for direct access.
    ///
    /// This works regardless of how stdin/stdout are redirected.
    ///
    /// # Returns
    ///
    /// A [`Tty`] opened for reading and writing on the controlling terminal.
    ///
    /// # Errors
    ///
    /// Returns an error if `/dev/tty` cannot be opened, e.g. when the process
    /// has no controlling terminal.
    pub fn open() -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open("/dev/tty")
            .context("Failed to open /dev/tty")?;
        Ok(Self { file })
    }

    /// Use a duplicate of the stdout file descriptor.
    ///
    /// # Errors
    ///
    /// Returns an error if the descriptor cannot be duplicated.
    pub fn stdout() -> Result<Self> {
        let fd = io::stdout()
            .as_fd()
            .try_clone_to_owned()
            .context("Failed to duplicate stdout")?;
        Ok(Self {
            file: File::from(fd),
        })
    }

    /// Wrap an already opened terminal file.
    #[must_use]
    pub fn from_file(file: File) -> Self {
        Self { file }
    }
}

impl TerminalDevice for Tty {
    type Attributes = Termios;

    fn is_terminal(&self) -> bool {
        self.file.is_terminal()
    }

    fn is_foreground(&self) -> bool {
        match tcgetpgrp(&self.file) {
            Ok(pgrp) => pgrp == getpgrp(),
            Err(e) => {
                trace!("tcgetpgrp failed: {e}");
                false
            }
        }
    }

    fn attributes(&self) -> io::Result<Termios> {
        Termios::from_fd(self.file.as_raw_fd())
    }

    fn set_attributes(&mut self, attributes: &Termios) -> io::Result<()> {
        tcsetattr(self.file.as_raw_fd(), TCSANOW, attributes)
    }

    fn raw_attributes(attributes: &Termios) -> Termios {
        let mut raw = *attributes;
        raw.c_lflag &= !(ICANON | ECHO);
        raw
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.file.write_all(buf)?;
        self.file.flush()
    }

    fn wait_readable(&mut self, timeout: Duration) -> io::Result<bool> {
        let millis = u16::try_from(timeout.as_millis()).unwrap_or(u16::MAX);
        let pollfd = PollFd::new(self.file.as_fd(), PollFlags::POLLIN);
        let ready = poll(&mut [pollfd], millis)?;
        Ok(ready > 0)
    }

    fn read_byte(&mut self) -> io::Result<u8> {
        let mut buf = [0u8; 1];
        self.file.read_exact(&mut buf)?;
        Ok(buf[0])
    }
}

/// Keeps a terminal in raw mode for as long as it lives.
///
/// Dropping the guard restores the attributes saved when it was created. This is
/// the only place that restores attributes, so every exit path out of raw mode
/// (success, timeout, parse failure, early `?` return, panic) goes through it.
pub struct RawModeGuard<'a, D: TerminalDevice> {
    device: &'a mut D,
    saved: D::Attributes,
}

impl<'a, D: TerminalDevice> RawModeGuard<'a, D> {
    /// Save the current attributes of `device` and switch it to raw mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the attributes cannot be read or raw mode cannot be
    /// set. In both cases the terminal is left as it was and nothing needs to be
    /// restored.
    pub fn enter(device: &'a mut D) -> io::Result<Self> {
        let saved = device.attributes()?;
        device.set_attributes(&D::raw_attributes(&saved))?;
        trace!("terminal in raw mode");
        Ok(Self { device, saved })
    }
}

impl<D: TerminalDevice> Deref for RawModeGuard<'_, D> {
    type Target = D;

    fn deref(&self) -> &D {
        self.device
    }
}

impl<D: TerminalDevice> DerefMut for RawModeGuard<'_, D> {
    fn deref_mut(&mut self) -> &mut D {
        self.device
    }
}

impl<D: TerminalDevice> Drop for RawModeGuard<'_, D> {
    fn drop(&mut self) {
        match self.device.set_attributes(&self.saved) {
            Ok(()) => trace!("terminal attributes restored"),
            Err(e) => warn!("Failed to restore terminal attributes: {e}"),
        }
    }
}
