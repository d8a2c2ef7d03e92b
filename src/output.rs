//! An output stream together with its color capabilities.
//!
//! [`Output`] combines the detected [`Profile`] with the terminal's default
//! colors. Those are looked up on first use, at most once per [`Output`], even
//! when several threads ask at the same time.

use std::sync::{Mutex, OnceLock, PoisonError};

use log::debug;

use crate::color::Color;
use crate::env::Environment;
use crate::identity::TerminalIdentity;
use crate::osc::{OscColor, QueryOptions, query_terminal_color};
use crate::profile::{Profile, env_no_color, index_color};
use crate::terminal::{TerminalDevice, Tty};

/// Color used when the foreground cannot be determined (light gray).
const DEFAULT_FOREGROUND: Color = Color::Ansi(7);
/// Color used when the background cannot be determined (black).
const DEFAULT_BACKGROUND: Color = Color::Ansi(0);

/// A terminal output stream with its color profile and default colors.
///
/// # Examples
///
/// ```no_run
/// # use termtint::Output;
/// let output = Output::from_tty();
/// let bg = output.background_color();
/// println!("{}: {bg:?}", output.profile());
/// ```
#[derive(Debug)]
pub struct Output<D: TerminalDevice = Tty> {
    profile: Profile,
    env: Environment,
    options: QueryOptions,
    is_tty: bool,
    // serializes queries: two raw-mode sections on one terminal would clobber
    // each other's saved attributes
    tty: Option<Mutex<D>>,
    foreground: OnceLock<Color>,
    background: OnceLock<Color>,
}

impl<D: TerminalDevice> Output<D> {
    /// Wrap `device`, described by `env`.
    ///
    /// The profile is detected from `env` when `device` is a terminal, and is
    /// [`Profile::Ascii`] otherwise.
    ///
    /// # Arguments
    ///
    /// * `device` - The terminal colors are written to and queried from
    /// * `env` - Snapshot used for profile detection, `COLORFGBG` and `TERM`
    #[must_use]
    pub fn new(device: D, env: Environment) -> Self {
        let profile = if device.is_terminal() {
            Profile::detect(&env)
        } else {
            Profile::Ascii
        };
        debug!("profile={profile}");
        Self::with_profile(Some(device), env, profile)
    }

    /// Wrap `device` with a known profile, skipping detection.
    ///
    /// Without a device the default colors come from the environment only.
    #[must_use]
    pub fn with_profile(device: Option<D>, env: Environment, profile: Profile) -> Self {
        let options = QueryOptions::from_env(&env);
        let is_tty = device.as_ref().is_some_and(|d| d.is_terminal());
        Self {
            profile,
            env,
            options,
            is_tty,
            tty: device.map(Mutex::new),
            foreground: OnceLock::new(),
            background: OnceLock::new(),
        }
    }

    /// Replace the options of the status queries.
    ///
    /// Only effective before the first color lookup.
    #[must_use]
    pub fn with_options(mut self, options: QueryOptions) -> Self {
        self.options = options;
        self
    }

    /// The color profile of this output.
    #[must_use]
    pub fn profile(&self) -> Profile {
        self.profile
    }

    /// The environment this output was created with.
    #[must_use]
    pub fn env(&self) -> &Environment {
        &self.env
    }

    /// Parse a color description and convert it to the profile of this output.
    #[must_use]
    pub fn color(&self, s: &str) -> Option<Color> {
        self.profile.color(s)
    }

    /// Whether the environment opts out of colors.
    #[must_use]
    pub fn env_no_color(&self) -> bool {
        env_no_color(&self.env)
    }

    /// The kind of terminal this output seems to be connected to.
    #[must_use]
    pub fn identity(&self) -> TerminalIdentity {
        TerminalIdentity::detect(&self.env)
    }

    /// Whether the underlying device is a terminal.
    ///
    /// Decided when the output is created, so this never waits for a running
    /// query.
    #[must_use]
    pub fn is_tty(&self) -> bool {
        self.is_tty
    }

    /// The default foreground color of the terminal.
    ///
    /// Looked up once, then cached. Falls back to `COLORFGBG` and then to light
    /// gray when the terminal does not say; [`Color::NoColor`] if the output is
    /// not a terminal.
    pub fn foreground_color(&self) -> Color {
        *self
            .foreground
            .get_or_init(|| self.lookup(OscColor::Foreground))
    }

    /// The default background color of the terminal.
    ///
    /// Looked up once, then cached. Falls back to `COLORFGBG` and then to black
    /// when the terminal does not say; [`Color::NoColor`] if the output is not a
    /// terminal.
    pub fn background_color(&self) -> Color {
        *self
            .background
            .get_or_init(|| self.lookup(OscColor::Background))
    }

    /// Whether the terminal has a dark background. An unknown background counts
    /// as dark.
    pub fn has_dark_background(&self) -> bool {
        self.background_color().to_rgb().is_none_or(|rgb| rgb.is_dark())
    }

    fn lookup(&self, which: OscColor) -> Color {
        let Some(tty) = &self.tty else {
            return self.fallback(which);
        };
        if !self.is_tty {
            return Color::NoColor;
        }
        let mut tty = tty.lock().unwrap_or_else(PoisonError::into_inner);

        match query_terminal_color(&mut *tty, which, &self.options) {
            Ok(rgb) => Color::Rgb(rgb),
            Err(e) => {
                debug!("OSC {} query failed: {e}", which.code());
                self.fallback(which)
            }
        }
    }

    fn fallback(&self, which: OscColor) -> Color {
        if let Some(color) = colorfgbg(self.env.get("COLORFGBG"), which) {
            debug!("using COLORFGBG for OSC {}: {color:?}", which.code());
            return color;
        }
        match which {
            OscColor::Foreground => DEFAULT_FOREGROUND,
            OscColor::Background => DEFAULT_BACKGROUND,
        }
    }
}

impl Output<Tty> {
    /// An output on stdout, described by the process environment.
    #[must_use]
    pub fn from_stdout() -> Self {
        Self::from_device(Tty::stdout())
    }

    /// An output on the controlling terminal, described by the process
    /// environment. Works even when stdout is redirected.
    #[must_use]
    pub fn from_tty() -> Self {
        Self::from_device(Tty::open())
    }

    fn from_device(device: anyhow::Result<Tty>) -> Self {
        let env = Environment::capture();
        match device {
            Ok(tty) => Self::new(tty, env),
            Err(e) => {
                debug!("no terminal: {e:#}");
                Self::with_profile(None, env, Profile::Ascii)
            }
        }
    }
}

/// Read one color from a `COLORFGBG` value such as `15;0` or `15;default;0`.
///
/// The first field is the foreground, the last one the background. A value
/// without `;` is not a pair and is ignored.
fn colorfgbg(value: &str, which: OscColor) -> Option<Color> {
    if !value.contains(';') {
        return None;
    }
    let mut fields = value.split(';');
    let field = match which {
        OscColor::Foreground => fields.next(),
        OscColor::Background => fields.next_back(),
    }?;
    field.trim().parse::<u8>().ok().map(index_color)
}
