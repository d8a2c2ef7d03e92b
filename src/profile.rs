//! Color profiles and their detection from the environment.
//!
//! A [`Profile`] is the richest color depth an output can show. Detection follows
//! the `TERM`/`COLORTERM` conventions, with `NO_COLOR` (<https://no-color.org>) and
//! `CLICOLOR`/`CLICOLOR_FORCE` (<https://bixense.com/clicolors>) taking precedence.

use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use log::debug;

use crate::color::{Color, RGB, parse_rgb};
use crate::env::Environment;
use crate::quantize::{ansi256_to_ansi, rgb_to_ansi256};

/// `TERM` values known to support true color without advertising it.
const TRUECOLOR_TERMS: [&str; 3] = ["xterm-kitty", "wezterm", "xterm-ghostty"];

/// Maximum color depth of an output, ordered from poorest to richest.
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Profile {
    /// No colors at all.
    Ascii,
    /// The 16 ANSI colors.
    ANSI,
    /// The 256-color palette.
    ANSI256,
    /// 24-bit colors.
    TrueColor,
}

impl Profile {
    /// Convert `color` so it can be shown with this profile.
    ///
    /// Colors already within the profile are returned untouched; richer colors are
    /// reduced with the [`crate::quantize`] functions. Converting is idempotent,
    /// and converting with a poorer profile gives the same result as converting
    /// with a richer one first.
    ///
    /// # Examples
    ///
    /// ```
    /// # use termtint::{Color, Profile, RGB};
    /// let color = Color::Rgb(RGB::new(0xab, 0xcd, 0xef));
    /// assert_eq!(Profile::ANSI256.convert(color), Color::Ansi256(153));
    /// assert_eq!(Profile::Ascii.convert(color), Color::NoColor);
    /// ```
    #[must_use]
    pub fn convert(self, color: Color) -> Color {
        if self == Profile::Ascii {
            return Color::NoColor;
        }

        match color {
            Color::NoColor | Color::Ansi(_) => color,
            Color::Ansi256(n) => {
                if self == Profile::ANSI {
                    Color::Ansi(ansi256_to_ansi(n))
                } else {
                    color
                }
            }
            Color::Rgb(rgb) => match self {
                Profile::TrueColor => color,
                Profile::ANSI256 => Color::Ansi256(rgb_to_ansi256(rgb)),
                Profile::ANSI | Profile::Ascii => Color::Ansi(ansi256_to_ansi(rgb_to_ansi256(rgb))),
            },
        }
    }

    /// Parse a color description and convert it to this profile.
    ///
    /// Accepts anything [`parse_rgb`] understands (e.g. `#abcdef`) as well as
    /// palette indices: `0`-`15` are ANSI colors, `16`-`255` entries of the
    /// 256-color palette.
    ///
    /// # Returns
    ///
    /// - `Some(color)` converted with [`Profile::convert`]
    /// - `None` if `s` is empty or not a recognized color
    #[must_use]
    pub fn color(self, s: &str) -> Option<Color> {
        let s = s.trim();
        if s.is_empty() {
            return None;
        }

        let color = if let Ok(index) = s.parse::<u8>() {
            index_color(index)
        } else {
            match parse_rgb(s) {
                Ok(rgb) => Color::Rgb(rgb),
                Err(e) => {
                    debug!("ignoring color {s:?}: {e:#}");
                    return None;
                }
            }
        };
        Some(self.convert(color))
    }

    /// Convert an RGB value to this profile.
    #[must_use]
    pub fn from_rgb(self, rgb: RGB) -> Color {
        self.convert(Color::Rgb(rgb))
    }

    /// Detect the profile from the environment, honoring the opt-out and force
    /// conventions.
    ///
    /// Opting out always yields [`Profile::Ascii`]. When the terminal itself does
    /// not seem to support colors but colors are forced, [`Profile::ANSI`] is used.
    ///
    /// The result is not memoized; snapshot the environment once if you need
    /// stable answers across a session.
    ///
    /// # Arguments
    ///
    /// * `env` - Snapshot holding `TERM`, `COLORTERM`, `TERM_PROGRAM`,
    ///   `GOOGLE_CLOUD_SHELL`, `NO_COLOR`, `CLICOLOR` and `CLICOLOR_FORCE`
    ///
    /// # Returns
    ///
    /// The richest profile the terminal is believed to support.
    #[must_use]
    pub fn detect(env: &Environment) -> Self {
        if env_no_color(env) {
            return Profile::Ascii;
        }
        let profile = Self::from_term(env);
        if profile == Profile::Ascii && cli_color_forced(env) {
            return Profile::ANSI;
        }
        profile
    }

    /// Detect the profile from the terminal variables alone (`TERM`, `COLORTERM`,
    /// `TERM_PROGRAM`, `GOOGLE_CLOUD_SHELL`), ignoring opt-out and force signals.
    #[must_use]
    pub fn from_term(env: &Environment) -> Self {
        if env.get("GOOGLE_CLOUD_SHELL") == "true" {
            return Profile::TrueColor;
        }

        let term = env.get("TERM");
        let color_term = env.get("COLORTERM").to_ascii_lowercase();

        match color_term.as_str() {
            "24bit" | "truecolor" => {
                // screen only forwards 256 colors, tmux passes true color through
                if term.starts_with("screen") && env.get("TERM_PROGRAM") != "tmux" {
                    return Profile::ANSI256;
                }
                return Profile::TrueColor;
            }
            "yes" | "true" => return Profile::ANSI256,
            _ => {}
        }

        if TRUECOLOR_TERMS.contains(&term) {
            return Profile::TrueColor;
        }
        if term.contains("256color") {
            return Profile::ANSI256;
        }
        if term.contains("color") || term.contains("ansi") {
            return Profile::ANSI;
        }

        Profile::Ascii
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Profile::Ascii => "Ascii",
            Profile::ANSI => "ANSI",
            Profile::ANSI256 => "ANSI256",
            Profile::TrueColor => "TrueColor",
        };
        f.write_str(name)
    }
}

impl FromStr for Profile {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ascii" | "none" => Ok(Profile::Ascii),
            "ansi" | "16" => Ok(Profile::ANSI),
            "ansi256" | "256" => Ok(Profile::ANSI256),
            "truecolor" | "24bit" => Ok(Profile::TrueColor),
            _ => Err(anyhow!("Unknown color profile: {s}")),
        }
    }
}

/// Whether the environment asks for colors to be disabled: `NO_COLOR` is set, or
/// `CLICOLOR=0` without a competing `CLICOLOR_FORCE`.
#[must_use]
pub fn env_no_color(env: &Environment) -> bool {
    env.is_set("NO_COLOR") || (env.get("CLICOLOR") == "0" && !cli_color_forced(env))
}

/// Whether `CLICOLOR_FORCE` is set to anything but `0`.
#[must_use]
pub fn cli_color_forced(env: &Environment) -> bool {
    let forced = env.get("CLICOLOR_FORCE");
    !forced.is_empty() && forced != "0"
}

/// The color for a palette index given as a small integer.
pub(crate) fn index_color(index: u8) -> Color {
    if index < 16 {
        Color::Ansi(index)
    } else {
        Color::Ansi256(index)
    }
}
