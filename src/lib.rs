//! Terminal color capability detection library.
//!
//! - [`Profile`] detects the color depth an output supports and converts colors
//!   down to it
//! - [`Color`] and [`RGB`] model colors independently of that depth
//! - [`Output`] asks the terminal for its default foreground and background
//!   colors, once, falling back to the environment when it does not answer

pub mod color;
pub mod env;
pub mod identity;
pub mod logs;
pub mod osc;
pub mod output;
pub mod profile;
pub mod quantize;
pub mod terminal;

use anyhow::{Context, Result};
use log::debug;

pub use color::{Color, RGB, parse_rgb};
pub use env::Environment;
pub use identity::TerminalIdentity;
pub use osc::{OscColor, QueryError, QueryOptions};
pub use output::Output;
pub use profile::Profile;
pub use terminal::{TerminalDevice, Tty};

/// Detect the terminal background color and determine if it's dark or light.
///
/// Unlike [`Output::has_dark_background`], nothing is assumed when the terminal
/// does not answer.
///
/// # Errors
///
/// Returns an error if:
/// - The controlling terminal cannot be opened
/// - The terminal does not report its background color
///
/// # Returns
///
/// - `Ok("dark")` for dark backgrounds
/// - `Ok("light")` for light backgrounds
pub fn detect_background() -> Result<&'static str> {
    let mut tty = Tty::open()?;
    let options = QueryOptions::from_env(&Environment::capture());
    let rgb = osc::query_terminal_color(&mut tty, OscColor::Background, &options)
        .context("Failed to query terminal background color")?;
    debug!("rgb={rgb:?} lightness={}", rgb.lightness());

    Ok(if rgb.is_dark() { "dark" } else { "light" })
}
