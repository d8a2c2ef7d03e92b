//! Terminal color capability report.
//!
//! This program detects the color profile of the controlling terminal and queries
//! its default foreground and background colors using OSC 10/11 escape sequences.
//!
//! # Usage
//!
//! The program prints the profile, both default colors (as SGR parameters and
//! hex values), then one of:
//! - `"light"` - for light backgrounds (lightness >= 0.5)
//! - `"dark"` - for dark backgrounds (lightness < 0.5)
//! - `"unknown"` - alone, when there is no controlling terminal
//!
//! Exit codes:
//! - 0: Successfully reached the terminal
//! - 2: No controlling terminal
//!
//! # Environment Variables
//!
//! - `DEBUG`: When set, enables debug output to stderr showing the query
//!   exchange and fallbacks. `DEBUG=trace` also shows raw-mode transitions.
//! - `TERM`, `COLORTERM`, `NO_COLOR`, `CLICOLOR`, `CLICOLOR_FORCE`, `COLORFGBG`:
//!   see [`termtint::Profile::detect`] and [`termtint::Output`].

use std::process;

use log::debug;
use termtint::{Color, Output, logs};

fn describe(color: Color, background: bool) -> String {
    let hex = color
        .to_rgb()
        .map_or_else(|| "-".to_string(), |rgb| rgb.to_string());
    format!("{:<16} {hex}", color.sequence(background))
}

/// Main entry point for the termtint terminal color report utility.
fn main() {
    if let Err(e) = logs::init() {
        eprintln!("Failed to initialize logging: {e}");
    }

    let output = Output::from_tty();
    if !output.is_tty() {
        debug!("unable to reach the terminal");
        print!("unknown");
        process::exit(2);
    }

    println!("profile:    {}", output.profile());
    println!("identity:   {}", output.identity());
    println!("foreground: {}", describe(output.foreground_color(), false));
    println!("background: {}", describe(output.background_color(), true));
    if output.has_dark_background() {
        println!("dark");
    } else {
        println!("light");
    }
}
