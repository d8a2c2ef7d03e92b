//! Color model and color string parsing.
//!
//! This module provides:
//! - The [`RGB`] triple used for true colors and palette lookups
//! - The [`Color`] sum type covering every color depth a terminal may support
//! - Rendering of colors to SGR parameter fragments
//! - Parsing of the color formats terminals and users hand us (hex, X11 `rgb:`, CSS `rgb()`)

use std::fmt;

use anyhow::{Context, Result, anyhow};
use regex::Regex;

use crate::profile::Profile;
use crate::quantize::PALETTE;

/// SGR prefix selecting the foreground color.
const FOREGROUND: &str = "38";
/// SGR prefix selecting the background color.
const BACKGROUND: &str = "48";

/// Colors with an HSL lightness below this value are considered dark.
const DARK_THRESHOLD: f64 = 0.5;

/// RGB color representation with red, green, and blue components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RGB {
    /// Red component (0-255)
    pub r: u8,
    /// Green component (0-255)
    pub g: u8,
    /// Blue component (0-255)
    pub b: u8,
}

impl RGB {
    /// Create a new RGB color from individual components.
    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Create a new RGB color from a tuple.
    #[must_use]
    pub fn from_tuple(rgb: (u8, u8, u8)) -> Self {
        Self {
            r: rgb.0,
            g: rgb.1,
            b: rgb.2,
        }
    }

    /// Convert RGB color to a tuple.
    #[must_use]
    pub fn to_tuple(self) -> (u8, u8, u8) {
        (self.r, self.g, self.b)
    }

    /// HSL lightness of the color, between 0.0 (black) and 1.0 (white).
    #[must_use]
    pub fn lightness(self) -> f64 {
        let max = self.r.max(self.g).max(self.b);
        let min = self.r.min(self.g).min(self.b);
        (f64::from(max) + f64::from(min)) / (2.0 * 255.0)
    }

    /// Whether the color reads as dark, i.e. its lightness is below one half.
    #[must_use]
    pub fn is_dark(self) -> bool {
        self.lightness() < DARK_THRESHOLD
    }
}

impl fmt::Display for RGB {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// A terminal color at one of the supported depths.
///
/// The rendered sequence of a color only depends on its variant, its value and
/// whether it is used as a background.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Color {
    /// The terminal cannot show colors; renders as an empty fragment.
    NoColor,
    /// One of the 16 ANSI colors (0-15).
    Ansi(u8),
    /// An entry of the 256-color palette.
    Ansi256(u8),
    /// A 24-bit color.
    Rgb(RGB),
}

impl Color {
    /// Render the color as an SGR parameter fragment.
    ///
    /// `Ansi` colors 0-7 map to 30-37 (40-47 as background), 8-15 to the bright
    /// range 90-97 (100-107). `Ansi256` renders as `38;5;N`, `Rgb` as `38;2;R;G;B`
    /// (`48` instead of `38` for backgrounds). `NoColor` renders as an empty
    /// string, which style layers must treat as "no color attribute" rather than an
    /// empty SGR group.
    ///
    /// # Examples
    ///
    /// ```
    /// # use termtint::color::{Color, RGB};
    /// assert_eq!(Color::Ansi(9).sequence(false), "91");
    /// assert_eq!(Color::Ansi256(91).sequence(true), "48;5;91");
    /// assert_eq!(Color::Rgb(RGB::new(255, 128, 0)).sequence(false), "38;2;255;128;0");
    /// assert_eq!(Color::NoColor.sequence(false), "");
    /// ```
    #[must_use]
    pub fn sequence(self, background: bool) -> String {
        let prefix = if background { BACKGROUND } else { FOREGROUND };
        match self {
            Color::NoColor => String::new(),
            Color::Ansi(n) => {
                let n = u16::from(n);
                let base = if n < 8 { 30 + n } else { 90 + n - 8 };
                let code = if background { base + 10 } else { base };
                code.to_string()
            }
            Color::Ansi256(n) => format!("{prefix};5;{n}"),
            Color::Rgb(RGB { r, g, b }) => format!("{prefix};2;{r};{g};{b}"),
        }
    }

    /// The RGB value the terminal is expected to show for this color, using the
    /// standard xterm palette for indexed colors.
    ///
    /// Returns `None` for [`Color::NoColor`].
    #[must_use]
    pub fn to_rgb(self) -> Option<RGB> {
        match self {
            Color::NoColor => None,
            Color::Ansi(n) | Color::Ansi256(n) => Some(PALETTE[usize::from(n)]),
            Color::Rgb(rgb) => Some(rgb),
        }
    }

    /// The lowest profile able to show this color without conversion.
    #[must_use]
    pub fn profile(self) -> Profile {
        match self {
            Color::NoColor => Profile::Ascii,
            Color::Ansi(_) => Profile::ANSI,
            Color::Ansi256(_) => Profile::ANSI256,
            Color::Rgb(_) => Profile::TrueColor,
        }
    }
}

impl From<RGB> for Color {
    fn from(rgb: RGB) -> Self {
        Color::Rgb(rgb)
    }
}

/// Parse an RGB color string into RGB struct.
///
/// This function supports multiple color formats:
/// - `rgb:RRRR/GGGG/BBBB` - X11 RGB format as reported by terminals
/// - `rgba:RRRR/GGGG/BBBB/AAAA` - X11 RGBA format (alpha ignored)
/// - `#RRGGBB` - Standard hex color format
/// - `#RRGGBBAA` - Hex color with alpha (alpha ignored)
/// - `rgb(R, G, B)` - CSS-style RGB function
///
/// # Errors
///
/// This function returns an error in the following cases:
/// - The string is not in a recognized color format
/// - A component value is invalid (e.g., non-hex characters, out of range)
/// - An X11 channel has fewer than 2 or more than 4 hex digits
///
/// # Examples
///
/// ```
/// # use termtint::color::{RGB, parse_rgb};
/// assert_eq!(parse_rgb("rgb:ffff/8080/0000").unwrap(), RGB::new(255, 128, 0));
/// assert_eq!(parse_rgb("#ff8000").unwrap(), RGB::new(255, 128, 0));
/// assert_eq!(parse_rgb("rgb(255, 128, 0)").unwrap(), RGB::new(255, 128, 0));
/// ```
pub fn parse_rgb(s: &str) -> Result<RGB> {
    let s = s.trim();

    // Handle rgb: or rgba: format
    if s.starts_with("rgb:") || s.starts_with("rgba:") {
        let color_part = s
            .split_once(':')
            .ok_or_else(|| anyhow!("Invalid rgb: format - missing colon"))?
            .1;
        let parts: Vec<&str> = color_part.split('/').collect();

        if parts.len() == 3 || parts.len() == 4 {
            let r = hex_to_u8(parts[0])
                .with_context(|| format!("Failed to parse red component: {}", parts[0]))?;
            let g = hex_to_u8(parts[1])
                .with_context(|| format!("Failed to parse green component: {}", parts[1]))?;
            let b = hex_to_u8(parts[2])
                .with_context(|| format!("Failed to parse blue component: {}", parts[2]))?;
            return Ok(RGB::new(r, g, b));
        }
        return Err(anyhow!(
            "Invalid rgb: format - expected 3 or 4 components, got {}",
            parts.len()
        ));
    }

    // Handle #hex format
    if s.starts_with('#') && s.is_ascii() && (s.len() == 7 || s.len() == 9) {
        let hex = &s[1..7];
        let r = u8::from_str_radix(&hex[0..2], 16)
            .with_context(|| format!("Failed to parse red hex component: {}", &hex[0..2]))?;
        let g = u8::from_str_radix(&hex[2..4], 16)
            .with_context(|| format!("Failed to parse green hex component: {}", &hex[2..4]))?;
        let b = u8::from_str_radix(&hex[4..6], 16)
            .with_context(|| format!("Failed to parse blue hex component: {}", &hex[4..6]))?;
        return Ok(RGB::new(r, g, b));
    }

    // Handle rgb() format
    let re = Regex::new(r"^rgb\((\d+),\s*(\d+),\s*(\d+)\)$")
        .context("Failed to compile RGB regex")?;
    if let Some(caps) = re.captures(s) {
        let r = caps[1]
            .parse::<u8>()
            .with_context(|| format!("Failed to parse red component: {}", &caps[1]))?;
        let g = caps[2]
            .parse::<u8>()
            .with_context(|| format!("Failed to parse green component: {}", &caps[2]))?;
        let b = caps[3]
            .parse::<u8>()
            .with_context(|| format!("Failed to parse blue component: {}", &caps[3]))?;
        return Ok(RGB::new(r, g, b));
    }

    Err(anyhow!("Unrecognized color format: {}", s))
}

/// Convert an X11 hex channel to u8.
///
/// Terminals report channels with 2 to 4 hex digits (up to 16 bits). Only the two
/// most significant digits are kept, which truncates the channel to 8 bits.
pub(crate) fn hex_to_u8(hex: &str) -> Result<u8> {
    if !(2..=4).contains(&hex.len()) {
        return Err(anyhow!(
            "Invalid hex length: expected 2 to 4 characters, got {}",
            hex.len()
        ));
    }
    if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(anyhow!("Invalid hex string: {hex}"));
    }
    u8::from_str_radix(&hex[..2], 16).with_context(|| format!("Invalid hex string: {hex}"))
}
