//! Color depth reduction.
//!
//! Two deterministic reductions are provided:
//! - [`rgb_to_ansi256`] maps a 24-bit color onto the 6x6x6 color cube or the
//!   24-step grayscale ramp of the 256-color palette, whichever is perceptually closer
//! - [`ansi256_to_ansi`] maps a 256-color palette entry onto the nearest of the 16
//!   ANSI colors
//!
//! Perceptual distance is the euclidean distance in CIE L\*a\*b\* (D65).

use crate::color::RGB;

/// Channel values of the six steps of the color cube.
const CUBE_RAMP: [u8; 6] = [0x00, 0x5f, 0x87, 0xaf, 0xd7, 0xff];

/// The 16 ANSI colors, as rendered by xterm.
const ANSI_COLORS: [RGB; 16] = [
    RGB::new(0x00, 0x00, 0x00),
    RGB::new(0x80, 0x00, 0x00),
    RGB::new(0x00, 0x80, 0x00),
    RGB::new(0x80, 0x80, 0x00),
    RGB::new(0x00, 0x00, 0x80),
    RGB::new(0x80, 0x00, 0x80),
    RGB::new(0x00, 0x80, 0x80),
    RGB::new(0xc0, 0xc0, 0xc0),
    RGB::new(0x80, 0x80, 0x80),
    RGB::new(0xff, 0x00, 0x00),
    RGB::new(0x00, 0xff, 0x00),
    RGB::new(0xff, 0xff, 0x00),
    RGB::new(0x00, 0x00, 0xff),
    RGB::new(0xff, 0x00, 0xff),
    RGB::new(0x00, 0xff, 0xff),
    RGB::new(0xff, 0xff, 0xff),
];

/// Reference RGB values of the 256-color palette.
///
/// Entries 0-15 are the ANSI colors, 16-231 the color cube and 232-255 the
/// grayscale ramp (`8 + 10 * n`).
pub const PALETTE: [RGB; 256] = build_palette();

const fn build_palette() -> [RGB; 256] {
    let mut palette = [RGB::new(0, 0, 0); 256];
    let mut i = 0;
    while i < 16 {
        palette[i] = ANSI_COLORS[i];
        i += 1;
    }
    while i < 232 {
        let ci = i - 16;
        palette[i] = RGB::new(CUBE_RAMP[ci / 36], CUBE_RAMP[(ci / 6) % 6], CUBE_RAMP[ci % 6]);
        i += 1;
    }
    while i < 256 {
        #[allow(clippy::cast_possible_truncation)]
        let v = (8 + 10 * (i - 232)) as u8;
        palette[i] = RGB::new(v, v, v);
        i += 1;
    }
    palette
}

/// Map a channel value to its color cube step (0-5).
///
/// The thresholds are the midpoints between consecutive [`CUBE_RAMP`] values.
fn cube_step(v: u8) -> usize {
    match v {
        0..48 => 0,
        48..115 => 1,
        _ => ((usize::from(v) - 35) / 40).min(5),
    }
}

/// Reduce a 24-bit color to a 256-color palette index (16-255).
///
/// The color cube candidate takes, for each channel, the nearest cube step. The
/// grayscale candidate is derived from the average of the cube candidate's
/// channels. The candidate with the smaller perceptual distance to `rgb` wins;
/// ties go to the color cube.
///
/// # Examples
///
/// ```
/// # use termtint::color::RGB;
/// # use termtint::quantize::rgb_to_ansi256;
/// assert_eq!(rgb_to_ansi256(RGB::new(0x87, 0x00, 0xaf)), 91);
/// assert_eq!(rgb_to_ansi256(RGB::new(0xff, 0xff, 0xff)), 231);
/// ```
#[must_use]
pub fn rgb_to_ansi256(rgb: RGB) -> u8 {
    let (r, g, b) = (cube_step(rgb.r), cube_step(rgb.g), cube_step(rgb.b));
    let cube = RGB::new(CUBE_RAMP[r], CUBE_RAMP[g], CUBE_RAMP[b]);

    let average = (usize::from(cube.r) + usize::from(cube.g) + usize::from(cube.b)) / 3;
    let gray_idx = if average > 238 {
        23
    } else {
        average.saturating_sub(3) / 10
    };
    let gray = PALETTE[232 + gray_idx];

    let target = Lab::from(rgb);
    let index = if target.distance(Lab::from(cube)) <= target.distance(Lab::from(gray)) {
        16 + 36 * r + 6 * g + b
    } else {
        232 + gray_idx
    };
    u8::try_from(index).unwrap_or(u8::MAX)
}

/// Reduce a 256-color palette index to the nearest of the 16 ANSI colors.
///
/// Ties go to the lowest ANSI index.
///
/// # Returns
///
/// An ANSI color index between 0 and 15.
///
/// # Examples
///
/// ```
/// # use termtint::quantize::ansi256_to_ansi;
/// assert_eq!(ansi256_to_ansi(82), 10);
/// assert_eq!(ansi256_to_ansi(9), 9);
/// ```
#[must_use]
pub fn ansi256_to_ansi(index: u8) -> u8 {
    let target = Lab::from(PALETTE[usize::from(index)]);
    let mut best = 0;
    let mut best_distance = f64::MAX;
    for (i, candidate) in (0u8..).zip(ANSI_COLORS) {
        let d = target.distance(Lab::from(candidate));
        if d < best_distance {
            best_distance = d;
            best = i;
        }
    }
    best
}

/// A color in CIE L\*a\*b\* space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lab {
    /// Lightness
    pub l: f64,
    /// Green-red axis
    pub a: f64,
    /// Blue-yellow axis
    pub b: f64,
}

impl Lab {
    /// Euclidean distance between two colors.
    #[must_use]
    pub fn distance(self, other: Lab) -> f64 {
        let dl = self.l - other.l;
        let da = self.a - other.a;
        let db = self.b - other.b;
        (dl * dl + da * da + db * db).sqrt()
    }
}

impl From<RGB> for Lab {
    fn from(rgb: RGB) -> Self {
        // D65 reference white
        const WHITE: [f64; 3] = [0.950_47, 1.0, 1.088_83];
        const EPSILON: f64 = 216.0 / 24_389.0;
        const KAPPA: f64 = 24_389.0 / 27.0;

        // Convert sRGB component to linear RGB
        let lin = |c: u8| -> f64 {
            let c = f64::from(c) / 255.0;
            if c <= 0.04045 {
                c / 12.92
            } else {
                ((c + 0.055) / 1.055).powf(2.4)
            }
        };
        let (r, g, b) = (lin(rgb.r), lin(rgb.g), lin(rgb.b));

        let x = 0.412_456_4 * r + 0.357_576_1 * g + 0.180_437_5 * b;
        let y = 0.212_672_9 * r + 0.715_152_2 * g + 0.072_175_0 * b;
        let z = 0.019_333_9 * r + 0.119_192_0 * g + 0.950_304_1 * b;

        let f = |t: f64| -> f64 {
            if t > EPSILON {
                t.cbrt()
            } else {
                (KAPPA * t + 16.0) / 116.0
            }
        };
        let (fx, fy, fz) = (f(x / WHITE[0]), f(y / WHITE[1]), f(z / WHITE[2]));

        Lab {
            l: 116.0 * fy - 16.0,
            a: 500.0 * (fx - fy),
            b: 200.0 * (fy - fz),
        }
    }
}
