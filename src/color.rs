//! Intensity color scale.
//!
//! A sequential red ramp over the fixed intensity domain `[0, 10]`. The ramp
//! is the 9-stop "Reds" scheme; intensities are mapped to a fractional stop
//! index and the color is linearly interpolated between adjacent stops.

use std::fmt;

/// Lower end of the intensity domain.
pub const DOMAIN_MIN: f64 = 0.0;

/// Upper end of the intensity domain.
pub const DOMAIN_MAX: f64 = 10.0;

/// Fill for counties without a recorded intensity.
pub const NO_DATA_FILL: &str = "var(--bg2-color)";

const REDS: [[u8; 3]; 9] = [
    [0xff, 0xf5, 0xf0],
    [0xfe, 0xe0, 0xd2],
    [0xfc, 0xbb, 0xa1],
    [0xfc, 0x92, 0x72],
    [0xfb, 0x6a, 0x4a],
    [0xef, 0x3b, 0x2c],
    [0xcb, 0x18, 0x1d],
    [0xa5, 0x0f, 0x15],
    [0x67, 0x00, 0x0d],
];

/// An sRGB color, formatted as `rgb(r, g, b)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rgb({}, {}, {})", self.r, self.g, self.b)
    }
}

/// Map an intensity to its scale color, clamping to the domain.
#[must_use]
pub fn intensity_color(intensity: f64) -> Rgb {
    let t = if intensity.is_nan() {
        0.0
    } else {
        ((intensity - DOMAIN_MIN) / (DOMAIN_MAX - DOMAIN_MIN)).clamp(0.0, 1.0)
    };
    sample(t)
}

/// Sample the ramp at `t` in `[0, 1]`.
fn sample(t: f64) -> Rgb {
    let last = REDS.len() - 1;
    let pos = t * last as f64;
    let lo = (pos.floor() as usize).min(last);
    let hi = (lo + 1).min(last);
    let frac = pos - lo as f64;
    let mix = |a: u8, b: u8| (f64::from(a) + (f64::from(b) - f64::from(a)) * frac).round() as u8;
    let (a, b) = (REDS[lo], REDS[hi]);
    Rgb {
        r: mix(a[0], b[0]),
        g: mix(a[1], b[1]),
        b: mix(a[2], b[2]),
    }
}
