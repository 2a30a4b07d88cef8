//! Mercator projection onto the map's SVG viewBox.

use std::f64::consts::FRAC_PI_2;
use std::fmt::Write;

use crate::topology::CountyFeature;

/// Map center (longitude, latitude) in degrees.
pub const MAP_CENTER: (f64, f64) = (121.0, 23.8);

/// Pixel position the map center projects to.
pub const TRANSLATE: (f64, f64) = (480.0, 250.0);

/// SVG viewBox the map is drawn into.
pub const VIEW_BOX: &str = "0 0 800 600";

const MAX_LAT_DEG: f64 = 85.051_128_78;

/// Initial scale for a viewport width, chosen once when the map is created.
///
/// Narrow screens get a larger scale so the island stays readable.
#[must_use]
pub fn scale_for_width(viewport_width: u32) -> f64 {
    match viewport_width {
        w if w < 768 => 16_000.0,
        w if w < 1200 => 15_000.0,
        _ => 13_500.0,
    }
}

fn mercator_x(lon_deg: f64) -> f64 {
    lon_deg.to_radians()
}

fn mercator_y(lat_deg: f64) -> f64 {
    let lat = lat_deg.clamp(-MAX_LAT_DEG, MAX_LAT_DEG).to_radians();
    (0.5 * (FRAC_PI_2 + lat)).tan().ln()
}

/// Spherical Mercator centered on [`MAP_CENTER`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mercator {
    scale: f64,
    center_x: f64,
    center_y: f64,
}

impl Mercator {
    #[must_use]
    pub fn new(scale: f64) -> Self {
        Self {
            scale,
            center_x: mercator_x(MAP_CENTER.0),
            center_y: mercator_y(MAP_CENTER.1),
        }
    }

    /// Projection for a viewport width, see [`scale_for_width`].
    #[must_use]
    pub fn for_viewport(viewport_width: u32) -> Self {
        Self::new(scale_for_width(viewport_width))
    }

    #[must_use]
    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Project (longitude, latitude) to viewBox pixels.
    #[must_use]
    pub fn project(&self, lon_deg: f64, lat_deg: f64) -> (f64, f64) {
        let x = TRANSLATE.0 + (mercator_x(lon_deg) - self.center_x) * self.scale;
        let y = TRANSLATE.1 - (mercator_y(lat_deg) - self.center_y) * self.scale;
        (x, y)
    }

    /// SVG path data for a county, one closed subpath per ring.
    #[must_use]
    pub fn path(&self, county: &CountyFeature) -> String {
        let mut d = String::new();
        for ring in county.polygons.iter().flatten() {
            for (i, [lon, lat]) in ring.iter().enumerate() {
                let (x, y) = self.project(*lon, *lat);
                let cmd = if i == 0 { 'M' } else { 'L' };
                let _ = write!(d, "{cmd}{x:.2},{y:.2}");
            }
            if !ring.is_empty() {
                d.push('Z');
            }
        }
        d
    }
}
