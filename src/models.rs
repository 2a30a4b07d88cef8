//! Data models for the earthquake feed.
//!
//! The feed is loosely typed: scalar fields arrive as strings on some
//! reports and as numbers on others, and any field may be missing. Values
//! are kept in their raw form so display code can mirror them verbatim.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Top-level response from `/api/earthquake_data`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EarthquakeFeed {
    /// Events, newest first
    #[serde(default)]
    pub earthquakes: Vec<EarthquakeEvent>,
}

/// A scalar that the feed may send as either a string or a number.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Scalar {
    Text(String),
    Number(serde_json::Number),
}

impl Scalar {
    /// Leading integer of the value, the way `parseInt` reads it.
    ///
    /// `"5弱"` reads as 5, `"4"` as 4, `4.7` as 4, `"強"` as `None`. Digit
    /// runs too long for `i64` saturate.
    #[must_use]
    pub fn leading_int(&self) -> Option<i64> {
        match self {
            Self::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
            Self::Text(s) => {
                let s = s.trim_start();
                let (sign, digits) = match s.strip_prefix('-') {
                    Some(rest) => (-1, rest),
                    None => (1, s.strip_prefix('+').unwrap_or(s)),
                };
                let end = digits
                    .char_indices()
                    .find(|(_, c)| !c.is_ascii_digit())
                    .map_or(digits.len(), |(i, _)| i);
                let digits = &digits[..end];
                if digits.is_empty() {
                    return None;
                }
                // Overlong digit runs saturate, so they clamp like any large value.
                Some(digits.parse::<i64>().map_or(sign * i64::MAX, |v| sign * v))
            }
        }
    }

    /// Floating point value, for coordinates.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => n.as_f64(),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }

    /// Empty strings count as missing, like a falsy value in the browser.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        matches!(self, Self::Text(s) if s.is_empty())
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Number(n) => {
                if let Some(i) = n.as_i64() {
                    write!(f, "{i}")
                } else if let Some(u) = n.as_u64() {
                    write!(f, "{u}")
                } else {
                    // f64 Display drops a trailing ".0", matching how the feed is shown in browsers.
                    write!(f, "{}", n.as_f64().unwrap_or_default())
                }
            }
        }
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        serde_json::Number::from_f64(v).map_or_else(|| Self::Text(v.to_string()), Self::Number)
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Self::Number(v.into())
    }
}

/// Recorded intensity for one county.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AreaIntensity {
    pub county_name: Option<String>,
    pub intensity: Option<Scalar>,
}

/// A single earthquake report.
///
/// Equality is structural over every field, including fields this type does
/// not model (kept in `extra`), so that any change in the feed is visible to
/// the change detector.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EarthquakeEvent {
    pub earthquake_no: Option<Scalar>,
    pub origin_time: Option<String>,
    pub location: Option<String>,
    pub longitude: Option<Scalar>,
    pub latitude: Option<Scalar>,
    pub depth: Option<Scalar>,
    pub magnitude: Option<Scalar>,
    pub max_intensity: Option<Scalar>,
    pub report_color: Option<String>,
    #[serde(rename = "AreaIntensity", default)]
    pub area_intensity: Vec<AreaIntensity>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl EarthquakeEvent {
    /// Intensity recorded for a county, first match wins.
    #[must_use]
    pub fn intensity_in(&self, county: &str) -> Option<&Scalar> {
        self.area_intensity
            .iter()
            .find(|area| area.county_name.as_deref() == Some(county))
            .and_then(|area| area.intensity.as_ref())
    }

    /// Epicenter as (longitude, latitude), if both parse.
    #[must_use]
    pub fn epicenter(&self) -> Option<(f64, f64)> {
        let lon = self.longitude.as_ref()?.as_f64()?;
        let lat = self.latitude.as_ref()?.as_f64()?;
        (lon.is_finite() && lat.is_finite()).then_some((lon, lat))
    }

    /// Report color tier used for the intensity badge.
    #[must_use]
    pub fn report_tier(&self) -> ReportTier {
        ReportTier::from_report_color(self.report_color.as_deref())
    }
}

/// The four report color tiers published with each report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportTier {
    Green,
    Yellow,
    Orange,
    Red,
    /// Missing or unrecognized report color
    Unknown,
}

impl ReportTier {
    #[must_use]
    pub fn from_report_color(color: Option<&str>) -> Self {
        match color {
            Some("綠色") => Self::Green,
            Some("黃色") => Self::Yellow,
            Some("橙色") => Self::Orange,
            Some("紅色") => Self::Red,
            _ => Self::Unknown,
        }
    }

    /// CSS variable holding the badge background for this tier.
    #[must_use]
    pub const fn css_var(self) -> &'static str {
        match self {
            Self::Green => "var(--earthquake-span-4)",
            Self::Yellow => "var(--earthquake-span-3)",
            Self::Orange => "var(--earthquake-span-2)",
            Self::Red => "var(--earthquake-span-1)",
            Self::Unknown => "var(--default-color)",
        }
    }
}

/// Simplified event for output.
///
/// This is the normalized structure we emit in JSON/NDJSON output.
#[derive(Debug, Clone, Serialize)]
pub struct OutputEvent {
    pub earthquake_no: Option<String>,
    pub origin_time: Option<String>,
    pub location: Option<String>,
    pub region: Option<String>,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
    pub depth_km: Option<String>,
    pub magnitude: Option<String>,
    pub max_intensity: Option<String>,
    pub report_color: Option<String>,
    pub counties: Vec<OutputCounty>,
}

/// County intensity as emitted in JSON output.
#[derive(Debug, Clone, Serialize)]
pub struct OutputCounty {
    pub county: String,
    pub intensity: String,
}

impl From<&EarthquakeEvent> for OutputEvent {
    fn from(e: &EarthquakeEvent) -> Self {
        let text = |s: &Option<Scalar>| s.as_ref().map(ToString::to_string);
        Self {
            earthquake_no: text(&e.earthquake_no),
            origin_time: e.origin_time.clone(),
            location: e.location.clone(),
            region: e
                .location
                .as_deref()
                .map(|l| crate::view::extract_location(l).to_string()),
            longitude: e.longitude.as_ref().and_then(Scalar::as_f64),
            latitude: e.latitude.as_ref().and_then(Scalar::as_f64),
            depth_km: text(&e.depth),
            magnitude: text(&e.magnitude),
            max_intensity: text(&e.max_intensity),
            report_color: e.report_color.clone(),
            counties: e
                .area_intensity
                .iter()
                .filter_map(|a| {
                    Some(OutputCounty {
                        county: a.county_name.clone()?,
                        intensity: a.intensity.as_ref().map_or_else(|| "0".into(), ToString::to_string),
                    })
                })
                .collect(),
        }
    }
}
