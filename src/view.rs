//! View models computed from the earthquake list and the current selection.
//!
//! Everything here is pure: no timers, no I/O, no surface. The dashboard
//! computes these and hands them to a [`crate::surface::Surface`].

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::color::{NO_DATA_FILL, intensity_color};
use crate::models::{EarthquakeEvent, Scalar};
use crate::projection::Mercator;
use crate::topology::CountyFeature;

/// Placeholder for fields missing from a marker-click detail panel.
pub const UNKNOWN: &str = "未知";

/// Unit suffix appended to depth.
pub const DEPTH_SUFFIX: &str = " 公里";

/// Suffix appended to intensities.
pub const INTENSITY_SUFFIX: &str = "級";

/// County fill opacity.
pub const COUNTY_OPACITY: f64 = 0.5;

#[allow(clippy::expect_used)]
static LOCATION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"位於(.+?)\)").expect("location pattern is valid"));

/// Sub-region named in a location text: what sits between "位於" and the
/// first ")" after it. Returns the text unchanged when there is no match.
#[must_use]
pub fn extract_location(location: &str) -> &str {
    LOCATION_PATTERN
        .captures(location)
        .and_then(|caps| caps.get(1))
        .map_or(location, |m| m.as_str())
}

/// Which list table a row belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableScope {
    Desktop,
    Mobile,
}

/// One row of the event list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableRow {
    pub index: usize,
    /// e.g. `4級`
    pub intensity: String,
    /// Badge background for the report color tier
    pub badge_color: &'static str,
    pub origin_time: String,
    pub location: String,
    pub selected: bool,
}

/// Build the list rows; `selected` marks one row.
#[must_use]
pub fn table_rows(events: &[EarthquakeEvent], selected: Option<usize>) -> Vec<TableRow> {
    events
        .iter()
        .enumerate()
        .map(|(index, event)| TableRow {
            index,
            intensity: format!("{}{INTENSITY_SUFFIX}", text_or(event.max_intensity.as_ref(), "")),
            badge_color: event.report_tier().css_var(),
            origin_time: event.origin_time.clone().unwrap_or_default(),
            location: event
                .location
                .as_deref()
                .map(extract_location)
                .unwrap_or_default()
                .to_string(),
            selected: selected == Some(index),
        })
        .collect()
}

/// Fields of a detail panel; all blank when nothing is selected.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct DetailView {
    pub no: String,
    pub datetime: String,
    pub location: String,
    pub depth: String,
    pub magnitude: String,
}

/// Detail panel for the selected event: raw values, depth gets its unit.
///
/// Missing fields render blank.
#[must_use]
pub fn detail_view(event: &EarthquakeEvent) -> DetailView {
    DetailView {
        no: text_or(event.earthquake_no.as_ref(), ""),
        datetime: event.origin_time.clone().unwrap_or_default(),
        location: event.location.clone().unwrap_or_default(),
        depth: event
            .depth
            .as_ref()
            .map(|d| format!("{d}{DEPTH_SUFFIX}"))
            .unwrap_or_default(),
        magnitude: text_or(event.magnitude.as_ref(), ""),
    }
}

/// Detail panel for a clicked marker, with [`UNKNOWN`] for missing fields.
#[must_use]
pub fn mobile_detail_view(event: &EarthquakeEvent) -> DetailView {
    let string_or_unknown = |s: &Option<String>| {
        s.as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(UNKNOWN)
            .to_string()
    };
    DetailView {
        no: text_or(event.earthquake_no.as_ref(), UNKNOWN),
        datetime: string_or_unknown(&event.origin_time),
        location: string_or_unknown(&event.location),
        depth: format!("{}{DEPTH_SUFFIX}", text_or(event.depth.as_ref(), UNKNOWN)),
        magnitude: text_or(event.magnitude.as_ref(), UNKNOWN),
    }
}

fn text_or(value: Option<&Scalar>, fallback: &str) -> String {
    value
        .filter(|v| !v.is_blank())
        .map_or_else(|| fallback.to_string(), ToString::to_string)
}

/// Fill for a county under the current selection.
#[must_use]
pub fn county_fill(selected: Option<&EarthquakeEvent>, county: &str) -> String {
    selected
        .and_then(|event| event.intensity_in(county))
        .and_then(Scalar::leading_int)
        .map_or_else(
            || NO_DATA_FILL.to_string(),
            |v| intensity_color(v as f64).to_string(),
        )
}

/// A drawn county.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountyView {
    pub name: String,
    pub path: String,
    pub fill: String,
}

/// The full map: every county's shape and fill.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapView {
    pub view_box: &'static str,
    pub opacity: f64,
    pub counties: Vec<CountyView>,
}

/// Draw every county for the current selection.
#[must_use]
pub fn map_view(
    counties: &[CountyFeature],
    projection: &Mercator,
    selected: Option<&EarthquakeEvent>,
) -> MapView {
    MapView {
        view_box: crate::projection::VIEW_BOX,
        opacity: COUNTY_OPACITY,
        counties: counties
            .iter()
            .map(|county| CountyView {
                name: county.name.clone(),
                path: projection.path(county),
                fill: county_fill(selected, &county.name),
            })
            .collect(),
    }
}

/// New fill for one county, for recoloring without redrawing shapes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CountyFill {
    pub name: String,
    pub fill: String,
}

/// Recolor every county for a new selection.
#[must_use]
pub fn county_fills(counties: &[CountyFeature], selected: Option<&EarthquakeEvent>) -> Vec<CountyFill> {
    counties
        .iter()
        .map(|county| CountyFill {
            name: county.name.clone(),
            fill: county_fill(selected, &county.name),
        })
        .collect()
}

/// Tooltip shown while hovering a county.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tooltip {
    pub county: String,
    /// e.g. `4級`, `0級` when nothing was recorded
    pub intensity: String,
    pub left: f64,
    pub top: f64,
}

/// Pointer and layout metrics reported by the page on hover.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct HoverMetrics {
    /// Pointer position in page coordinates
    pub x: f64,
    pub y: f64,
    /// Rendered tooltip size
    pub width: f64,
    pub height: f64,
    /// Window inner width
    pub window: f64,
}

/// Gap between pointer and tooltip.
const TOOLTIP_GAP: f64 = 10.0;

/// Tooltip for a county, placed right of the pointer unless that would
/// overflow the window, and always above it.
#[must_use]
pub fn tooltip(selected: Option<&EarthquakeEvent>, county: &str, at: HoverMetrics) -> Tooltip {
    let intensity = selected
        .and_then(|event| event.intensity_in(county))
        .map_or_else(|| "0".to_string(), ToString::to_string);

    let left = if at.x + at.width + TOOLTIP_GAP > at.window {
        at.x - at.width - TOOLTIP_GAP
    } else {
        at.x + TOOLTIP_GAP
    };

    Tooltip {
        county: county.to_string(),
        intensity: format!("{intensity}{INTENSITY_SUFFIX}"),
        left,
        top: at.y - at.height - TOOLTIP_GAP,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tests::sample_event;
    use crate::topology::tests::SAMPLE_TOPOLOGY;

    #[test]
    fn test_extract_location() {
        assert_eq!(extract_location("位於台北(天氣)"), "台北(天氣");
        assert_eq!(
            extract_location("花蓮縣政府南南東方 20.3 公里 (位於花蓮縣壽豐鄉)"),
            "花蓮縣壽豐鄉"
        );
        assert_eq!(extract_location("發生於某地"), "發生於某地");
        assert_eq!(extract_location("位於台東縣"), "位於台東縣");
    }

    #[test]
    fn test_rows_for_sample() {
        let rows = table_rows(&[sample_event()], Some(0));
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.intensity, "4級");
        assert_eq!(row.badge_color, "var(--earthquake-span-3)");
        assert_eq!(row.origin_time, "2024-01-01 00:00");
        assert!(row.selected);
    }

    #[test]
    fn test_detail_mirrors_fields() {
        let detail = detail_view(&sample_event());
        assert_eq!(
            detail,
            DetailView {
                no: "001".into(),
                datetime: "2024-01-01 00:00".into(),
                location: "位於台北(天氣)".into(),
                depth: "10 公里".into(),
                magnitude: "5".into(),
            }
        );
    }

    #[test]
    fn test_mobile_detail_placeholders() {
        let detail = mobile_detail_view(&EarthquakeEvent::default());
        assert_eq!(detail.no, UNKNOWN);
        assert_eq!(detail.datetime, UNKNOWN);
        assert_eq!(detail.location, UNKNOWN);
        assert_eq!(detail.depth, "未知 公里");
        assert_eq!(detail.magnitude, UNKNOWN);

        let detail = mobile_detail_view(&sample_event());
        assert_eq!(detail.depth, "10 公里");
    }

    #[test]
    fn test_county_fill() {
        let event = sample_event();
        assert_eq!(county_fill(Some(&event), "台北市"), intensity_color(4.0).to_string());
        assert_eq!(county_fill(Some(&event), "新北市"), NO_DATA_FILL);
        assert_eq!(county_fill(None, "台北市"), NO_DATA_FILL);

        let mut huge = sample_event();
        huge.area_intensity[0].intensity = Some(Scalar::from("99999999999999999999"));
        assert_eq!(county_fill(Some(&huge), "台北市"), "rgb(103, 0, 13)");
    }

    #[test]
    fn test_map_view_colors_only_recorded_counties() {
        let counties = crate::topology::parse_counties(SAMPLE_TOPOLOGY, "Taiwan").expect("decodes");
        let event = sample_event();
        let map = map_view(&counties, &Mercator::new(13_500.0), Some(&event));
        assert_eq!(map.counties.len(), 2);
        assert_eq!(map.counties[0].fill, intensity_color(4.0).to_string());
        assert_eq!(map.counties[1].fill, NO_DATA_FILL);
        assert!(map.counties.iter().all(|c| c.path.starts_with('M')));
    }

    #[test]
    fn test_tooltip_content_and_flip() {
        let event = sample_event();
        let metrics = HoverMetrics { x: 100.0, y: 200.0, width: 80.0, height: 40.0, window: 1000.0 };

        let tip = tooltip(Some(&event), "台北市", metrics);
        assert_eq!(tip.intensity, "4級");
        assert!((tip.left - 110.0).abs() < f64::EPSILON);
        assert!((tip.top - 150.0).abs() < f64::EPSILON);

        let tip = tooltip(Some(&event), "新北市", HoverMetrics { x: 950.0, ..metrics });
        assert_eq!(tip.intensity, "0級");
        assert!((tip.left - 860.0).abs() < f64::EPSILON);
    }
}
