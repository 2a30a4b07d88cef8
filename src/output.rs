//! Output formatters for the earthquake list.
//!
//! Supports human-readable (with colors), JSON, and NDJSON formats.

use std::io::{self, Write};

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone};

use crate::models::{EarthquakeEvent, OutputEvent, ReportTier};
use crate::view::extract_location;

// ANSI color codes
const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";

// Report color tiers
const TIER_GREEN: &str = "\x1b[42;30m";
const TIER_YELLOW: &str = "\x1b[43;30m";
const TIER_ORANGE: &str = "\x1b[48;5;208;30m";
const TIER_RED: &str = "\x1b[41;97m";
const TIER_UNKNOWN: &str = "\x1b[47;30m";

const ICON_QUAKE: &str = "🌏";

/// Offset of the feed's local times (UTC+8).
const FEED_OFFSET_SECS: i32 = 8 * 3600;

/// Output format selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    /// Human-readable terminal output (default)
    #[default]
    Human,
    /// JSON array
    Json,
    /// Newline-delimited JSON (one object per line)
    Ndjson,
}

impl std::str::FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "human" => Ok(Self::Human),
            "json" => Ok(Self::Json),
            "ndjson" => Ok(Self::Ndjson),
            _ => Err(format!("unknown format: {s} (expected: human, json, ndjson)")),
        }
    }
}

fn tier_color(tier: ReportTier) -> &'static str {
    match tier {
        ReportTier::Green => TIER_GREEN,
        ReportTier::Yellow => TIER_YELLOW,
        ReportTier::Orange => TIER_ORANGE,
        ReportTier::Red => TIER_RED,
        ReportTier::Unknown => TIER_UNKNOWN,
    }
}

/// Parse a feed origin time, which is local time without an offset.
#[must_use]
pub fn parse_origin_time(s: &str) -> Option<DateTime<FixedOffset>> {
    let offset = FixedOffset::east_opt(FEED_OFFSET_SECS)?;
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .and_then(|naive| offset.from_local_datetime(&naive).single())
}

/// Relative age such as "5 min ago".
fn relative_age(origin: DateTime<FixedOffset>, now: DateTime<FixedOffset>) -> String {
    let diff = now.signed_duration_since(origin);
    if diff.num_hours() < 1 {
        format!("{} min ago", diff.num_minutes().max(1))
    } else if diff.num_hours() < 24 {
        format!("{} hr ago", diff.num_hours())
    } else {
        format!("{} days ago", diff.num_days())
    }
}

/// Write events in human-readable format.
///
/// One line per event: intensity badge on the report color, magnitude,
/// depth, origin time with age, region, and county intensities.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_human<W: Write>(
    writer: &mut W,
    events: &[EarthquakeEvent],
    now: DateTime<FixedOffset>,
) -> io::Result<()> {
    for event in events {
        let badge = tier_color(event.report_tier());
        let intensity = event
            .max_intensity
            .as_ref()
            .map_or_else(|| "?".into(), ToString::to_string);
        let magnitude = event
            .magnitude
            .as_ref()
            .map_or_else(|| "?".into(), ToString::to_string);
        let depth = event
            .depth
            .as_ref()
            .map_or_else(|| "?".into(), ToString::to_string);

        let origin = event.origin_time.as_deref().unwrap_or("unknown");
        let age = parse_origin_time(origin)
            .map(|t| format!(" {DIM}({}){RESET}", relative_age(t, now)))
            .unwrap_or_default();

        let region = event
            .location
            .as_deref()
            .map_or("Unknown location", extract_location);

        let counties = event
            .area_intensity
            .iter()
            .filter_map(|a| {
                let name = a.county_name.as_deref()?;
                let level = a.intensity.as_ref().map_or_else(|| "0".into(), ToString::to_string);
                Some(format!("{name} {level}"))
            })
            .collect::<Vec<_>>()
            .join(", ");

        writeln!(
            writer,
            "{ICON_QUAKE} {badge}{BOLD} {intensity}級 {RESET} │ \
             {BOLD}M{magnitude}{RESET} │ \
             {DIM}{depth:>4}km{RESET} │ \
             {origin}{age} │ \
             {region} {DIM}{counties}{RESET}"
        )?;
    }
    Ok(())
}

/// Write events as a JSON array.
///
/// # Errors
///
/// Returns an error if serialization or writing fails.
pub fn write_json<W: Write>(writer: &mut W, events: &[EarthquakeEvent]) -> io::Result<()> {
    let output: Vec<OutputEvent> = events.iter().map(OutputEvent::from).collect();
    let json = serde_json::to_string_pretty(&output)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    writeln!(writer, "{json}")
}

/// Write events as newline-delimited JSON.
///
/// Each event is written as a single line of JSON.
///
/// # Errors
///
/// Returns an error if serialization or writing fails.
pub fn write_ndjson<W: Write>(writer: &mut W, events: &[EarthquakeEvent]) -> io::Result<()> {
    for event in events {
        let output = OutputEvent::from(event);
        let json = serde_json::to_string(&output)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        writeln!(writer, "{json}")?;
    }
    Ok(())
}

/// Write events in the specified format.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_events<W: Write>(
    writer: &mut W,
    events: &[EarthquakeEvent],
    format: Format,
) -> io::Result<()> {
    match format {
        Format::Human => write_human(writer, events, chrono::Utc::now().fixed_offset()),
        Format::Json => write_json(writer, events),
        Format::Ndjson => write_ndjson(writer, events),
    }
}
