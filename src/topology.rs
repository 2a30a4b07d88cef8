//! County boundaries from a TopoJSON document.
//!
//! Decoding the topology itself is left to the `topojson` crate; this module
//! only picks the named object, reads the county name property, and keeps the
//! polygon rings.

use serde::Deserialize;
use topojson::{TopoJson, to_geojson};
use tracing::debug;

use crate::errors::QuakemapError;

/// Feature property holding the county name.
pub const COUNTY_NAME_PROPERTY: &str = "COUNTYNAME";

/// A ring of (longitude, latitude) points.
pub type Ring = Vec<[f64; 2]>;

/// One county: its name and polygons (outer ring first, then holes).
#[derive(Debug, Clone, PartialEq)]
pub struct CountyFeature {
    pub name: String,
    pub polygons: Vec<Vec<Ring>>,
}

/// The geometry shapes a county can take once converted to GeoJSON.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum Shape {
    Polygon { coordinates: Vec<Vec<Vec<f64>>> },
    MultiPolygon { coordinates: Vec<Vec<Vec<Vec<f64>>>> },
    #[serde(other)]
    Other,
}

/// Parse a topology document and extract the counties of `object_name`.
///
/// # Errors
///
/// Returns [`QuakemapError::Topology`] if the document is not a topology or
/// does not contain the named object.
pub fn parse_counties(text: &str, object_name: &str) -> Result<Vec<CountyFeature>, QuakemapError> {
    let topo = text
        .parse::<TopoJson>()
        .map_err(|e| QuakemapError::Topology(e.to_string()))?;
    let TopoJson::Topology(topology) = topo else {
        return Err(QuakemapError::Topology("document is not a Topology".into()));
    };

    let collection = to_geojson(&topology, object_name)
        .map_err(|e| QuakemapError::Topology(format!("object {object_name:?}: {e}")))?;

    let mut counties = Vec::with_capacity(collection.features.len());
    for feature in collection.features {
        let name = feature
            .properties
            .as_ref()
            .and_then(|props| props.get(COUNTY_NAME_PROPERTY))
            .and_then(serde_json::Value::as_str)
            .map(str::to_string);
        let Some(name) = name else {
            debug!("skipping feature without {}", COUNTY_NAME_PROPERTY);
            continue;
        };
        let Some(geometry) = feature.geometry else {
            debug!("skipping {} without geometry", name);
            continue;
        };

        let polygons = match serde_json::from_value(serde_json::to_value(&geometry)?)? {
            Shape::Polygon { coordinates } => vec![to_rings(coordinates)],
            Shape::MultiPolygon { coordinates } => coordinates.into_iter().map(to_rings).collect(),
            Shape::Other => {
                debug!("skipping {} with non-polygon geometry", name);
                continue;
            }
        };

        counties.push(CountyFeature { name, polygons });
    }

    debug!("decoded {} counties from {}", counties.len(), object_name);
    Ok(counties)
}

fn to_rings(rings: Vec<Vec<Vec<f64>>>) -> Vec<Ring> {
    rings
        .into_iter()
        .map(|ring| {
            ring.into_iter()
                .filter_map(|pos| match pos.as_slice() {
                    [lon, lat, ..] => Some([*lon, *lat]),
                    _ => None,
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Two square counties, 台北市 and 新北市, under the `Taiwan` object.
    pub(crate) const SAMPLE_TOPOLOGY: &str = r#"{
        "type": "Topology",
        "objects": {
            "Taiwan": {
                "type": "GeometryCollection",
                "geometries": [
                    { "type": "Polygon", "arcs": [[0]], "properties": { "COUNTYNAME": "台北市" } },
                    { "type": "Polygon", "arcs": [[1]], "properties": { "COUNTYNAME": "新北市" } }
                ]
            }
        },
        "arcs": [
            [[121.4, 25.0], [121.6, 25.0], [121.6, 25.2], [121.4, 25.2], [121.4, 25.0]],
            [[121.0, 24.8], [121.2, 24.8], [121.2, 25.0], [121.0, 25.0], [121.0, 24.8]]
        ]
    }"#;

    #[test]
    fn test_parse_counties() {
        let counties = parse_counties(SAMPLE_TOPOLOGY, "Taiwan").expect("topology decodes");
        let names: Vec<&str> = counties.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["台北市", "新北市"]);

        let taipei = &counties[0];
        assert_eq!(taipei.polygons.len(), 1);
        assert_eq!(taipei.polygons[0][0].first(), Some(&[121.4, 25.0]));
    }

    #[test]
    fn test_missing_object_is_an_error() {
        let err = parse_counties(SAMPLE_TOPOLOGY, "Japan").expect_err("unknown object");
        assert!(matches!(err, QuakemapError::Topology(_)));
    }

    #[test]
    fn test_not_a_topology() {
        assert!(parse_counties("{\"type\":\"Point\",\"coordinates\":[1,2]}", "Taiwan").is_err());
        assert!(parse_counties("not json", "Taiwan").is_err());
    }
}
