//! Region features and the case counts attached to them.

use geojson::{FeatureCollection, GeoJson, Value};
use log::warn;
use serde_json::Value as JsonValue;
use std::collections::HashMap;

use crate::MapError;
use crate::projection::GeoPos;

/// The property holding the case count of a region.
pub const COUNT_PROPERTY: &str = "count";

/// Identifier of a feature, assigned when a collection is loaded. Stable for as long as the
/// collection is shown.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FeatureId(pub u64);

/// A polygon of a region, in geographical coordinates. Rings are stored open (the closing point
/// of the GeoJSON ring is dropped).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RegionPolygon {
    /// The outer boundary.
    pub exterior: Vec<GeoPos>,
    /// Holes cut out of the outer boundary.
    pub holes: Vec<Vec<GeoPos>>,
}

impl RegionPolygon {
    /// Whether the position lies inside the polygon (and not inside one of its holes).
    pub fn contains(&self, pos: GeoPos) -> bool {
        ring_contains(&self.exterior, pos) && !self.holes.iter().any(|h| ring_contains(h, pos))
    }
}

/// A single mapped region.
#[derive(Clone, Debug, PartialEq)]
pub struct RegionFeature {
    /// Identifier of the feature within its collection.
    pub id: FeatureId,
    /// Display name of the region.
    pub name: String,
    /// Number of cases. `None` if the source has no usable count for the region.
    pub count: Option<u64>,
    /// The geometry of the region. Empty for non-areal geometries.
    pub polygons: Vec<RegionPolygon>,
}

impl RegionFeature {
    /// Whether the position lies inside any polygon of the region.
    pub fn contains(&self, pos: GeoPos) -> bool {
        self.polygons.iter().any(|p| p.contains(pos))
    }
}

/// An ordered collection of regions, replaced wholesale whenever new data arrives.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RegionCollection {
    features: Vec<RegionFeature>,
}

impl RegionCollection {
    /// Creates a collection, assigning feature ids by position.
    pub fn new(features: Vec<RegionFeature>) -> Self {
        let features = features
            .into_iter()
            .enumerate()
            .map(|(idx, mut feature)| {
                feature.id = FeatureId(idx as u64);
                feature
            })
            .collect();
        Self { features }
    }

    /// Builds a collection from a GeoJSON feature collection. The region name is read from
    /// `name_property`, the count from [`COUNT_PROPERTY`].
    pub fn from_geojson(collection: FeatureCollection, name_property: &str) -> Self {
        let features = collection
            .features
            .into_iter()
            .map(|feature| {
                let properties = feature.properties.unwrap_or_default();
                let name = properties
                    .get(name_property)
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                let count = properties.get(COUNT_PROPERTY).and_then(parse_count);
                let polygons = feature
                    .geometry
                    .map(|geometry| polygons_from_value(geometry.value))
                    .unwrap_or_default();
                if polygons.is_empty() {
                    warn!("Region `{}` has no drawable geometry", name);
                }
                RegionFeature {
                    id: FeatureId(0),
                    name,
                    count,
                    polygons,
                }
            })
            .collect();
        Self::new(features)
    }

    /// Parses a GeoJSON string holding a feature collection.
    pub fn from_geojson_str(s: &str, name_property: &str) -> Result<Self, MapError> {
        match s.parse::<GeoJson>()? {
            GeoJson::FeatureCollection(collection) => {
                Ok(Self::from_geojson(collection, name_property))
            }
            _ => Err(MapError::NotAFeatureCollection),
        }
    }

    /// The features, ordered by id.
    pub fn features(&self) -> &[RegionFeature] {
        &self.features
    }

    /// Looks up a feature by id.
    pub fn get(&self, id: FeatureId) -> Option<&RegionFeature> {
        self.features.get(id.0 as usize)
    }

    /// Number of features.
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Whether the collection has no features.
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// The valid counts of the collection, in feature order. Regions without a count are left
    /// out.
    pub fn samples(&self) -> Vec<f64> {
        self.features
            .iter()
            .filter_map(|f| f.count)
            .map(|c| c as f64)
            .collect()
    }

    /// Returns a copy of this collection with counts replaced from `counts`, matched by region
    /// name. Regions missing from `counts` end up without a count.
    pub fn with_counts(&self, counts: &CountTable) -> Self {
        let features = self
            .features
            .iter()
            .map(|feature| RegionFeature {
                count: counts.get(&feature.name),
                ..feature.clone()
            })
            .collect();
        Self::new(features)
    }
}

/// Case counts per region name, as served for one health status.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CountTable(HashMap<String, Option<u64>>);

impl CountTable {
    /// Parses a JSON array of records such as `[{"adm2": "Cebu", "count": 12}]`. Records without
    /// a name are skipped; unusable counts are kept as `None`.
    pub fn from_json_str(s: &str, name_property: &str) -> Result<Self, MapError> {
        let records: Vec<serde_json::Map<String, JsonValue>> = serde_json::from_str(s)?;
        let table = records
            .iter()
            .filter_map(|record| {
                let name = record.get(name_property)?.as_str()?.to_string();
                let count = record.get(COUNT_PROPERTY).and_then(parse_count);
                Some((name, count))
            })
            .collect();
        Ok(Self(table))
    }

    /// The count for a region, `None` if unknown or unusable.
    pub fn get(&self, name: &str) -> Option<u64> {
        self.0.get(name).copied().flatten()
    }
}

impl FromIterator<(String, Option<u64>)> for CountTable {
    fn from_iter<T: IntoIterator<Item = (String, Option<u64>)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Accepts non-negative integral JSON numbers, including integral floats such as `12.0`.
fn parse_count(value: &JsonValue) -> Option<u64> {
    if let Some(count) = value.as_u64() {
        return Some(count);
    }
    let count = value.as_f64()?;
    if count.is_finite() && count >= 0.0 && count.fract() == 0.0 {
        Some(count as u64)
    } else {
        None
    }
}

fn polygons_from_value(value: Value) -> Vec<RegionPolygon> {
    match value {
        Value::Polygon(rings) => polygon_from_rings(rings).into_iter().collect(),
        Value::MultiPolygon(polygons) => polygons
            .into_iter()
            .filter_map(polygon_from_rings)
            .collect(),
        _ => Vec::new(),
    }
}

fn polygon_from_rings(rings: Vec<Vec<Vec<f64>>>) -> Option<RegionPolygon> {
    let mut rings = rings.into_iter().map(|ring| ring_from_positions(&ring));
    let exterior = rings.next()?;
    if exterior.len() < 3 {
        return None;
    }
    Some(RegionPolygon {
        exterior,
        holes: rings.filter(|ring| ring.len() >= 3).collect(),
    })
}

fn ring_from_positions(positions: &[Vec<f64>]) -> Vec<GeoPos> {
    let mut ring: Vec<GeoPos> = positions
        .iter()
        .filter_map(|pos| match pos.as_slice() {
            [lon, lat, ..] => Some(GeoPos {
                lon: *lon,
                lat: *lat,
            }),
            _ => None,
        })
        .collect();

    // GeoJSON rings are closed, the triangulation expects open rings.
    if ring.len() > 1 && ring.first() == ring.last() {
        ring.pop();
    }
    ring
}

/// Even-odd ray casting test in lon/lat space.
fn ring_contains(ring: &[GeoPos], pos: GeoPos) -> bool {
    let mut inside = false;
    let n = ring.len();
    if n < 3 {
        return false;
    }
    let mut j = n - 1;
    for i in 0..n {
        let (a, b) = (ring[i], ring[j]);
        if (a.lat > pos.lat) != (b.lat > pos.lat)
            && pos.lon < (b.lon - a.lon) * (pos.lat - a.lat) / (b.lat - a.lat) + a.lon
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}
