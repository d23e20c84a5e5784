use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Boundary records of any other type are never joined.
pub const COUNTRY_AREA_TYPE: &str = "country";

/// A (latitude, longitude) pair, serialized as `[lat, lng]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng(pub f64, pub f64);

impl LatLng {
    pub fn lat(&self) -> f64 {
        self.0
    }

    pub fn lng(&self) -> f64 {
        self.1
    }
}

/// An ordered ring of coordinates. Closure and winding are not checked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPolygon")]
pub struct Polygon(Vec<LatLng>);

// Feeds send either a bare ring or a ring wrapped in one more array.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawPolygon {
    Ring(Vec<LatLng>),
    Rings(Vec<Vec<LatLng>>),
}

impl TryFrom<RawPolygon> for Polygon {
    type Error = String;

    fn try_from(raw: RawPolygon) -> Result<Self, Self::Error> {
        let points = match raw {
            RawPolygon::Ring(points) => points,
            RawPolygon::Rings(mut rings) if rings.len() == 1 => rings.remove(0),
            RawPolygon::Rings(rings) => {
                return Err(format!(
                    "a boundary polygon must hold exactly one ring, got {}",
                    rings.len()
                ))
            }
        };
        if points.is_empty() {
            return Err("a boundary ring needs at least one point".to_string());
        }
        Ok(Polygon(points))
    }
}

impl Polygon {
    pub fn new(points: Vec<LatLng>) -> Self {
        Polygon(points)
    }

    pub fn points(&self) -> &[LatLng] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Reasons a map client refuses to draw this polygon, if any.
    pub fn defect(&self) -> Option<String> {
        if self.0.is_empty() {
            return Some("polygon has no coordinates".to_string());
        }
        self.0.iter().enumerate().find_map(|(i, p)| {
            let in_range = p.lat().is_finite()
                && p.lng().is_finite()
                && (-90.0..=90.0).contains(&p.lat())
                && (-180.0..=180.0).contains(&p.lng());
            (!in_range).then(|| format!("coordinate {} ({}, {}) is out of range", i, p.lat(), p.lng()))
        })
    }
}

impl FromIterator<LatLng> for Polygon {
    fn from_iter<I: IntoIterator<Item = LatLng>>(iter: I) -> Self {
        Polygon(iter.into_iter().collect())
    }
}

/// A country from the countries feed, with the polygons joined onto it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Country {
    pub name: String,
    #[serde(rename = "isoCode", alias = "iso")]
    pub iso_code: String,
    /// Absent until the first matching boundary arrives; never empty once present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boundaries: Option<Vec<Polygon>>,
    /// Everything else the feed carries (population, area, centre, ...).
    #[serde(flatten)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

impl Country {
    pub fn new(name: impl Into<String>, iso_code: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            iso_code: iso_code.into(),
            boundaries: None,
            attributes: serde_json::Map::new(),
        }
    }

    pub fn boundary_count(&self) -> usize {
        self.boundaries.as_ref().map_or(0, Vec::len)
    }

    /// Append-only: boundaries are never replaced.
    pub fn push_boundary(&mut self, polygon: Polygon) {
        self.boundaries.get_or_insert_with(Vec::new).push(polygon);
    }
}

/// One raw entry of the boundaries feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundaryRecord {
    #[serde(rename = "type")]
    pub area_type: String,
    pub name: String,
    #[serde(rename = "isoCode", alias = "iso")]
    pub iso_code: String,
    #[serde(rename = "boundaries", alias = "polygon")]
    pub polygon: Polygon,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub division: Option<u32>,
}

impl BoundaryRecord {
    pub fn is_country(&self) -> bool {
        self.area_type == COUNTRY_AREA_TYPE
    }
}

/// The boundaries feed: boundary id -> record, kept in document order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BoundaryFeed {
    entries: Vec<(String, BoundaryRecord)>,
}

impl BoundaryFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<String>, record: BoundaryRecord) {
        self.entries.push((id.into(), record));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BoundaryRecord)> {
        self.entries.iter().map(|(id, record)| (id.as_str(), record))
    }

    pub fn get(&self, id: &str) -> Option<&BoundaryRecord> {
        self.iter().find(|(key, _)| *key == id).map(|(_, record)| record)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, BoundaryRecord)> for BoundaryFeed {
    fn from_iter<I: IntoIterator<Item = (String, BoundaryRecord)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl Serialize for BoundaryFeed {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (id, record) in &self.entries {
            map.serialize_entry(id, record)?;
        }
        map.end()
    }
}

struct BoundaryFeedVisitor;

impl<'de> Visitor<'de> for BoundaryFeedVisitor {
    type Value = BoundaryFeed;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a map of boundary id to boundary record")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
        while let Some((id, record)) = access.next_entry::<String, BoundaryRecord>()? {
            entries.push((id, record));
        }
        Ok(BoundaryFeed { entries })
    }
}

impl<'de> Deserialize<'de> for BoundaryFeed {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(BoundaryFeedVisitor)
    }
}
