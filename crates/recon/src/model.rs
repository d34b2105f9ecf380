use std::collections::BTreeMap;

use serde::Serialize;

/// Mean earth radius in meters (IUGG), as used by turf-style haversine.
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Tag mapping of a record. Keys are unique; iteration order is stable.
pub type Tags = BTreeMap<String, String>;

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

/// WGS84 position in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Great-circle distance in meters (haversine).
    pub fn distance_to(&self, other: &LatLon) -> f64 {
        let phi1 = self.lat.to_radians();
        let phi2 = other.lat.to_radians();
        let d_phi = (other.lat - self.lat).to_radians();
        let d_lambda = (other.lon - self.lon).to_radians();

        let a = (d_phi / 2.0).sin().powi(2)
            + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_M * a.sqrt().min(1.0).asin()
    }

    /// Smallest lat/lon box that contains every point within `radius_m`.
    ///
    /// The longitude half-width is the exact extent of a spherical cap,
    /// `asin(sin(r) / cos(lat))`, which is never narrower than the naive
    /// `r / cos(lat)` approximation would suggest at small radii. Near the
    /// poles the box widens to the full longitude range.
    pub fn enclosing_bbox(&self, radius_m: f64) -> BoundingBox {
        let angular = radius_m / EARTH_RADIUS_M;
        let d_lat = angular.to_degrees();

        let min_lat = (self.lat - d_lat).max(-90.0);
        let max_lat = (self.lat + d_lat).min(90.0);

        let cos_lat = self.lat.to_radians().cos();
        let ratio = angular.sin() / cos_lat;
        let (min_lon, max_lon) = if min_lat <= -90.0 || max_lat >= 90.0 || ratio.is_nan() || ratio >= 1.0 {
            (-180.0, 180.0)
        } else {
            let d_lon = ratio.asin().to_degrees();
            (self.lon - d_lon, self.lon + d_lon)
        };

        BoundingBox {
            min_lat,
            min_lon,
            max_lat,
            max_lon,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, serde::Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    pub fn contains(&self, p: &LatLon) -> bool {
        p.lat >= self.min_lat && p.lat <= self.max_lat && p.lon >= self.min_lon && p.lon <= self.max_lon
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A point feature from either dataset.
///
/// Cadastre records carry no `id` (they are created fresh each run);
/// comparison records carry the id/version they were loaded with.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PointRecord {
    pub id: Option<i64>,
    pub version: u32,
    /// Last modification instant as delivered by the source (RFC 3339 or date).
    pub timestamp: String,
    pub position: LatLon,
    pub tags: Tags,
}

impl PointRecord {
    /// Human-readable handle for logs and error messages.
    pub fn label(&self) -> String {
        match self.id {
            Some(id) => format!("node/{id}"),
            None => format!("new@{:.7},{:.7}", self.position.lat, self.position.lon),
        }
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewReason {
    /// Matched by stable id, but the comparison record was edited after the
    /// cadastre snapshot and a non-exempt tag disagrees.
    ChangedInTheMeantime,
    /// Unmatched cadastre record with comparison records nearby that could
    /// not be merged automatically.
    CloseToOtherTree,
    /// Comparison record carrying a stable id already claimed by another one.
    DuplicateStableId,
}

impl std::fmt::Display for ReviewReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ChangedInTheMeantime => write!(f, "changed_in_the_meantime"),
            Self::CloseToOtherTree => write!(f, "close_to_other_tree"),
            Self::DuplicateStableId => write!(f, "duplicate_stable_id"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewItem {
    pub record: PointRecord,
    pub reason: ReviewReason,
}

// ---------------------------------------------------------------------------
// Summary + Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconSummary {
    pub cadastre_records: usize,
    pub comparison_records: usize,
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
    pub review: usize,
    /// Matched by stable id with no tag difference.
    pub unchanged: usize,
    pub changed_in_the_meantime: usize,
    pub close_to_other_tree: usize,
    pub duplicate_stable_id: usize,
}

/// Four pairwise-disjoint output collections plus counters.
#[derive(Debug, Clone, Serialize)]
pub struct ReconResult {
    pub added: Vec<PointRecord>,
    pub updated: Vec<PointRecord>,
    pub removed: Vec<PointRecord>,
    pub review: Vec<ReviewItem>,
    pub summary: ReconSummary,
}

impl ReconResult {
    /// True when there is anything to put into a changeset.
    pub fn has_changes(&self) -> bool {
        !self.added.is_empty() || !self.updated.is_empty() || !self.removed.is_empty()
    }
}
