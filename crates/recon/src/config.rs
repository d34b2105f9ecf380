use serde::Deserialize;

use crate::error::ReconError;
use crate::model::BoundingBox;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Engine configuration. Every section has defaults, so an empty TOML
/// document describes the Münster street tree import.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReconConfig {
    pub name: String,
    pub area: AreaConfig,
    pub thresholds: ThresholdConfig,
    pub stable_id: StableIdConfig,
    pub merge: MergeConfig,
}

impl Default for ReconConfig {
    fn default() -> Self {
        Self {
            name: "Münster street trees".into(),
            area: AreaConfig::default(),
            thresholds: ThresholdConfig::default(),
            stable_id: StableIdConfig::default(),
            merge: MergeConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Area
// ---------------------------------------------------------------------------

/// Raster extent plus the comparison-dataset area it corresponds to.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AreaConfig {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
    /// OSM relation id of the administrative area (62591 = Münster).
    pub relation_id: u64,
}

impl Default for AreaConfig {
    fn default() -> Self {
        Self {
            min_lat: 51.866528062297945,
            min_lon: 7.333374023437501,
            max_lat: 52.05523498618564,
            max_lon: 7.872390747070313,
            relation_id: 62591,
        }
    }
}

impl AreaConfig {
    pub fn bbox(&self) -> BoundingBox {
        BoundingBox {
            min_lat: self.min_lat,
            min_lon: self.min_lon,
            max_lat: self.max_lat,
            max_lon: self.max_lon,
        }
    }
}

// ---------------------------------------------------------------------------
// Thresholds
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Anything closer than this (meters) counts as "nearby": an unmatched
    /// cadastre record is only added blindly when nothing is within it.
    /// Roughly "the other side of a residential street".
    pub safe_distance_m: f64,
    /// Trunk-center to trunk-center distance (meters) up to which a single
    /// nearby record may absorb the cadastre record automatically.
    pub merge_distance_m: f64,
    /// Raster cell size in degrees.
    pub raster_cell_deg: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            safe_distance_m: 6.5,
            merge_distance_m: 2.5,
            raster_cell_deg: 0.0005,
        }
    }
}

// ---------------------------------------------------------------------------
// Stable id
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StableIdConfig {
    /// Tag the stable id is stored in.
    pub id_tag: String,
    /// Grouping attribute (administrative segment).
    pub group_tag: String,
    /// Category attribute used as first sort key and id component.
    pub category_tag: String,
    /// Category used when a record has none.
    pub unknown_category: String,
    pub separator: String,
}

impl Default for StableIdConfig {
    fn default() -> Self {
        Self {
            id_tag: "ref:muenster:tree".into(),
            group_tag: "de:strassenschluessel".into(),
            category_tag: "species:de".into(),
            unknown_category: "unknown".into(),
            separator: "_".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Merge policy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Volatile measurements that never block an automatic merge.
    pub exempt_tags: Vec<String>,
    /// Tags consulted, in order, before the record timestamp when deciding
    /// which side is more recent.
    pub timestamp_tags: Vec<String>,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            exempt_tags: vec!["circumference".into(), "diameter_crown".into()],
            timestamp_tags: vec!["check_date".into(), "survey:date".into()],
        }
    }
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl ReconConfig {
    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let config: ReconConfig =
            toml::from_str(input).map_err(|e| ReconError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        let t = &self.thresholds;
        for (name, value) in [
            ("safe_distance_m", t.safe_distance_m),
            ("merge_distance_m", t.merge_distance_m),
            ("raster_cell_deg", t.raster_cell_deg),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ReconError::ConfigValidation(format!(
                    "{name} must be a positive number, got {value}"
                )));
            }
        }
        if t.safe_distance_m <= t.merge_distance_m {
            return Err(ReconError::ConfigValidation(format!(
                "safe_distance_m ({}) must be greater than merge_distance_m ({})",
                t.safe_distance_m, t.merge_distance_m
            )));
        }

        let a = &self.area;
        let in_range = (-90.0..=90.0).contains(&a.min_lat)
            && (-90.0..=90.0).contains(&a.max_lat)
            && (-180.0..=180.0).contains(&a.min_lon)
            && (-180.0..=180.0).contains(&a.max_lon);
        if !in_range {
            return Err(ReconError::ConfigValidation(
                "area bounds must be valid WGS84 coordinates".into(),
            ));
        }
        if a.min_lat >= a.max_lat || a.min_lon >= a.max_lon {
            return Err(ReconError::ConfigValidation(
                "area must have min_lat < max_lat and min_lon < max_lon".into(),
            ));
        }

        let s = &self.stable_id;
        for (name, value) in [
            ("id_tag", &s.id_tag),
            ("group_tag", &s.group_tag),
            ("category_tag", &s.category_tag),
            ("separator", &s.separator),
        ] {
            if value.is_empty() {
                return Err(ReconError::ConfigValidation(format!(
                    "stable_id.{name} must not be empty"
                )));
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
