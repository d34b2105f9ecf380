// Street tree cadastre (GeoJSON FeatureCollection) import

use std::io::Read;
use std::path::Path;

use log::{debug, info};
use serde::Deserialize;
use serde_json::Value;

use treesync_recon::config::StableIdConfig;
use treesync_recon::model::{LatLon, PointRecord, Tags};

/// Where the cadastre keeps its attributes and how they map onto tags.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KatasterSettings {
    /// Prefix turning the city-local street key into a nationwide one
    /// (Regionalschlüssel of Münster).
    pub regional_key: String,
    pub street_key_property: String,
    pub category_property: String,
    /// Tag every imported record carries, as `key=value`.
    pub marker_key: String,
    pub marker_value: String,
}

impl Default for KatasterSettings {
    fn default() -> Self {
        Self {
            regional_key: "055150000000".into(),
            street_key_property: "str_schl".into(),
            category_property: "baumgruppe".into(),
            marker_key: "natural".into(),
            marker_value: "tree".into(),
        }
    }
}

#[derive(Deserialize)]
struct FeatureCollection {
    features: Vec<Feature>,
}

#[derive(Deserialize)]
struct Feature {
    #[serde(default)]
    geometry: Option<Value>,
    #[serde(default)]
    properties: Option<serde_json::Map<String, Value>>,
}

pub fn import(
    path: &Path,
    timestamp: &str,
    settings: &KatasterSettings,
    scheme: &StableIdConfig,
) -> Result<Vec<PointRecord>, String> {
    let file = std::fs::File::open(path).map_err(|e| format!("cannot open {}: {e}", path.display()))?;
    parse(std::io::BufReader::new(file), timestamp, settings, scheme)
}

/// Read every usable tree from a FeatureCollection.
///
/// Features without a point geometry, street key or category property are
/// skipped silently. Records get no id, version 1 and `timestamp` (the date
/// the city published the snapshot) as modification time.
pub fn parse<R: Read>(
    reader: R,
    timestamp: &str,
    settings: &KatasterSettings,
    scheme: &StableIdConfig,
) -> Result<Vec<PointRecord>, String> {
    let collection: FeatureCollection =
        serde_json::from_reader(reader).map_err(|e| format!("invalid cadastre GeoJSON: {e}"))?;

    let total = collection.features.len();
    let mut records = Vec::with_capacity(total);

    for feature in collection.features {
        let Some(position) = feature.geometry.as_ref().and_then(point_position) else {
            debug!("skipping feature without point geometry");
            continue;
        };
        let properties = feature.properties.unwrap_or_default();
        let (Some(street_key), Some(category)) = (
            string_property(&properties, &settings.street_key_property),
            string_property(&properties, &settings.category_property),
        ) else {
            debug!("skipping feature without street key or category at {position:?}");
            continue;
        };

        let mut tags = Tags::new();
        tags.insert(settings.marker_key.clone(), settings.marker_value.clone());
        tags.insert(
            scheme.group_tag.clone(),
            format!("{}{}", settings.regional_key, street_key),
        );
        if !category.is_empty() {
            tags.insert(scheme.category_tag.clone(), category);
        }

        records.push(PointRecord {
            id: None,
            version: 1,
            timestamp: timestamp.to_string(),
            position,
            tags,
        });
    }

    info!("cadastre: {} of {total} features usable", records.len());
    Ok(records)
}

/// `[lon, lat]` of a GeoJSON Point geometry.
fn point_position(geometry: &Value) -> Option<LatLon> {
    if geometry.get("type")?.as_str()? != "Point" {
        return None;
    }
    let coords = geometry.get("coordinates")?.as_array()?;
    let lon = coords.first()?.as_f64()?;
    let lat = coords.get(1)?.as_f64()?;
    Some(LatLon::new(lat, lon))
}

/// String or numeric property as text; anything else counts as missing.
fn string_property(properties: &serde_json::Map<String, Value>, name: &str) -> Option<String> {
    match properties.get(name)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
