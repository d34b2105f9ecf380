// OSM XML 0.6 node import (Overpass `out meta;` output)

use quick_xml::escape::unescape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use treesync_recon::model::{LatLon, PointRecord, Tags};

/// Parse every `<node>` of an OSM XML document. Ways, relations and other
/// elements are ignored.
pub fn parse_osm_nodes(xml: &str) -> Result<Vec<PointRecord>, String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut nodes = Vec::new();
    let mut current: Option<PointRecord> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) if e.name().as_ref() == b"node" => {
                current = Some(node_from_attributes(e)?);
            }
            Ok(Event::Empty(ref e)) if e.name().as_ref() == b"node" => {
                nodes.push(node_from_attributes(e)?);
            }
            Ok(Event::Empty(ref e)) if e.name().as_ref() == b"tag" => {
                if let Some(node) = current.as_mut() {
                    let (k, v) = tag_from_attributes(e)?;
                    node.tags.insert(k, v);
                }
            }
            Ok(Event::End(ref e)) if e.name().as_ref() == b"node" => {
                if let Some(node) = current.take() {
                    nodes.push(node);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(format!(
                    "invalid OSM XML at byte {}: {e}",
                    reader.buffer_position()
                ))
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(nodes)
}

fn attr_value(raw: &[u8]) -> Result<String, String> {
    let lossy = String::from_utf8_lossy(raw);
    unescape(&lossy)
        .map(|v| v.into_owned())
        .map_err(|e| format!("invalid attribute value '{lossy}': {e}"))
}

fn node_from_attributes(e: &BytesStart) -> Result<PointRecord, String> {
    let mut id = None;
    let mut version = 1u32;
    let mut timestamp = String::new();
    let mut lat = None;
    let mut lon = None;

    for attr in e.attributes().flatten() {
        let value = attr_value(&attr.value)?;
        match attr.key.as_ref() {
            b"id" => id = Some(value.parse::<i64>().map_err(|_| format!("invalid node id '{value}'"))?),
            b"version" => {
                version = value
                    .parse()
                    .map_err(|_| format!("invalid node version '{value}'"))?
            }
            b"timestamp" => timestamp = value,
            b"lat" => lat = value.parse::<f64>().ok(),
            b"lon" => lon = value.parse::<f64>().ok(),
            _ => {}
        }
    }

    match (id, lat, lon) {
        (Some(id), Some(lat), Some(lon)) => Ok(PointRecord {
            id: Some(id),
            version,
            timestamp,
            position: LatLon::new(lat, lon),
            tags: Tags::new(),
        }),
        (Some(id), _, _) => Err(format!("node {id} has no valid lat/lon")),
        _ => Err("node without id".into()),
    }
}

fn tag_from_attributes(e: &BytesStart) -> Result<(String, String), String> {
    let mut k = None;
    let mut v = None;
    for attr in e.attributes().flatten() {
        match attr.key.as_ref() {
            b"k" => k = Some(attr_value(&attr.value)?),
            b"v" => v = Some(attr_value(&attr.value)?),
            _ => {}
        }
    }
    match (k, v) {
        (Some(k), Some(v)) => Ok((k, v)),
        _ => Err("tag without k or v attribute".into()),
    }
}
