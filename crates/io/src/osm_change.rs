// osmChange (.osc) and plain OSM (.osm) export

use std::fmt::Write as _;
use std::fs::{File, OpenOptions};
use std::io::Write as _;
use std::path::Path;

use log::warn;
use quick_xml::escape::escape;

use treesync_recon::model::{PointRecord, ReviewItem};

use crate::GENERATOR;

/// Render added/updated/removed records as an osmChange 0.6 document.
///
/// New records get placeholder ids -1, -2, … in input order. Modified
/// records keep id, version and position; deleted ones are written without
/// tags.
pub fn render_osm_change(added: &[PointRecord], updated: &[PointRecord], removed: &[PointRecord]) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    let _ = writeln!(out, "<osmChange version=\"0.6\" generator=\"{GENERATOR}\">");

    if !added.is_empty() {
        out.push_str("  <create>\n");
        for (i, record) in added.iter().enumerate() {
            write_node(&mut out, record, -(i as i64) - 1, 0, true, 4);
        }
        out.push_str("  </create>\n");
    }

    if !updated.is_empty() {
        out.push_str("  <modify>\n");
        for record in updated {
            write_node(&mut out, record, record.id.unwrap_or(0), record.version, true, 4);
        }
        out.push_str("  </modify>\n");
    }

    if !removed.is_empty() {
        out.push_str("  <delete>\n");
        for record in removed {
            write_node(&mut out, record, record.id.unwrap_or(0), record.version, false, 4);
        }
        out.push_str("  </delete>\n");
    }

    out.push_str("</osmChange>\n");
    out
}

/// Render review items as an OSM 0.6 document loadable in an editor.
///
/// Records without an id get placeholder ids -1, -2, …; each node is
/// preceded by a comment naming why it needs review.
pub fn render_osm(review: &[ReviewItem]) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    let _ = writeln!(out, "<osm version=\"0.6\" generator=\"{GENERATOR}\">");

    let mut next_placeholder = -1i64;
    for item in review {
        let id = match item.record.id {
            Some(id) => id,
            None => {
                let id = next_placeholder;
                next_placeholder -= 1;
                id
            }
        };
        let _ = writeln!(out, "  <!-- {} -->", item.reason);
        write_node(&mut out, &item.record, id, item.record.version, true, 2);
    }

    out.push_str("</osm>\n");
    out
}

/// Create every `(path, content)` file and write it.
///
/// All paths are created with create-new semantics before anything is
/// written. If any path already exists or any write fails, the files created
/// by this call are removed again: either all files are written or none.
pub fn write_new_files(files: &[(&Path, &str)]) -> Result<(), String> {
    let mut created: Vec<File> = Vec::with_capacity(files.len());
    for (i, (path, _)) in files.iter().enumerate() {
        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => created.push(file),
            Err(e) => {
                drop(created);
                discard(&files[..i]);
                return Err(format!("cannot create {}: {e}", path.display()));
            }
        }
    }

    let result = created
        .into_iter()
        .zip(files)
        .try_for_each(|(mut file, (path, content))| {
            file.write_all(content.as_bytes())
                .map_err(|e| format!("cannot write {}: {e}", path.display()))
        });
    if result.is_err() {
        discard(files);
    }
    result
}

fn discard(files: &[(&Path, &str)]) {
    for (path, _) in files {
        if let Err(e) = std::fs::remove_file(path) {
            warn!("cannot remove partial output {}: {e}", path.display());
        }
    }
}

fn write_node(out: &mut String, record: &PointRecord, id: i64, version: u32, with_tags: bool, indent: usize) {
    let pad = " ".repeat(indent);
    let _ = write!(
        out,
        "{pad}<node id=\"{id}\" version=\"{version}\" lat=\"{:.7}\" lon=\"{:.7}\"",
        record.position.lat, record.position.lon
    );

    if !with_tags || record.tags.is_empty() {
        out.push_str("/>\n");
        return;
    }

    out.push_str(">\n");
    for (k, v) in &record.tags {
        let _ = writeln!(out, "{pad}  <tag k=\"{}\" v=\"{}\"/>", escape(k.as_str()), escape(v.as_str()));
    }
    let _ = writeln!(out, "{pad}</node>");
}
