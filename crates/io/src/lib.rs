// File I/O: cadastre extraction, OSM XML in, osmChange / .osm out

pub mod kataster;
pub mod osm_change;
pub mod osm_xml;

/// Written into the `generator` attribute of every produced document.
pub const GENERATOR: &str = concat!("treesync ", env!("CARGO_PKG_VERSION"));
