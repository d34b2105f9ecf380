//! `treesync-recon`: reconciliation of a tree cadastre against OSM.
//!
//! Pure engine crate: receives pre-loaded records, returns classified results.
//! No CLI or IO dependencies.

pub mod config;
pub mod conflict;
pub mod engine;
pub mod error;
pub mod evidence;
pub mod model;
pub mod raster;
pub mod stable_id;

pub use config::ReconConfig;
pub use engine::Reconciler;
pub use error::ReconError;
pub use model::{LatLon, PointRecord, ReconResult, ReconSummary, ReviewItem, ReviewReason, Tags};
