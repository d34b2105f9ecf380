//! Overpass API client: downloads every tree node of the configured area.
//!
//! One request per run. Transport errors and non-success statuses map to
//! [`EXIT_FETCH`].

use std::time::Duration;

use log::{debug, info};
use treesync_recon::model::PointRecord;

use crate::exit_codes::{EXIT_FETCH, EXIT_PARSE};
use crate::settings::OverpassSettings;
use crate::CliError;

const USER_AGENT: &str = concat!("treesync/", env!("CARGO_PKG_VERSION"));

/// Overpass derives area ids from relation ids by this offset.
const AREA_ID_OFFSET: u64 = 3_600_000_000;

/// Overpass QL selecting all `natural=tree` nodes inside a relation's area,
/// with version and timestamp metadata.
pub fn area_query(relation_id: u64) -> String {
    format!(
        "area({})->.searchArea;\nnode[\"natural\"=\"tree\"](area.searchArea);\nout meta;",
        AREA_ID_OFFSET + relation_id
    )
}

pub struct OverpassClient {
    http: reqwest::blocking::Client,
    endpoint: String,
}

impl OverpassClient {
    pub fn new(settings: &OverpassSettings) -> Result<Self, CliError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| CliError::new(EXIT_FETCH, format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            http,
            endpoint: settings.endpoint.clone(),
        })
    }

    /// Fetch all tree nodes of `relation_id`'s area.
    pub fn fetch_trees(&self, relation_id: u64) -> Result<Vec<PointRecord>, CliError> {
        let body = self.request(&area_query(relation_id))?;
        treesync_io::osm_xml::parse_osm_nodes(&body)
            .map_err(|e| CliError::new(EXIT_PARSE, format!("Overpass response: {e}")))
    }

    fn request(&self, query: &str) -> Result<String, CliError> {
        debug!("POST {}", self.endpoint);
        let resp = self
            .http
            .post(&self.endpoint)
            .form(&[("data", query)])
            .send()
            .map_err(|e| {
                CliError::new(EXIT_FETCH, format!("Overpass request failed: {e}"))
                    .with_hint(format!("is {} reachable?", self.endpoint))
            })?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().unwrap_or_default();
            let detail = detail.lines().next().unwrap_or("").trim();
            return Err(CliError::new(
                EXIT_FETCH,
                if detail.is_empty() {
                    format!("Overpass returned {}", status.as_u16())
                } else {
                    format!("Overpass returned {}: {detail}", status.as_u16())
                },
            ));
        }

        let body = resp
            .text()
            .map_err(|e| CliError::new(EXIT_FETCH, format!("cannot read Overpass response: {e}")))?;
        info!("overpass: {} bytes", body.len());
        Ok(body)
    }
}
