//! Optional settings file: engine config plus the knobs of the two inputs.
//!
//! ```toml
//! [recon.thresholds]
//! safe_distance_m = 6.5
//!
//! [kataster]
//! regional_key = "055150000000"
//!
//! [overpass]
//! endpoint = "https://overpass-api.de/api/interpreter"
//! ```

use std::path::Path;

use serde::Deserialize;
use treesync_io::kataster::KatasterSettings;
use treesync_recon::ReconConfig;

use crate::exit_codes::EXIT_USAGE;
use crate::CliError;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub recon: ReconConfig,
    pub kataster: KatasterSettings,
    pub overpass: OverpassSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OverpassSettings {
    pub endpoint: String,
    pub timeout_secs: u64,
}

impl Default for OverpassSettings {
    fn default() -> Self {
        Self {
            endpoint: "https://overpass-api.de/api/interpreter".into(),
            timeout_secs: 300,
        }
    }
}

impl Settings {
    /// Load from `path`, or the built-in defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, CliError> {
        let settings = match path {
            None => Settings::default(),
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|e| {
                    CliError::new(EXIT_USAGE, format!("cannot read settings {}: {e}", path.display()))
                })?;
                Self::from_toml(&text)
                    .map_err(|e| CliError::new(EXIT_USAGE, format!("{}: {e}", path.display())))?
            }
        };
        settings
            .recon
            .validate()
            .map_err(|e| CliError::new(EXIT_USAGE, e.to_string()))?;
        Ok(settings)
    }

    pub fn from_toml(input: &str) -> Result<Self, String> {
        toml::from_str(input).map_err(|e| format!("settings parse error: {e}"))
    }
}
