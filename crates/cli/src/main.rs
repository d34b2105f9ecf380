// treesync - turn a municipal tree cadastre into an OSM changeset

mod exit_codes;
mod overpass;
mod settings;

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use flexi_logger::{Logger, LoggerHandle};
use log::{info, warn};

use treesync_io::{kataster, osm_change};
use treesync_recon::conflict::parse_timestamp;
use treesync_recon::{ReconResult, Reconciler};

use exit_codes::*;
use overpass::OverpassClient;
use settings::Settings;

#[derive(Parser)]
#[command(name = "treesync")]
#[command(about = "Reconcile a street tree cadastre with OpenStreetMap", long_about = None)]
#[command(version)]
struct Cli {
    /// Cadastre export (GeoJSON FeatureCollection of tree points)
    kataster: PathBuf,

    /// Publication date of the cadastre (YYYY-MM-DD, YYYY-MM or RFC 3339)
    date: String,

    /// Settings file (TOML) overriding area, thresholds and endpoints
    #[arg(long, env = "TREESYNC_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn new(code: u8, msg: impl Into<String>) -> Self {
        Self { code, message: msg.into(), hint: None }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let _logger = init_logging();

    match cmd_sync(&cli) {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

/// stderr logger, level from `RUST_LOG`. Logging is best effort.
fn init_logging() -> Option<LoggerHandle> {
    match Logger::try_with_env_or_str("warn").and_then(|logger| logger.log_to_stderr().start()) {
        Ok(handle) => Some(handle),
        Err(e) => {
            eprintln!("warning: logging disabled: {e}");
            None
        }
    }
}

/// `<input>` with `suffix` appended to the file name.
fn artifact_path(input: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(input.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

fn cmd_sync(cli: &Cli) -> Result<(), CliError> {
    if !cli.kataster.is_file() {
        return Err(CliError::new(
            EXIT_INPUT_NOT_FOUND,
            format!("input file not found: {}", cli.kataster.display()),
        ));
    }

    let review_path = artifact_path(&cli.kataster, "-review.osm");
    let changes_path = artifact_path(&cli.kataster, "-aenderungen.osc");
    for path in [&review_path, &changes_path] {
        if path.exists() {
            return Err(CliError::new(
                EXIT_OUTPUT_EXISTS,
                format!("output file already exists: {}", path.display()),
            )
            .with_hint("move or delete it, then run again"));
        }
    }

    if parse_timestamp(&cli.date).is_none() {
        return Err(CliError::new(EXIT_USAGE, format!("invalid date '{}'", cli.date))
            .with_hint("use YYYY-MM-DD, e.g. 2025-02-01"));
    }

    let settings = Settings::load(cli.config.as_deref())?;
    let reconciler = Reconciler::new(settings.recon.clone())
        .map_err(|e| CliError::new(EXIT_USAGE, e.to_string()))?;

    let cadastre = kataster::import(
        &cli.kataster,
        &cli.date,
        &settings.kataster,
        &reconciler.config().stable_id,
    )
    .map_err(|e| CliError::new(EXIT_PARSE, e))?;
    println!("Kataster: {} trees", cadastre.len());

    let client = OverpassClient::new(&settings.overpass)?;
    let comparison = client.fetch_trees(reconciler.config().area.relation_id)?;
    println!("OSM: {} trees", comparison.len());

    let result = reconciler
        .run(cadastre, comparison)
        .map_err(|e| CliError::new(EXIT_ERROR, e.to_string()))?;
    info!("summary: {:?}", result.summary);

    write_artifacts(&result, &settings, &review_path, &changes_path)
}

fn write_artifacts(
    result: &ReconResult,
    settings: &Settings,
    review_path: &Path,
    changes_path: &Path,
) -> Result<(), CliError> {
    let summary = &result.summary;
    let mut files: Vec<(&Path, String)> = Vec::new();

    if result.has_changes() {
        println!(
            "Changes: {} new, {} updated, {} removed",
            summary.added, summary.updated, summary.removed
        );
        files.push((
            changes_path,
            osm_change::render_osm_change(&result.added, &result.updated, &result.removed),
        ));
    }

    if !result.review.is_empty() {
        let thresholds = &settings.recon.thresholds;
        println!(
            "Review: {} trees ({} changed in the meantime, {} close to other tree, {} duplicate stable id)",
            summary.review,
            summary.changed_in_the_meantime,
            summary.close_to_other_tree,
            summary.duplicate_stable_id
        );
        println!(
            "        merge distance {} m, safe distance {} m",
            thresholds.merge_distance_m, thresholds.safe_distance_m
        );
        files.push((review_path, osm_change::render_osm(&result.review)));
    }

    if files.is_empty() {
        warn!("nothing to write");
        println!("Nothing to do: {} trees unchanged", summary.unchanged);
        return Ok(());
    }

    let contents: Vec<(&Path, &str)> = files.iter().map(|(path, xml)| (*path, xml.as_str())).collect();
    osm_change::write_new_files(&contents).map_err(|e| {
        CliError::new(EXIT_WRITE, e).with_hint("no output files were left behind")
    })?;
    for (path, _) in &files {
        println!("Wrote {}", path.display());
    }

    Ok(())
}
