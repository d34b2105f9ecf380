//! CLI Exit Code Registry
//!
//! Single source of truth for the exit codes of `treesync`.
//!
//! | Code | Meaning                                                   |
//! |------|-----------------------------------------------------------|
//! | 0    | Success (also when there was nothing to write)            |
//! | 1    | Reconciliation failed (e.g. unparseable timestamp)        |
//! | 2    | Usage error (missing argument, bad date, bad settings)    |
//! | 3    | Cadastre input file not found                             |
//! | 4    | An output artifact already exists                         |
//! | 5    | Input could not be parsed (cadastre GeoJSON, OSM XML)     |
//! | 6    | Comparison dataset could not be retrieved                 |
//! | 7    | Output artifact could not be written                      |

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - reconciliation aborted.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments or settings. clap uses 2 for missing
/// positionals as well.
pub const EXIT_USAGE: u8 = 2;

/// The cadastre file does not exist or is not a file.
pub const EXIT_INPUT_NOT_FOUND: u8 = 3;

/// Refusing to overwrite an existing review or changeset file.
pub const EXIT_OUTPUT_EXISTS: u8 = 4;

/// Cadastre or OSM data is not in the expected format.
pub const EXIT_PARSE: u8 = 5;

/// Overpass request failed (transport error or non-success status).
pub const EXIT_FETCH: u8 = 6;

/// Writing an output artifact failed.
pub const EXIT_WRITE: u8 = 7;
