use std::fmt;

#[derive(Debug)]
pub enum ReconError {
    /// TOML parse / deserialization error.
    ConfigParse(String),
    /// Config validation error (bad thresholds, empty extent, etc.).
    ConfigValidation(String),
    /// A timestamp (record timestamp or check-date tag) could not be parsed.
    TimestampParse {
        record: String,
        tag: Option<String>,
        value: String,
    },
}

impl fmt::Display for ReconError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
            Self::TimestampParse { record, tag: Some(tag), value } => {
                write!(f, "record {record}: cannot parse {tag} '{value}'")
            }
            Self::TimestampParse { record, tag: None, value } => {
                write!(f, "record {record}: cannot parse timestamp '{value}'")
            }
        }
    }
}

impl std::error::Error for ReconError {}
