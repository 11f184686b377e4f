//! CLI error type.

use std::fmt;

/// Errors surfaced to the terminal with a non-zero exit code.
#[derive(Debug)]
pub enum CliError {
    /// Reading an input file failed
    Io(std::io::Error),
    /// The export could not be parsed
    Parse(hearthmap::hmap::HmapError),
    /// The import finished unsuccessfully
    ImportFailed(String),
    /// Usage reconciliation failed
    Reconcile(String),
    /// Invalid command-line input
    Invalid(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Io(e) => write!(f, "i/o error: {e}"),
            CliError::Parse(e) => write!(f, "{e}"),
            CliError::ImportFailed(msg) => write!(f, "import failed: {msg}"),
            CliError::Reconcile(msg) => write!(f, "reconciliation failed: {msg}"),
            CliError::Invalid(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for CliError {}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError::Io(e)
    }
}

impl From<hearthmap::hmap::HmapError> for CliError {
    fn from(e: hearthmap::hmap::HmapError) -> Self {
        CliError::Parse(e)
    }
}
