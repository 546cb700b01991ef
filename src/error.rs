use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Pipeline stage names, used to report where a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Normalize,
    Combine,
    Categorize,
    Load,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Normalize => "normalize",
            Self::Combine => "combine",
            Self::Categorize => "categorize",
            Self::Load => "load",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("{}: {reason}", file.display())]
    Parse { file: PathBuf, reason: String },

    #[error("No transaction data found to combine")]
    NoData,

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Unknown dataset: {0} (expected 'synthetic' or 'real')")]
    UnknownDataset(String),

    #[error("Database not found: {0}\nRun `finpipe run` first.")]
    MissingStore(PathBuf),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("Stage '{stage}' failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: Box<PipelineError>,
    },
}

impl PipelineError {
    pub fn parse(file: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Parse {
            file: file.into(),
            reason: reason.into(),
        }
    }

    pub fn at(self, stage: Stage) -> Self {
        Self::Stage {
            stage,
            source: Box::new(self),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_names_file() {
        let err = PipelineError::parse("raw/anz_2024.csv", "row 3: bad date '31/02/2024'");
        assert_eq!(err.to_string(), "raw/anz_2024.csv: row 3: bad date '31/02/2024'");
    }

    #[test]
    fn test_stage_wrapping_names_stage() {
        let err = PipelineError::NoData.at(Stage::Combine);
        let msg = err.to_string();
        assert!(msg.contains("'combine'"), "got: {msg}");
        assert!(msg.contains("No transaction data"), "got: {msg}");
    }
}
