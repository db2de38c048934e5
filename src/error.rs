use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed contact label '{label}': {reason}")]
    MalformedLabel { label: String, reason: String },

    #[error("unsupported table format for {}: expected .csv or a binary table", path.display())]
    UnsupportedFormat { path: PathBuf },

    #[error("no lists left to intersect after applying the length cutoff")]
    EmptyIntersection,

    #[error("averaging stalled: no column matched the group of '{pivot}'")]
    NonTermination { pivot: String },

    #[error("I/O operation failed: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("CSV error: {source}")]
    Csv {
        #[from]
        source: csv::Error,
    },

    #[error("binary table error: {source}")]
    Binary {
        #[from]
        source: bincode::Error,
    },

    #[error("failed to parse {context}: {details}")]
    Parse { context: String, details: String },

    #[error("table shape mismatch: {0}")]
    Shape(String),

    #[error("component PC{requested} requested but only {available} components were retained")]
    ComponentOutOfRange { requested: usize, available: usize },

    #[error("decomposition failed: {0}")]
    Decomposition(String),

    #[error("structure error: {0}")]
    Structure(String),
}

impl Error {
    pub fn malformed(label: &str, reason: impl Into<String>) -> Self {
        Self::MalformedLabel {
            label: label.to_string(),
            reason: reason.into(),
        }
    }

    pub fn parse(context: impl Into<String>, details: impl ToString) -> Self {
        Self::Parse {
            context: context.into(),
            details: details.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
