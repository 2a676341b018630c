use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the mask computation pipeline.
///
/// Parsing and geometric problems are recovered where they occur and never
/// show up here; what remains is configuration, I/O, and upstream failure.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {reason}")]
    Config { reason: String },

    #[error("unsupported EPSG code {epsg}")]
    UnknownCrs { epsg: u32 },

    #[error("coordinate ({x}, {y}) is not transformable into EPSG {epsg}")]
    Untransformable { x: f64, y: f64, epsg: u32 },

    #[error("WFS request failed with status {status}")]
    Upstream { status: u16 },

    #[error("WFS request failed: {reason}")]
    Transport { reason: String },

    #[error("malformed geoid grid {path}: line {line}")]
    GeoidFormat { path: PathBuf, line: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn config(reason: impl Into<String>) -> Self {
        Error::Config {
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
