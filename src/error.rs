//! Error taxonomy for ingestion and generation.

use thiserror::Error;

use crate::parsers::ParseError;

/// Failure loading a single file.
///
/// Recovered locally: logged, the file is skipped, and sibling loads in the
/// same batch are unaffected.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("svg parse failed for {name}: {source}")]
    SvgParse {
        name: String,
        #[source]
        source: ParseError,
    },
    #[error("dxf parse failed for {name}: {source}")]
    DxfParse {
        name: String,
        #[source]
        source: ParseError,
    },
    #[error("raster decode failed for {name}: {source}")]
    Decode {
        name: String,
        #[source]
        source: anyhow::Error,
    },
}

impl LoadError {
    /// Name of the file the failure belongs to.
    pub fn file_name(&self) -> &str {
        match self {
            LoadError::Io { name, .. }
            | LoadError::SvgParse { name, .. }
            | LoadError::DxfParse { name, .. }
            | LoadError::Decode { name, .. } => name,
        }
    }
}

/// Failure starting a generation job.
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("invalid settings: {}", .problems.join("; "))]
    InvalidSettings { problems: Vec<String> },
    #[error("a generation job is already running")]
    JobAlreadyRunning,
}
