//! File-format classification for incoming documents.

use serde::{Deserialize, Serialize};

/// Format a source file resolves to at ingestion time.
///
/// Fixed once per document; every later dispatch (parser choice, payload
/// shape) keys off this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Svg,
    Dxf,
    Raster,
    Raw,
}

impl std::fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocumentKind::Svg => write!(f, "svg"),
            DocumentKind::Dxf => write!(f, "dxf"),
            DocumentKind::Raster => write!(f, "raster"),
            DocumentKind::Raw => write!(f, "raw"),
        }
    }
}

impl DocumentKind {
    /// Classify a file from its name and declared media type.
    ///
    /// Rule order, first match wins:
    /// 1. name ends with `.svg` (exact case) -> `Svg`
    /// 2. name ends with `.dxf` (any case) -> `Dxf`
    /// 3. media type starts with `image/` -> `Raster`
    /// 4. otherwise -> `Raw`
    ///
    /// The `.svg` suffix matches exact-case only while `.dxf` matches any
    /// case, so `drawing.SVG` falls through to rules 3/4. Pure function of
    /// its two inputs.
    pub fn classify(file_name: &str, media_type: &str) -> Self {
        if file_name.ends_with(".svg") {
            DocumentKind::Svg
        } else if file_name.to_ascii_lowercase().ends_with(".dxf") {
            DocumentKind::Dxf
        } else if media_type.starts_with("image/") {
            DocumentKind::Raster
        } else {
            DocumentKind::Raw
        }
    }
}
