//! Per-file asynchronous loading.
//!
//! One call of [`load_file`] is one independent unit of work: read the
//! file, parse or decode per its classified format, and build the
//! `Document`. Failures are typed and belong to this file alone.

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;

use crate::classify::DocumentKind;
use crate::diag::{DiagnosticHub, DiagnosticSink, RedirectScope};
use crate::document::{Document, DocumentPayload, IngestModifiers};
use crate::error::LoadError;
use crate::parsers::{DxfTreeParser, RasterDecoder, SvgTagParser};

/// One file handed to ingestion: where it lives and what the picker declared
/// it to be.
#[derive(Debug, Clone)]
pub struct InputFile {
    pub path: PathBuf,
    pub media_type: String,
}

impl InputFile {
    pub fn new(path: impl Into<PathBuf>, media_type: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            media_type: media_type.into(),
        }
    }

    /// File name component, used for classification and reporting.
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// Shared collaborators every load uses.
#[derive(Clone)]
pub struct LoaderDeps {
    pub svg: Arc<dyn SvgTagParser>,
    pub dxf: Arc<dyn DxfTreeParser>,
    pub raster: Arc<dyn RasterDecoder>,
    /// Diagnostic channel the SVG parser writes to.
    pub diag: DiagnosticHub,
    /// Application command log; parse diagnostics and load failures land here.
    pub command_log: Arc<dyn DiagnosticSink>,
}

/// Load one file into a `Document`.
///
/// Steps run in order within this task: read, parse/decode, build payload.
/// All failure paths return a typed [`LoadError`]; nothing panics outward.
pub async fn load_file(
    file: &InputFile,
    modifiers: &IngestModifiers,
    deps: &LoaderDeps,
) -> Result<Document, LoadError> {
    let name = file.name();
    let kind = DocumentKind::classify(&name, &file.media_type);
    tracing::debug!(name = %name, kind = %kind, "Loading file");

    match kind {
        DocumentKind::Svg => {
            let text = read_text(file, &name).await?;
            // Parser output is rerouted to the command log for exactly the
            // duration of the parse; the scope restores the previous sink on
            // every exit path.
            let parsed = {
                let _redirect = RedirectScope::new(&deps.diag, deps.command_log.clone());
                deps.svg.parse(&text, &deps.diag).await
            };
            let tags = parsed.map_err(|source| LoadError::SvgParse {
                name: name.clone(),
                source,
            })?;
            Ok(Document::new(
                name,
                &file.media_type,
                text.len() as u64,
                kind,
                DocumentPayload::VectorTags(tags),
                modifiers.clone(),
            ))
        }
        DocumentKind::Dxf => {
            let text = read_text(file, &name).await?;
            let tree = deps.dxf.parse(&text).map_err(|source| LoadError::DxfParse {
                name: name.clone(),
                source,
            })?;
            Ok(Document::new(
                name,
                &file.media_type,
                text.len() as u64,
                kind,
                DocumentPayload::VectorTree(tree),
                modifiers.clone(),
            ))
        }
        DocumentKind::Raster => {
            let data = read_bytes(file, &name).await?;
            let image = deps
                .raster
                .decode(&data)
                .await
                .map_err(|source| LoadError::Decode {
                    name: name.clone(),
                    source,
                })?;
            Ok(Document::new(
                name,
                &file.media_type,
                data.len() as u64,
                kind,
                DocumentPayload::Raster { data, image },
                modifiers.clone(),
            ))
        }
        DocumentKind::Raw => {
            // No parsing; downstream consumers may still reject the content.
            let data = read_bytes(file, &name).await?;
            Ok(Document::new(
                name,
                &file.media_type,
                data.len() as u64,
                kind,
                DocumentPayload::Raw(data),
                modifiers.clone(),
            ))
        }
    }
}

async fn read_text(file: &InputFile, name: &str) -> Result<String, LoadError> {
    tokio::fs::read_to_string(&file.path)
        .await
        .map_err(|source| LoadError::Io {
            name: name.to_string(),
            source,
        })
}

async fn read_bytes(file: &InputFile, name: &str) -> Result<Bytes, LoadError> {
    tokio::fs::read(&file.path)
        .await
        .map(Bytes::from)
        .map_err(|source| LoadError::Io {
            name: name.to_string(),
            source,
        })
}
