//! Shared test doubles for the parser and decoder seams.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use image::{DynamicImage, RgbaImage};

use crate::diag::{DiagnosticHub, MemorySink, Severity};
use crate::ingest::LoaderDeps;
use crate::parsers::{
    DxfEntity, DxfTreeParser, ParseError, RasterDecoder, SvgTagParser, TagNode, VectorTags,
    VectorTree,
};

/// SVG parser stub: warns through the hub, fails on input containing
/// "broken".
pub struct StubSvgParser;

#[async_trait]
impl SvgTagParser for StubSvgParser {
    async fn parse(&self, text: &str, diag: &DiagnosticHub) -> Result<VectorTags, ParseError> {
        diag.write(Severity::Warn, "unsupported attribute skipped");
        if text.contains("broken") {
            return Err(ParseError::new("unclosed svg tag"));
        }
        Ok(VectorTags {
            tags: vec![TagNode {
                name: "svg".to_string(),
                ..Default::default()
            }],
        })
    }
}

/// DXF parser stub: fails on input containing "broken".
pub struct StubDxfParser;

impl DxfTreeParser for StubDxfParser {
    fn parse(&self, text: &str) -> Result<VectorTree, ParseError> {
        if text.contains("broken") {
            return Err(ParseError::new("bad group code"));
        }
        Ok(VectorTree {
            entities: vec![DxfEntity {
                kind: "LINE".to_string(),
                layer: "0".to_string(),
                points: vec![(0.0, 0.0), (1.0, 1.0)],
            }],
        })
    }
}

/// Decoder stub: yields a 1x1 image, fails on bytes containing "broken".
pub struct StubDecoder;

#[async_trait]
impl RasterDecoder for StubDecoder {
    async fn decode(&self, data: &Bytes) -> anyhow::Result<Arc<DynamicImage>> {
        if data.as_ref().windows(6).any(|w| w == b"broken") {
            anyhow::bail!("not a supported image format");
        }
        Ok(Arc::new(DynamicImage::ImageRgba8(RgbaImage::new(1, 1))))
    }
}

/// Loader deps wired to the stubs, plus the command log they write into.
pub fn stub_deps() -> (LoaderDeps, MemorySink) {
    let command_log = MemorySink::new();
    let deps = LoaderDeps {
        svg: Arc::new(StubSvgParser),
        dxf: Arc::new(StubDxfParser),
        raster: Arc::new(StubDecoder),
        diag: DiagnosticHub::default(),
        command_log: Arc::new(command_log.clone()),
    };
    (deps, command_log)
}

/// Write a fixture file into a temp dir and return its path.
pub fn write_file(dir: &tempfile::TempDir, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, contents).unwrap();
    path
}
