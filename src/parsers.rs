//! Seams for the external vector parsers and the raster decoder.
//!
//! The geometry parsers are external collaborators: this crate defines the
//! contracts and the payload shapes they produce, plus a default raster
//! decoder backed by the `image` crate.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::diag::DiagnosticHub;

/// Malformed input reported by a vector parser.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// One element of a parsed SVG tag structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TagNode {
    pub name: String,
    pub attrs: HashMap<String, String>,
    pub children: Vec<TagNode>,
}

/// Parsed SVG tag structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VectorTags {
    pub tags: Vec<TagNode>,
}

/// One entity of a parsed DXF tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DxfEntity {
    pub kind: String,
    pub layer: String,
    pub points: Vec<(f64, f64)>,
}

/// Parsed DXF entity tree.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VectorTree {
    pub entities: Vec<DxfEntity>,
}

/// Asynchronous SVG tag parser.
///
/// Parser diagnostics go through `diag`; during ingestion the loader
/// redirects that hub to the application command log for the duration of
/// the parse.
#[async_trait]
pub trait SvgTagParser: Send + Sync {
    async fn parse(&self, text: &str, diag: &DiagnosticHub) -> Result<VectorTags, ParseError>;
}

/// Synchronous DXF entity-tree parser. Runs inside the loading task.
pub trait DxfTreeParser: Send + Sync {
    fn parse(&self, text: &str) -> Result<VectorTree, ParseError>;
}

/// Asynchronous raster decoder.
#[async_trait]
pub trait RasterDecoder: Send + Sync {
    async fn decode(&self, data: &Bytes) -> anyhow::Result<Arc<DynamicImage>>;
}

/// Raster decoder backed by the `image` crate.
///
/// The format is sniffed from the bytes; decoding runs on the blocking pool.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageRasterDecoder;

#[async_trait]
impl RasterDecoder for ImageRasterDecoder {
    async fn decode(&self, data: &Bytes) -> anyhow::Result<Arc<DynamicImage>> {
        let data = data.clone();
        let image = tokio::task::spawn_blocking(move || image::load_from_memory(&data))
            .await
            .context("raster decode task panicked")?
            .context("failed to decode raster image")?;
        Ok(Arc::new(image))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, RgbaImage};
    use std::io::Cursor;

    #[tokio::test]
    async fn decodes_png_bytes() {
        let mut buf = Vec::new();
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(2, 3, image::Rgba([0, 0, 0, 255])));
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();

        let decoded = ImageRasterDecoder
            .decode(&Bytes::from(buf))
            .await
            .unwrap();
        assert_eq!(decoded.width(), 2);
        assert_eq!(decoded.height(), 3);
    }

    #[tokio::test]
    async fn garbage_bytes_fail_to_decode() {
        let err = ImageRasterDecoder
            .decode(&Bytes::from_static(b"definitely not an image"))
            .await;
        assert!(err.is_err());
    }
}
