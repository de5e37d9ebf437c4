use std::collections::BTreeMap;
use std::io::{Cursor, Write as _};

use anyhow::Context as _;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use crate::camera::orbit::OrbitConfig;
use crate::foundation::error::SplatgenResult;
use crate::validate::gate::ValidationResult;

/// Archive member holding the raw scene bytes.
pub const SCENE_MEMBER: &str = "scene.ply";
/// Archive member holding the preview PNG.
pub const PREVIEW_MEMBER: &str = "preview.png";
/// Archive member holding pretty-printed metadata JSON.
pub const METADATA_MEMBER: &str = "metadata.json";

/// Descriptive metadata stored next to an accepted scene. Field order is the JSON key order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub prompt: String,
    pub seed: Option<u64>,
    pub model_variant: String,
    pub num_points: u64,
    /// Step durations in seconds, keyed by step name.
    pub timings: BTreeMap<String, f64>,
    pub validation: ValidationResult,
    pub camera: OrbitConfig,
}

/// Everything delivered for an accepted still request.
#[derive(Clone, Debug)]
pub struct GenerationArtifact {
    pub scene_bytes: Vec<u8>,
    pub preview_png: Vec<u8>,
    pub metadata: ArtifactMetadata,
}

impl GenerationArtifact {
    /// Package this artifact as a zip archive.
    pub fn to_zip(&self) -> SplatgenResult<Vec<u8>> {
        pack(&self.scene_bytes, &self.preview_png, &self.metadata)
    }
}

/// Build a deterministic zip archive with `scene.ply`, `preview.png` and `metadata.json`.
///
/// Every member is deflated and stamped with the same fixed timestamp, so equal input always
/// yields equal bytes.
pub fn pack<M: Serialize + ?Sized>(
    scene: &[u8],
    preview_png: &[u8],
    metadata: &M,
) -> SplatgenResult<Vec<u8>> {
    let json = serde_json::to_vec_pretty(metadata).context("serialize artifact metadata")?;
    let opts = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
        .unix_permissions(0o644);

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in [
        (SCENE_MEMBER, scene),
        (PREVIEW_MEMBER, preview_png),
        (METADATA_MEMBER, json.as_slice()),
    ] {
        zip.start_file(name, opts)
            .with_context(|| format!("start archive member '{name}'"))?;
        zip.write_all(data)
            .with_context(|| format!("write archive member '{name}'"))?;
    }
    let cursor = zip.finish().context("finalize archive")?;
    Ok(cursor.into_inner())
}

/// Encode an RGB8 image as PNG.
pub fn encode_png(image: &RgbImage) -> SplatgenResult<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, image::ImageFormat::Png)
        .context("encode preview PNG")?;
    Ok(out.into_inner())
}

#[cfg(test)]
#[path = "../../tests/unit/package/archive.rs"]
mod tests;
