use glam::Mat3;
use image::RgbImage;

use crate::camera::orbit::{OrbitConfig, Poses};
use crate::camera::projection::{intrinsics, look_at};
use crate::foundation::core::{Canvas, FrameIndex};
use crate::foundation::error::SplatgenResult;
use crate::render::backend::Rasterizer;
use crate::render::layout::normalize_layout;
use crate::scene::splat::SplatScene;

/// A rendered orbit frame.
#[derive(Clone, Debug)]
pub struct Frame {
    /// Position along the orbit.
    pub index: FrameIndex,
    /// `height x width` RGB8 pixels.
    pub image: RgbImage,
}

/// Lazy frame sequence over an orbit.
///
/// Each `next` builds one view matrix, calls the rasterizer once and normalizes the result; no
/// pose is computed ahead of the frame that needs it.
pub struct Frames<'a> {
    rasterizer: &'a dyn Rasterizer,
    scene: &'a SplatScene,
    canvas: Canvas,
    intrinsics: Mat3,
    poses: std::iter::Take<Poses>,
}

/// Render `scene` along the orbit described by `cfg`.
///
/// `first_only` limits the sequence to the first pose (still previews).
pub fn render<'a>(
    rasterizer: &'a dyn Rasterizer,
    scene: &'a SplatScene,
    cfg: &OrbitConfig,
    first_only: bool,
) -> Frames<'a> {
    let limit = if first_only { 1 } else { usize::MAX };
    Frames {
        rasterizer,
        scene,
        canvas: cfg.canvas(),
        intrinsics: intrinsics(cfg.width, cfg.height, cfg.fov_deg),
        poses: cfg.poses().take(limit),
    }
}

/// Render only the first orbit frame. `None` when the orbit has no poses.
pub fn render_preview(
    rasterizer: &dyn Rasterizer,
    scene: &SplatScene,
    cfg: &OrbitConfig,
) -> SplatgenResult<Option<RgbImage>> {
    render(rasterizer, scene, cfg, true)
        .next()
        .transpose()
        .map(|f| f.map(|f| f.image))
}

impl Iterator for Frames<'_> {
    type Item = SplatgenResult<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        let pose = self.poses.next()?;
        let view = look_at(pose.eye, pose.target, pose.up);
        tracing::trace!(frame = pose.index.0, "rasterize");
        let frame = self
            .rasterizer
            .rasterize(
                self.scene,
                &view,
                &self.intrinsics,
                self.canvas.width,
                self.canvas.height,
            )
            .and_then(|t| normalize_layout(&t, self.canvas))
            .map(|image| Frame {
                index: pose.index,
                image,
            });
        Some(frame)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.poses.size_hint()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/frames.rs"]
mod tests;
