use glam::{Mat3, Mat4};

use crate::foundation::error::{SplatgenError, SplatgenResult};
use crate::scene::splat::SplatScene;

/// Raw rasterizer output: a dense f32 tensor with values nominally in [0, 1].
///
/// The axis order is implementation-defined; [`crate::render::layout::normalize_layout`] turns
/// the accepted layouts into an RGB8 image.
#[derive(Clone, Debug, PartialEq)]
pub struct RasterTensor {
    /// Tensor dimensions, outermost first.
    pub shape: Vec<usize>,
    /// Row-major values.
    pub data: Vec<f32>,
}

impl RasterTensor {
    /// Create a tensor, checking that `data` holds exactly `product(shape)` values.
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> SplatgenResult<Self> {
        let expected = shape
            .iter()
            .try_fold(1usize, |acc, &d| acc.checked_mul(d))
            .ok_or_else(|| SplatgenError::layout("tensor shape overflows"))?;
        if expected != data.len() {
            return Err(SplatgenError::layout(format!(
                "tensor shape {shape:?} needs {expected} values, got {}",
                data.len()
            )));
        }
        Ok(Self { shape, data })
    }
}

/// Splat rasterization capability.
///
/// Called once per pose with the full scene, a world-to-camera view matrix and pinhole
/// intrinsics. Implementations may hold accelerator memory per call; callers never keep more
/// than one frame in flight.
pub trait Rasterizer: Send + Sync {
    /// Human-readable device name reported by the health endpoint.
    fn device(&self) -> &str;

    /// Render `scene` from `view` into a `width x height` image tensor.
    fn rasterize(
        &self,
        scene: &SplatScene,
        view: &Mat4,
        intrinsics: &Mat3,
        width: u32,
        height: u32,
    ) -> SplatgenResult<RasterTensor>;
}
