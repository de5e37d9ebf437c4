use image::RgbImage;

use crate::foundation::core::Canvas;
use crate::foundation::error::{SplatgenError, SplatgenResult};
use crate::foundation::math::unit_to_u8;
use crate::render::backend::RasterTensor;

/// Tensor layouts accepted from a rasterizer, after leading unit axes are stripped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RasterLayout {
    /// `[H, W]` (or `[1, H, W]`) single channel, replicated to RGB.
    Gray,
    /// `[H, W, C]` with `C` in {3, 4}; alpha is dropped.
    Hwc {
        /// Channel count.
        channels: usize,
    },
    /// `[C, H, W]` with `C` in {3, 4}; alpha is dropped.
    Chw {
        /// Channel count.
        channels: usize,
    },
}

/// Identify the layout of `shape` for an image of size `canvas`.
///
/// Leading axes of length 1 are stripped while more than three axes remain, so batched outputs
/// such as `[1, 1, H, W, 3]` are accepted. Height-major layouts win when a shape is ambiguous.
pub fn classify_layout(shape: &[usize], canvas: Canvas) -> SplatgenResult<RasterLayout> {
    let mut dims = shape;
    while dims.len() > 3 && dims[0] == 1 {
        dims = &dims[1..];
    }
    let (h, w) = (canvas.height as usize, canvas.width as usize);
    match *dims {
        [dh, dw] if dh == h && dw == w => Ok(RasterLayout::Gray),
        [dh, dw, c] if dh == h && dw == w && (c == 3 || c == 4) => {
            Ok(RasterLayout::Hwc { channels: c })
        }
        [c, dh, dw] if dh == h && dw == w && (c == 3 || c == 4) => {
            Ok(RasterLayout::Chw { channels: c })
        }
        [1, dh, dw] if dh == h && dw == w => Ok(RasterLayout::Gray),
        _ => Err(SplatgenError::layout(format!(
            "shape {shape:?} is not one of [H,W], [H,W,3|4], [3|4,H,W] for {w}x{h}"
        ))),
    }
}

/// Convert rasterizer output into an `height x width` RGB8 image.
///
/// Values are clamped to [0, 1] and quantized by truncation.
pub fn normalize_layout(tensor: &RasterTensor, canvas: Canvas) -> SplatgenResult<RgbImage> {
    let layout = classify_layout(&tensor.shape, canvas)?;
    let plane = canvas.pixel_count();
    let expected: usize = tensor.shape.iter().product();
    if tensor.data.len() != expected {
        return Err(SplatgenError::layout(format!(
            "tensor shape {:?} needs {expected} values, got {}",
            tensor.shape,
            tensor.data.len()
        )));
    }
    let mut out = Vec::with_capacity(canvas.rgb8_len());
    let d = &tensor.data;
    match layout {
        RasterLayout::Gray => {
            for &v in d {
                let g = unit_to_u8(v);
                out.extend_from_slice(&[g, g, g]);
            }
        }
        RasterLayout::Hwc { channels } => {
            for px in d.chunks_exact(channels) {
                out.extend_from_slice(&[unit_to_u8(px[0]), unit_to_u8(px[1]), unit_to_u8(px[2])]);
            }
        }
        RasterLayout::Chw { .. } => {
            let (r, rest) = d.split_at(plane);
            let (g, rest) = rest.split_at(plane);
            let b = &rest[..plane];
            for i in 0..plane {
                out.extend_from_slice(&[unit_to_u8(r[i]), unit_to_u8(g[i]), unit_to_u8(b[i])]);
            }
        }
    }
    RgbImage::from_raw(canvas.width, canvas.height, out)
        .ok_or_else(|| SplatgenError::layout("normalized buffer does not match canvas size"))
}

#[cfg(test)]
#[path = "../../tests/unit/render/layout.rs"]
mod tests;
