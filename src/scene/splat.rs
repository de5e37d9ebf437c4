use glam::Vec3;

use crate::foundation::error::{SplatgenError, SplatgenResult};
use crate::foundation::math::{sh_dc_to_channel, sigmoid};
use crate::scene::ply::{parse_header, read_columns};

const VERTEX: &str = "vertex";

const REQUIRED_FIELDS: [&str; 14] = [
    "x", "y", "z", "f_dc_0", "f_dc_1", "f_dc_2", "opacity", "scale_0", "scale_1", "scale_2",
    "rot_0", "rot_1", "rot_2", "rot_3",
];

/// Decoded Gaussian-splat scene.
///
/// All sequences have the same length. Decode transforms are already applied: scales are
/// exponentiated, opacities pass through the logistic function and colors are the SH DC term
/// mapped into [0, 1].
#[derive(Clone, Debug, PartialEq)]
pub struct SplatScene {
    /// Splat centers in world space.
    pub positions: Vec<Vec3>,
    /// Orientation quaternions in stored `(w, x, y, z)` order.
    pub rotations: Vec<[f32; 4]>,
    /// Per-axis standard deviations, always > 0.
    pub scales: Vec<Vec3>,
    /// Opacities in [0, 1].
    pub opacities: Vec<f32>,
    /// Linear RGB colors in [0, 1].
    pub colors: Vec<Vec3>,
}

impl SplatScene {
    /// Decode PLY scene bytes.
    ///
    /// Fails with [`SplatgenError::MalformedScene`] when the document is invalid or lacks any of
    /// the required vertex fields, and with [`SplatgenError::EmptyScene`] when it has no points.
    /// Extra properties and elements are ignored.
    pub fn decode(raw: &[u8]) -> SplatgenResult<Self> {
        let header = parse_header(raw)?;
        let cols = read_columns(raw, &header, VERTEX, &REQUIRED_FIELDS)?;
        let n = cols[0].len();
        if n == 0 {
            return Err(SplatgenError::EmptyScene);
        }

        let col = |i: usize, p: usize| cols[i][p];
        let mut scene = Self {
            positions: Vec::with_capacity(n),
            rotations: Vec::with_capacity(n),
            scales: Vec::with_capacity(n),
            opacities: Vec::with_capacity(n),
            colors: Vec::with_capacity(n),
        };
        for p in 0..n {
            scene
                .positions
                .push(Vec3::new(col(0, p), col(1, p), col(2, p)));
            scene.colors.push(Vec3::new(
                sh_dc_to_channel(col(3, p)),
                sh_dc_to_channel(col(4, p)),
                sh_dc_to_channel(col(5, p)),
            ));
            scene.opacities.push(sigmoid(col(6, p)));
            scene.scales.push(Vec3::new(
                exp_scale(col(7, p)),
                exp_scale(col(8, p)),
                exp_scale(col(9, p)),
            ));
            scene
                .rotations
                .push([col(10, p), col(11, p), col(12, p), col(13, p)]);
        }
        Ok(scene)
    }

    /// Number of splats.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Return `true` when the scene has no splats.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// `exp` of a stored log-scale, floored at the smallest positive normal so the result stays > 0.
fn exp_scale(log_scale: f32) -> f32 {
    log_scale.exp().max(f32::MIN_POSITIVE)
}

#[cfg(test)]
#[path = "../../tests/unit/scene/splat.rs"]
mod tests;
