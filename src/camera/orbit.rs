use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::foundation::core::{Canvas, FrameIndex};
use crate::foundation::error::{SplatgenError, SplatgenResult};

/// Turntable camera configuration.
///
/// Determines the frame count `floor(seconds * fps)` and every pose along the orbit. Pose `i`
/// sits at azimuth `(i / n) * orbit_degrees` and a fixed elevation, `cam_radius` away from
/// `lookat`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrbitConfig {
    /// Orbit duration in seconds.
    pub seconds: f64,
    /// Frames per second.
    pub fps: f64,
    /// Total azimuth swept over the orbit, in degrees.
    pub orbit_degrees: f32,
    /// Constant camera elevation, in degrees.
    pub elevation_deg: f32,
    /// Distance from the camera to `lookat`.
    pub cam_radius: f32,
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
    /// Vertical field of view, in degrees.
    pub fov_deg: f32,
    /// Orbit center and look-at target.
    pub lookat: [f32; 3],
    /// World up direction.
    pub up: [f32; 3],
}

impl Default for OrbitConfig {
    fn default() -> Self {
        Self {
            seconds: 4.0,
            fps: 24.0,
            orbit_degrees: 360.0,
            elevation_deg: 15.0,
            cam_radius: 2.5,
            width: 512,
            height: 512,
            fov_deg: 45.0,
            lookat: [0.0, 0.0, 0.0],
            up: [0.0, 1.0, 0.0],
        }
    }
}

impl OrbitConfig {
    /// Number of poses on the orbit. Zero for non-positive or non-finite `seconds`/`fps`.
    pub fn frame_count(&self) -> usize {
        let total = self.seconds * self.fps;
        if !(self.seconds > 0.0 && self.fps > 0.0 && total.is_finite()) {
            return 0;
        }
        total.floor().min(u32::MAX as f64) as usize
    }

    /// Output image size.
    pub fn canvas(&self) -> Canvas {
        Canvas {
            width: self.width,
            height: self.height,
        }
    }

    /// Check values that would make rendering meaningless.
    ///
    /// Degenerate timing (`fps <= 0`, `seconds <= 0`) is accepted and simply yields no frames.
    pub fn validate(&self) -> SplatgenResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(SplatgenError::validation(
                "orbit width/height must be non-zero",
            ));
        }
        if !(self.fov_deg > 0.0 && self.fov_deg < 180.0) {
            return Err(SplatgenError::validation(
                "orbit fov_deg must be within (0, 180)",
            ));
        }
        if !(self.cam_radius.is_finite() && self.cam_radius > 0.0) {
            return Err(SplatgenError::validation(
                "orbit cam_radius must be positive",
            ));
        }
        Ok(())
    }

    /// Lazy pose sequence for this configuration.
    pub fn poses(&self) -> Poses {
        poses(self)
    }
}

/// One camera placement on the orbit.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraPose {
    /// Position of the pose along the orbit.
    pub index: FrameIndex,
    /// Camera position.
    pub eye: Vec3,
    /// Look-at target.
    pub target: Vec3,
    /// World up direction.
    pub up: Vec3,
    /// Vertical field of view, in degrees.
    pub fov_deg: f32,
}

/// Lazy, finite, restartable pose sequence.
///
/// A clone continues from the same position; call [`OrbitConfig::poses`] again to start over.
#[derive(Clone, Debug)]
pub struct Poses {
    cfg: OrbitConfig,
    next: usize,
    len: usize,
}

/// Build the pose sequence for `cfg`.
pub fn poses(cfg: &OrbitConfig) -> Poses {
    Poses {
        cfg: cfg.clone(),
        next: 0,
        len: cfg.frame_count(),
    }
}

/// Pose `index` of an orbit with `count` poses.
pub fn pose_at(cfg: &OrbitConfig, index: usize, count: usize) -> CameraPose {
    let t = if count == 0 {
        0.0
    } else {
        index as f64 / count as f64
    };
    let az = (t * f64::from(cfg.orbit_degrees)).to_radians();
    let el = f64::from(cfg.elevation_deg).to_radians();
    let r = f64::from(cfg.cam_radius);
    let offset = Vec3::new(
        (r * az.sin() * el.cos()) as f32,
        (r * el.sin()) as f32,
        (r * az.cos() * el.cos()) as f32,
    );
    let target = Vec3::from_array(cfg.lookat);
    CameraPose {
        index: FrameIndex(index as u64),
        eye: target + offset,
        target,
        up: Vec3::from_array(cfg.up),
        fov_deg: cfg.fov_deg,
    }
}

impl Iterator for Poses {
    type Item = CameraPose;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.len {
            return None;
        }
        let pose = pose_at(&self.cfg, self.next, self.len);
        self.next += 1;
        Some(pose)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let rem = self.len - self.next;
        (rem, Some(rem))
    }
}

impl ExactSizeIterator for Poses {}

impl std::iter::FusedIterator for Poses {}

#[cfg(test)]
#[path = "../../tests/unit/camera/orbit.rs"]
mod tests;
