use glam::{Mat3, Mat4, Quat, Vec2, Vec3};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::foundation::error::{SplatgenError, SplatgenResult};
use crate::render::backend::{RasterTensor, Rasterizer};
use crate::scene::splat::SplatScene;

/// Screen-space dilation added to every projected covariance (pixels squared).
const LOW_PASS: f32 = 0.3;
const MAX_ALPHA: f32 = 0.99;
const MIN_ALPHA: f32 = 1.0 / 255.0;
const MIN_TRANSMITTANCE: f32 = 1e-4;

/// Options for [`CpuRasterizer`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CpuRasterizerOpts {
    /// Background color (linear RGB in [0, 1]) composited behind the splats.
    pub background: [f32; 3],
    /// Splats closer than this to the camera plane are culled.
    pub near: f32,
    /// Override rayon worker threads. `None` uses the global pool.
    pub threads: Option<usize>,
}

impl Default for CpuRasterizerOpts {
    fn default() -> Self {
        Self {
            background: [0.0, 0.0, 0.0],
            near: 0.01,
            threads: None,
        }
    }
}

/// Reference software rasterizer for Gaussian splats.
///
/// Every splat is projected to a 2D Gaussian (EWA splatting with a perspective Jacobian), sorted
/// by depth and alpha-composited front to back. Rows are shaded in parallel. Output layout is
/// `[H, W, 3]`.
pub struct CpuRasterizer {
    opts: CpuRasterizerOpts,
    pool: Option<rayon::ThreadPool>,
}

impl CpuRasterizer {
    /// Create a rasterizer, building a dedicated thread pool when `threads` is set.
    pub fn new(opts: CpuRasterizerOpts) -> SplatgenResult<Self> {
        let pool = match opts.threads {
            Some(n) => Some(build_thread_pool(n)?),
            None => None,
        };
        Ok(Self { opts, pool })
    }
}

fn build_thread_pool(threads: usize) -> SplatgenResult<rayon::ThreadPool> {
    if threads == 0 {
        return Err(SplatgenError::validation(
            "rasterizer 'threads' must be >= 1 when set",
        ));
    }
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .map_err(|e| {
            SplatgenError::Other(anyhow::anyhow!("failed to build rayon thread pool: {e}"))
        })
}

#[derive(Clone, Copy, Debug)]
struct Projected {
    mean: Vec2,
    /// Inverse 2D covariance as (xx, xy, yy).
    conic: Vec3,
    color: Vec3,
    opacity: f32,
    depth: f32,
    x0: i32,
    x1: i32,
    y0: i32,
    y1: i32,
}

impl Rasterizer for CpuRasterizer {
    fn device(&self) -> &str {
        "cpu"
    }

    fn rasterize(
        &self,
        scene: &SplatScene,
        view: &Mat4,
        intrinsics: &Mat3,
        width: u32,
        height: u32,
    ) -> SplatgenResult<RasterTensor> {
        if width == 0 || height == 0 {
            return Err(SplatgenError::validation(
                "rasterize width/height must be non-zero",
            ));
        }
        let mut splats = project_all(scene, view, intrinsics, width, height, self.opts.near);
        splats.sort_by(|a, b| a.depth.total_cmp(&b.depth));

        let bg = Vec3::from_array(self.opts.background);
        let w = width as usize;
        let mut data = vec![0.0f32; w * height as usize * 3];
        let shade = |data: &mut [f32]| {
            data.par_chunks_mut(w * 3)
                .enumerate()
                .for_each(|(y, row)| shade_row(row, y as i32, &splats, bg));
        };
        match &self.pool {
            Some(pool) => pool.install(|| shade(&mut data)),
            None => shade(&mut data),
        }

        RasterTensor::new(vec![height as usize, w, 3], data)
    }
}

fn project_all(
    scene: &SplatScene,
    view: &Mat4,
    k: &Mat3,
    width: u32,
    height: u32,
    near: f32,
) -> Vec<Projected> {
    let rot = Mat3::from_mat4(*view);
    let (fx, fy) = (k.x_axis.x, k.y_axis.y);
    let (cx, cy) = (k.z_axis.x, k.z_axis.y);
    let (wmax, hmax) = (width as i32 - 1, height as i32 - 1);

    let mut out = Vec::with_capacity(scene.len());
    for i in 0..scene.len() {
        let p = view.transform_point3(scene.positions[i]);
        let depth = -p.z;
        if !(depth > near) || !p.is_finite() {
            continue;
        }
        let mean = Vec2::new(fx * p.x / depth + cx, cy - fy * p.y / depth);

        let [qw, qx, qy, qz] = scene.rotations[i];
        let q = Quat::from_xyzw(qx, qy, qz, qw);
        let r = if q.length_squared() > 1e-12 {
            Mat3::from_quat(q.normalize())
        } else {
            Mat3::IDENTITY
        };
        let m = rot * r * Mat3::from_diagonal(scene.scales[i]);
        let cov_cam = m * m.transpose();

        let d2 = depth * depth;
        let j0 = Vec3::new(fx / depth, 0.0, fx * p.x / d2);
        let j1 = Vec3::new(0.0, -fy / depth, -fy * p.y / d2);
        let a = j0.dot(cov_cam * j0) + LOW_PASS;
        let b = j0.dot(cov_cam * j1);
        let c = j1.dot(cov_cam * j1) + LOW_PASS;
        let det = a * c - b * b;
        if !(det > 0.0) {
            continue;
        }

        let mid = 0.5 * (a + c);
        let lambda = mid + (mid * mid - det).max(0.1).sqrt();
        let radius = (3.0 * lambda.sqrt()).ceil();
        let x0 = ((mean.x - radius).floor() as i32).max(0);
        let x1 = ((mean.x + radius).ceil() as i32).min(wmax);
        let y0 = ((mean.y - radius).floor() as i32).max(0);
        let y1 = ((mean.y + radius).ceil() as i32).min(hmax);
        if x0 > x1 || y0 > y1 {
            continue;
        }

        out.push(Projected {
            mean,
            conic: Vec3::new(c / det, -b / det, a / det),
            color: scene.colors[i],
            opacity: scene.opacities[i],
            depth,
            x0,
            x1,
            y0,
            y1,
        });
    }
    out
}

fn shade_row(row: &mut [f32], y: i32, splats: &[Projected], bg: Vec3) {
    let active: Vec<&Projected> = splats
        .iter()
        .filter(|s| s.y0 <= y && y <= s.y1)
        .collect();
    let yf = y as f32;

    for (x, px) in row.chunks_exact_mut(3).enumerate() {
        let x = x as i32;
        let xf = x as f32;
        let mut color = Vec3::ZERO;
        let mut t = 1.0f32;
        for s in &active {
            if x < s.x0 || x > s.x1 {
                continue;
            }
            let dx = xf - s.mean.x;
            let dy = yf - s.mean.y;
            let power = -0.5 * (s.conic.x * dx * dx + s.conic.z * dy * dy) - s.conic.y * dx * dy;
            if power > 0.0 {
                continue;
            }
            let alpha = (s.opacity * power.exp()).min(MAX_ALPHA);
            if alpha < MIN_ALPHA {
                continue;
            }
            color += s.color * (alpha * t);
            t *= 1.0 - alpha;
            if t < MIN_TRANSMITTANCE {
                break;
            }
        }
        let rgb = color + bg * t;
        px.copy_from_slice(&rgb.to_array());
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/cpu.rs"]
mod tests;
