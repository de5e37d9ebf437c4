use super::*;
use crate::foundation::error::SplatgenError;
use crate::render::backend::RasterTensor;
use glam::{Mat4, Vec3};
use std::sync::Mutex;

struct Recording {
    views: Mutex<Vec<Mat4>>,
    shape_override: Option<Vec<usize>>,
}

impl Recording {
    fn new() -> Self {
        Self {
            views: Mutex::new(Vec::new()),
            shape_override: None,
        }
    }

    fn calls(&self) -> usize {
        self.views.lock().unwrap().len()
    }
}

impl Rasterizer for Recording {
    fn device(&self) -> &str {
        "test"
    }

    fn rasterize(
        &self,
        _scene: &SplatScene,
        view: &Mat4,
        _intrinsics: &Mat3,
        width: u32,
        height: u32,
    ) -> SplatgenResult<RasterTensor> {
        let n = self.views.lock().unwrap().len();
        self.views.lock().unwrap().push(*view);
        let shape = self
            .shape_override
            .clone()
            .unwrap_or_else(|| vec![height as usize, width as usize, 3]);
        let len = shape.iter().product();
        RasterTensor::new(shape, vec![n as f32 / 10.0; len])
    }
}

fn scene() -> SplatScene {
    SplatScene {
        positions: vec![Vec3::ZERO],
        rotations: vec![[1.0, 0.0, 0.0, 0.0]],
        scales: vec![Vec3::splat(0.1)],
        opacities: vec![0.9],
        colors: vec![Vec3::ONE],
    }
}

fn cfg() -> OrbitConfig {
    OrbitConfig {
        seconds: 1.0,
        fps: 5.0,
        width: 4,
        height: 2,
        ..OrbitConfig::default()
    }
}

#[test]
fn full_orbit_rasterizes_once_per_pose_in_order() {
    let r = Recording::new();
    let scene = scene();
    let frames: Vec<Frame> = render(&r, &scene, &cfg(), false)
        .collect::<SplatgenResult<_>>()
        .unwrap();
    assert_eq!(frames.len(), 5);
    assert_eq!(r.calls(), 5);
    for (i, f) in frames.iter().enumerate() {
        assert_eq!(f.index, FrameIndex(i as u64));
        assert_eq!(f.image.dimensions(), (4, 2));
    }
    // values 0.1 * i quantized by truncation
    assert_eq!(frames[2].image.get_pixel(0, 0).0, [51, 51, 51]);
}

#[test]
fn first_only_renders_a_single_frame() {
    let r = Recording::new();
    let scene = scene();
    let frames: Vec<_> = render(&r, &scene, &cfg(), true).collect();
    assert_eq!(frames.len(), 1);
    assert_eq!(r.calls(), 1);

    let first = r.views.lock().unwrap()[0];
    let pose = cfg().poses().next().unwrap();
    assert_eq!(first, look_at(pose.eye, pose.target, pose.up));
}

#[test]
fn frames_are_produced_lazily() {
    let r = Recording::new();
    let scene = scene();
    let mut it = render(&r, &scene, &cfg(), false);
    assert_eq!(r.calls(), 0);
    assert_eq!(it.size_hint(), (5, Some(5)));
    it.next();
    it.next();
    assert_eq!(r.calls(), 2);
}

#[test]
fn degenerate_timing_yields_no_frames() {
    let r = Recording::new();
    let scene = scene();
    let cfg = OrbitConfig {
        fps: 0.0,
        ..cfg()
    };
    assert_eq!(render(&r, &scene, &cfg, false).count(), 0);
    assert!(render_preview(&r, &scene, &cfg).unwrap().is_none());
    assert_eq!(r.calls(), 0);
}

#[test]
fn layout_errors_propagate() {
    let r = Recording {
        shape_override: Some(vec![5, 5]),
        ..Recording::new()
    };
    let scene = scene();
    let err = render_preview(&r, &scene, &cfg()).unwrap_err();
    assert!(matches!(err, SplatgenError::UnsupportedLayout(_)));
}
