use super::*;
use crate::camera::projection::{intrinsics, look_at};

fn blob(color: Vec3, opacity: f32, scale: f32) -> SplatScene {
    SplatScene {
        positions: vec![Vec3::ZERO],
        rotations: vec![[1.0, 0.0, 0.0, 0.0]],
        scales: vec![Vec3::splat(scale)],
        opacities: vec![opacity],
        colors: vec![color],
    }
}

fn front_view() -> Mat4 {
    look_at(Vec3::new(0.0, 0.0, 3.0), Vec3::ZERO, Vec3::Y)
}

fn pixel(t: &RasterTensor, x: usize, y: usize) -> [f32; 3] {
    let w = t.shape[1];
    let i = (y * w + x) * 3;
    [t.data[i], t.data[i + 1], t.data[i + 2]]
}

#[test]
fn centered_splat_covers_center_not_corner() {
    let r = CpuRasterizer::new(CpuRasterizerOpts {
        background: [0.0, 0.0, 1.0],
        ..CpuRasterizerOpts::default()
    })
    .unwrap();
    let k = intrinsics(32, 32, 45.0);
    let t = r
        .rasterize(&blob(Vec3::new(1.0, 0.0, 0.0), 0.99, 0.2), &front_view(), &k, 32, 32)
        .unwrap();
    assert_eq!(t.shape, vec![32, 32, 3]);

    let c = pixel(&t, 16, 16);
    assert!(c[0] > 0.9, "{c:?}");
    assert!(c[2] < 0.1, "{c:?}");
    assert_eq!(pixel(&t, 0, 0), [0.0, 0.0, 1.0]);
}

#[test]
fn splat_behind_camera_is_culled() {
    let r = CpuRasterizer::new(CpuRasterizerOpts::default()).unwrap();
    let k = intrinsics(8, 8, 45.0);
    let view = look_at(Vec3::new(0.0, 0.0, 3.0), Vec3::new(0.0, 0.0, 6.0), Vec3::Y);
    let t = r
        .rasterize(&blob(Vec3::ONE, 1.0, 0.5), &view, &k, 8, 8)
        .unwrap();
    assert!(t.data.iter().all(|&v| v == 0.0));
}

#[test]
fn nearer_splat_occludes_farther() {
    let mut scene = blob(Vec3::new(0.0, 1.0, 0.0), 0.99, 0.3);
    scene.positions.push(Vec3::new(0.0, 0.0, 1.0));
    scene.rotations.push([1.0, 0.0, 0.0, 0.0]);
    scene.scales.push(Vec3::splat(0.3));
    scene.opacities.push(0.99);
    scene.colors.push(Vec3::new(1.0, 0.0, 0.0));

    let r = CpuRasterizer::new(CpuRasterizerOpts::default()).unwrap();
    let k = intrinsics(16, 16, 45.0);
    let t = r.rasterize(&scene, &front_view(), &k, 16, 16).unwrap();
    let c = pixel(&t, 8, 8);
    assert!(c[0] > c[1], "{c:?}");
}

#[test]
fn zero_rotation_falls_back_to_identity() {
    let mut scene = blob(Vec3::ONE, 0.99, 0.2);
    scene.rotations[0] = [0.0; 4];
    let r = CpuRasterizer::new(CpuRasterizerOpts::default()).unwrap();
    let k = intrinsics(16, 16, 45.0);
    let t = r.rasterize(&scene, &front_view(), &k, 16, 16).unwrap();
    assert!(t.data.iter().all(|v| v.is_finite()));
    assert!(pixel(&t, 8, 8)[0] > 0.5);
}

#[test]
fn dedicated_pool_matches_global_pool() {
    let scene = blob(Vec3::new(0.3, 0.6, 0.9), 0.7, 0.25);
    let k = intrinsics(24, 16, 50.0);
    let a = CpuRasterizer::new(CpuRasterizerOpts::default())
        .unwrap()
        .rasterize(&scene, &front_view(), &k, 24, 16)
        .unwrap();
    let b = CpuRasterizer::new(CpuRasterizerOpts {
        threads: Some(2),
        ..CpuRasterizerOpts::default()
    })
    .unwrap()
    .rasterize(&scene, &front_view(), &k, 24, 16)
    .unwrap();
    assert_eq!(a, b);
}

#[test]
fn zero_threads_is_rejected() {
    let err = CpuRasterizer::new(CpuRasterizerOpts {
        threads: Some(0),
        ..CpuRasterizerOpts::default()
    })
    .err()
    .unwrap();
    assert!(matches!(err, SplatgenError::Validation(_)));
}

#[test]
fn default_background_is_black() {
    let r = CpuRasterizer::new(CpuRasterizerOpts::default()).unwrap();
    let k = intrinsics(16, 16, 45.0);
    let t = r
        .rasterize(&blob(Vec3::ONE, 0.99, 0.3), &front_view(), &k, 16, 16)
        .unwrap();
    assert_eq!(pixel(&t, 0, 0), [0.0, 0.0, 0.0]);
    assert!(pixel(&t, 8, 8)[0] > 0.5);
}
