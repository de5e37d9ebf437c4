use super::*;

fn approx(a: Vec3, b: Vec3) -> bool {
    (a - b).length() < 1e-5
}

#[test]
fn camera_on_positive_z_looks_down_negative_z() {
    let view = look_at(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y);
    assert!(approx(forward(&view), Vec3::new(0.0, 0.0, -1.0)));
    assert!(approx(view.row(0).truncate(), Vec3::X));
    assert!(approx(view.row(1).truncate(), Vec3::Y));
    assert!(approx(view.row(2).truncate(), Vec3::Z));

    let cam_to_world = view.inverse();
    assert!(approx(cam_to_world.w_axis.truncate(), Vec3::new(0.0, 0.0, 5.0)));
}

#[test]
fn target_maps_onto_negative_view_axis() {
    let eye = Vec3::new(1.5, 2.0, -3.0);
    let target = Vec3::new(-0.5, 0.25, 0.75);
    let view = look_at(eye, target, Vec3::Y);
    let p = view.transform_point3(target);
    assert!(p.x.abs() < 1e-5 && p.y.abs() < 1e-5);
    assert!((p.z + (target - eye).length()).abs() < 1e-4);
    assert!(approx(view.inverse().w_axis.truncate(), eye));
}

#[test]
fn rotation_block_is_orthonormal() {
    let view = look_at(Vec3::new(3.0, 1.0, 2.0), Vec3::new(0.1, 0.0, -0.2), Vec3::Y);
    let r = Mat3::from_mat4(view);
    let should_be_identity = r * r.transpose();
    assert!(should_be_identity.abs_diff_eq(Mat3::IDENTITY, 1e-5));
}

#[test]
fn degenerate_input_never_produces_nan() {
    let cases = [
        (Vec3::ZERO, Vec3::ZERO, Vec3::Y),
        (Vec3::new(0.0, 5.0, 0.0), Vec3::ZERO, Vec3::Y),
        (Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::ZERO),
    ];
    for (eye, target, up) in cases {
        let view = look_at(eye, target, up);
        assert!(
            view.to_cols_array().iter().all(|v| v.is_finite()),
            "{eye} {target} {up}"
        );
    }
}

#[test]
fn intrinsics_follow_vertical_fov() {
    let k = intrinsics(640, 480, 90.0);
    assert!((k.x_axis.x - 240.0).abs() < 1e-3);
    assert!((k.y_axis.y - 240.0).abs() < 1e-3);
    assert_eq!(k.z_axis, Vec3::new(319.5, 239.5, 1.0));
    assert_eq!(k.x_axis.y, 0.0);
    assert_eq!(k.y_axis.x, 0.0);

    let narrow = intrinsics(512, 512, 45.0);
    let expected = 256.0 / (22.5f32.to_radians()).tan();
    assert!((narrow.x_axis.x - expected).abs() < 1e-3);
}
