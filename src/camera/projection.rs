use glam::{Mat3, Mat4, Vec3, Vec4};

const EPS: f32 = 1e-8;

/// Right-handed look-at view matrix (world to camera).
///
/// Rows of the rotation block are `right`, `up` and `-forward`; the translation column is
/// `-R * eye`. Norms are padded with a small epsilon so degenerate input (eye on the target, zero
/// up, up parallel to the view direction) never divides by zero.
pub fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Mat4 {
    let f = target - eye;
    let f = f / (f.length() + EPS);
    let u = up / (up.length() + EPS);
    let s = f.cross(u);
    let s = s / (s.length() + EPS);
    let u = s.cross(f);

    Mat4::from_cols(
        Vec4::new(s.x, u.x, -f.x, 0.0),
        Vec4::new(s.y, u.y, -f.y, 0.0),
        Vec4::new(s.z, u.z, -f.z, 0.0),
        Vec4::new(-s.dot(eye), -u.dot(eye), f.dot(eye), 1.0),
    )
}

/// Viewing direction encoded in a view matrix (the negated third row).
pub fn forward(view: &Mat4) -> Vec3 {
    -view.row(2).truncate()
}

/// Pinhole intrinsics from image size and vertical field of view (degrees).
///
/// `fx = fy = 0.5 * height / tan(fov / 2)`, principal point at the pixel-center midpoint.
pub fn intrinsics(width: u32, height: u32, vertical_fov_deg: f32) -> Mat3 {
    let f = 0.5 * height as f32 / (vertical_fov_deg.to_radians() * 0.5).tan();
    let cx = (width as f32 - 1.0) / 2.0;
    let cy = (height as f32 - 1.0) / 2.0;
    Mat3::from_cols(
        Vec3::new(f, 0.0, 0.0),
        Vec3::new(0.0, f, 0.0),
        Vec3::new(cx, cy, 1.0),
    )
}

#[cfg(test)]
#[path = "../../tests/unit/camera/projection.rs"]
mod tests;
