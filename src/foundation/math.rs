/// Zeroth-order real spherical-harmonics basis constant.
pub const SH_C0: f32 = 0.282_094_8;

pub(crate) const SH_C0_F64: f64 = 0.282_094_791_773_878_14;

/// Logistic function used to turn stored opacity logits into [0, 1] opacities.
pub fn sigmoid(x: f32) -> f32 {
    (1.0 / (1.0 + (-f64::from(x)).exp())) as f32
}

/// Map a spherical-harmonics DC coefficient to a color channel in [0, 1].
pub fn sh_dc_to_channel(dc: f32) -> f32 {
    (0.5 + SH_C0_F64 * f64::from(dc)).clamp(0.0, 1.0) as f32
}

/// Quantize a unit-range value to u8 with truncation, clamping out-of-range input.
pub(crate) fn unit_to_u8(v: f32) -> u8 {
    if v.is_nan() {
        return 0;
    }
    (v.clamp(0.0, 1.0) * 255.0) as u8
}

/// BT.601 luma of an RGB8 pixel, rounded to the nearest integer.
pub(crate) fn luma_u8(r: u8, g: u8, b: u8) -> u8 {
    let y = 0.299 * f32::from(r) + 0.587 * f32::from(g) + 0.114 * f32::from(b);
    y.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/math.rs"]
mod tests;
