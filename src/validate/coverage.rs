use image::RgbImage;

use crate::foundation::math::luma_u8;

fn luma_histogram(image: &RgbImage) -> [u64; 256] {
    let mut hist = [0u64; 256];
    for px in image.pixels() {
        let [r, g, b] = px.0;
        hist[luma_u8(r, g, b) as usize] += 1;
    }
    hist
}

/// Otsu threshold over a 256-bin histogram.
///
/// Class 0 holds levels `<= t`. The first level with the largest between-class variance wins;
/// a histogram with a single populated level has no split and yields 0.
pub fn otsu_threshold(hist: &[u64; 256]) -> u8 {
    let total: f64 = hist.iter().map(|&c| c as f64).sum();
    let sum_all: f64 = hist
        .iter()
        .enumerate()
        .map(|(i, &c)| i as f64 * c as f64)
        .sum();

    let mut weight_bg = 0.0f64;
    let mut sum_bg = 0.0f64;
    let mut best_between = -1.0f64;
    let mut best = 0u8;
    for (t, &count) in hist.iter().enumerate() {
        weight_bg += count as f64;
        if weight_bg <= f64::EPSILON {
            continue;
        }
        let weight_fg = total - weight_bg;
        if weight_fg <= f64::EPSILON {
            break;
        }
        sum_bg += t as f64 * count as f64;
        let diff = sum_bg / weight_bg - (sum_all - sum_bg) / weight_fg;
        let between = weight_bg * weight_fg * diff * diff;
        if between > best_between {
            best_between = between;
            best = t as u8;
        }
    }
    best
}

/// Fraction of pixels whose luma is strictly above the Otsu threshold of `image`.
///
/// Returns 0 for an empty image.
pub fn silhouette_coverage(image: &RgbImage) -> f32 {
    let hist = luma_histogram(image);
    let total: u64 = hist.iter().sum();
    if total == 0 {
        return 0.0;
    }
    let t = otsu_threshold(&hist) as usize;
    let above: u64 = hist[t + 1..].iter().sum();
    (above as f64 / total as f64) as f32
}

#[cfg(test)]
#[path = "../../tests/unit/validate/coverage.rs"]
mod tests;
