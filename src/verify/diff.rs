use serde::Serialize;

use crate::foundation::error::{RecipeError, RecipeResult};
use crate::render::backend::Raster;

/// Pixel statistics of two rasters of equal size.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct DiffStats {
    /// Mean squared error over all RGB channels.
    pub mse: f64,
    /// Largest channel difference.
    pub max_diff: u8,
    /// Mean channel difference.
    pub mean_diff: f64,
    /// Pixels whose largest channel difference exceeds the threshold.
    pub mismatched: u64,
    /// Fraction of pixels within the threshold.
    pub match_ratio: f64,
    /// `true` when every pixel is identical.
    pub is_pixel_perfect: bool,
}

/// Compare `a` and `b` on RGB channels.
///
/// A pixel matches when none of its channels differs by more than `threshold`. The returned
/// raster paints matching pixels green and mismatches red, brighter for larger differences.
pub fn compare_rasters(a: &Raster, b: &Raster, threshold: u8) -> RecipeResult<(DiffStats, Raster)> {
    if a.size() != b.size() {
        return Err(RecipeError::validation(format!(
            "raster sizes differ: {}x{} vs {}x{}",
            a.width, a.height, b.width, b.height
        )));
    }
    let pixels = u64::from(a.width) * u64::from(a.height);
    let mut sq_sum = 0f64;
    let mut abs_sum = 0f64;
    let mut max_diff = 0u8;
    let mut mismatched = 0u64;
    let mut vis = Vec::with_capacity(a.data.len());

    for (pa, pb) in a.data.chunks_exact(4).zip(b.data.chunks_exact(4)) {
        let mut worst = 0u8;
        for c in 0..3 {
            let d = pa[c].abs_diff(pb[c]);
            sq_sum += f64::from(d) * f64::from(d);
            abs_sum += f64::from(d);
            worst = worst.max(d);
        }
        max_diff = max_diff.max(worst);
        if worst > threshold {
            mismatched += 1;
            vis.extend_from_slice(&[128u8.saturating_add(worst / 2), 0, 0, 255]);
        } else {
            vis.extend_from_slice(&[0, 160, 0, 255]);
        }
    }

    let channels = (pixels * 3).max(1) as f64;
    let stats = DiffStats {
        mse: sq_sum / channels,
        max_diff,
        mean_diff: abs_sum / channels,
        mismatched,
        match_ratio: if pixels == 0 {
            1.0
        } else {
            (pixels - mismatched) as f64 / pixels as f64
        },
        is_pixel_perfect: max_diff == 0,
    };
    let diff = Raster {
        width: a.width,
        height: a.height,
        data: vis,
    };
    Ok((stats, diff))
}

impl std::fmt::Display for DiffStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "mse={:.6} max={} mean={:.4} mismatched={} match={:.4}%{}",
            self.mse,
            self.max_diff,
            self.mean_diff,
            self.mismatched,
            self.match_ratio * 100.0,
            if self.is_pixel_perfect { " (pixel perfect)" } else { "" }
        )
    }
}

#[cfg(test)]
#[path = "../../tests/unit/verify/diff.rs"]
mod tests;
