use serde::Serialize;

use crate::foundation::core::RasterSize;
use crate::foundation::error::RecipeResult;
use crate::recipe::model::Recipe;
use crate::render::backend::{Raster, RenderEngine};
use crate::replay::engine::reconstruct;
use crate::verify::diff::compare_rasters;

/// Default largest mean squared error a reproduction may have and still pass.
pub const DEFAULT_MSE_THRESHOLD: f64 = 100.0;

/// How closely a reconstructed recipe matches the image it was recorded from.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ValidationResult {
    /// `true` when sizes match and `mse` does not exceed `threshold`.
    pub passed: bool,
    /// Mean squared error over RGB channels; infinite when sizes differ.
    pub mse: f64,
    /// Peak signal-to-noise ratio in dB; infinite for identical images, zero when sizes differ.
    pub psnr: f64,
    /// Largest channel difference; infinite when sizes differ.
    pub max_diff: f64,
    /// Size of the original image.
    pub original_size: RasterSize,
    /// Size of the reproduction.
    pub reproduced_size: RasterSize,
    /// `true` when both images have the same dimensions.
    pub same_size: bool,
    /// Threshold the result was judged against.
    pub threshold: f64,
    /// One-line verdict.
    pub message: String,
}

/// Reconstruct `recipe` on `engine` and compare its native rendering with `original`.
///
/// Reconstruction failures are returned as errors; a size mismatch is a failed result.
#[tracing::instrument(skip(recipe, engine, original), fields(recipe = %recipe.id))]
pub fn validate_recipe(
    recipe: &Recipe,
    engine: &dyn RenderEngine,
    original: &Raster,
    mse_threshold: f64,
) -> RecipeResult<ValidationResult> {
    let mut figure = reconstruct(recipe, engine)?;
    let reproduced = figure.render()?;
    let (original_size, reproduced_size) = (original.size(), reproduced.size());
    if original_size != reproduced_size {
        return Ok(ValidationResult {
            passed: false,
            mse: f64::INFINITY,
            psnr: 0.0,
            max_diff: f64::INFINITY,
            original_size,
            reproduced_size,
            same_size: false,
            threshold: mse_threshold,
            message: format!(
                "image dimensions differ: {}x{} vs {}x{}",
                original_size.width, original_size.height, reproduced_size.width,
                reproduced_size.height
            ),
        });
    }
    let (stats, _) = compare_rasters(original, &reproduced, 0)?;
    let psnr = if stats.mse == 0.0 {
        f64::INFINITY
    } else {
        10.0 * (255.0_f64 * 255.0 / stats.mse).log10()
    };
    let passed = stats.mse <= mse_threshold;
    let message = if passed {
        "reproduction matches the original within threshold".to_owned()
    } else {
        format!("mse {:.2} exceeds threshold {mse_threshold}", stats.mse)
    };
    tracing::debug!(mse = stats.mse, passed, "validated recipe");
    Ok(ValidationResult {
        passed,
        mse: stats.mse,
        psnr,
        max_diff: f64::from(stats.max_diff),
        original_size,
        reproduced_size,
        same_size: true,
        threshold: mse_threshold,
        message,
    })
}

impl std::fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "validation {}",
            if self.passed { "PASSED" } else { "FAILED" }
        )?;
        writeln!(
            f,
            "  size     {}x{} vs {}x{} ({})",
            self.original_size.width,
            self.original_size.height,
            self.reproduced_size.width,
            self.reproduced_size.height,
            if self.same_size { "match" } else { "differ" }
        )?;
        writeln!(f, "  mse      {:.2} (threshold {})", self.mse, self.threshold)?;
        writeln!(f, "  max diff {}", self.max_diff)?;
        if self.psnr.is_infinite() {
            writeln!(f, "  psnr     inf (identical)")?;
        } else {
            writeln!(f, "  psnr     {:.1} dB", self.psnr)?;
        }
        if !self.passed {
            writeln!(f, "  note     {}", self.message)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/verify/validate.rs"]
mod tests;
