use super::*;
use crate::foundation::core::PanelPos;
use crate::recipe::model::FigureConfig;
use crate::recipe::ops::Operation;
use crate::record::recorder::RecordingFigure;
use crate::render::cpu::CpuEngine;

fn recorded() -> (Recipe, Raster) {
    let mut fig = RecordingFigure::new(&CpuEngine, FigureConfig::default()).unwrap();
    fig.call(PanelPos::new(0, 0), Operation::Plot)
        .arg(vec![0.0, 1.0, 2.0])
        .arg(vec![1.0, 3.0, 2.0])
        .run()
        .unwrap();
    let preview = fig.render().unwrap();
    (fig.into_recipe(), preview)
}

#[test]
fn faithful_recipes_pass_with_infinite_psnr() {
    let (recipe, preview) = recorded();
    let result = validate_recipe(&recipe, &CpuEngine, &preview, DEFAULT_MSE_THRESHOLD).unwrap();
    assert!(result.passed);
    assert!(result.same_size);
    assert_eq!(result.mse, 0.0);
    assert_eq!(result.max_diff, 0.0);
    assert!(result.psnr.is_infinite());
    assert!(result.to_string().contains("PASSED"));
}

#[test]
fn threshold_decides_on_small_differences() {
    let (recipe, mut preview) = recorded();
    for px in preview.data.chunks_exact_mut(4).take(50) {
        px[0] = px[0].saturating_sub(40);
    }
    let strict = validate_recipe(&recipe, &CpuEngine, &preview, 0.0).unwrap();
    assert!(!strict.passed);
    assert_eq!(strict.max_diff, 40.0);
    assert!(strict.psnr.is_finite() && strict.psnr > 0.0);
    assert!(strict.message.contains("exceeds"), "{}", strict.message);

    let loose = validate_recipe(&recipe, &CpuEngine, &preview, DEFAULT_MSE_THRESHOLD).unwrap();
    assert!(loose.passed);
    assert_eq!(loose.mse, strict.mse);
}

#[test]
fn size_mismatch_fails() {
    let (recipe, _) = recorded();
    let tiny = Raster {
        width: 2,
        height: 2,
        data: vec![255; 16],
    };
    let result = validate_recipe(&recipe, &CpuEngine, &tiny, DEFAULT_MSE_THRESHOLD).unwrap();
    assert!(!result.passed);
    assert!(!result.same_size);
    assert!(result.mse.is_infinite());
    assert!(result.message.contains("dimensions"));
}
