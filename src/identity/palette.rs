//! Identifier colors for hitmaps.

use crate::foundation::core::Rgb8;
use crate::foundation::math::hsv_to_rgb;

/// Background of a hitmap; identifier 0.
pub const BACKGROUND: Rgb8 = Rgb8::new(26, 26, 26);

/// Color of non-selectable structure (frames, ticks, grid lines).
pub const STRUCTURAL: Rgb8 = Rgb8::new(64, 64, 64);

/// Hand-picked colors for identifiers `1..=12`.
pub const DISTINCT_COLORS: [Rgb8; 12] = [
    Rgb8::new(255, 0, 0),
    Rgb8::new(0, 200, 0),
    Rgb8::new(0, 100, 255),
    Rgb8::new(255, 200, 0),
    Rgb8::new(255, 0, 255),
    Rgb8::new(0, 255, 255),
    Rgb8::new(255, 128, 0),
    Rgb8::new(128, 0, 255),
    Rgb8::new(0, 255, 128),
    Rgb8::new(255, 0, 128),
    Rgb8::new(128, 255, 0),
    Rgb8::new(0, 128, 255),
];

const GOLDEN_RATIO_CONJUGATE: f64 = 0.618033988749895;

/// Color of identifier `id`.
///
/// Beyond the fixed palette, hues step by the golden-ratio conjugate while saturation and value
/// cycle over three and four levels.
pub fn id_to_rgb(id: u32) -> Rgb8 {
    let n = DISTINCT_COLORS.len() as u32;
    match id {
        0 => BACKGROUND,
        i if i <= n => DISTINCT_COLORS[(i - 1) as usize],
        i => {
            let hue = (f64::from(i - n) * GOLDEN_RATIO_CONJUGATE) % 1.0;
            let sat = 0.7 + f64::from(i % 3) * 0.1;
            let val = 0.75 + f64::from(i % 4) * 0.0625;
            Rgb8::from(hsv_to_rgb(hue, sat, val))
        }
    }
}

/// Identifier of `rgb` when it is the background or a palette color.
///
/// Generated colors are not inverted; look them up in the
/// [`IdentityMap`](crate::identity::hitmap::IdentityMap) built during assignment.
pub fn rgb_to_id(rgb: Rgb8) -> Option<u32> {
    if rgb == BACKGROUND {
        return Some(0);
    }
    DISTINCT_COLORS
        .iter()
        .position(|c| *c == rgb)
        .map(|i| i as u32 + 1)
}

#[cfg(test)]
#[path = "../../tests/unit/identity/palette.rs"]
mod tests;
