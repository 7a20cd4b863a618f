use crate::codec::value::Value;
use crate::foundation::core::Rgba8;
use crate::foundation::error::{RecipeError, RecipeResult};

/// Default color cycle (the "tab10" palette).
pub(crate) const CYCLE: [Rgba8; 10] = [
    Rgba8::new(0x1f, 0x77, 0xb4, 255),
    Rgba8::new(0xff, 0x7f, 0x0e, 255),
    Rgba8::new(0x2c, 0xa0, 0x2c, 255),
    Rgba8::new(0xd6, 0x27, 0x28, 255),
    Rgba8::new(0x94, 0x67, 0xbd, 255),
    Rgba8::new(0x8c, 0x56, 0x4b, 255),
    Rgba8::new(0xe3, 0x77, 0xc2, 255),
    Rgba8::new(0x7f, 0x7f, 0x7f, 255),
    Rgba8::new(0xbc, 0xbd, 0x22, 255),
    Rgba8::new(0x17, 0xbe, 0xcf, 255),
];

const TAB_NAMES: [&str; 10] = [
    "blue", "orange", "green", "red", "purple", "brown", "pink", "gray", "olive", "cyan",
];

fn named(name: &str) -> Option<Rgba8> {
    let rgb = |r, g, b| Some(Rgba8::new(r, g, b, 255));
    match name {
        "b" | "blue" => rgb(0, 0, 255),
        "g" | "green" => rgb(0, 128, 0),
        "r" | "red" => rgb(255, 0, 0),
        "c" | "cyan" => rgb(0, 191, 191),
        "m" | "magenta" => rgb(191, 0, 191),
        "y" | "yellow" => rgb(191, 191, 0),
        "k" | "black" => rgb(0, 0, 0),
        "w" | "white" => rgb(255, 255, 255),
        "gray" | "grey" => rgb(128, 128, 128),
        "lightgray" | "lightgrey" => rgb(211, 211, 211),
        "darkgray" | "darkgrey" => rgb(169, 169, 169),
        "orange" => rgb(255, 165, 0),
        "purple" => rgb(128, 0, 128),
        "brown" => rgb(165, 42, 42),
        "pink" => rgb(255, 192, 203),
        "olive" => rgb(128, 128, 0),
        "navy" => rgb(0, 0, 128),
        "teal" => rgb(0, 128, 128),
        "none" | "transparent" => Some(Rgba8::new(0, 0, 0, 0)),
        _ => None,
    }
}

fn parse_hex(s: &str) -> RecipeResult<Rgba8> {
    let hex_byte = |pair: &str| {
        u8::from_str_radix(pair, 16)
            .map_err(|_| RecipeError::validation(format!("invalid hex byte \"{pair}\"")))
    };
    let nibble = |c: &str| hex_byte(&format!("{c}{c}"));
    match s.len() {
        3 => Ok(Rgba8::new(nibble(&s[0..1])?, nibble(&s[1..2])?, nibble(&s[2..3])?, 255)),
        6 => Ok(Rgba8::new(
            hex_byte(&s[0..2])?,
            hex_byte(&s[2..4])?,
            hex_byte(&s[4..6])?,
            255,
        )),
        8 => Ok(Rgba8::new(
            hex_byte(&s[0..2])?,
            hex_byte(&s[2..4])?,
            hex_byte(&s[4..6])?,
            hex_byte(&s[6..8])?,
        )),
        _ => Err(RecipeError::validation(
            "hex color must be #RGB, #RRGGBB or #RRGGBBAA",
        )),
    }
}

/// Parse a color string: hex, a named color, a cycle reference (`C0`..`C9`), a `tab:` name,
/// or a gray level in `[0, 1]`.
pub fn parse_color(s: &str) -> RecipeResult<Rgba8> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix('#') {
        return parse_hex(hex);
    }
    let lower = s.to_ascii_lowercase();
    if let Some(c) = named(&lower) {
        return Ok(c);
    }
    if let Some(i) = lower.strip_prefix('c').and_then(|n| n.parse::<usize>().ok()) {
        return Ok(CYCLE[i % CYCLE.len()]);
    }
    if let Some(name) = lower.strip_prefix("tab:") {
        if let Some(i) = TAB_NAMES.iter().position(|n| *n == name) {
            return Ok(CYCLE[i]);
        }
    }
    if let Ok(level) = lower.parse::<f64>() {
        if (0.0..=1.0).contains(&level) {
            let v = (level * 255.0).round() as u8;
            return Ok(Rgba8::new(v, v, v, 255));
        }
    }
    Err(RecipeError::validation(format!("unknown color '{s}'")))
}

/// Interpret a single-color argument value (string or `[r, g, b(, a)]` in `[0, 1]`).
pub fn color_from_value(v: &Value) -> RecipeResult<Rgba8> {
    match v {
        Value::Str(s) => parse_color(s),
        other => {
            let comps = other.to_f64_vec().ok_or_else(|| {
                RecipeError::validation(format!("expected a color, got {}", other.kind()))
            })?;
            let to_u8 = |x: f64| (x.clamp(0.0, 1.0) * 255.0).round() as u8;
            match comps.as_slice() {
                [r, g, b] => Ok(Rgba8::new(to_u8(*r), to_u8(*g), to_u8(*b), 255)),
                [r, g, b, a] => Ok(Rgba8::new(to_u8(*r), to_u8(*g), to_u8(*b), to_u8(*a))),
                _ => Err(RecipeError::validation(
                    "rgb color must have 3 or 4 components",
                )),
            }
        }
    }
}

/// Interpret a color-sequence argument value.
pub fn colors_from_value(v: &Value) -> RecipeResult<Vec<Rgba8>> {
    match v {
        Value::Colors(list) => list.iter().map(|s| parse_color(s)).collect(),
        Value::List(items) => items.iter().map(color_from_value).collect(),
        single => Ok(vec![color_from_value(single)?]),
    }
}

/// Sample a named colormap at `t` in `[0, 1]`.
pub(crate) fn colormap(name: &str, t: f64) -> RecipeResult<Rgba8> {
    let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
    let stops: &[[u8; 3]] = match name {
        "viridis" => &[
            [68, 1, 84],
            [59, 82, 139],
            [33, 145, 140],
            [94, 201, 98],
            [253, 231, 37],
        ],
        "gray" | "grey" => &[[0, 0, 0], [255, 255, 255]],
        "hot" => &[[10, 0, 0], [230, 0, 0], [255, 210, 0], [255, 255, 255]],
        "coolwarm" => &[[59, 76, 192], [221, 221, 221], [180, 4, 38]],
        other => {
            return Err(RecipeError::validation(format!("unknown colormap '{other}'")));
        }
    };
    let pos = t * (stops.len() - 1) as f64;
    let i = (pos.floor() as usize).min(stops.len() - 2);
    let f = pos - i as f64;
    let lerp = |a: u8, b: u8| (f64::from(a) + (f64::from(b) - f64::from(a)) * f).round() as u8;
    let (a, b) = (stops[i], stops[i + 1]);
    Ok(Rgba8::new(lerp(a[0], b[0]), lerp(a[1], b[1]), lerp(a[2], b[2]), 255))
}

#[cfg(test)]
#[path = "../../tests/unit/render/color.rs"]
mod tests;
