use super::*;

#[test]
fn parses_hex_forms() {
    assert_eq!(parse_color("#f00").unwrap(), Rgba8::new(255, 0, 0, 255));
    assert_eq!(parse_color("#1f77b4").unwrap(), CYCLE[0]);
    assert_eq!(
        parse_color("#11223380").unwrap(),
        Rgba8::new(0x11, 0x22, 0x33, 0x80)
    );
    assert!(parse_color("#12345").is_err());
    assert!(parse_color("#gg0000").is_err());
}

#[test]
fn parses_names_cycle_and_gray_levels() {
    assert_eq!(parse_color("k").unwrap(), Rgba8::new(0, 0, 0, 255));
    assert_eq!(parse_color("White").unwrap(), Rgba8::new(255, 255, 255, 255));
    assert_eq!(parse_color("C1").unwrap(), CYCLE[1]);
    assert_eq!(parse_color("C11").unwrap(), CYCLE[1]);
    assert_eq!(parse_color("tab:green").unwrap(), CYCLE[2]);
    assert_eq!(parse_color("0.5").unwrap(), Rgba8::new(128, 128, 128, 255));
    assert_eq!(parse_color("none").unwrap().a, 0);
    assert!(parse_color("1.5").is_err());
    assert!(parse_color("chartreuse-ish").is_err());
}

#[test]
fn color_values_accept_strings_and_components() {
    assert_eq!(
        color_from_value(&Value::str("red")).unwrap(),
        Rgba8::new(255, 0, 0, 255)
    );
    assert_eq!(
        color_from_value(&Value::floats(vec![0.0, 0.0, 1.0, 0.5])).unwrap(),
        Rgba8::new(0, 0, 255, 128)
    );
    assert!(color_from_value(&Value::floats(vec![0.0, 1.0])).is_err());
    assert!(color_from_value(&Value::Bool(true)).is_err());
}

#[test]
fn color_sequences_keep_every_entry() {
    let v = Value::colors(["red", "#00ff00"]);
    assert_eq!(
        colors_from_value(&v).unwrap(),
        vec![Rgba8::new(255, 0, 0, 255), Rgba8::new(0, 255, 0, 255)]
    );
    assert_eq!(colors_from_value(&Value::str("k")).unwrap().len(), 1);
}

#[test]
fn colormaps_hit_their_end_stops() {
    assert_eq!(colormap("viridis", 0.0).unwrap(), Rgba8::new(68, 1, 84, 255));
    assert_eq!(colormap("viridis", 1.0).unwrap(), Rgba8::new(253, 231, 37, 255));
    assert_eq!(colormap("gray", 0.5).unwrap(), Rgba8::new(128, 128, 128, 255));
    assert_eq!(colormap("gray", f64::NAN).unwrap(), Rgba8::new(0, 0, 0, 255));
    assert!(colormap("jet", 0.5).is_err());
}
