use super::*;

fn canvas() -> CpuCanvas {
    CpuCanvas::new(&FigureConfig::default()).unwrap()
}

#[test]
fn native_size_follows_figure_size_and_dpi() {
    let c = canvas();
    assert_eq!(c.native_size(), RasterSize { width: 640, height: 480 });
    assert_eq!(c.device_to_physical_unit_ratio(), 100.0);
    assert_eq!(c.tight_bounding_box(), Rect::new(0.0, 0.0, 6.4, 4.8));
}

#[test]
fn tight_crop_shrinks_the_canvas() {
    let cfg = FigureConfig {
        crop: CropMode::Tight,
        ..FigureConfig::default()
    };
    let c = CpuCanvas::new(&cfg).unwrap();
    let size = c.native_size();
    assert!(size.width < 640 && size.height < 480, "{size:?}");
}

#[test]
fn empty_canvas_renders_the_background() {
    let mut c = canvas();
    let r = c.render(c.native_size()).unwrap();
    assert_eq!(r.pixel(0, 0), Some([255, 255, 255, 255]));
    assert_eq!(r.data.len(), 640 * 480 * 4);
}

#[test]
fn rendering_is_deterministic() {
    let mut c = canvas();
    let kw = BTreeMap::from([("color".to_owned(), Value::str("red"))]);
    c.invoke(
        Operation::Plot,
        PanelPos::new(0, 0),
        &[Value::floats(vec![0.0, 1.0]), Value::floats(vec![0.0, 1.0])],
        &kw,
    )
    .unwrap();
    let a = c.render(c.native_size()).unwrap();
    let b = c.render(c.native_size()).unwrap();
    assert_eq!(a, b);
    let red = a
        .data
        .chunks_exact(4)
        .filter(|p| p[0] > 200 && p[1] < 60 && p[2] < 60)
        .count();
    assert!(red > 100, "only {red} red pixels");
}

#[test]
fn zero_sized_render_is_an_error() {
    let mut c = canvas();
    assert!(c.render(RasterSize { width: 0, height: 10 }).is_err());
}

#[test]
fn panels_outside_the_grid_are_rejected() {
    let mut c = canvas();
    let err = c
        .invoke(
            Operation::Plot,
            PanelPos::new(1, 0),
            &[Value::floats(vec![0.0])],
            &BTreeMap::new(),
        )
        .unwrap_err();
    assert!(matches!(err, RecipeError::Engine(_)));
}

#[test]
fn structural_elements_are_not_selectable() {
    let c = canvas();
    let els = c.elements();
    assert_eq!(els.len(), 2);
    assert!(els.iter().all(|e| !e.selectable && e.handle.is_none()));
}

#[test]
fn appearance_can_be_replaced() {
    let mut c = canvas();
    let h = c
        .invoke(
            Operation::Scatter,
            PanelPos::new(0, 0),
            &[Value::floats(vec![0.0, 1.0]), Value::floats(vec![1.0, 0.0])],
            &BTreeMap::new(),
        )
        .unwrap();
    let id = c.handle_parts(h)[0];
    let mut app = c.appearance(id).unwrap();
    app.fill = Some(Rgba8::new(1, 2, 3, 255));
    c.set_appearance(id, app).unwrap();
    assert_eq!(c.appearance(id).unwrap(), app);
    assert!(c.element_path(id).is_some_and(|p| p.len() == 2));
    assert!(c.set_appearance(ElementId(999), app).is_err());
}

#[test]
fn finalize_sets_ticks_and_widths() {
    let mut c = canvas();
    let h = c
        .invoke(
            Operation::Plot,
            PanelPos::new(0, 0),
            &[Value::floats(vec![0.0, 1.0]), Value::floats(vec![0.0, 1.0])],
            &BTreeMap::new(),
        )
        .unwrap();
    let spec = FinalizeSpec {
        tick_count: Some(3),
        legend_frame_width: None,
        line_widths: BTreeMap::from([("plot".to_owned(), 4.0)]),
    };
    c.finalize(&spec).unwrap();
    assert_eq!(c.panels[0].tick_count, 3);
    let id = c.handle_parts(h)[0];
    assert_eq!(c.appearance(id).unwrap().line_width, 4.0);

    let bad = FinalizeSpec {
        tick_count: Some(1),
        ..FinalizeSpec::default()
    };
    assert!(c.finalize(&bad).is_err());
}

#[test]
fn ticks_use_round_steps() {
    assert_eq!(nice_ticks((0.0, 1.0), 5), vec![0.0, 0.5, 1.0]);
    assert_eq!(nice_ticks((0.0, 10.0), 3), vec![0.0, 5.0, 10.0]);
    assert!(nice_ticks((1.0, 1.0), 5).is_empty());
}

#[test]
fn unpremultiply_restores_straight_color() {
    let mut px = [128u8, 0, 0, 128, 10, 20, 30, 255, 0, 0, 0, 0];
    unpremultiply_in_place(&mut px);
    assert_eq!(px, [255, 0, 0, 128, 10, 20, 30, 255, 0, 0, 0, 0]);
}
