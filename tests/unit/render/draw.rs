use super::*;
use crate::recipe::model::FigureConfig;

fn canvas() -> CpuCanvas {
    CpuCanvas::new(&FigureConfig::default()).unwrap()
}

fn kw(pairs: &[(&str, Value)]) -> Kwargs {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), v.clone()))
        .collect()
}

fn parts(c: &CpuCanvas, h: Handle) -> Vec<&Element> {
    c.handles[h.0 as usize]
        .parts
        .iter()
        .map(|id| &c.elements[id.0 as usize])
        .collect()
}

fn xy() -> [Value; 2] {
    [
        Value::floats(vec![0.0, 1.0, 2.0]),
        Value::floats(vec![1.0, 3.0, 2.0]),
    ]
}

#[test]
fn value_formats() {
    assert_eq!(format_value(3.14159, "%.2f").unwrap(), "3.14");
    assert_eq!(format_value(2.6, "%d").unwrap(), "3");
    assert_eq!(format_value(2.34, "{:.1f}").unwrap(), "2.3");
    assert_eq!(format_value(4.0, "%g").unwrap(), "4");
    assert_eq!(format_value(0.5, "{}").unwrap(), "0.5");
    assert!(format_value(1.0, "%s").is_err());
    assert!(format_value(1.0, "plain").is_err());
}

#[test]
fn step_modes() {
    let pts = [Point::new(0.0, 0.0), Point::new(1.0, 1.0)];
    assert_eq!(
        step_points(&pts, "pre").unwrap(),
        vec![pts[0], Point::new(0.0, 1.0), pts[1]]
    );
    assert_eq!(
        step_points(&pts, "post").unwrap(),
        vec![pts[0], Point::new(1.0, 0.0), pts[1]]
    );
    assert_eq!(step_points(&pts, "mid").unwrap().len(), 4);
    assert!(step_points(&pts, "sideways").is_err());
}

#[test]
fn unexpected_keywords_are_rejected() {
    let mut c = canvas();
    let err = c
        .dispatch(Operation::Plot, 0, &xy(), &kw(&[("bogus", Value::Int(1))]))
        .unwrap_err();
    assert!(matches!(err, RecipeError::Engine(_)));
    assert!(err.to_string().contains("unexpected keyword argument 'bogus'"));
}

#[test]
fn too_many_positionals_are_rejected() {
    let mut c = canvas();
    let three = [Value::floats(vec![0.0]), Value::floats(vec![0.0]), Value::Int(1)];
    assert!(c.dispatch(Operation::Plot, 0, &three, &Kwargs::new()).is_err());
}

#[test]
fn plot_draws_a_line_and_optional_markers() {
    let mut c = canvas();
    let h = c
        .dispatch(Operation::Plot, 0, &xy(), &kw(&[("marker", Value::str("o"))]))
        .unwrap();
    let kinds: Vec<ElementKind> = parts(&c, h).iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![ElementKind::Line, ElementKind::Markers]);

    let none = kw(&[("linestyle", Value::str("none"))]);
    assert!(c.dispatch(Operation::Plot, 0, &xy(), &none).is_err());
}

#[test]
fn lines_take_successive_cycle_colors() {
    let mut c = canvas();
    let a = c.dispatch(Operation::Plot, 0, &xy(), &Kwargs::new()).unwrap();
    let b = c.dispatch(Operation::Plot, 0, &xy(), &Kwargs::new()).unwrap();
    assert_eq!(parts(&c, a)[0].appearance.stroke, Some(CYCLE[0]));
    assert_eq!(parts(&c, b)[0].appearance.stroke, Some(CYCLE[1]));

    let red = c
        .dispatch(Operation::Plot, 0, &xy(), &kw(&[("color", Value::str("red"))]))
        .unwrap();
    assert_eq!(parts(&c, red)[0].appearance.stroke, Some(Rgba8::new(255, 0, 0, 255)));
}

#[test]
fn bars_produce_one_patch_each() {
    let mut c = canvas();
    let args = [
        Value::floats(vec![1.0, 2.0, 3.0]),
        Value::floats(vec![4.0, -1.0, 2.0]),
    ];
    let h = c.dispatch(Operation::Bar, 0, &args, &Kwargs::new()).unwrap();
    let p = parts(&c, h);
    assert_eq!(p.len(), 3);
    assert!(p.iter().all(|e| e.kind == ElementKind::Patch));
    let bars = &c.handles[h.0 as usize].bars;
    assert_eq!(bars[1].value, -1.0);
    assert!((bars[0].rect.width() - 0.8).abs() < 1e-12);
}

#[test]
fn histogram_counts_land_in_their_bins() {
    let mut c = canvas();
    let h = c
        .dispatch(
            Operation::Hist,
            0,
            &[Value::floats(vec![0.0, 1.0, 1.0, 2.0])],
            &kw(&[("bins", Value::Int(2))]),
        )
        .unwrap();
    let counts: Vec<f64> = c.handles[h.0 as usize].bars.iter().map(|b| b.value).collect();
    assert_eq!(counts, vec![1.0, 3.0]);
}

#[test]
fn bar_labels_need_a_bar_container() {
    let mut c = canvas();
    let args = [Value::floats(vec![1.0, 2.0]), Value::floats(vec![3.0, 4.0])];
    let bars = c.dispatch(Operation::Bar, 0, &args, &Kwargs::new()).unwrap();
    let labels = c
        .dispatch(
            Operation::BarLabel,
            0,
            &[Value::Handle(bars)],
            &kw(&[("fmt", Value::str("%.1f"))]),
        )
        .unwrap();
    let p = parts(&c, labels);
    assert_eq!(p.len(), 2);
    assert!(p.iter().all(|e| e.kind == ElementKind::Text));

    let line = c.dispatch(Operation::Plot, 0, &xy(), &Kwargs::new()).unwrap();
    assert!(c
        .dispatch(Operation::BarLabel, 0, &[Value::Handle(line)], &Kwargs::new())
        .is_err());
    assert!(c
        .dispatch(Operation::BarLabel, 0, &[Value::Int(0)], &Kwargs::new())
        .is_err());
}

#[test]
fn a_second_title_replaces_the_first() {
    let mut c = canvas();
    let first = c
        .dispatch(Operation::SetTitle, 0, &[Value::str("one")], &Kwargs::new())
        .unwrap();
    let second = c
        .dispatch(Operation::SetTitle, 0, &[Value::str("two")], &Kwargs::new())
        .unwrap();
    assert!(!parts(&c, first)[0].visible);
    assert!(parts(&c, second)[0].visible);
}

#[test]
fn legend_without_labels_is_empty() {
    let mut c = canvas();
    c.dispatch(Operation::Plot, 0, &xy(), &Kwargs::new()).unwrap();
    let h = c.dispatch(Operation::Legend, 0, &[], &Kwargs::new()).unwrap();
    assert!(parts(&c, h).iter().all(|e| !e.visible));
}

#[test]
fn legend_picks_up_later_labelled_calls() {
    let mut c = canvas();
    c.dispatch(Operation::Plot, 0, &xy(), &kw(&[("label", Value::str("a"))]))
        .unwrap();
    let legend = c.dispatch(Operation::Legend, 0, &[], &Kwargs::new()).unwrap();
    let before = parts(&c, legend).len();

    c.dispatch(Operation::Plot, 0, &xy(), &kw(&[("label", Value::str("b"))]))
        .unwrap();
    assert!(c.panels[0].legend_stale);
    c.refresh_legends();
    assert!(!c.panels[0].legend_stale);

    let after = parts(&c, legend);
    assert_eq!(after.len(), before + 2);
    assert!(after.iter().all(|e| e.visible && e.handle == Some(legend)));
}

#[test]
fn legend_rebuild_keeps_frame_style() {
    let mut c = canvas();
    c.dispatch(Operation::Plot, 0, &xy(), &Kwargs::new()).unwrap();
    let legend = c.dispatch(Operation::Legend, 0, &[], &Kwargs::new()).unwrap();
    let frame = c.handles[legend.0 as usize].parts[0];
    let red = Rgba8::new(255, 0, 0, 255);
    c.elements[frame.0 as usize].appearance.stroke = Some(red);

    c.dispatch(Operation::Plot, 0, &xy(), &kw(&[("label", Value::str("b"))]))
        .unwrap();
    c.refresh_legends();

    let rebuilt = parts(&c, legend);
    assert!(rebuilt[0].visible);
    assert_eq!(rebuilt[0].kind, ElementKind::Legend);
    assert_eq!(rebuilt[0].appearance.stroke, Some(red));
}

#[test]
fn legend_lists_calls_before_decorations() {
    let mut c = canvas();
    c.dispatch(Operation::Plot, 0, &xy(), &kw(&[("label", Value::str("first"))]))
        .unwrap();
    c.dispatch(Operation::Axhline, 0, &[Value::Float(1.5)], &kw(&[("label", Value::str("ref"))]))
        .unwrap();
    c.dispatch(Operation::Plot, 0, &xy(), &kw(&[("label", Value::str("second"))]))
        .unwrap();
    let labels: Vec<String> = c.legend_entries(0).into_iter().map(|e| e.2).collect();
    assert_eq!(labels, vec!["first", "second", "ref"]);
}

#[test]
fn one_sided_limit_keeps_autoscaling() {
    let mut c = canvas();
    c.dispatch(Operation::Plot, 0, &xy(), &Kwargs::new()).unwrap();
    c.dispatch(Operation::SetXlim, 0, &[Value::Float(-1.0)], &Kwargs::new())
        .unwrap();
    c.dispatch(
        Operation::Plot,
        0,
        &[Value::floats(vec![0.0, 10.0]), Value::floats(vec![0.0, 1.0])],
        &Kwargs::new(),
    )
    .unwrap();
    let lim = c.limits(0);
    assert_eq!(lim.x.0, -1.0);
    assert!(lim.x.1 > 10.0);

    assert!(c
        .dispatch(Operation::SetXlim, 0, &[Value::Float(2.0), Value::Float(2.0)], &Kwargs::new())
        .is_err());
}

#[test]
fn pie_wedges_follow_explicit_colors() {
    let mut c = canvas();
    let h = c
        .dispatch(
            Operation::Pie,
            0,
            &[Value::floats(vec![1.0, 1.0])],
            &kw(&[("colors", Value::colors(["red", "blue"]))]),
        )
        .unwrap();
    let fills: Vec<Option<Rgba8>> = parts(&c, h).iter().map(|e| e.appearance.fill).collect();
    assert_eq!(
        fills,
        vec![Some(Rgba8::new(255, 0, 0, 255)), Some(Rgba8::new(0, 0, 255, 255))]
    );
    assert!(c
        .dispatch(Operation::Pie, 0, &[Value::floats(vec![0.0, 0.0])], &Kwargs::new())
        .is_err());
}
