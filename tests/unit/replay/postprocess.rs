use super::*;
use crate::recipe::model::FigureConfig;
use crate::render::cpu::CpuCanvas;

const P: PanelPos = PanelPos { row: 0, col: 0 };

fn canvas() -> CpuCanvas {
    CpuCanvas::new(&FigureConfig::default()).unwrap()
}

fn kw(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), v.clone()))
        .collect()
}

fn samples() -> Vec<Value> {
    vec![Value::groups(vec![
        vec![1.0, 2.0, 3.0, 4.0, 5.0],
        vec![2.0, 3.0, 3.5, 4.0],
    ])]
}

fn appearances(c: &CpuCanvas, h: Handle, kind: ElementKind) -> Vec<crate::render::backend::Appearance> {
    c.handle_parts(h)
        .into_iter()
        .filter(|id| c.element(*id).is_some_and(|i| i.kind == kind))
        .map(|id| c.appearance(id).unwrap())
        .collect()
}

#[test]
fn table_covers_styling_keywords() {
    assert_eq!(lookup(Operation::Boxplot).unwrap().keys, &["color", "linewidth"]);
    assert!(lookup(Operation::Pie).unwrap().keys.contains(&"edgecolor"));
    assert!(lookup(Operation::Plot).is_none());
    assert_eq!(TABLE.len(), 4);
}

#[test]
fn box_color_is_applied_after_the_native_call() {
    let mut c = canvas();
    let direct = c.invoke(
        Operation::Boxplot,
        P,
        &samples(),
        &kw(&[("color", Value::str("red"))]),
    );
    assert!(direct.is_err());

    let h = invoke(
        &mut c,
        Operation::Boxplot,
        P,
        &samples(),
        kw(&[("color", Value::str("red")), ("linewidth", Value::Float(2.5))]),
    )
    .unwrap();
    let red = color_from_value(&Value::str("red")).unwrap();
    let parts = c.handle_parts(h);
    assert!(!parts.is_empty());
    for id in parts {
        let app = c.appearance(id).unwrap();
        assert_eq!(app.stroke, Some(red));
        assert_eq!(app.line_width, 2.5);
    }
}

#[test]
fn null_keywords_are_dropped() {
    let mut c = canvas();
    let h = invoke(
        &mut c,
        Operation::Boxplot,
        P,
        &samples(),
        kw(&[("color", Value::Null)]),
    );
    assert!(h.is_ok());
}

#[test]
fn bad_widths_are_reported() {
    let mut c = canvas();
    let err = invoke(
        &mut c,
        Operation::Boxplot,
        P,
        &samples(),
        kw(&[("linewidth", Value::str("thick"))]),
    )
    .unwrap_err();
    assert!(err.to_string().contains("linewidth"));
}

#[test]
fn wedges_get_outlines() {
    let mut c = canvas();
    let h = invoke(
        &mut c,
        Operation::Pie,
        P,
        &[Value::floats(vec![1.0, 2.0, 3.0])],
        kw(&[("edgecolor", Value::str("black")), ("linewidth", Value::Float(2.0))]),
    )
    .unwrap();
    let black = color_from_value(&Value::str("black")).unwrap();
    let wedges = appearances(&c, h, ElementKind::Wedge);
    assert_eq!(wedges.len(), 3);
    assert!(wedges.iter().all(|a| a.stroke == Some(black) && a.line_width == 2.0));
}

#[test]
fn violin_bodies_take_alpha() {
    let mut c = canvas();
    let h = invoke(
        &mut c,
        Operation::Violinplot,
        P,
        &samples(),
        kw(&[("color", Value::str("green")), ("alpha", Value::Float(0.5))]),
    )
    .unwrap();
    let bodies = appearances(&c, h, ElementKind::Fill);
    assert_eq!(bodies.len(), 2);
    let green = color_from_value(&Value::str("green")).unwrap();
    for app in bodies {
        let fill = app.fill.unwrap();
        assert_eq!((fill.r, fill.g, fill.b), (green.r, green.g, green.b));
        assert!(fill.a > 100 && fill.a < 160, "alpha {}", fill.a);
    }
}
