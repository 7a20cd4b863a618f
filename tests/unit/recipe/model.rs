use super::*;

fn rec(id: &str, op: &str) -> CallRecord {
    CallRecord {
        id: id.to_owned(),
        operation: op.to_owned(),
        args: Vec::new(),
        kwargs: BTreeMap::new(),
        stats: None,
        timestamp: None,
    }
}

#[test]
fn decorations_follow_calls() {
    let mut p = Panel::new(PanelPos::new(0, 0));
    p.decorations.push(rec("title", "set_title"));
    p.calls.push(rec("a", "plot"));
    p.calls.push(rec("b", "bar"));
    let ids: Vec<&str> = p.records().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "title"]);
    assert!(p.contains_id("title"));
    assert!(p.record_mut("b").is_some());
    assert!(p.record("c").is_none());
}

#[test]
fn operations_resolve_by_name_and_alias() {
    assert_eq!(rec("a", "line").op().unwrap(), Operation::Plot);
    assert!(matches!(
        rec("a", "contourf").op(),
        Err(RecipeError::UnknownOperation(_))
    ));
}

#[test]
fn link_rejects_duplicate_ids_across_lists() {
    let mut r = Recipe::new("test", FigureConfig::default());
    let p = r.panel_entry(PanelPos::new(0, 0));
    p.calls.push(rec("x", "plot"));
    p.decorations.push(rec("x", "set_title"));
    assert!(matches!(r.link(), Err(RecipeError::DuplicateId { .. })));
}

#[test]
fn link_derives_positions_from_keys() {
    let mut r = Recipe::new("test", FigureConfig::grid(2, 2));
    r.panels.insert("ax_1_0".into(), Panel::default());
    r.link().unwrap();
    assert_eq!(r.panels["ax_1_0"].pos, PanelPos::new(1, 0));

    r.panels.insert("axes".into(), Panel::default());
    assert!(r.link().is_err());
}

#[test]
fn figure_config_checks_ranges() {
    assert!(FigureConfig::default().validate().is_ok());
    let mut bad = FigureConfig::default();
    bad.size = [0.0, 4.0];
    assert!(bad.validate().is_err());
    assert!(FigureConfig::grid(0, 1).validate().is_err());
    let mut no_dpi = FigureConfig::default();
    no_dpi.dpi = f64::NAN;
    assert!(no_dpi.validate().is_err());
}

#[test]
fn legacy_field_names_are_accepted() {
    let r: CallRecord = serde_yaml::from_str("id: a\nfunction: plot\n").unwrap();
    assert_eq!(r.operation, "plot");
    let cfg: FigureConfig =
        serde_yaml::from_str("figsize: [3.0, 2.0]\nlayout: {nrows: 2, ncols: 3}\n").unwrap();
    assert_eq!(cfg.size, [3.0, 2.0]);
    assert_eq!(cfg.grid, GridSpec { rows: 2, cols: 3 });
    assert_eq!(cfg.dpi, 100.0);
}

#[test]
fn new_recipes_get_distinct_ids() {
    let a = Recipe::new("e", FigureConfig::default());
    let b = Recipe::new("e", FigureConfig::default());
    assert_ne!(a.id, b.id);
    assert!(a.id.starts_with("fig_"));
    assert_eq!(a.schema_version, SCHEMA_VERSION);
}

#[test]
fn find_calls_spans_panels() {
    let mut r = Recipe::new("e", FigureConfig::grid(1, 2));
    r.panel_entry(PanelPos::new(0, 0)).calls.push(rec("s", "plot"));
    r.panel_entry(PanelPos::new(0, 1)).calls.push(rec("s", "plot"));
    r.panel_entry(PanelPos::new(0, 1)).calls.push(rec("t", "plot"));
    assert_eq!(r.find_calls("s").len(), 2);
    assert_eq!(r.find_calls("t")[0].0, "ax_0_1");
    assert_eq!(r.record_count(), 3);
}

#[test]
fn external_refs_cover_args_and_kwargs() {
    use crate::codec::value::DType;
    let ext = |sel: &str| {
        ArgumentSpec::External(ExternalRef {
            path: String::new(),
            selector: sel.to_owned(),
            dtype: DType::Float64,
            shape: vec![200],
            groups: None,
        })
    };
    let mut c = rec("a", "plot");
    c.args.push(PositionalArg {
        name: "x".into(),
        spec: ext("sx"),
    });
    c.kwargs.insert("yerr".into(), ext("se"));
    c.kwargs
        .insert("color".into(), ArgumentSpec::Inline(crate::codec::value::Value::str("r")));
    let mut r = Recipe::new("e", FigureConfig::default());
    r.panel_entry(PanelPos::new(0, 0)).calls.push(c);
    let sels: Vec<&str> = r.external_refs().map(|e| e.selector.as_str()).collect();
    assert_eq!(sels, vec!["sx", "se"]);
}
