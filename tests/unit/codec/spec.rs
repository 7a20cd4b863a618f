use super::*;

#[test]
fn keyword_forms() {
    let inline: ArgumentSpec = serde_yaml::from_str("inline: red\n").unwrap();
    assert_eq!(inline, ArgumentSpec::Inline(Value::str("red")));

    let call: ArgumentSpec = serde_yaml::from_str("ref: bar_000\n").unwrap();
    assert_eq!(call, ArgumentSpec::CallRef("bar_000".into()));

    let ext: ArgumentSpec = serde_yaml::from_str(
        "external: {path: d/x.csv, selector: r0c0_a_x, dtype: float64, shape: [300]}\n",
    )
    .unwrap();
    let r = ext.as_external().unwrap();
    assert_eq!(r.path, "d/x.csv");
    assert_eq!(r.element_count(), 300);
    assert_eq!(r.groups, None);
}

#[test]
fn null_inline_is_kept() {
    let spec: ArgumentSpec = serde_yaml::from_str("inline: null\n").unwrap();
    assert_eq!(spec, ArgumentSpec::Inline(Value::Null));
}

#[test]
fn exactly_one_form_is_allowed() {
    let err = serde_yaml::from_str::<ArgumentSpec>("inline: 1\nref: a\n").unwrap_err();
    assert!(err.to_string().contains("more than one"), "{err}");
}

#[test]
fn positional_entries_need_a_name() {
    let arg: PositionalArg = serde_yaml::from_str("name: height\ninline: [1, 2]\n").unwrap();
    assert_eq!(arg.name, "height");
    assert!(arg.spec.as_inline().is_some());
    assert!(serde_yaml::from_str::<PositionalArg>("inline: 1\n").is_err());
}

#[test]
fn serialized_form_names_the_variant() {
    let arg = PositionalArg {
        name: "container".into(),
        spec: ArgumentSpec::CallRef("bar_000".into()),
    };
    let text = serde_yaml::to_string(&arg).unwrap();
    assert!(text.contains("name: container"));
    assert!(text.contains("ref: bar_000"));
    assert!(!text.contains("inline"));
}

#[test]
fn entries_without_any_form_are_refused() {
    let err = serde_yaml::from_str::<PositionalArg>("name: x\n").unwrap_err();
    assert!(err.to_string().contains("none of"), "{err}");
    let arg: PositionalArg = serde_yaml::from_str("name: x\ninline: null\n").unwrap();
    assert_eq!(arg.spec, ArgumentSpec::Inline(Value::Null));
}

#[test]
fn raw_keyword_values_are_inline() {
    let spec = |text: &str| serde_yaml::from_str::<ArgumentSpec>(text).unwrap();
    assert_eq!(spec("red\n"), ArgumentSpec::Inline(Value::str("red")));
    assert_eq!(spec("[5]\n"), ArgumentSpec::Inline(Value::ints(vec![5])));
    assert_eq!(spec("null\n"), ArgumentSpec::Inline(Value::Null));
    assert_eq!(spec("{}\n"), ArgumentSpec::Inline(Value::Map(Default::default())));
    let ArgumentSpec::Inline(Value::Map(m)) = spec("{color: red, lw: 2}\n") else {
        panic!("expected a raw mapping");
    };
    assert_eq!(m.get("color"), Some(&Value::str("red")));

    let err = serde_yaml::from_str::<ArgumentSpec>("{inline: 1, bogus: 2}\n").unwrap_err();
    assert!(err.to_string().contains("malformed"), "{err}");
}

#[test]
fn data_entries_follow_their_dtype() {
    let arg = |text: &str| serde_yaml::from_str::<PositionalArg>(text).unwrap().spec;

    let ArgumentSpec::Inline(Value::Array(a)) = arg("name: x\ndata: [0, 1, 2]\ndtype: float64\n")
    else {
        panic!("expected an array");
    };
    assert_eq!(a.dtype(), DType::Float64);
    assert_eq!(a.to_f64_vec(), vec![0.0, 1.0, 2.0]);

    let ArgumentSpec::Inline(Value::Array(m)) = arg("name: X\ndata: [[1, 2], [3, 4]]\ndtype: int64\n")
    else {
        panic!("expected a matrix");
    };
    assert_eq!(m.shape(), &[2, 2]);
    assert_eq!(m.dtype(), DType::Int64);

    let listed = arg("name: dataset\ndata: [[1, 2], [3, 4]]\ndtype: float64\n_is_array_list: true\n");
    assert!(matches!(listed, ArgumentSpec::Inline(Value::Groups(ref g)) if g.len() == 2));

    assert_eq!(arg("name: s\ndata: hello\n"), ArgumentSpec::Inline(Value::str("hello")));
    assert_eq!(
        arg("name: container\ndata: {__ref__: bar_000}\n"),
        ArgumentSpec::CallRef("bar_000".into())
    );
}

#[test]
fn data_file_names_become_unresolved_references() {
    let spec = serde_yaml::from_str::<PositionalArg>(
        "name: y\ndata: fig_data/plot_000_y.npy\ndtype: int64\n",
    )
    .unwrap()
    .spec;
    let r = spec.as_external().unwrap();
    assert!(r.is_unresolved_file());
    assert_eq!(r.path, "fig_data/plot_000_y.npy");
    assert_eq!(r.dtype, DType::Int64);

    let err = serde_yaml::from_str::<PositionalArg>("name: y\ndata: __FILE__\n").unwrap_err();
    assert!(err.to_string().contains("never written"), "{err}");
    let err = serde_yaml::from_str::<PositionalArg>("name: y\ndata: [1]\ndtype: complex\n")
        .unwrap_err();
    assert!(err.to_string().contains("unknown dtype"), "{err}");
}
