use super::*;

fn yaml(v: &Value) -> String {
    serde_yaml::to_string(v).unwrap()
}

fn parse(s: &str) -> Value {
    serde_yaml::from_str(s).unwrap()
}

#[test]
fn array_construction_checks_shape_and_storage() {
    assert!(NumArray::new(DType::Float64, vec![2, 2], NumData::Float(vec![0.0; 4])).is_ok());
    assert!(NumArray::new(DType::Float64, vec![3], NumData::Float(vec![0.0; 4])).is_err());
    assert!(NumArray::new(DType::Int32, vec![1], NumData::Float(vec![0.0])).is_err());
    assert!(NumArray::new(DType::Float32, vec![1], NumData::Int(vec![1])).is_err());
}

#[test]
fn reshape_keeps_elements() {
    let m = NumArray::matrix_f64(2, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
    let flat = m.flattened();
    assert_eq!(flat.shape(), &[6]);
    let back = flat.reshaped(vec![2, 3]).unwrap();
    assert_eq!(back, m);
    assert!(m.clone().reshaped(vec![4]).is_err());
}

#[test]
fn dtype_names_parse_back() {
    for d in [
        DType::Float64,
        DType::Float32,
        DType::Int64,
        DType::Int32,
        DType::Uint8,
    ] {
        assert_eq!(DType::parse(d.name()), Some(d));
    }
    assert_eq!(DType::parse("<f8"), Some(DType::Float64));
    assert_eq!(DType::parse("complex128"), None);
}

#[test]
fn plain_arrays_are_bare_sequences() {
    let v = Value::floats(vec![0.5, 1.0]);
    let back = parse(&yaml(&v));
    assert_eq!(back, v);

    let ints = Value::ints(vec![1, 2, 3]);
    assert_eq!(parse(&yaml(&ints)), ints);
}

#[test]
fn empty_sequences_keep_their_dtype() {
    let groups = Value::groups(vec![vec![], vec![1.0, 2.0]]);
    assert_eq!(parse(&yaml(&groups)), groups);

    let empty_floats = Value::floats(Vec::new());
    assert_eq!(yaml(&empty_floats).trim(), "[]");
    assert_eq!(parse(&yaml(&empty_floats)), empty_floats);

    let empty_ints = Value::ints(Vec::new());
    let text = yaml(&empty_ints);
    assert!(text.contains("dtype: int64"), "{text}");
    assert_eq!(parse(&text), empty_ints);

    assert_eq!(parse("[]"), Value::floats(Vec::new()));
}

#[test]
fn typed_arrays_keep_dtype_and_shape() {
    let arr = NumArray::new(DType::Int32, vec![2, 2], NumData::Int(vec![1, 2, 3, 4])).unwrap();
    let v = Value::Array(arr);
    let text = yaml(&v);
    assert!(text.contains("dtype: int32"), "{text}");
    assert_eq!(parse(&text), v);
}

#[test]
fn mixed_numeric_sequences_widen_to_float() {
    assert_eq!(parse("[1, 2.5]"), Value::floats(vec![1.0, 2.5]));
    assert_eq!(parse("[]"), Value::floats(Vec::<f64>::new()));
}

#[test]
fn ragged_sequences_become_groups() {
    let v = parse("[[1.0, 2.0], [3.0]]");
    match v {
        Value::Groups(g) => {
            assert_eq!(g.len(), 2);
            assert_eq!(g[1].to_f64_vec(), vec![3.0]);
        }
        other => panic!("expected groups, got {other:?}"),
    }
}

#[test]
fn single_color_list_stays_a_color_list() {
    let v = Value::colors(["red"]);
    let text = yaml(&v);
    assert_eq!(parse(&text), v);
}

#[test]
fn heterogeneous_lists_and_maps() {
    assert_eq!(
        parse("[a, 1]"),
        Value::List(vec![Value::str("a"), Value::Int(1)])
    );
    let m = parse("{color: red, lw: 2}");
    let Value::Map(m) = m else {
        panic!("expected map")
    };
    assert_eq!(m["color"], Value::str("red"));
    assert_eq!(m["lw"], Value::Int(2));
}

#[test]
fn handles_refuse_to_serialize() {
    assert!(serde_yaml::to_string(&Value::Handle(Handle(3))).is_err());
}

#[test]
fn accessors() {
    assert_eq!(Value::Int(2).as_f64(), Some(2.0));
    assert_eq!(Value::str("s").as_str(), Some("s"));
    assert_eq!(Value::Bool(true).as_bool(), Some(true));
    assert_eq!(
        Value::List(vec![Value::Int(1), Value::Float(0.5)]).to_f64_vec(),
        Some(vec![1.0, 0.5])
    );
    assert_eq!(Value::groups(vec![vec![1.0], vec![2.0, 3.0]]).element_count(), 3);
    assert_eq!(Value::Null.kind(), "null");
}
