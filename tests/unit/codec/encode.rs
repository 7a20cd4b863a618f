use super::*;
use crate::codec::value::DType;
use crate::recipe::ops::Operation;
use crate::render::backend::Handle;

fn encode_with(
    opts: CodecOpts,
    store: &mut PayloadStore,
    index: &CallIndex,
    name: &str,
    value: Value,
) -> RecipeResult<ArgumentSpec> {
    Encoder {
        opts,
        panel: PanelPos::new(0, 0),
        call_id: "trace",
        payloads: store,
        index,
    }
    .encode(name, value)
}

fn linspace(n: usize) -> Vec<f64> {
    (0..n).map(|i| i as f64 / n as f64).collect()
}

#[test]
fn small_arrays_stay_inline() {
    let mut store = PayloadStore::default();
    let index = CallIndex::default();
    let spec = encode_with(
        CodecOpts::default(),
        &mut store,
        &index,
        "x",
        Value::floats(linspace(50)),
    )
    .unwrap();
    assert_eq!(spec.as_inline().map(Value::element_count), Some(50));
}

#[test]
fn large_arrays_are_externalized_with_their_shape() {
    let mut store = PayloadStore::default();
    let index = CallIndex::default();
    let spec = encode_with(
        CodecOpts::default(),
        &mut store,
        &index,
        "y",
        Value::floats(linspace(500)),
    )
    .unwrap();
    let r = spec.as_external().expect("external");
    assert_eq!(r.selector, "r0c0_trace_y");
    assert_eq!(r.shape, vec![500]);
    assert_eq!(r.dtype, DType::Float64);
    assert!(r.path.is_empty());
    assert!(store.holds(&r.selector));
    assert_eq!(store.resolve(r).unwrap().len(), 500);
}

#[test]
fn threshold_is_exclusive() {
    let mut store = PayloadStore::default();
    let index = CallIndex::default();
    let opts = CodecOpts { inline_threshold: 4 };
    let at = encode_with(opts, &mut store, &index, "x", Value::floats(linspace(4))).unwrap();
    assert!(at.as_inline().is_some());
    let over = encode_with(opts, &mut store, &index, "x", Value::floats(linspace(5))).unwrap();
    assert!(over.as_external().is_some());
}

#[test]
fn matrices_keep_their_shape() {
    let mut store = PayloadStore::default();
    let index = CallIndex::default();
    let z = NumArray::matrix_f64(20, 10, linspace(200)).unwrap();
    let spec = encode_with(CodecOpts::default(), &mut store, &index, "z", Value::Array(z)).unwrap();
    let r = spec.as_external().unwrap();
    assert_eq!(r.shape, vec![20, 10]);
    assert_eq!(store.resolve(r).unwrap().shape(), &[20, 10]);
}

#[test]
fn large_groups_record_their_lengths() {
    let mut store = PayloadStore::default();
    let index = CallIndex::default();
    let v = Value::groups(vec![linspace(60), linspace(70)]);
    let spec = encode_with(CodecOpts::default(), &mut store, &index, "data", v).unwrap();
    let r = spec.as_external().unwrap();
    assert_eq!(r.groups, Some(vec![60, 70]));
    assert_eq!(r.shape, vec![130]);
}

#[test]
fn handles_become_call_references() {
    let mut store = PayloadStore::default();
    let mut index = CallIndex::default();
    index.insert(Handle(7), PanelPos::new(0, 0), "bars", Operation::Bar);
    let spec = encode_with(
        CodecOpts::default(),
        &mut store,
        &index,
        "container",
        Value::Handle(Handle(7)),
    )
    .unwrap();
    assert_eq!(spec, ArgumentSpec::CallRef("bars".to_owned()));
}

#[test]
fn foreign_and_untracked_handles_are_rejected() {
    let mut store = PayloadStore::default();
    let mut index = CallIndex::default();
    index.insert(Handle(1), PanelPos::new(0, 1), "bars", Operation::Bar);
    let opts = CodecOpts::default();
    let err = encode_with(opts, &mut store, &index, "c", Value::Handle(Handle(1))).unwrap_err();
    assert!(matches!(err, RecipeError::Validation(_)));
    let err = encode_with(opts, &mut store, &index, "c", Value::Handle(Handle(2))).unwrap_err();
    assert!(matches!(err, RecipeError::Validation(_)));
    let nested = Value::List(vec![Value::Handle(Handle(1))]);
    assert!(encode_with(opts, &mut store, &index, "c", nested).is_err());
}

#[test]
fn color_list_keyword_keeps_single_colors_as_lists() {
    let mut store = PayloadStore::default();
    let index = CallIndex::default();
    let opts = CodecOpts::default();
    let spec = encode_with(opts, &mut store, &index, "colors", Value::str("red")).unwrap();
    assert_eq!(spec, ArgumentSpec::Inline(Value::colors(["red"])));

    let spec = encode_with(opts, &mut store, &index, "color", Value::str("red")).unwrap();
    assert_eq!(spec, ArgumentSpec::Inline(Value::str("red")));

    let bad = Value::List(vec![Value::Int(1)]);
    assert!(encode_with(opts, &mut store, &index, "colors", bad).is_err());
}
