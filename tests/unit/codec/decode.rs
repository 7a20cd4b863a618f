use super::*;
use crate::codec::spec::ExternalRef;
use crate::codec::value::{DType, NumArray};
use crate::foundation::core::PanelPos;

#[test]
fn inline_values_pass_through() {
    let results = CrossCallResults::new();
    let payloads = PayloadStore::default();
    let ctx = DecodeCtx {
        results: &results,
        payloads: &payloads,
    };
    let v = decode(&ArgumentSpec::Inline(Value::Int(3)), ctx).unwrap();
    assert_eq!(v, Value::Int(3));
}

#[test]
fn call_references_need_an_earlier_result() {
    let mut results = CrossCallResults::new();
    let payloads = PayloadStore::default();
    let spec = ArgumentSpec::CallRef("bars".into());

    let err = decode(
        &spec,
        DecodeCtx {
            results: &results,
            payloads: &payloads,
        },
    )
    .unwrap_err();
    assert!(matches!(err, RecipeError::UnresolvedReference(ref id) if id == "bars"));

    results.insert("bars".into(), Handle(4));
    let v = decode(
        &spec,
        DecodeCtx {
            results: &results,
            payloads: &payloads,
        },
    )
    .unwrap();
    assert_eq!(v, Value::Handle(Handle(4)));
}

#[test]
fn grouped_payloads_split_back_into_groups() {
    let results = CrossCallResults::new();
    let mut payloads = PayloadStore::default();
    payloads.insert_column(
        "g".into(),
        PanelPos::new(0, 0),
        "box",
        "data",
        NumArray::from_f64(vec![1.0, 2.0, 3.0, 4.0, 5.0]),
    );
    let r = ExternalRef {
        path: String::new(),
        selector: "g".into(),
        dtype: DType::Float64,
        shape: vec![5],
        groups: Some(vec![2, 3]),
    };
    let ctx = DecodeCtx {
        results: &results,
        payloads: &payloads,
    };
    let v = decode(&ArgumentSpec::External(r.clone()), ctx).unwrap();
    assert_eq!(v, Value::groups(vec![vec![1.0, 2.0], vec![3.0, 4.0, 5.0]]));

    let bad = ExternalRef {
        groups: Some(vec![2, 2]),
        ..r
    };
    let err = decode(&ArgumentSpec::External(bad), ctx).unwrap_err();
    assert!(matches!(err, RecipeError::SchemaMismatch(_)));
}
