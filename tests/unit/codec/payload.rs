use super::*;
use crate::codec::value::DType;

fn ext(path: &str, selector: &str, dtype: DType, shape: Vec<usize>) -> ExternalRef {
    ExternalRef {
        path: path.to_owned(),
        selector: selector.to_owned(),
        dtype,
        shape,
        groups: None,
    }
}

#[test]
fn ids_are_sanitized() {
    assert_eq!(sanitize_id("My Line!"), "my-line");
    assert_eq!(sanitize_id("a__b"), "a-b");
    assert_eq!(sanitize_id("***"), "unnamed");
}

#[test]
fn column_keys_are_short_and_legacy_keys_map_onto_them() {
    let p = PanelPos::new(1, 2);
    assert_eq!(column_key(p, "My Line", "X"), "r1c2_my-line_x");
    let legacy = legacy_column_key(p, "line_1", "y");
    assert_eq!(legacy, "ax-row-1-col-2_trace-id-line_1_variable-y");
    assert_eq!(legacy_to_short(&legacy), Some(column_key(p, "line_1", "y")));
    assert_eq!(legacy_to_short("r0c0_x_y"), None);
}

#[test]
fn colliding_selectors_get_a_suffix() {
    let p = PanelPos::new(0, 0);
    let mut store = PayloadStore::default();
    let first = store.claim_selector(p, "a b", "x");
    store.insert_column(first.clone(), p, "a b", "x", NumArray::from_f64(vec![1.0]));
    assert_eq!(store.claim_selector(p, "a b", "x"), first);
    assert_eq!(store.claim_selector(p, "a-b", "x"), "r0c0_a-b-2_x");
}

#[test]
fn in_memory_columns_take_the_recorded_shape() {
    let p = PanelPos::new(0, 0);
    let mut store = PayloadStore::default();
    store.insert_column("k".into(), p, "c", "z", NumArray::from_f64(vec![0.0; 6]));
    let arr = store.resolve(&ext("", "k", DType::Float64, vec![2, 3])).unwrap();
    assert_eq!(arr.shape(), &[2, 3]);
    let err = store
        .resolve(&ext("", "k", DType::Float64, vec![4]))
        .unwrap_err();
    assert!(matches!(err, RecipeError::SchemaMismatch(_)));
    store.drop_owned_by(p, "c");
    assert!(!store.holds("k"));
}

#[test]
fn unsaved_columns_without_files_are_missing() {
    let store = PayloadStore::default();
    let err = store
        .resolve(&ext("", "nope", DType::Float64, vec![1]))
        .unwrap_err();
    assert!(matches!(err, RecipeError::MissingPayload(_)));
}

#[test]
fn table_files_resolve_by_selector_or_legacy_name() {
    let dir = tempfile::tempdir().unwrap();
    let legacy = legacy_column_key(PanelPos::new(0, 0), "line", "y");
    std::fs::write(
        dir.path().join("data.csv"),
        format!("r0c0_line_x,{legacy}\n1,4.5\n2,5.5\n3,6.5\n"),
    )
    .unwrap();
    let store = PayloadStore::with_base_dir(dir.path());

    let x = store
        .resolve(&ext("data.csv", "r0c0_line_x", DType::Int64, vec![3]))
        .unwrap();
    assert_eq!(x.to_f64_vec(), vec![1.0, 2.0, 3.0]);
    assert_eq!(x.dtype(), DType::Int64);

    let y = store
        .resolve(&ext("data.csv", "r0c0_line_y", DType::Float64, vec![3]))
        .unwrap();
    assert_eq!(y.to_f64_vec(), vec![4.5, 5.5, 6.5]);

    let err = store
        .resolve(&ext("data.csv", "r0c0_line_z", DType::Float64, vec![3]))
        .unwrap_err();
    assert!(matches!(err, RecipeError::SchemaMismatch(_)));

    let err = store
        .resolve(&ext("gone.csv", "r0c0_line_x", DType::Float64, vec![3]))
        .unwrap_err();
    assert!(matches!(err, RecipeError::MissingPayload(_)));
}

#[test]
fn materialized_payloads_outlive_their_files() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("d.csv"), "c\n1.5\n2.5\n").unwrap();
    let mut store = PayloadStore::with_base_dir(dir.path());
    let r = ext("d.csv", "c", DType::Float64, vec![2]);
    store.materialize([&r]);
    std::fs::remove_file(dir.path().join("d.csv")).unwrap();
    assert!(store.holds("c"));
    assert_eq!(store.resolve(&r).unwrap().to_f64_vec(), vec![1.5, 2.5]);
}

#[test]
fn whole_files_are_adopted_into_memory() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("fig_data")).unwrap();
    std::fs::write(dir.path().join("fig_data/l_x.csv"), "0\n1\n2\n").unwrap();
    let mut store = PayloadStore::with_base_dir(dir.path());
    let mut r = ext("fig_data/l_x.csv", "", DType::Int64, Vec::new());
    assert!(matches!(store.resolve(&r), Err(RecipeError::MissingPayload(_))));

    store.adopt_file(&mut r, PanelPos::new(0, 0), "l", "x", false).unwrap();
    assert!(!r.is_unresolved_file());
    assert_eq!(r.selector, "r0c0_l_x");
    assert_eq!(r.shape, vec![3]);
    assert_eq!(store.resolve(&r).unwrap(), NumArray::from_i64(vec![0, 1, 2]));

    let mut bad = ext("fig_data/l_y.npz", "", DType::Float64, Vec::new());
    let err = store
        .adopt_file(&mut bad, PanelPos::new(0, 0), "l", "y", false)
        .unwrap_err();
    assert!(err.to_string().contains("npz"), "{err}");
}

#[test]
fn merged_tables_drop_padding() {
    let dir = tempfile::tempdir().unwrap();
    let legacy = legacy_column_key(PanelPos::new(0, 1), "b", "height");
    std::fs::write(
        dir.path().join("fig.csv"),
        format!("r0c0_line-1_x,{legacy}\n1.0,4.0\n2.0,5.0\n3.0,\n"),
    )
    .unwrap();
    let mut store = PayloadStore::with_base_dir(dir.path());

    let mut x = ext("fig.csv", "", DType::Float64, Vec::new());
    store.adopt_file(&mut x, PanelPos::new(0, 0), "Line 1", "x", true).unwrap();
    assert_eq!(store.resolve(&x).unwrap().to_f64_vec(), vec![1.0, 2.0, 3.0]);

    let mut h = ext("fig.csv", "", DType::Int64, Vec::new());
    store.adopt_file(&mut h, PanelPos::new(0, 1), "b", "height", true).unwrap();
    assert_eq!(h.shape, vec![2]);
    assert_eq!(store.resolve(&h).unwrap(), NumArray::from_i64(vec![4, 5]));

    let mut missing = ext("fig.csv", "", DType::Float64, Vec::new());
    assert!(store.adopt_file(&mut missing, PanelPos::new(0, 0), "other", "x", true).is_err());
}
