use super::*;

#[test]
fn reads_columns_skipping_comments_and_blank_lines() {
    let t = read_table("# dtype: float64\na,b\n1,2\n\n3,4\n").unwrap();
    assert_eq!(t.column_names().collect::<Vec<_>>(), vec!["a", "b"]);
    assert_eq!(t.column("b").unwrap(), &["2".to_owned(), "4".to_owned()]);
}

#[test]
fn short_rows_get_empty_cells() {
    let t = read_table("a,b\n1\n").unwrap();
    assert_eq!(t.column("b").unwrap(), &[String::new()]);
}

#[test]
fn rejects_empty_and_repeated_headers() {
    assert!(read_table("").is_err());
    assert!(read_table("a,a\n1,2\n").is_err());
}

#[test]
fn writes_ragged_columns_padded() {
    let mut t = Table::default();
    t.insert("x".into(), vec!["1".into(), "2".into()]);
    t.insert("y".into(), vec!["3".into()]);
    assert_eq!(write_table(&t), "x,y\n1,3\n2,\n");
}

#[test]
fn cells_convert_per_dtype() {
    let cells: Vec<String> = ["1", "2", "3"].iter().map(|s| s.to_string()).collect();
    let ints = cells_to_array(&cells, DType::Int64, 2, "c").unwrap();
    assert_eq!(ints.data(), &NumData::Int(vec![1, 2]));

    let floats = cells_to_array(&[String::new()], DType::Float64, 1, "c").unwrap();
    assert!(floats.to_f64_vec()[0].is_nan());

    let err = cells_to_array(&cells, DType::Int64, 4, "c").unwrap_err();
    assert!(matches!(err, RecipeError::SchemaMismatch(_)));
    assert!(cells_to_array(&["1.5".to_owned()], DType::Int32, 1, "c").is_err());
}

#[test]
fn float_cells_use_shortest_form() {
    let arr = NumArray::from_f64(vec![0.1, 1.0, -2.5]);
    assert_eq!(array_cells(&arr), vec!["0.1", "1", "-2.5"]);
}

#[test]
fn headerless_files_are_vectors_or_matrices() {
    let v = read_matrix("# dtype: float64\n1\n2.5\n\n3\n", "v.csv").unwrap();
    assert_eq!(v.shape(), &[3]);
    assert_eq!(v.to_f64_vec(), vec![1.0, 2.5, 3.0]);

    let m = read_matrix("1,2,3\n4,5,6\n", "m.csv").unwrap();
    assert_eq!(m.shape(), &[2, 3]);

    assert!(read_matrix("1,2\n3\n", "bad.csv").is_err());
    assert!(read_matrix("1\nx\n", "bad.csv").is_err());
}
