use super::*;

#[test]
fn header_is_padded_to_64_bytes() {
    let bytes = write_npy(&NumArray::from_f64(vec![1.0, 2.0]));
    assert_eq!(&bytes[..6], MAGIC);
    let header_len = usize::from(u16::from_le_bytes([bytes[8], bytes[9]]));
    assert_eq!((10 + header_len) % 64, 0);
    assert_eq!(bytes.len(), 10 + header_len + 16);
}

#[test]
fn reads_back_dtype_and_shape() {
    let m = NumArray::new(DType::Int32, vec![2, 3], NumData::Int(vec![1, -2, 3, -4, 5, -6])).unwrap();
    let back = read_npy(&write_npy(&m)).unwrap();
    assert_eq!(back, m);

    let bytes = NumArray::new(DType::Uint8, vec![3], NumData::Int(vec![0, 128, 255])).unwrap();
    assert_eq!(read_npy(&write_npy(&bytes)).unwrap(), bytes);

    let f = NumArray::new(DType::Float32, vec![2], NumData::Float(vec![0.5, -1.25])).unwrap();
    assert_eq!(read_npy(&write_npy(&f)).unwrap(), f);
}

#[test]
fn rejects_malformed_input() {
    assert!(read_npy(b"not numpy at all").is_err());
    let mut truncated = write_npy(&NumArray::from_f64(vec![1.0, 2.0, 3.0]));
    truncated.truncate(truncated.len() - 4);
    assert!(read_npy(&truncated).is_err());
}
