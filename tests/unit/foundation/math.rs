use super::*;

#[test]
fn fnv1a64_matches_reference_vectors() {
    assert_eq!(Fnv1a64::new_default().finish(), Fnv1a64::OFFSET_BASIS);
    let mut h = Fnv1a64::new_default();
    h.write_bytes(b"a");
    assert_eq!(h.finish(), 0xaf63_dc4c_8601_ec8c);
}

#[test]
fn hsv_primaries_and_gray() {
    assert_eq!(hsv_to_rgb(0.0, 1.0, 1.0), [255, 0, 0]);
    assert_eq!(hsv_to_rgb(0.5, 1.0, 1.0), [0, 255, 255]);
    assert_eq!(hsv_to_rgb(1.0, 1.0, 1.0), [255, 0, 0]);
    assert_eq!(hsv_to_rgb(0.2, 0.0, 0.5), [127, 127, 127]);
}

#[test]
fn quantiles_interpolate_linearly() {
    let s = [1.0, 2.0, 3.0, 4.0];
    assert_eq!(quantile_sorted(&s, 0.0), 1.0);
    assert_eq!(quantile_sorted(&s, 0.5), 2.5);
    assert_eq!(quantile_sorted(&s, 1.0), 4.0);
    assert!(quantile_sorted(&[], 0.5).is_nan());
}

#[test]
fn kde_is_symmetric_and_empty_safe() {
    let d = gaussian_kde(&[-1.0, 1.0], &[-0.5, 0.0, 0.5]);
    assert!((d[0] - d[2]).abs() < 1e-12);
    assert!(d.iter().all(|v| *v > 0.0));
    assert_eq!(gaussian_kde(&[], &[0.0, 1.0]), vec![0.0, 0.0]);
}
