use super::*;
use crate::foundation::core::PanelPos;
use crate::recipe::model::{CropMode, FigureConfig};
use crate::recipe::ops::Operation;
use crate::record::recorder::RecordingFigure;
use crate::render::cpu::CpuEngine;

const A: PanelPos = PanelPos { row: 0, col: 0 };

fn chart(config: FigureConfig) -> RecordingFigure {
    let mut fig = RecordingFigure::new(&CpuEngine, config).unwrap();
    fig.call(A, Operation::Bar)
        .arg(vec![0.0, 1.0])
        .arg(vec![2.0, 6.0])
        .run()
        .unwrap();
    let x: Vec<f64> = (0..250).map(|i| f64::from(i) / 125.0).collect();
    let y: Vec<f64> = x.iter().map(|v| 3.0 + v.sin()).collect();
    fig.call(A, Operation::Plot).arg(x).arg(y).run().unwrap();
    fig
}

#[test]
fn points_flip_to_top_left_origin() {
    let full = Rect::new(0.0, 0.0, 8.0, 4.0);
    let tf = PixelTransform::new(100.0, full, RasterSize::new(800, 400).unwrap());
    assert_eq!(tf.map_point(Point::new(100.0, 100.0)), Point::new(100.0, 300.0));

    let half = PixelTransform::new(100.0, full, RasterSize::new(400, 200).unwrap());
    assert_eq!(half.map_point(Point::new(100.0, 100.0)), Point::new(50.0, 150.0));
}

#[test]
fn points_are_clamped_to_the_raster() {
    let tf = PixelTransform::new(100.0, Rect::new(0.0, 0.0, 8.0, 4.0), RasterSize::new(800, 400).unwrap());
    assert_eq!(tf.map_point(Point::new(-50.0, 900.0)), Point::new(0.0, 0.0));
    assert_eq!(tf.map_point(Point::new(1e4, -1e4)), Point::new(800.0, 400.0));
    assert_eq!(tf.map_rect(Rect::new(-30.0, -30.0, -10.0, -10.0)), None);
    let r = tf.map_rect(Rect::new(100.0, 100.0, 200.0, 150.0)).unwrap();
    assert_eq!((r.x0, r.y0, r.x1, r.y1), (100.0, 250.0, 200.0, 300.0));
}

#[test]
fn tight_crop_shifts_the_origin() {
    let tight = Rect::new(1.0, 1.0, 3.0, 2.0);
    let tf = PixelTransform::new(100.0, tight, RasterSize::new(200, 100).unwrap());
    assert_eq!(tf.map_point(Point::new(100.0, 100.0)), Point::new(0.0, 100.0));
    assert_eq!(tf.map_point(Point::new(300.0, 200.0)), Point::new(200.0, 0.0));
}

#[test]
fn downsampling_keeps_the_ends() {
    let pts: Vec<Point> = (0..250).map(|i| Point::new(f64::from(i), 0.0)).collect();
    let out = downsample(&pts, MAX_PATH_POINTS);
    assert!(out.len() <= MAX_PATH_POINTS);
    assert!(out.len() > MAX_PATH_POINTS / 2);
    assert_eq!(out.first(), pts.first());
    assert_eq!(out.last(), pts.last());
    assert_eq!(downsample(&pts[..10], MAX_PATH_POINTS).len(), 10);
}

#[test]
fn bbox_keys_match_identity_keys() {
    let mut fig = chart(FigureConfig::default());
    let size = fig.figure().canvas().native_size();
    let boxes = bbox_map(fig.figure(), size);
    let (map, _) = crate::identity::hitmap::assign_identities(
        fig.figure_mut(),
        size,
        &crate::identity::hitmap::HitmapOpts::default(),
    )
    .unwrap();
    for r in map.iter() {
        assert!(boxes.contains_key(&r.key), "{} has no box", r.key);
    }
    assert_eq!(boxes.len(), map.len());
}

#[test]
fn boxes_follow_the_data() {
    let fig = chart(FigureConfig::default());
    let size = fig.figure().canvas().native_size();
    let boxes = bbox_map(fig.figure(), size);

    let short = &boxes["ax0_bar0_layer0"];
    let tall = &boxes["ax0_bar0_layer1"];
    assert_eq!(short.element_type, ElementKind::Patch);
    assert_eq!(short.call_id.as_deref(), Some("bar_000"));
    assert!(tall.y < short.y);
    assert!(tall.height > short.height);
    assert!(short.points.is_none());

    let line = &boxes["ax0_plot0"];
    let pts = line.points.as_ref().unwrap();
    assert!(pts.len() <= MAX_PATH_POINTS && pts.len() > 2);
    for [x, y] in pts {
        assert!(*x >= line.x - 1e-9 && *x <= line.x + line.width + 1e-9);
        assert!(*y >= line.y - 1e-9 && *y <= line.y + line.height + 1e-9);
    }
}

#[test]
fn boxes_stay_inside_cropped_rasters() {
    let mut config = FigureConfig::default();
    config.crop = CropMode::Tight;
    let fig = chart(config);
    let size = fig.figure().canvas().native_size();
    assert!(size.width < 640);
    for (key, b) in bbox_map(fig.figure(), size) {
        assert!(b.x >= 0.0 && b.y >= 0.0, "{key}");
        assert!(b.x + b.width <= f64::from(size.width) + 1e-9, "{key}");
        assert!(b.y + b.height <= f64::from(size.height) + 1e-9, "{key}");
    }
}

#[test]
fn unknown_elements_have_no_box() {
    let fig = chart(FigureConfig::default());
    let size = fig.figure().canvas().native_size();
    assert!(map_to_pixel_space(fig.figure().canvas(), ElementId(9999), size).is_none());
}

#[test]
fn non_finite_path_points_are_dropped() {
    let tf = PixelTransform::new(100.0, Rect::new(0.0, 0.0, 8.0, 4.0), RasterSize::new(800, 400).unwrap());
    let mut pts: Vec<Point> = (0..300).map(|i| Point::new(f64::from(i), 100.0)).collect();
    pts[10] = Point::new(f64::NAN, 100.0);
    pts[299] = Point::new(299.0, f64::INFINITY);
    let out = pixel_path(&tf, &pts);
    assert!(!out.is_empty() && out.len() <= MAX_PATH_POINTS);
    assert!(out.iter().flatten().all(|v| v.is_finite()));
    assert_eq!(out.last(), Some(&[298.0, 300.0]));
}

#[test]
fn full_canvas_rect_maps_to_the_whole_raster() {
    let tf = PixelTransform::new(100.0, Rect::new(0.0, 0.0, 8.0, 4.0), RasterSize::new(800, 400).unwrap());
    let r = tf.map_rect(Rect::new(0.0, 0.0, 800.0, 400.0)).unwrap();
    assert_eq!((r.x0, r.y0, r.x1, r.y1), (0.0, 0.0, 800.0, 400.0));
}

#[test]
fn elements_past_every_edge_cover_the_raster() {
    let mut fig = RecordingFigure::new(&CpuEngine, FigureConfig::default()).unwrap();
    fig.call(A, Operation::FillBetween)
        .arg(vec![-1000.0, 1000.0])
        .arg(vec![-1000.0, -1000.0])
        .arg(vec![1000.0, 1000.0])
        .run()
        .unwrap();
    fig.call(A, Operation::SetXlim).arg(0.0).arg(1.0).run().unwrap();
    fig.call(A, Operation::SetYlim).arg(0.0).arg(1.0).run().unwrap();
    let size = fig.figure().canvas().native_size();
    let boxes = bbox_map(fig.figure(), size);
    let fill = boxes
        .values()
        .find(|b| b.call_id.as_deref() == Some("fill_between_000"))
        .unwrap();
    assert_eq!(
        (fill.x, fill.y, fill.width, fill.height),
        (0.0, 0.0, f64::from(size.width), f64::from(size.height))
    );
}
