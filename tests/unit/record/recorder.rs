use super::*;
use crate::codec::spec::ArgumentSpec;
use crate::render::cpu::CpuEngine;

fn figure(rows: u32, cols: u32) -> RecordingFigure {
    RecordingFigure::new(&CpuEngine, FigureConfig::grid(rows, cols)).unwrap()
}

fn line(fig: &mut RecordingFigure, panel: PanelPos) -> Recorded {
    fig.call(panel, Operation::Plot)
        .arg(vec![0.0, 1.0, 2.0])
        .arg(vec![1.0, 0.0, 1.0])
        .run_recorded()
        .unwrap()
}

const A: PanelPos = PanelPos { row: 0, col: 0 };

#[test]
fn auto_ids_count_per_operation() {
    let mut fig = figure(1, 2);
    assert_eq!(line(&mut fig, A).call_id.as_deref(), Some("plot_000"));
    assert_eq!(
        line(&mut fig, PanelPos::new(0, 1)).call_id.as_deref(),
        Some("plot_001")
    );
    let bar = fig
        .call(A, Operation::Bar)
        .arg(vec![0.0, 1.0])
        .arg(vec![2.0, 3.0])
        .run_recorded()
        .unwrap();
    assert_eq!(bar.call_id.as_deref(), Some("bar_000"));
    assert_eq!(fig.recipe().record_count(), 3);
}

#[test]
fn explicit_ids_are_used_verbatim_and_unique() {
    let mut fig = figure(1, 1);
    let r = fig
        .call(A, Operation::Plot)
        .arg(vec![0.0, 1.0])
        .arg(vec![0.0, 1.0])
        .id("baseline")
        .run_recorded()
        .unwrap();
    assert_eq!(r.call_id.as_deref(), Some("baseline"));

    let dup = fig
        .call(A, Operation::Scatter)
        .arg(vec![0.0])
        .arg(vec![0.0])
        .id("baseline")
        .run();
    assert!(matches!(dup, Err(RecipeError::DuplicateId { .. })));

    let empty = fig
        .call(A, Operation::Plot)
        .arg(vec![0.0])
        .arg(vec![0.0])
        .id("  ")
        .run();
    assert!(matches!(empty, Err(RecipeError::Validation(_))));
    assert_eq!(fig.recipe().record_count(), 1);
}

#[test]
fn auto_ids_skip_explicit_collisions() {
    let mut fig = figure(1, 1);
    fig.call(A, Operation::Plot)
        .arg(vec![0.0, 1.0])
        .arg(vec![0.0, 1.0])
        .id("plot_000")
        .run()
        .unwrap();
    assert_eq!(line(&mut fig, A).call_id.as_deref(), Some("plot_001"));
}

#[test]
fn untracked_calls_draw_without_recording() {
    let mut fig = figure(1, 1);
    let r = fig
        .call(A, Operation::Plot)
        .arg(vec![0.0, 1.0])
        .arg(vec![1.0, 0.0])
        .untracked()
        .run_recorded()
        .unwrap();
    assert_eq!(r.call_id, None);
    assert_eq!(fig.recipe().record_count(), 0);
    assert!(!fig.figure().canvas().handle_parts(r.handle).is_empty());
}

#[test]
fn decorations_are_kept_apart() {
    let mut fig = figure(1, 1);
    line(&mut fig, A);
    fig.call(A, Operation::SetTitle).arg("t").run().unwrap();
    fig.call(A, Operation::SetXlabel).arg("x").run().unwrap();
    let panel = fig.recipe().panel(A).unwrap();
    assert_eq!(panel.calls.len(), 1);
    let ops: Vec<&str> = panel.decorations.iter().map(|r| r.operation.as_str()).collect();
    assert_eq!(ops, vec!["set_title", "set_xlabel"]);
}

#[test]
fn positional_names_follow_the_operation() {
    let mut fig = figure(1, 1);
    let bars = fig
        .call(A, Operation::Bar)
        .arg(vec![0.0, 1.0, 2.0])
        .arg(vec![3.0, 1.0, 2.0])
        .run()
        .unwrap();
    fig.call(A, Operation::BarLabel).arg(bars).run().unwrap();

    let panel = fig.recipe().panel(A).unwrap();
    let names: Vec<&str> = panel.calls[0].args.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, vec!["x", "height"]);
    assert_eq!(
        panel.calls[1].argument("container"),
        Some(&ArgumentSpec::CallRef("bar_000".into()))
    );
}

#[test]
fn failed_calls_leave_nothing_behind() {
    let mut fig = figure(1, 1);
    let x: Vec<f64> = (0..500).map(f64::from).collect();
    let err = fig
        .call(A, Operation::Plot)
        .arg(x.clone())
        .arg(x)
        .kw("bogus", 1.0)
        .run()
        .unwrap_err();
    assert!(err.to_string().contains("bogus"), "{err}");
    assert_eq!(fig.recipe().record_count(), 0);
    assert!(!fig.recipe().payloads.holds("r0c0_plot_000_x"));
}

#[test]
fn failed_calls_do_not_consume_auto_ids() {
    let mut fig = figure(1, 1);
    let failed = fig
        .call(A, Operation::Plot)
        .arg(vec![0.0, 1.0])
        .arg(vec![0.0, 1.0])
        .kw("bogus", 1.0)
        .run();
    assert!(failed.is_err());
    assert_eq!(line(&mut fig, A).call_id.as_deref(), Some("plot_000"));
    assert_eq!(line(&mut fig, A).call_id.as_deref(), Some("plot_001"));
}

#[test]
fn panels_outside_the_grid_are_refused() {
    let mut fig = figure(1, 2);
    let r = fig
        .call(PanelPos::new(1, 0), Operation::Plot)
        .arg(vec![0.0])
        .arg(vec![0.0])
        .run();
    assert!(matches!(r, Err(RecipeError::Validation(_))));
    assert!(fig.set_panel_caption(PanelPos::new(0, 2), "c").is_err());
    fig.set_panel_caption(PanelPos::new(0, 1), "right").unwrap();
    assert_eq!(
        fig.recipe().panel(PanelPos::new(0, 1)).unwrap().caption.as_deref(),
        Some("right")
    );
}

#[test]
fn stats_attach_to_existing_calls() {
    let mut fig = figure(1, 1);
    line(&mut fig, A);
    fig.set_call_stats(A, "plot_000", serde_json::json!({"n": 3}))
        .unwrap();
    assert!(fig.set_call_stats(A, "plot_009", serde_json::json!(1)).is_err());
    let rec = fig.recipe().panel(A).unwrap().record("plot_000").unwrap();
    assert_eq!(rec.stats, Some(serde_json::json!({"n": 3})));
    assert!(rec.timestamp.is_some());
}

#[test]
fn large_arguments_are_externalized() {
    let mut fig = figure(1, 1);
    let x: Vec<f64> = (0..500).map(f64::from).collect();
    fig.call(A, Operation::Plot)
        .arg(x.clone())
        .arg(x)
        .run()
        .unwrap();
    let rec = fig.recipe().panel(A).unwrap().record("plot_000").unwrap();
    assert!(rec.argument("x").and_then(ArgumentSpec::as_external).is_some());
    assert!(fig.recipe().payloads.holds("r0c0_plot_000_y"));
}
