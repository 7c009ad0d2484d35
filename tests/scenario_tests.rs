//! End-to-end labeling sessions over a real frame directory, checked through
//! the coverage analyzer.

use std::fs;
use std::path::Path;
use std::time::Duration;

use frame_labeler::engine::resolve_all;
use frame_labeler::{
    AnalysisReport, AutoSaver, Coverage, ExistingLabels, FrameLabel, FrameSource, Gap, LabelMode,
    LabelStore, Labeler, Session, Value, load_labels,
};

fn v(raw: i64) -> Value {
    Value::new(raw).unwrap()
}

fn frame_dir(names: &[&str]) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    for name in names {
        fs::write(dir.path().join(name), b"").unwrap();
    }
    dir
}

fn open(dir: &Path, property: &str, mode: LabelMode, existing: ExistingLabels) -> Labeler {
    let labels = dir.join("labels.json");
    let mut store = frame_labeler::persist::load_or_default(&labels).unwrap();
    let session = Session::open(&mut store, property, mode, existing);
    let frames = FrameSource::scan(dir).unwrap();
    Labeler::open(frames, store, session, AutoSaver::new(labels, Duration::ZERO)).unwrap()
}

#[test]
fn set_navigate_clear_leaves_trailing_gap() {
    let dir = frame_dir(&["f1.png", "f2.png", "f3.png", "f4.png", "f5.png"]);
    let mut labeler = open(dir.path(), "motion", LabelMode::Exclusive, ExistingLabels::Keep);

    labeler.set(v(2)).unwrap();
    labeler.next().unwrap();
    labeler.next().unwrap();
    labeler.set(v(5)).unwrap();
    labeler.clear().unwrap();
    let store = labeler.close().unwrap();

    let saved = load_labels(dir.path().join("labels.json")).unwrap();
    assert_eq!(saved.label("f1.png", "motion"), store.label("f1.png", "motion"));

    let frames = FrameSource::scan(dir.path()).unwrap();
    let coverage = Coverage::new(&saved, frames.ids(), "motion");
    assert_eq!(coverage.gaps(), vec![Gap { start: 2, end: 4, len: 3 }]);
    assert_eq!(coverage.completeness(), 40.0);

    let timeline = coverage.timeline();
    assert_eq!(timeline.len(), 1);
    assert_eq!((timeline[0].start, timeline[0].end), (0, 1));
    assert_eq!(timeline[0].label, FrameLabel::single(v(2)));
}

#[test]
fn exclusive_reassignment_keeps_single_value() {
    let dir = frame_dir(&["f1.png", "f2.png"]);
    let mut labeler = open(dir.path(), "quality", LabelMode::Exclusive, ExistingLabels::Keep);
    labeler.next().unwrap();
    labeler.set(v(7)).unwrap();
    labeler.set(v(8)).unwrap();
    assert_eq!(
        labeler.store().label("f2.png", "quality"),
        Some(&FrameLabel::single(v(8)))
    );
}

#[test]
fn second_property_session_keeps_first_property() {
    let dir = frame_dir(&["a_1.png", "a_2.png", "a_10.png"]);

    let mut labeler = open(dir.path(), "motion", LabelMode::Exclusive, ExistingLabels::Keep);
    labeler.set(v(1)).unwrap();
    labeler.next().unwrap();
    labeler.next().unwrap();
    assert_eq!(labeler.current_frame(), "a_10.png");
    labeler.close().unwrap();

    let mut labeler = open(dir.path(), "person", LabelMode::Multi, ExistingLabels::Keep);
    labeler.toggle(v(2)).unwrap();
    labeler.toggle(v(3)).unwrap();
    labeler.close().unwrap();

    let store = load_labels(dir.path().join("labels.json")).unwrap();
    assert_eq!(store.frames_with_property("motion"), 3);
    assert_eq!(store.label("a_1.png", "person").map(FrameLabel::len), Some(2));
    assert_eq!(store.metadata().properties, vec!["motion", "person"]);
    assert_eq!(store.metadata().total_frames, 3);

    let report = AnalysisReport::build("labels.json", &store, &FrameSource::scan(dir.path()).unwrap(), None);
    assert_eq!(report.properties.len(), 2);
    assert_eq!(report.properties[0].completeness, 100.0);
}

#[test]
fn replace_discards_previous_labels_of_property() {
    let dir = frame_dir(&["f1.png", "f2.png", "f3.png"]);
    let mut labeler = open(dir.path(), "motion", LabelMode::Exclusive, ExistingLabels::Keep);
    labeler.set(v(4)).unwrap();
    labeler.next().unwrap();
    labeler.close().unwrap();

    let mut labeler = open(dir.path(), "motion", LabelMode::Exclusive, ExistingLabels::Replace);
    assert_eq!(labeler.store().frames_with_property("motion"), 0);
    labeler.seek(2).unwrap();
    labeler.set(v(6)).unwrap();
    labeler.close().unwrap();

    let store = load_labels(dir.path().join("labels.json")).unwrap();
    assert_eq!(store.frames_with_property("motion"), 1);
    assert!(store.has_label("f3.png", "motion"));
}

#[test]
fn clear_and_reset_matches_never_clearing() {
    let frames = FrameSource::from_ids((1..=6).map(|i| format!("f{i}.png")));
    let session = Session::new("motion", LabelMode::Exclusive);
    let edits = [("f1.png", 3), ("f2.png", 3), ("f4.png", 6)];

    let mut plain = LabelStore::new();
    for (frame, raw) in edits {
        plain.apply(&session, &frame_labeler::Edit::set(frame, raw).unwrap());
    }
    let mut cleared = plain.clone();
    cleared.apply(&session, &frame_labeler::Edit::clear("f4.png"));
    cleared.apply(&session, &frame_labeler::Edit::set("f4.png", 6).unwrap());

    assert_eq!(
        resolve_all(&plain, frames.ids(), "motion"),
        resolve_all(&cleared, frames.ids(), "motion")
    );
    let a = Coverage::new(&plain, frames.ids(), "motion");
    let b = Coverage::new(&cleared, frames.ids(), "motion");
    assert_eq!(a.gaps(), b.gaps());
    assert_eq!(a.timeline(), b.timeline());
}
