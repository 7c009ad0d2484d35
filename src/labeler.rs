use std::path::Path;

use crate::engine::{self, Edit, Session};
use crate::error::{LabelError, Result};
use crate::frames::FrameSource;
use crate::label::{FrameLabel, Value};
use crate::persist::AutoSaver;
use crate::store::LabelStore;

/// One labeling run: a frame sequence, the labels, the active session and the
/// current position. Every mutation goes through the auto-saver.
#[derive(Debug)]
pub struct Labeler {
    store: LabelStore,
    frames: FrameSource,
    session: Session,
    saver: AutoSaver,
    index: usize,
}

impl Labeler {
    pub fn open(
        frames: FrameSource,
        mut store: LabelStore,
        session: Session,
        saver: AutoSaver,
    ) -> Result<Self> {
        if frames.is_empty() {
            let dir = frames.dir().unwrap_or(Path::new(".")).to_path_buf();
            return Err(LabelError::NoFrames(dir));
        }
        store.set_total_frames(frames.len());
        log::info!(
            "Labeling '{}' ({:?}) over {} frames",
            session.property(),
            session.mode(),
            frames.len()
        );
        Ok(Self {
            store,
            frames,
            session,
            saver,
            index: 0,
        })
    }

    pub fn store(&self) -> &LabelStore {
        &self.store
    }

    pub fn frames(&self) -> &FrameSource {
        &self.frames
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn current_frame(&self) -> &str {
        &self.frames.ids()[self.index]
    }

    pub fn is_dirty(&self) -> bool {
        self.saver.is_dirty()
    }

    /// The label shown for the current frame, inherited if it has none.
    pub fn current_label(&self) -> Option<&FrameLabel> {
        engine::resolve(
            &self.store,
            self.frames.ids(),
            self.index,
            self.session.property(),
        )
    }

    /// Whether the current frame carries its own label.
    pub fn current_is_explicit(&self) -> bool {
        self.store
            .has_label(self.current_frame(), self.session.property())
    }

    pub fn describe(&self, label: &FrameLabel) -> String {
        self.store.describe_label(self.session.property(), label)
    }

    /// Moves forward one frame, writing the inherited label into it when it
    /// has none. Returns false at the end of the sequence.
    pub fn next(&mut self) -> Result<bool> {
        if self.index + 1 >= self.frames.len() {
            return Ok(false);
        }
        self.index += 1;
        let written = engine::materialize(
            &mut self.store,
            self.frames.ids(),
            self.index,
            &self.session,
        );
        if written.is_some() {
            self.saver.record(&self.store)?;
        }
        Ok(true)
    }

    /// Moves back one frame without touching any label.
    pub fn prev(&mut self) -> bool {
        if self.index == 0 {
            return false;
        }
        self.index -= 1;
        true
    }

    /// Jumps to `index` without touching any label.
    pub fn seek(&mut self, index: usize) -> Result<()> {
        if index >= self.frames.len() {
            return Err(LabelError::UnknownFrame(format!("index {index}")));
        }
        self.index = index;
        Ok(())
    }

    pub fn set(&mut self, value: Value) -> Result<()> {
        self.edit(Edit::Set {
            frame: self.current_frame().to_owned(),
            value,
        })
    }

    pub fn toggle(&mut self, value: Value) -> Result<()> {
        self.edit(Edit::Toggle {
            frame: self.current_frame().to_owned(),
            value,
        })
    }

    pub fn clear(&mut self) -> Result<()> {
        self.edit(Edit::clear(self.current_frame()))
    }

    /// Applies an edit addressed to any frame of the sequence.
    ///
    /// The edit stays in memory even when the following auto-save fails.
    pub fn edit(&mut self, edit: Edit) -> Result<()> {
        if self.frames.index_of(edit.frame()).is_none() {
            return Err(LabelError::UnknownFrame(edit.frame().to_owned()));
        }
        if self.store.apply(&self.session, &edit) {
            self.saver.record(&self.store)?;
        }
        Ok(())
    }

    pub fn set_meaning(&mut self, value: Value, meaning: &str) -> Result<()> {
        self.store
            .set_meaning(self.session.property(), value, meaning);
        self.saver.record(&self.store)
    }

    pub fn save(&mut self) -> Result<()> {
        self.saver.save(&self.store)?;
        log::info!("Labels saved to {}", self.saver.path().display());
        Ok(())
    }

    /// Final flush before teardown. On failure the labeler is handed back so
    /// the caller can retry.
    pub fn close(mut self) -> std::result::Result<LabelStore, (Self, LabelError)> {
        match self.saver.flush(&self.store) {
            Ok(()) => Ok(self.store),
            Err(e) => Err((self, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::label::LabelMode;
    use crate::persist::load_labels;

    fn v(raw: i64) -> Value {
        Value::new(raw).unwrap()
    }

    fn labeler(dir: &Path, n: usize) -> Labeler {
        let frames = FrameSource::from_ids((1..=n).map(|i| format!("f{i}")));
        let session = Session::new("motion", LabelMode::Exclusive);
        let saver = AutoSaver::new(dir.join("labels.json"), Duration::ZERO);
        Labeler::open(frames, LabelStore::new(), session, saver).unwrap()
    }

    #[test]
    fn empty_frame_source_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let saver = AutoSaver::new(dir.path().join("labels.json"), Duration::ZERO);
        let session = Session::new("motion", LabelMode::Exclusive);
        let result = Labeler::open(FrameSource::default(), LabelStore::new(), session, saver);
        assert!(matches!(result, Err(LabelError::NoFrames(_))));
    }

    #[test]
    fn forward_navigation_materializes_and_autosaves() {
        let dir = tempfile::tempdir().unwrap();
        let mut labeler = labeler(dir.path(), 3);
        labeler.set(v(4)).unwrap();
        assert!(labeler.next().unwrap());

        assert!(labeler.current_is_explicit());
        let saved = load_labels(dir.path().join("labels.json")).unwrap();
        assert_eq!(saved.label("f2", "motion"), Some(&FrameLabel::single(v(4))));
        assert_eq!(saved.metadata().total_frames, 3);
    }

    #[test]
    fn exclusive_session_over_kept_multi_labels_stays_single_valued() {
        let dir = tempfile::tempdir().unwrap();
        let store =
            crate::persist::parse_labels(r#"{ "frames": { "f1": { "motion": [2, 5] } } }"#, "l.json")
                .unwrap();
        let frames = FrameSource::from_ids(["f1", "f2", "f3"]);
        let session = Session::new("motion", LabelMode::Exclusive);
        let saver = AutoSaver::new(dir.path().join("labels.json"), Duration::ZERO);
        let mut labeler = Labeler::open(frames, store, session, saver).unwrap();

        assert!(labeler.next().unwrap());
        assert!(labeler.next().unwrap());
        for frame in ["f2", "f3"] {
            assert_eq!(labeler.store().label(frame, "motion"), Some(&FrameLabel::single(v(2))));
        }
        assert_eq!(labeler.store().label("f1", "motion").map(FrameLabel::len), Some(2));
    }

    #[test]
    fn backward_navigation_does_not_mutate() {
        let dir = tempfile::tempdir().unwrap();
        let mut labeler = labeler(dir.path(), 3);
        labeler.seek(2).unwrap();
        labeler.set(v(6)).unwrap();
        let before = labeler.store().clone();

        assert!(labeler.prev());
        assert!(labeler.prev());
        assert!(!labeler.prev());
        assert_eq!(labeler.store(), &before);
        assert!(labeler.seek(3).is_err());
    }

    #[test]
    fn untouched_frames_display_inherited_label() {
        let dir = tempfile::tempdir().unwrap();
        let mut labeler = labeler(dir.path(), 4);
        labeler.set(v(2)).unwrap();
        labeler.seek(3).unwrap();
        assert!(!labeler.current_is_explicit());
        assert_eq!(labeler.current_label(), Some(&FrameLabel::single(v(2))));
    }

    #[test]
    fn next_stops_at_end() {
        let dir = tempfile::tempdir().unwrap();
        let mut labeler = labeler(dir.path(), 2);
        assert!(labeler.next().unwrap());
        assert!(!labeler.next().unwrap());
        assert_eq!(labeler.current_frame(), "f2");
    }

    #[test]
    fn edit_outside_sequence_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut labeler = labeler(dir.path(), 2);
        let result = labeler.edit(Edit::set("f9", 1).unwrap());
        assert!(matches!(result, Err(LabelError::UnknownFrame(_))));
        assert_eq!(labeler.store().frame_count(), 0);
    }

    #[test]
    fn failed_save_keeps_edit_for_retry() {
        let dir = tempfile::tempdir().unwrap();
        let frames = FrameSource::from_ids(["f1", "f2"]);
        let session = Session::new("motion", LabelMode::Exclusive);
        let target = dir.path().join("later").join("labels.json");
        let saver = AutoSaver::new(&target, Duration::ZERO);
        let mut labeler = Labeler::open(frames, LabelStore::new(), session, saver).unwrap();

        assert!(labeler.set(v(3)).is_err());
        assert!(labeler.store().has_label("f1", "motion"));
        assert!(labeler.is_dirty());

        let labeler = match labeler.close() {
            Ok(_) => panic!("close should fail while the directory is missing"),
            Err((labeler, _)) => labeler,
        };
        std::fs::create_dir_all(target.parent().unwrap()).unwrap();
        let store = labeler.close().unwrap();
        assert_eq!(load_labels(&target).unwrap().label("f1", "motion"), store.label("f1", "motion"));
    }

    #[test]
    fn meanings_are_saved() {
        let dir = tempfile::tempdir().unwrap();
        let mut labeler = labeler(dir.path(), 1);
        labeler.set_meaning(v(1), "still").unwrap();
        labeler.set(v(1)).unwrap();
        assert_eq!(labeler.describe(&FrameLabel::single(v(1))), "[1:still]");
        let saved = load_labels(dir.path().join("labels.json")).unwrap();
        assert_eq!(saved.meaning("motion", v(1)), Some("still"));
    }
}
