/*

Structured label file, the only layout written:

{
  "frames": { "img_0001.png": { "motion": [2], "quality": [7, 8] } },
  "mappings": { "motion": { "1": "still", "2": "walking" } },
  "metadata": {
    "created_with": "frame_property_labeler",
    "version": "2.0",
    "total_frames": 1792,
    "properties": ["motion", "quality"]
  }
}

Legacy flat layouts, read only:

{ "img_0001.png": { "motion": [1, 3] } }
{ "img_0001.png": 4 }

*/

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::Deserialize;
use tempfile::NamedTempFile;

use crate::error::{LabelError, Result};
use crate::label::{FrameLabel, Value};
use crate::store::{LabelStore, Metadata, ValueMappings};

/// Property used for the oldest single-property legacy layout.
pub const DEFAULT_PROPERTY: &str = "default";

/// A label as it may appear on disk: a list of values or a bare value.
#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum RawLabel {
    Many(Vec<Value>),
    One(Value),
}

impl From<RawLabel> for FrameLabel {
    fn from(raw: RawLabel) -> Self {
        match raw {
            RawLabel::Many(values) => values.into_iter().collect(),
            RawLabel::One(value) => FrameLabel::single(value),
        }
    }
}

#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum RawFrame {
    Properties(BTreeMap<String, RawLabel>),
    Single(Value),
}

type RawFrames = BTreeMap<String, RawFrame>;

#[derive(Deserialize, Debug)]
struct StructuredDocument {
    frames: RawFrames,
    #[serde(default)]
    mappings: ValueMappings,
    #[serde(default)]
    metadata: Option<Metadata>,
}

/// The two on-disk shapes, told apart by the presence of a `frames` key.
#[derive(Debug)]
enum LabelDocument {
    Structured(StructuredDocument),
    Legacy(RawFrames),
}

impl LabelDocument {
    fn parse(text: &str, path: &Path) -> Result<Self> {
        let malformed = |reason: String| LabelError::Malformed {
            path: path.to_path_buf(),
            reason,
        };

        let json: serde_json::Value =
            serde_json::from_str(text).map_err(|e| malformed(e.to_string()))?;
        let is_structured = match &json {
            serde_json::Value::Object(map) => map.contains_key("frames"),
            other => {
                return Err(malformed(format!(
                    "expected a JSON object at the top level, found {}",
                    json_kind(other)
                )));
            }
        };

        if is_structured {
            serde_json::from_value(json)
                .map(LabelDocument::Structured)
                .map_err(|e| malformed(format!("structured layout: {e}")))
        } else {
            serde_json::from_value(json)
                .map(LabelDocument::Legacy)
                .map_err(|e| malformed(format!("legacy layout: {e}")))
        }
    }

    fn into_store(self) -> LabelStore {
        let (raw_frames, mappings, metadata) = match self {
            LabelDocument::Structured(doc) => (
                doc.frames,
                doc.mappings,
                doc.metadata.unwrap_or_else(Metadata::unstamped),
            ),
            LabelDocument::Legacy(frames) => (frames, ValueMappings::new(), Metadata::unstamped()),
        };

        let mut store = LabelStore {
            mappings,
            metadata,
            ..LabelStore::default()
        };
        for (frame, raw) in raw_frames {
            match raw {
                RawFrame::Properties(properties) => {
                    for (property, label) in properties {
                        store.put_label(&frame, &property, label.into());
                    }
                }
                RawFrame::Single(value) => {
                    store.put_label(&frame, DEFAULT_PROPERTY, FrameLabel::single(value));
                }
            }
        }

        let declared = &store.metadata.properties;
        let undeclared: Vec<String> = store
            .properties()
            .into_iter()
            .filter(|p| !declared.contains(p))
            .collect();
        if !declared.is_empty() && !undeclared.is_empty() {
            log::warn!("Metadata does not declare properties in use: {undeclared:?}");
        }
        store
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

/// Parses label file contents in either layout.
pub fn parse_labels(text: &str, path: impl AsRef<Path>) -> Result<LabelStore> {
    Ok(LabelDocument::parse(text, path.as_ref())?.into_store())
}

/// Loads a label file. The file is only read, never rewritten.
pub fn load_labels(path: impl AsRef<Path>) -> Result<LabelStore> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;
    let store = parse_labels(&text, path)?;
    log::info!(
        "Loaded labels for {} frames from {}",
        store.frame_count(),
        path.display()
    );
    Ok(store)
}

/// Loads `path` if it exists, otherwise starts an empty store.
pub fn load_or_default(path: impl AsRef<Path>) -> Result<LabelStore> {
    let path = path.as_ref();
    if path.exists() {
        load_labels(path)
    } else {
        log::info!("No label file at {}, starting empty", path.display());
        Ok(LabelStore::new())
    }
}

/// Renders the store in the structured layout.
pub fn to_json(store: &LabelStore) -> Result<String> {
    let mut store = store.clone();
    store.sync_metadata();
    Ok(serde_json::to_string_pretty(&store)?)
}

/// Writes the store in the structured layout.
///
/// The content goes to a temporary file next to `path` which then replaces
/// it, so an interrupted or failed save leaves the previous file intact.
pub fn save_labels(store: &LabelStore, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let json = to_json(store)?;

    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut file = NamedTempFile::new_in(parent)?;
    writeln!(file, "{json}")?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| LabelError::Io(e.error))?;

    log::debug!("Wrote: {}", path.display());
    Ok(())
}

/// Saves after mutations, optionally at most once per debounce window.
///
/// Whatever is pending is always written by [`AutoSaver::flush`].
#[derive(Debug)]
pub struct AutoSaver {
    path: PathBuf,
    debounce: Duration,
    last_saved: Option<Instant>,
    dirty: bool,
}

impl AutoSaver {
    pub fn new(path: impl Into<PathBuf>, debounce: Duration) -> Self {
        Self {
            path: path.into(),
            debounce,
            last_saved: None,
            dirty: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Notes a mutation and saves unless the debounce window is still open.
    pub fn record(&mut self, store: &LabelStore) -> Result<()> {
        self.dirty = true;
        let due = self
            .last_saved
            .is_none_or(|last| last.elapsed() >= self.debounce);
        if due { self.flush(store) } else { Ok(()) }
    }

    /// Writes pending changes. On failure the changes stay pending.
    pub fn flush(&mut self, store: &LabelStore) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        self.save(store)
    }

    /// Unconditional save.
    pub fn save(&mut self, store: &LabelStore) -> Result<()> {
        match save_labels(store, &self.path) {
            Ok(()) => {
                self.dirty = false;
                self.last_saved = Some(Instant::now());
                Ok(())
            }
            Err(e) => {
                self.dirty = true;
                log::error!("Failed to save labels to {}: {e}", self.path.display());
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(raw: i64) -> Value {
        Value::new(raw).unwrap()
    }

    #[test]
    fn parses_structured_layout() {
        let text = r#"{
            "frames": { "a.png": { "motion": [2], "quality": 7 } },
            "mappings": { "motion": { "2": "walking" } },
            "metadata": { "created_with": "x", "version": "1.0", "total_frames": 3, "properties": ["motion"] }
        }"#;
        let store = parse_labels(text, "labels.json").unwrap();
        assert_eq!(store.label("a.png", "motion"), Some(&FrameLabel::single(v(2))));
        assert_eq!(store.label("a.png", "quality"), Some(&FrameLabel::single(v(7))));
        assert_eq!(store.meaning("motion", v(2)), Some("walking"));
        assert_eq!(store.metadata().total_frames, 3);
    }

    #[test]
    fn parses_legacy_layouts() {
        let store = parse_labels(r#"{ "a.png": { "motion": [1, 3] } }"#, "l.json").unwrap();
        assert_eq!(store.label("a.png", "motion").map(FrameLabel::len), Some(2));
        assert!(store.mappings().is_empty());

        let oldest = parse_labels(r#"{ "a.png": 4, "b.png": 5 }"#, "l.json").unwrap();
        assert_eq!(
            oldest.label("b.png", DEFAULT_PROPERTY),
            Some(&FrameLabel::single(v(5)))
        );
    }

    #[test]
    fn empty_value_lists_are_dropped() {
        let store = parse_labels(r#"{ "frames": { "a.png": { "motion": [] } } }"#, "l.json").unwrap();
        assert_eq!(store.frame_count(), 0);
    }

    #[test]
    fn malformed_files_fail_with_path() {
        for text in ["{ not json", "[1, 2]", r#"{ "a.png": "fast" }"#, r#"{ "a.png": 12 }"#] {
            match parse_labels(text, "bad.json") {
                Err(LabelError::Malformed { path, .. }) => assert_eq!(path, Path::new("bad.json")),
                other => panic!("expected malformed error for {text}, got {other:?}"),
            }
        }
    }

    #[test]
    fn saved_json_has_structured_shape() {
        let mut store = parse_labels(r#"{ "a.png": 4 }"#, "l.json").unwrap();
        store.set_total_frames(10);
        let json: serde_json::Value = serde_json::from_str(&to_json(&store).unwrap()).unwrap();
        assert_eq!(json["frames"]["a.png"]["default"], serde_json::json!([4]));
        assert_eq!(json["metadata"]["total_frames"], 10);
        assert_eq!(json["metadata"]["properties"], serde_json::json!(["default"]));
        assert_eq!(json["metadata"]["version"], "2.0");
    }

    #[test]
    fn failed_save_stays_dirty() {
        let dir = tempfile::tempdir().unwrap();
        let mut saver = AutoSaver::new(dir.path().join("missing").join("labels.json"), Duration::ZERO);
        let store = LabelStore::new();
        assert!(saver.record(&store).is_err());
        assert!(saver.is_dirty());
    }

    #[test]
    fn debounced_changes_are_flushed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.json");
        let mut saver = AutoSaver::new(&path, Duration::from_secs(3600));
        let mut store = LabelStore::new();

        saver.record(&store).unwrap();
        assert!(path.exists());

        store.put_label("a.png", "motion", FrameLabel::single(v(3)));
        saver.record(&store).unwrap();
        assert!(saver.is_dirty());
        assert_eq!(load_labels(&path).unwrap().frame_count(), 0);

        saver.flush(&store).unwrap();
        assert!(!saver.is_dirty());
        assert_eq!(load_labels(&path).unwrap(), {
            let mut expected = store.clone();
            expected.sync_metadata();
            expected
        });
    }
}
