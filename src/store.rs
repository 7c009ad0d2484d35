use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::label::{FrameLabel, Value};

pub const CREATED_WITH: &str = "frame_property_labeler";
pub const LABEL_FORMAT_VERSION: &str = "2.0";

/// Property name -> (value as string -> meaning)
pub type ValueMappings = BTreeMap<String, BTreeMap<String, String>>;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default = "default_created_with")]
    pub created_with: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub total_frames: usize,
    #[serde(default)]
    pub properties: Vec<String>,
}

fn default_created_with() -> String {
    CREATED_WITH.to_owned()
}

fn default_version() -> String {
    LABEL_FORMAT_VERSION.to_owned()
}

impl Metadata {
    /// Metadata for a file that carried none (legacy layouts).
    pub fn unstamped() -> Self {
        Self {
            created_with: String::new(),
            version: String::new(),
            ..Self::default()
        }
    }

    /// Whether the file named the tool that wrote it.
    pub fn is_stamped(&self) -> bool {
        !self.created_with.is_empty()
    }
}

impl Default for Metadata {
    fn default() -> Self {
        Self {
            created_with: default_created_with(),
            version: default_version(),
            total_frames: 0,
            properties: Vec::new(),
        }
    }
}

/// In-memory labels for a frame sequence.
///
/// Serializes directly to the structured label file layout:
/// `{ "frames": ..., "mappings": ..., "metadata": ... }`.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct LabelStore {
    pub(crate) frames: BTreeMap<String, BTreeMap<String, FrameLabel>>,
    pub(crate) mappings: ValueMappings,
    pub(crate) metadata: Metadata,
}

impl LabelStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn label(&self, frame: &str, property: &str) -> Option<&FrameLabel> {
        self.frames.get(frame)?.get(property)
    }

    pub fn has_label(&self, frame: &str, property: &str) -> bool {
        self.label(frame, property).is_some_and(|l| !l.is_empty())
    }

    /// Stores `label` for the frame, removing the entry when the label is empty.
    pub fn put_label(&mut self, frame: &str, property: &str, label: FrameLabel) {
        if label.is_empty() {
            self.remove_label(frame, property);
            return;
        }
        self.frames
            .entry(frame.to_owned())
            .or_default()
            .insert(property.to_owned(), label);
    }

    pub fn remove_label(&mut self, frame: &str, property: &str) -> Option<FrameLabel> {
        let properties = self.frames.get_mut(frame)?;
        let removed = properties.remove(property);
        if properties.is_empty() {
            self.frames.remove(frame);
        }
        removed
    }

    /// Drops every label of `property`. Returns how many frames were affected.
    pub fn discard_property(&mut self, property: &str) -> usize {
        let mut removed = 0;
        self.frames.retain(|_, properties| {
            if properties.remove(property).is_some() {
                removed += 1;
            }
            !properties.is_empty()
        });
        removed
    }

    /// Number of frames carrying a label for `property`.
    pub fn frames_with_property(&self, property: &str) -> usize {
        self.frames
            .values()
            .filter(|properties| properties.get(property).is_some_and(|l| !l.is_empty()))
            .count()
    }

    /// Properties actually present in frame labels, sorted.
    pub fn properties(&self) -> BTreeSet<String> {
        self.frames
            .values()
            .flat_map(|properties| properties.keys().cloned())
            .collect()
    }

    pub fn frame_ids(&self) -> impl Iterator<Item = &str> {
        self.frames.keys().map(String::as_str)
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn mappings(&self) -> &ValueMappings {
        &self.mappings
    }

    pub fn meaning(&self, property: &str, value: Value) -> Option<&str> {
        self.mappings
            .get(property)?
            .get(&value.to_string())
            .map(String::as_str)
    }

    pub fn set_meaning(&mut self, property: &str, value: Value, meaning: impl Into<String>) {
        let meaning = meaning.into();
        if meaning.trim().is_empty() {
            if let Some(entry) = self.mappings.get_mut(property) {
                entry.remove(&value.to_string());
                if entry.is_empty() {
                    self.mappings.remove(property);
                }
            }
        } else {
            self.mappings
                .entry(property.to_owned())
                .or_default()
                .insert(value.to_string(), meaning);
        }
    }

    pub fn describe_label(&self, property: &str, label: &FrameLabel) -> String {
        describe_with(self.mappings.get(property), label)
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn set_total_frames(&mut self, total_frames: usize) {
        self.metadata.total_frames = total_frames;
    }

    /// Unions the declared property list with the properties in use so the
    /// declared list never misses one.
    pub fn sync_metadata(&mut self) {
        let mut declared: BTreeSet<String> = self.metadata.properties.drain(..).collect();
        declared.extend(self.properties());
        self.metadata.properties = declared.into_iter().collect();
        self.metadata.created_with = default_created_with();
        self.metadata.version = default_version();
    }
}

/// Renders a label as `[2:walking, 5]`, values without a meaning as the bare
/// number.
pub fn describe_with(meanings: Option<&BTreeMap<String, String>>, label: &FrameLabel) -> String {
    let parts: Vec<String> = label
        .values()
        .map(|value| match meanings.and_then(|m| m.get(&value.to_string())) {
            Some(meaning) => format!("{value}:{meaning}"),
            None => value.to_string(),
        })
        .collect();
    format!("[{}]", parts.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(raw: i64) -> Value {
        Value::new(raw).unwrap()
    }

    #[test]
    fn empty_label_is_not_stored() {
        let mut store = LabelStore::new();
        store.put_label("f1", "motion", FrameLabel::single(v(2)));
        store.put_label("f1", "motion", FrameLabel::default());
        assert!(store.label("f1", "motion").is_none());
        assert_eq!(store.frame_count(), 0);
    }

    #[test]
    fn discard_property_keeps_other_properties() {
        let mut store = LabelStore::new();
        store.put_label("f1", "motion", FrameLabel::single(v(2)));
        store.put_label("f1", "quality", FrameLabel::single(v(7)));
        store.put_label("f2", "motion", FrameLabel::single(v(3)));

        assert_eq!(store.discard_property("motion"), 2);
        assert_eq!(store.frames_with_property("motion"), 0);
        assert!(store.has_label("f1", "quality"));
        assert_eq!(store.frame_count(), 1);
    }

    #[test]
    fn describe_falls_back_to_raw_value() {
        let mut store = LabelStore::new();
        store.set_meaning("motion", v(1), "still");
        let label: FrameLabel = [1, 4].into_iter().map(v).collect();
        assert_eq!(store.describe_label("motion", &label), "[1:still, 4]");
        assert_eq!(store.describe_label("quality", &label), "[1, 4]");

        store.set_meaning("motion", v(1), "  ");
        assert_eq!(store.meaning("motion", v(1)), None);
    }

    #[test]
    fn sync_metadata_never_drops_declared_properties() {
        let mut store = LabelStore::new();
        store.metadata.properties = vec!["person".to_owned()];
        store.put_label("f1", "motion", FrameLabel::single(v(2)));
        store.sync_metadata();
        assert_eq!(store.metadata().properties, vec!["motion", "person"]);
    }
}
