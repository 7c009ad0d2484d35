//! State propagation: how a property's label carries forward from frame to
//! frame, and how edits change it.
//!
//! Inherited labels are materialized on forward navigation ([`materialize`]).
//! Frames that were never visited keep no entry and are displayed through the
//! read-time lookup [`resolve`], so changing an early frame changes what
//! untouched later frames appear to inherit without rewriting stored labels.

use serde::{Deserialize, Serialize};

use crate::label::{FrameLabel, LabelMode, Value};
use crate::store::LabelStore;

/// What to do with labels already stored for the property being opened.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExistingLabels {
    /// Edits layer onto the existing labels
    Keep,
    /// Existing labels of the property are discarded before editing
    Replace,
}

/// The property and labeling discipline that edits address.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    property: String,
    mode: LabelMode,
}

impl Session {
    pub fn new(property: impl Into<String>, mode: LabelMode) -> Self {
        Self {
            property: property.into(),
            mode,
        }
    }

    /// Starts a session on `property`, applying the caller's choice for
    /// labels that already exist.
    pub fn open(
        store: &mut LabelStore,
        property: impl Into<String>,
        mode: LabelMode,
        existing: ExistingLabels,
    ) -> Self {
        let session = Self::new(property, mode);
        if existing == ExistingLabels::Replace {
            let removed = store.discard_property(&session.property);
            log::info!(
                "Discarded {removed} existing labels for property '{}'",
                session.property
            );
        }
        session
    }

    pub fn property(&self) -> &str {
        &self.property
    }

    pub fn mode(&self) -> LabelMode {
        self.mode
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Edit {
    /// Replace the frame's label with exactly this value
    Set { frame: String, value: Value },
    /// Add/remove in multi mode; set or clear in exclusive mode
    Toggle { frame: String, value: Value },
    /// Remove the frame's label entry
    Clear { frame: String },
}

impl Edit {
    pub fn set(frame: impl Into<String>, raw: i64) -> crate::error::Result<Self> {
        Ok(Edit::Set {
            frame: frame.into(),
            value: Value::new(raw)?,
        })
    }

    pub fn toggle(frame: impl Into<String>, raw: i64) -> crate::error::Result<Self> {
        Ok(Edit::Toggle {
            frame: frame.into(),
            value: Value::new(raw)?,
        })
    }

    pub fn clear(frame: impl Into<String>) -> Self {
        Edit::Clear {
            frame: frame.into(),
        }
    }

    pub fn frame(&self) -> &str {
        match self {
            Edit::Set { frame, .. } | Edit::Toggle { frame, .. } | Edit::Clear { frame } => frame,
        }
    }
}

/// Applies `edit` and returns the updated store.
pub fn apply(mut store: LabelStore, session: &Session, edit: &Edit) -> LabelStore {
    store.apply(session, edit);
    store
}

impl LabelStore {
    /// Applies `edit` in place. Returns whether the store changed.
    pub fn apply(&mut self, session: &Session, edit: &Edit) -> bool {
        let property = session.property();
        let before = self.label(edit.frame(), property).cloned();

        match edit {
            Edit::Set { frame, value } => {
                self.put_label(frame, property, FrameLabel::single(*value));
            }
            Edit::Clear { frame } => {
                self.remove_label(frame, property);
            }
            Edit::Toggle { frame, value } => {
                let mut label = before.clone().unwrap_or_default();
                match session.mode() {
                    LabelMode::Multi => {
                        if !label.remove(*value) {
                            label.insert(*value);
                        }
                    }
                    LabelMode::Exclusive => {
                        label = if label.contains(*value) {
                            FrameLabel::default()
                        } else {
                            FrameLabel::single(*value)
                        };
                    }
                }
                self.put_label(frame, property, label);
            }
        }

        let after = self.label(edit.frame(), property);
        let changed = before.as_ref() != after;
        if changed {
            log::debug!("{edit:?} on '{property}': {before:?} -> {after:?}");
        }
        changed
    }
}

/// The label shown for `frames[index]`: its own label, or the label of the
/// nearest preceding frame that has one.
pub fn resolve<'a>(
    store: &'a LabelStore,
    frames: &[String],
    index: usize,
    property: &str,
) -> Option<&'a FrameLabel> {
    let end = index.checked_add(1)?.min(frames.len());
    frames[..end]
        .iter()
        .rev()
        .find_map(|frame| store.label(frame, property).filter(|l| !l.is_empty()))
}

/// Read-time inherited label for every index of `frames`.
pub fn resolve_all<'a>(
    store: &'a LabelStore,
    frames: &[String],
    property: &str,
) -> Vec<Option<&'a FrameLabel>> {
    let mut current = None;
    frames
        .iter()
        .map(|frame| {
            if let Some(label) = store.label(frame, property).filter(|l| !l.is_empty()) {
                current = Some(label);
            }
            current
        })
        .collect()
}

/// Writes the inherited label into `frames[index]` when it has none.
/// Returns the label written, if any.
///
/// Exclusive sessions only ever write one value: a multi-value label kept
/// from an earlier session is reduced to its lowest value.
pub fn materialize(
    store: &mut LabelStore,
    frames: &[String],
    index: usize,
    session: &Session,
) -> Option<FrameLabel> {
    let property = session.property();
    let frame = frames.get(index)?;
    if store.has_label(frame, property) {
        return None;
    }
    let inherited = resolve(store, frames, index, property)?;
    let inherited = match session.mode() {
        LabelMode::Exclusive => FrameLabel::single(inherited.first()?),
        LabelMode::Multi => inherited.clone(),
    };
    store.put_label(frame, property, inherited.clone());
    Some(inherited)
}
