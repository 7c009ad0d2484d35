//! Coverage analysis of one label store against a frame sequence.
//!
//! A frame is *defined* for a property when it carries a non-empty label.
//! Every index of the sequence falls into exactly one gap (a run of undefined
//! frames) or exactly one state segment (a run of defined frames sharing the
//! same label).

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::Serialize;

use crate::engine;
use crate::frames::FrameSource;
use crate::label::{FrameLabel, LabelMode, Value};
use crate::store::{LabelStore, describe_with};

const SEGMENTS_SHOWN: usize = 10;
const GAPS_SHOWN: usize = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Gap {
    pub start: usize,
    /// Inclusive
    pub end: usize,
    pub len: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Segment {
    pub label: FrameLabel,
    pub start: usize,
    /// Inclusive
    pub end: usize,
    pub duration: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum Distribution {
    Exclusive { counts: BTreeMap<Value, usize> },
    Multi { avg_values_per_frame: f64 },
}

/// Per-property view over a frame sequence.
///
/// Two readings of the same labels: the *labeled* view only counts frames
/// carrying their own label, the *state* view carries each label forward
/// until the next labeled frame, as key-frame files are meant to be read.
pub struct Coverage<'a> {
    labels: Vec<Option<&'a FrameLabel>>,
    inherited: Vec<Option<&'a FrameLabel>>,
}

impl<'a> Coverage<'a> {
    pub fn new(store: &'a LabelStore, frames: &[String], property: &str) -> Self {
        let labels = frames
            .iter()
            .map(|frame| store.label(frame, property).filter(|l| !l.is_empty()))
            .collect();
        Self {
            labels,
            inherited: engine::resolve_all(store, frames, property),
        }
    }

    pub fn total_frames(&self) -> usize {
        self.labels.len()
    }

    pub fn defined_count(&self) -> usize {
        self.labels.iter().filter(|l| l.is_some()).count()
    }

    /// Percentage of frames in the sequence with a label, 0 for an empty sequence.
    pub fn completeness(&self) -> f64 {
        percent(self.defined_count(), self.total_frames())
    }

    pub fn gaps(&self) -> Vec<Gap> {
        let mut gaps = Vec::new();
        let mut gap_start = None;

        for (index, label) in self.labels.iter().enumerate() {
            match (label, gap_start) {
                (None, None) => gap_start = Some(index),
                (Some(_), Some(start)) => {
                    gaps.push(gap(start, index - 1));
                    gap_start = None;
                }
                _ => {}
            }
        }
        if let Some(start) = gap_start {
            gaps.push(gap(start, self.labels.len() - 1));
        }
        gaps
    }

    /// Runs of consecutive defined frames with an unchanged label.
    pub fn timeline(&self) -> Vec<Segment> {
        segments(&self.labels)
    }

    /// Frames that have a state, own or inherited.
    pub fn state_covered(&self) -> usize {
        self.inherited.iter().filter(|l| l.is_some()).count()
    }

    pub fn state_completeness(&self) -> f64 {
        percent(self.state_covered(), self.total_frames())
    }

    /// Runs of the carried-forward state. Only frames before the first
    /// labeled frame are left out.
    pub fn state_timeline(&self) -> Vec<Segment> {
        segments(&self.inherited)
    }

    /// Frames before the first labeled frame, where no state is known yet.
    /// The whole sequence when nothing is labeled.
    pub fn undefined_prefix(&self) -> Option<Gap> {
        let first = self
            .inherited
            .iter()
            .position(Option::is_some)
            .unwrap_or(self.inherited.len());
        (first > 0).then(|| gap(0, first - 1))
    }

    /// Multi when any defined frame carries more than one value.
    pub fn inferred_mode(&self) -> LabelMode {
        if self.labels.iter().flatten().any(|l| l.len() > 1) {
            LabelMode::Multi
        } else {
            LabelMode::Exclusive
        }
    }

    pub fn distribution(&self, mode: LabelMode) -> Distribution {
        match mode {
            LabelMode::Exclusive => {
                let mut counts = BTreeMap::new();
                for value in self.labels.iter().flatten().flat_map(|l| l.values()) {
                    *counts.entry(value).or_insert(0) += 1;
                }
                Distribution::Exclusive { counts }
            }
            LabelMode::Multi => {
                let defined = self.defined_count();
                let total_values: usize = self.labels.iter().flatten().map(|l| l.len()).sum();
                let avg_values_per_frame = if defined == 0 {
                    0.0
                } else {
                    total_values as f64 / defined as f64
                };
                Distribution::Multi {
                    avg_values_per_frame,
                }
            }
        }
    }
}

fn segments(labels: &[Option<&FrameLabel>]) -> Vec<Segment> {
    let mut segments: Vec<Segment> = Vec::new();

    for (index, label) in labels.iter().enumerate() {
        let Some(label) = label else {
            continue;
        };
        match segments.last_mut() {
            Some(last) if last.end + 1 == index && last.label == **label => {
                last.end = index;
                last.duration += 1;
            }
            _ => segments.push(Segment {
                label: (*label).clone(),
                start: index,
                end: index,
                duration: 1,
            }),
        }
    }
    segments
}

fn gap(start: usize, end: usize) -> Gap {
    Gap {
        start,
        end,
        len: end - start + 1,
    }
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct PropertyReport {
    pub property: String,
    pub total_frames: usize,
    /// Changes of the carried-forward state
    pub transitions: usize,
    pub state_covered_frames: usize,
    pub state_completeness: f64,
    pub state_timeline: Vec<Segment>,
    pub undefined_prefix: Option<Gap>,
    pub labeled_frames: usize,
    pub completeness: f64,
    pub timeline: Vec<Segment>,
    pub gaps: Vec<Gap>,
    pub distribution: Distribution,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub meanings: BTreeMap<String, String>,
}

impl PropertyReport {
    pub fn build(store: &LabelStore, frames: &[String], property: &str) -> Self {
        let coverage = Coverage::new(store, frames, property);
        let state_timeline = coverage.state_timeline();
        Self {
            property: property.to_owned(),
            total_frames: coverage.total_frames(),
            transitions: state_timeline.len(),
            state_covered_frames: coverage.state_covered(),
            state_completeness: coverage.state_completeness(),
            state_timeline,
            undefined_prefix: coverage.undefined_prefix(),
            labeled_frames: coverage.defined_count(),
            completeness: coverage.completeness(),
            timeline: coverage.timeline(),
            gaps: coverage.gaps(),
            distribution: coverage.distribution(coverage.inferred_mode()),
            meanings: store.mappings().get(property).cloned().unwrap_or_default(),
        }
    }

    fn write_segments(&self, f: &mut fmt::Formatter<'_>, title: &str, segments: &[Segment]) -> fmt::Result {
        if segments.is_empty() {
            return Ok(());
        }
        writeln!(f, "  {title}:")?;
        for segment in segments.iter().take(SEGMENTS_SHOWN) {
            writeln!(
                f,
                "    Frames {}-{} ({} frames): {}",
                segment.start,
                segment.end,
                segment.duration,
                describe_with(Some(&self.meanings), &segment.label)
            )?;
        }
        if segments.len() > SEGMENTS_SHOWN {
            writeln!(f, "    ... and {} more states", segments.len() - SEGMENTS_SHOWN)?;
        }
        Ok(())
    }
}

impl Display for PropertyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Property: {}", self.property)?;
        writeln!(f, "  State transitions: {}", self.transitions)?;
        writeln!(
            f,
            "  State coverage: {}/{} frames ({:.1}%)",
            self.state_covered_frames, self.total_frames, self.state_completeness
        )?;
        writeln!(
            f,
            "  Labeled frames: {}/{} ({:.1}%)",
            self.labeled_frames, self.total_frames, self.completeness
        )?;
        match &self.distribution {
            Distribution::Exclusive { counts } => {
                let counts: Vec<String> = counts
                    .iter()
                    .map(|(value, count)| format!("{value}={count}"))
                    .collect();
                writeln!(f, "  Value counts: {}", counts.join(", "))?;
            }
            Distribution::Multi {
                avg_values_per_frame,
            } => writeln!(f, "  Avg values per frame: {avg_values_per_frame:.1}")?,
        }

        self.write_segments(f, "State timeline", &self.state_timeline)?;
        if let Some(prefix) = &self.undefined_prefix {
            writeln!(
                f,
                "  Undefined before first label: Frames {}-{} ({} frames)",
                prefix.start, prefix.end, prefix.len
            )?;
        }

        self.write_segments(f, "Labeled runs", &self.timeline)?;
        if !self.gaps.is_empty() {
            writeln!(f, "  Unlabeled ranges: {} gaps", self.gaps.len())?;
            for gap in self.gaps.iter().take(GAPS_SHOWN) {
                writeln!(f, "    Frames {}-{} ({} frames)", gap.start, gap.end, gap.len)?;
            }
            if self.gaps.len() > GAPS_SHOWN {
                writeln!(f, "    ... and {} more gaps", self.gaps.len() - GAPS_SHOWN)?;
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct AnalysisReport {
    pub source: String,
    pub total_frames: usize,
    /// Absent for files without metadata
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_with: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub properties: Vec<PropertyReport>,
}

impl AnalysisReport {
    /// Reports every property present in the store's labels, or only `only`.
    pub fn build(
        source: impl Into<String>,
        store: &LabelStore,
        frames: &FrameSource,
        only: Option<&str>,
    ) -> Self {
        let properties = store
            .properties()
            .into_iter()
            .filter(|p| only.is_none_or(|only| only == p))
            .map(|p| PropertyReport::build(store, frames.ids(), &p))
            .collect();
        let metadata = store.metadata();
        let (created_with, version) = if metadata.is_stamped() {
            let version = match metadata.version.as_str() {
                "" => "unknown".to_owned(),
                version => version.to_owned(),
            };
            (Some(metadata.created_with.clone()), Some(version))
        } else {
            (None, None)
        };
        Self {
            source: source.into(),
            total_frames: frames.len(),
            created_with,
            version,
            properties,
        }
    }
}

impl Display for AnalysisReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(60);
        writeln!(f, "{rule}")?;
        writeln!(f, "LABEL ANALYSIS SUMMARY")?;
        writeln!(f, "{rule}")?;
        writeln!(f, "Labels file: {}", self.source)?;
        if let (Some(created_with), Some(version)) = (&self.created_with, &self.version) {
            writeln!(f, "File info: {created_with} v{version}")?;
        }
        writeln!(f, "Total frames in sequence: {}", self.total_frames)?;
        writeln!(f, "Properties found: {}", self.properties.len())?;

        for report in &self.properties {
            if !report.meanings.is_empty() {
                writeln!(f)?;
                writeln!(f, "Value meanings for {}:", report.property)?;
                for (value, meaning) in &report.meanings {
                    writeln!(f, "  {value}: {meaning}")?;
                }
            }
        }
        for report in &self.properties {
            writeln!(f)?;
            write!(f, "{report}")?;
        }
        Ok(())
    }
}
