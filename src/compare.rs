//! Scores per-frame algorithm detections against labeled ground truth.
//!
//! Ground truth comes from a label file whose labeled frames are treated as
//! key frames: each state holds until the next key frame. Algorithm results
//! are one JSON document per frame (`img_*.json`), with the state found by
//! following a configured key path.

use std::collections::BTreeMap;
use std::fmt::{self, Display};
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result, anyhow, bail};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::frames::natural_cmp;
use crate::store::LabelStore;

pub const UNKNOWN: &str = "unknown";

/// Only this many extraction failures are logged individually.
const REPORTED_ERRORS: usize = 5;

/// Upper bound on a reconstructed ground truth timeline.
pub const MAX_TIMELINE_FRAMES: usize = 10_000_000;

static LAST_DIGITS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\D*$").expect("digit pattern is valid"));

#[derive(Debug, Clone, Deserialize)]
pub struct CompareConfig {
    pub properties: BTreeMap<String, PropertyConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PropertyConfig {
    /// Label value (as string) -> algorithm state name
    pub gt_to_algo_mapping: BTreeMap<String, String>,
    /// Keys into each result document; `"[n]"` indexes an array
    pub algo_extraction_path: Vec<String>,
}

impl CompareConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read comparison config {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse comparison config {}", path.display()))
    }

    pub fn property(&self, name: &str) -> Result<&PropertyConfig> {
        self.properties.get(name).ok_or_else(|| {
            let available: Vec<&str> = self.properties.keys().map(String::as_str).collect();
            anyhow!(
                "Property '{name}' not found in configuration. Available properties: {}",
                available.join(", ")
            )
        })
    }
}

/// Frame number of a frame file name: the part after the last `_` of the
/// stem (`cam_00042.bmp` -> 42), else the last run of digits.
pub fn frame_number(frame_id: &str) -> Option<u64> {
    let stem = Path::new(frame_id)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(frame_id);
    if let Some(number) = stem.rsplit('_').next().and_then(|tail| tail.parse().ok()) {
        return Some(number);
    }
    LAST_DIGITS
        .captures(stem)
        .and_then(|caps| caps[1].parse().ok())
}

#[derive(Debug, Clone, Serialize)]
pub struct GroundTruth {
    pub key_frames: Vec<(u64, String)>,
    pub states: Vec<String>,
}

impl GroundTruth {
    /// Rebuilds a state for every frame from the key frames of `property`.
    ///
    /// The sequence spans `metadata.total_frames`, or up to the last key frame
    /// when the metadata has no count. Frames before the first key frame take
    /// its state. Fails when the timeline would exceed [`MAX_TIMELINE_FRAMES`].
    pub fn reconstruct(store: &LabelStore, property: &str, config: &PropertyConfig) -> Result<Self> {
        let mut key_frames = Vec::new();
        for frame in store.frame_ids() {
            let Some(value) = store.label(frame, property).and_then(|l| l.first()) else {
                continue;
            };
            let Some(number) = frame_number(frame) else {
                log::warn!("Could not extract frame number from {frame}");
                continue;
            };
            let state = config
                .gt_to_algo_mapping
                .get(&value.to_string())
                .cloned()
                .unwrap_or_else(|| UNKNOWN.to_owned());
            key_frames.push((number, state));
        }
        key_frames.sort();

        let total = match store.metadata().total_frames {
            0 => match key_frames.last() {
                Some((last, _)) => usize::try_from(*last)
                    .ok()
                    .and_then(|last| last.checked_add(1))
                    .unwrap_or(usize::MAX),
                None => 0,
            },
            total => total,
        };
        if total > MAX_TIMELINE_FRAMES {
            bail!(
                "Ground truth for {property} would span {total} frames (limit {MAX_TIMELINE_FRAMES}); \
                 set metadata.total_frames or check the frame numbers"
            );
        }

        let mut states = Vec::with_capacity(total);
        let mut next_key = 0;
        let mut current = key_frames
            .first()
            .map_or(UNKNOWN, |(_, state)| state.as_str());
        for index in 0..total as u64 {
            while let Some((number, state)) = key_frames.get(next_key) {
                if *number > index {
                    break;
                }
                current = state.as_str();
                next_key += 1;
            }
            states.push(current.to_owned());
        }

        log::info!(
            "Found {} key frames for {property}, reconstructed {} ground truth states",
            key_frames.len(),
            states.len()
        );
        Ok(Self { key_frames, states })
    }
}

/// Follows `path` into `doc`. Strings are returned as-is, other JSON values in
/// their JSON text form.
pub fn extract(doc: &serde_json::Value, path: &[String]) -> Result<String> {
    let mut value = doc;
    for key in path {
        value = match key.strip_prefix('[').and_then(|k| k.strip_suffix(']')) {
            Some(index) => {
                let index: usize = index
                    .parse()
                    .with_context(|| format!("Invalid array index {key}"))?;
                value
                    .get(index)
                    .ok_or_else(|| anyhow!("Index {index} out of range"))?
            }
            None => value
                .get(key)
                .ok_or_else(|| anyhow!("Missing key '{key}'"))?,
        };
    }
    Ok(match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}

/// Reads the state of every `img_*.json` file in `dir`, in frame order.
/// Files that cannot be read or lack the value count as `unknown`.
pub fn load_algorithm_states(dir: impl AsRef<Path>, config: &PropertyConfig) -> Result<Vec<String>> {
    let dir = dir.as_ref();
    let mut files: Vec<String> = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read results directory {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| name.starts_with("img_") && name.ends_with(".json"))
        .collect();
    files.sort_by(|a, b| natural_cmp(a, b));

    let mut errors = 0;
    let states = files
        .iter()
        .map(|name| {
            let result = std::fs::read_to_string(dir.join(name))
                .map_err(anyhow::Error::from)
                .and_then(|text| Ok(serde_json::from_str::<serde_json::Value>(&text)?))
                .and_then(|doc| extract(&doc, &config.algo_extraction_path));
            result.unwrap_or_else(|e| {
                errors += 1;
                if errors <= REPORTED_ERRORS {
                    log::warn!("Error extracting from {name}: {e:#}");
                }
                UNKNOWN.to_owned()
            })
        })
        .collect::<Vec<_>>();

    if errors > REPORTED_ERRORS {
        log::warn!("... and {} more errors", errors - REPORTED_ERRORS);
    }
    log::info!("Loaded {} algorithm results ({errors} errors)", states.len());
    Ok(states)
}

/// Nearest-index resampling of `states` onto `len` evenly spaced positions.
/// Halfway positions round to the even index.
pub fn resample(states: &[String], len: usize) -> Vec<String> {
    match (states.len(), len) {
        (_, 0) => Vec::new(),
        (0, _) => vec![UNKNOWN.to_owned(); len],
        (_, 1) => vec![states[0].clone()],
        (n, _) => (0..len)
            .map(|i| {
                let position = i as f64 * (n - 1) as f64 / (len - 1) as f64;
                states[(position.round_ties_even() as usize).min(n - 1)].clone()
            })
            .collect(),
    }
}

/// Brings both sequences to the same length: a shorter ground truth is
/// stretched to the algorithm's length, otherwise the algorithm results are
/// resampled to the ground truth's.
pub fn align(algo: Vec<String>, gt: Vec<String>) -> (Vec<String>, Vec<String>) {
    if algo.len() == gt.len() {
        return (algo, gt);
    }
    log::info!(
        "Resampling to match lengths (algo={}, gt={})",
        algo.len(),
        gt.len()
    );
    if gt.len() < algo.len() {
        let gt = resample(&gt, algo.len());
        (algo, gt)
    } else {
        let algo = resample(&algo, gt.len());
        (algo, gt)
    }
}

/// Count per state, sorted by state name.
pub fn distribution(states: &[String]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for state in states {
        *counts.entry(state.clone()).or_insert(0) += 1;
    }
    counts
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Comparison {
    pub property: String,
    pub agreement_rate: f64,
    pub matches: usize,
    pub total: usize,
    /// algorithm state -> ground truth state -> count
    pub confusion: BTreeMap<String, BTreeMap<String, usize>>,
    pub state_metrics: BTreeMap<String, StateMetrics>,
}

impl Comparison {
    /// Compares frame by frame. Extra frames of the longer sequence are ignored.
    pub fn compute(property: &str, algo: &[String], gt: &[String]) -> Self {
        if algo.len() != gt.len() {
            log::warn!(
                "Sequence length mismatch (algo={}, gt={})",
                algo.len(),
                gt.len()
            );
        }
        let total = algo.len().min(gt.len());
        let pairs = || algo.iter().zip(gt.iter());

        let mut confusion: BTreeMap<String, BTreeMap<String, usize>> = BTreeMap::new();
        for state in algo[..total].iter().chain(&gt[..total]) {
            confusion.entry(state.clone()).or_default();
        }
        let states: Vec<String> = confusion.keys().cloned().collect();
        for row in confusion.values_mut() {
            for state in &states {
                row.insert(state.clone(), 0);
            }
        }
        for (a, g) in pairs() {
            if let Some(count) = confusion.get_mut(a).and_then(|row| row.get_mut(g)) {
                *count += 1;
            }
        }

        let matches = pairs().filter(|(a, g)| a == g).count();
        let agreement_rate = percent(matches, total);

        let state_metrics = states
            .iter()
            .map(|state| {
                let tp = confusion[state][state];
                let predicted: usize = confusion[state].values().sum();
                let support: usize = confusion.values().map(|row| row[state]).sum();
                let precision = percent(tp, predicted);
                let recall = percent(tp, support);
                let f1 = if precision + recall > 0.0 {
                    2.0 * precision * recall / (precision + recall)
                } else {
                    0.0
                };
                let metrics = StateMetrics {
                    precision,
                    recall,
                    f1,
                    support,
                };
                (state.clone(), metrics)
            })
            .collect();

        Self {
            property: property.to_owned(),
            agreement_rate,
            matches,
            total,
            confusion,
            state_metrics,
        }
    }

    /// The most frequent (count, algorithm state, ground truth state)
    /// disagreements, largest first.
    pub fn top_confusions(&self, n: usize) -> Vec<(usize, &str, &str)> {
        let mut errors: Vec<(usize, &str, &str)> = self
            .confusion
            .iter()
            .flat_map(|(algo, row)| {
                row.iter()
                    .filter(move |(gt, count)| *gt != algo && **count > 0)
                    .map(move |(gt, count)| (*count, algo.as_str(), gt.as_str()))
            })
            .collect();
        errors.sort_by(|a, b| b.cmp(a));
        errors.truncate(n);
        errors
    }
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

impl Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(70);
        writeln!(f, "{rule}")?;
        writeln!(f, "RESULTS FOR {}", self.property.to_uppercase())?;
        writeln!(f, "{rule}")?;
        writeln!(
            f,
            "\nOverall Agreement: {:.2}% ({}/{})",
            self.agreement_rate, self.matches, self.total
        )?;

        writeln!(f, "\nPer-State Metrics:")?;
        writeln!(
            f,
            "{:<15} {:<12} {:<12} {:<12} {:<10}",
            "State", "Precision", "Recall", "F1", "Support"
        )?;
        writeln!(f, "{}", "-".repeat(65))?;
        for (state, m) in &self.state_metrics {
            writeln!(
                f,
                "{state:<15} {:>10.2}% {:>10.2}% {:>10.2}% {:>10}",
                m.precision, m.recall, m.f1, m.support
            )?;
        }

        writeln!(f, "\nConfusion Matrix (Rows=Algorithm, Columns=Ground Truth):")?;
        write!(f, "{:<15}", "")?;
        for state in self.confusion.keys() {
            write!(f, " {state:>12}")?;
        }
        writeln!(f)?;
        for (algo, row) in &self.confusion {
            write!(f, "{algo:<15}")?;
            for count in row.values() {
                write!(f, " {count:>12}")?;
            }
            writeln!(f)?;
        }

        let errors = self.top_confusions(5);
        if !errors.is_empty() {
            writeln!(f, "\nMost Common Errors:")?;
            for (count, algo, gt) in errors {
                writeln!(f, "  {algo} -> {gt}: {count} times")?;
            }
        }
        Ok(())
    }
}
