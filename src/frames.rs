use std::{
    cmp::Ordering,
    fs,
    path::{Path, PathBuf},
    sync::LazyLock,
};

use anyhow::{Context, Result};
use regex::Regex;

pub const SUPPORTED_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "bmp", "tiff", "tif"];

static CHUNKS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+|\D+").expect("chunk pattern is valid"));

pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|supported| ext.eq_ignore_ascii_case(supported))
        })
}

/// Case-insensitive natural ordering: digit runs compare by numeric value,
/// so `frame2` sorts before `frame10`. Equal keys fall back to the raw name.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let a_lower = a.to_lowercase();
    let b_lower = b.to_lowercase();
    let mut a_chunks = CHUNKS.find_iter(&a_lower).map(|m| m.as_str());
    let mut b_chunks = CHUNKS.find_iter(&b_lower).map(|m| m.as_str());

    loop {
        let ordering = match (a_chunks.next(), b_chunks.next()) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => compare_chunk(x, y),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
}

fn compare_chunk(a: &str, b: &str) -> Ordering {
    let a_digits = a.starts_with(|c: char| c.is_ascii_digit());
    let b_digits = b.starts_with(|c: char| c.is_ascii_digit());
    match (a_digits, b_digits) {
        (true, true) => {
            let a_trim = a.trim_start_matches('0');
            let b_trim = b.trim_start_matches('0');
            a_trim
                .len()
                .cmp(&b_trim.len())
                .then_with(|| a_trim.cmp(b_trim))
        }
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.cmp(b),
    }
}

/// The ordered frame sequence a labeling or analysis run works over.
///
/// Index positions in this sequence are the canonical frame indices used by
/// the analyzer.
#[derive(Debug, Clone, Default)]
pub struct FrameSource {
    dir: Option<PathBuf>,
    ids: Vec<String>,
}

impl FrameSource {
    /// Lists the supported image files of `dir` (not recursive).
    /// Anything else is skipped with a warning.
    pub fn scan<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let entries = fs::read_dir(dir)
            .with_context(|| format!("Failed to read frame directory: {}", dir.display()))?;

        let mut ids = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    log::warn!("Skipping unreadable entry in {}: {e}", dir.display());
                    continue;
                }
            };
            let path = entry.path();
            let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
            if !is_file {
                continue;
            }

            if !is_supported_image(&path) {
                if path.extension().is_some_and(|ext| ext == "json") {
                    log::debug!("Ignoring {}", path.display());
                } else {
                    log::warn!("Skipping unsupported file: {}", path.display());
                }
                continue;
            }

            match path.file_name().and_then(|name| name.to_str()) {
                Some(name) => ids.push(name.to_owned()),
                None => log::warn!("Skipping file with non UTF-8 name: {}", path.display()),
            }
        }

        ids.sort_by(|a, b| natural_cmp(a, b));
        log::info!("Found {} frames in {}", ids.len(), dir.display());

        Ok(Self {
            dir: Some(dir.to_path_buf()),
            ids,
        })
    }

    /// A sequence made of known frame IDs, e.g. the frames named in a label file.
    pub fn from_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut ids: Vec<String> = ids.into_iter().map(Into::into).collect();
        ids.sort_by(|a, b| natural_cmp(a, b));
        ids.dedup();
        Self { dir: None, ids }
    }

    /// True when `dir` holds at least one supported image.
    pub fn has_images<P: AsRef<Path>>(dir: P) -> bool {
        fs::read_dir(dir.as_ref())
            .map(|entries| {
                entries
                    .filter_map(|entry| entry.ok())
                    .any(|entry| is_supported_image(&entry.path()))
            })
            .unwrap_or(false)
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.ids.get(index).map(String::as_str)
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.ids.iter().position(|candidate| candidate == id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    pub fn path(&self, index: usize) -> Option<PathBuf> {
        Some(self.dir.as_ref()?.join(self.ids.get(index)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn natural_order_compares_numbers() {
        let mut names = vec!["frame10.png", "Frame2.png", "frame1.png", "frame002.jpg"];
        names.sort_by(|a, b| natural_cmp(a, b));
        assert_eq!(
            names,
            vec!["frame1.png", "frame002.jpg", "Frame2.png", "frame10.png"]
        );
    }

    #[test]
    fn scan_skips_unsupported_files() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["img_10.PNG", "img_9.jpg", "notes.txt", "labels.json", "img_1.tif"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        fs::create_dir(dir.path().join("sub.png")).unwrap();

        let source = FrameSource::scan(dir.path()).unwrap();
        assert_eq!(source.ids(), ["img_1.tif", "img_9.jpg", "img_10.PNG"]);
        assert_eq!(source.index_of("img_10.PNG"), Some(2));
        assert_eq!(source.path(0), Some(dir.path().join("img_1.tif")));
        assert!(FrameSource::has_images(dir.path()));
    }

    #[test]
    fn scan_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(FrameSource::scan(dir.path().join("missing")).is_err());
    }

    #[test]
    fn from_ids_sorts_and_dedups() {
        let source = FrameSource::from_ids(["b_2.png", "b_10.png", "b_2.png", "a.png"]);
        assert_eq!(source.ids(), ["a.png", "b_2.png", "b_10.png"]);
        assert!(source.dir().is_none());
        assert_eq!(source.path(0), None);
    }
}
