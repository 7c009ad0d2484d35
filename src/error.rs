use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, LabelError>;

#[derive(Error, Debug)]
pub enum LabelError {
    /// The label file could not be parsed or has an unexpected shape
    #[error("Malformed label file {}: {reason}", path.display())]
    Malformed { path: PathBuf, reason: String },

    /// A property value outside of 1-9
    #[error("Value {0} is out of range (expected 1-9)")]
    ValueOutOfRange(i64),

    #[error("Frame not in sequence: {0}")]
    UnknownFrame(String),

    #[error("No image frames found in {}", .0.display())]
    NoFrames(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
