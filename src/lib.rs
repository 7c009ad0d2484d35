//! Frame property labeling: a label store, state propagation, coverage
//! analysis and ground truth comparison. The label file layouts are
//! described in [`persist`].

pub mod analysis;
pub mod compare;
pub mod config;
pub mod engine;
pub mod error;
pub mod frames;
pub mod label;
pub mod labeler;
pub mod persist;
pub mod playback;
pub mod store;

pub use analysis::{AnalysisReport, Coverage, Gap, PropertyReport, Segment};
pub use engine::{Edit, ExistingLabels, Session, apply};
pub use error::{LabelError, Result};
pub use frames::FrameSource;
pub use label::{FrameLabel, LabelMode, Value};
pub use labeler::Labeler;
pub use persist::{AutoSaver, load_labels, save_labels};
pub use store::LabelStore;
