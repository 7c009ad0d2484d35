use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;
use frame_labeler::{AnalysisReport, FrameSource, load_labels};

#[derive(Parser, Debug)]
#[command(
    name = "analyze-labels",
    version,
    about = "Analyze labeling completeness of frame property labels"
)]
struct Args {
    /// Path to the labels.json file
    labels_path: PathBuf,

    /// Directory containing the frame images, so unlabeled frames count.
    /// Defaults to the labels file's directory when it holds images
    #[arg(long)]
    image_dir: Option<PathBuf>,

    /// Write the analysis report as JSON to this file
    #[arg(long)]
    save: Option<PathBuf>,

    /// Don't print the summary (useful when saving only)
    #[arg(long)]
    no_show: bool,

    /// Only analyze this property
    #[arg(long)]
    property: Option<String>,
}

fn detect_image_dir(labels_path: &Path) -> Option<PathBuf> {
    let parent = labels_path.parent()?;
    let parent = if parent.as_os_str().is_empty() {
        Path::new(".")
    } else {
        parent
    };
    FrameSource::has_images(parent).then(|| parent.to_path_buf())
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    if !args.labels_path.exists() {
        bail!("Labels file not found: {}", args.labels_path.display());
    }
    let store = load_labels(&args.labels_path)?;

    let image_dir = match args.image_dir {
        Some(dir) => Some(dir),
        None => {
            let detected = detect_image_dir(&args.labels_path);
            if let Some(dir) = &detected {
                println!("Auto-detected image directory: {}", dir.display());
            }
            detected
        }
    };
    let frames = match image_dir {
        Some(dir) => FrameSource::scan(&dir)?,
        None => FrameSource::from_ids(store.frame_ids()),
    };

    let report = AnalysisReport::build(
        args.labels_path.display().to_string(),
        &store,
        &frames,
        args.property.as_deref(),
    );
    if report.properties.is_empty() {
        println!("No properties found in labels file.");
    }

    if let Some(path) = &args.save {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        println!("Report saved to: {}", path.display());
    }
    if !args.no_show {
        print!("{report}");
    }
    Ok(())
}
