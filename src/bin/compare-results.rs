use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use frame_labeler::compare::{self, CompareConfig, Comparison, GroundTruth};
use frame_labeler::load_labels;

#[derive(Parser, Debug)]
#[command(
    name = "compare-results",
    version,
    about = "Compare algorithm detection results with ground truth labels"
)]
struct Args {
    /// Ground truth label file
    #[arg(long)]
    gt: PathBuf,

    /// Directory containing per-frame algorithm result files (img_*.json)
    #[arg(long)]
    results: PathBuf,

    /// Configuration file with per-property mappings
    #[arg(long)]
    config: PathBuf,

    /// Property to compare
    #[arg(long)]
    property: String,

    /// Directory to write <property>_comparison.json into
    #[arg(long)]
    output: Option<PathBuf>,
}

fn print_distribution(title: &str, states: &[String]) {
    println!("\n{title} state distribution:");
    for (state, count) in compare::distribution(states) {
        let percentage = count as f64 / states.len() as f64 * 100.0;
        println!("  {state:15}: {count:5} ({percentage:5.1}%)");
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = CompareConfig::load(&args.config)?;
    let property_config = config.property(&args.property)?;

    println!("Loading ground truth from {}...", args.gt.display());
    let store = load_labels(&args.gt)?;
    let gt = GroundTruth::reconstruct(&store, &args.property, property_config)?;
    println!(
        "Found {} key frames with state transitions for {}",
        gt.key_frames.len(),
        args.property
    );
    for (frame, state) in &gt.key_frames {
        println!("  Frame {frame:5}: {state}");
    }
    print_distribution("Ground truth", &gt.states);

    println!("\nLoading algorithm results from {}...", args.results.display());
    let algo = compare::load_algorithm_states(&args.results, property_config)?;
    print_distribution("Algorithm", &algo);

    let (algo, gt_states) = compare::align(algo, gt.states);
    let comparison = Comparison::compute(&args.property, &algo, &gt_states);
    print!("\n{comparison}");

    if let Some(dir) = &args.output {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}_comparison.json", args.property));
        std::fs::write(&path, serde_json::to_string_pretty(&comparison)?)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Saved comparison to {}", path.display());
    }
    Ok(())
}
