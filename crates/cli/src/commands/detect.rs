use std::path::PathBuf;

use anyhow::{bail, Result};
use omnidupe_core::Orchestrator;

use super::report::{self, ReportFormat};

pub struct DetectArgs {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub similarity_threshold: u32,
    pub report_format: ReportFormat,
    pub max_workers: usize,
}

pub fn run(args: DetectArgs) -> Result<()> {
    if !args.input_dir.is_dir() {
        bail!("input directory does not exist: {}", args.input_dir.display());
    }
    std::fs::create_dir_all(&args.output_dir)?;

    let catalog_path = args.output_dir.join("omnidupe.db");
    let mut orchestrator = Orchestrator::open(&catalog_path)?;

    let outcome = orchestrator.detect(
        &args.input_dir,
        args.similarity_threshold,
        args.max_workers,
        Some(&mut |event| {
            if let omnidupe_core::DetectProgress::WalkComplete { candidate_count } = event {
                tracing::info!(candidates = candidate_count, "walk complete");
            }
        }),
    )?;

    println!(
        "Processed {} images: {} timestamp groups, {} hash groups, {} perceptual groups ({} images marked for removal)",
        outcome.images_processed,
        outcome.summary.timestamp_groups,
        outcome.summary.hash_groups,
        outcome.summary.perceptual_groups,
        outcome.summary.images_marked,
    );

    let groups = orchestrator.list_groups()?;
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S").to_string();
    let report_path = report::write_report(&args.output_dir, args.report_format, &groups, &timestamp)?;
    println!("Report written to {}", report_path.display());

    Ok(())
}
