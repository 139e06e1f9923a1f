use std::path::PathBuf;

use anyhow::{bail, Result};
use omnidupe_core::Orchestrator;

pub struct ProtectArgs {
    pub output_dir: PathBuf,
    pub file_path: PathBuf,
}

pub fn run(args: ProtectArgs) -> Result<bool> {
    let catalog_path = args.output_dir.join("omnidupe.db");
    if !catalog_path.exists() {
        bail!("no catalog found at {}; run detect first", catalog_path.display());
    }
    let orchestrator = Orchestrator::open(&catalog_path)?;

    let protected = orchestrator.protect(&args.file_path)?;
    if protected {
        println!("Protected: {}", args.file_path.display());
    } else {
        println!("Not found in catalog: {}", args.file_path.display());
    }
    Ok(protected)
}
