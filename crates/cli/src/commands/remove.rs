use std::io::{self, Write as _};
use std::path::PathBuf;

use anyhow::{bail, Result};
use omnidupe_core::actuator::{ActuatorConfig, Disposition};
use omnidupe_core::Orchestrator;

pub struct RemoveArgs {
    pub output_dir: PathBuf,
    pub dry_run: bool,
    pub move_to: Option<PathBuf>,
    pub yes: bool,
}

/// What the `remove` subcommand decided to do, so `main` can map it to the
/// right exit code without re-deciding policy itself.
pub enum RemoveOutcome {
    Completed { succeeded: usize, failed: usize },
    Cancelled,
    AbortedNonInteractive,
}

pub fn run(args: RemoveArgs) -> Result<RemoveOutcome> {
    let catalog_path = args.output_dir.join("omnidupe.db");
    if !catalog_path.exists() {
        bail!("no catalog found at {}; run detect first", catalog_path.display());
    }
    let orchestrator = Orchestrator::open(&catalog_path)?;

    let pending = orchestrator.images_for_removal()?;
    if pending.is_empty() {
        println!("Nothing marked for removal.");
        return Ok(RemoveOutcome::Completed {
            succeeded: 0,
            failed: 0,
        });
    }

    print_summary(&pending);

    if !args.dry_run {
        if !args.yes {
            if !atty::is(atty::Stream::Stdin) {
                eprintln!("Refusing to remove files non-interactively without --yes.");
                return Ok(RemoveOutcome::AbortedNonInteractive);
            }
            print!("Proceed? (y/N) ");
            io::stdout().flush()?;
            let mut answer = String::new();
            io::stdin().read_line(&mut answer)?;
            if !matches!(answer.trim(), "y" | "Y") {
                println!("Cancelled.");
                return Ok(RemoveOutcome::Cancelled);
            }
        }
    }

    let disposition = match &args.move_to {
        Some(dest) => Disposition::Move(dest.clone()),
        None => Disposition::Delete,
    };
    let config = ActuatorConfig {
        disposition,
        dry_run: args.dry_run,
    };

    let summary = orchestrator.remove(&config)?;
    println!(
        "{}{} succeeded, {} failed",
        if args.dry_run { "[dry-run] " } else { "" },
        summary.succeeded,
        summary.failed
    );

    Ok(RemoveOutcome::Completed {
        succeeded: summary.succeeded,
        failed: summary.failed,
    })
}

fn print_summary(pending: &[omnidupe_core::domain::ImageRecord]) {
    let total_bytes: u64 = pending.iter().map(|i| i.file_size).sum();
    let total_mb = total_bytes as f64 / (1024.0 * 1024.0);
    println!("{} file(s) marked for removal ({:.1} MB total)", pending.len(), total_mb);
    for image in pending.iter().take(5) {
        println!(
            "  {} ({})",
            image.file_path.display(),
            image.removal_reason.as_deref().unwrap_or("unknown")
        );
    }
    if pending.len() > 5 {
        println!("  ... and {} more", pending.len() - 5);
    }
}
