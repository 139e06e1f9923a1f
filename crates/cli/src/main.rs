mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use omnidupe_core::logging::{self, LogFormat};

use commands::detect::DetectArgs;
use commands::protect::ProtectArgs;
use commands::remove::{RemoveArgs, RemoveOutcome};
use commands::report::ReportFormat;

/// OmniDupe — duplicate and near-duplicate image finder
#[derive(Parser)]
#[command(name = "omnidupe", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Walk a directory, fingerprint images, and cluster duplicates
    Detect {
        /// Root directory to scan
        #[arg(long, env = "INPUT_DIR")]
        input_dir: PathBuf,
        /// Directory holding the catalog and reports
        #[arg(long, env = "OUTPUT_DIR")]
        output_dir: PathBuf,
        /// Maximum Hamming distance for perceptual similarity (0-64)
        #[arg(long, default_value_t = 5)]
        similarity_threshold: u32,
        /// Report output format
        #[arg(long, default_value = "text")]
        report_format: String,
        /// Bounded worker pool size for directory listing and extraction
        #[arg(long, default_value_t = 4)]
        max_workers: usize,
        #[arg(long)]
        verbose: bool,
        #[arg(long, default_value = "text")]
        log_format: String,
    },
    /// Delete or relocate files marked for removal
    Remove {
        #[arg(long, env = "OUTPUT_DIR")]
        output_dir: PathBuf,
        /// Report what would happen without touching the filesystem or catalog
        #[arg(long)]
        dry_run: bool,
        /// Move files here instead of deleting them
        #[arg(long)]
        move_to: Option<PathBuf>,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
        #[arg(long)]
        verbose: bool,
        #[arg(long, default_value = "text")]
        log_format: String,
    },
    /// Mark a single cataloged file as protected from removal
    Protect {
        #[arg(long, env = "OUTPUT_DIR")]
        output_dir: PathBuf,
        /// Path to the file to protect
        #[arg(long)]
        file_path: PathBuf,
        #[arg(long)]
        verbose: bool,
        #[arg(long, default_value = "text")]
        log_format: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Commands::Detect {
            input_dir,
            output_dir,
            similarity_threshold,
            report_format,
            max_workers,
            verbose,
            log_format,
        } => {
            init_logging(&log_format, verbose);

            let Some(report_format) = ReportFormat::parse(&report_format) else {
                eprintln!("invalid --report-format: {report_format}");
                return ExitCode::FAILURE;
            };

            let args = DetectArgs {
                input_dir,
                output_dir,
                similarity_threshold,
                report_format,
                max_workers,
            };

            match commands::detect::run(args) {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    eprintln!("error: {e}");
                    ExitCode::FAILURE
                }
            }
        }

        Commands::Remove {
            output_dir,
            dry_run,
            move_to,
            yes,
            verbose,
            log_format,
        } => {
            init_logging(&log_format, verbose);

            let args = RemoveArgs {
                output_dir,
                dry_run,
                move_to,
                yes,
            };

            match commands::remove::run(args) {
                Ok(RemoveOutcome::Completed { .. }) | Ok(RemoveOutcome::Cancelled) => ExitCode::SUCCESS,
                Ok(RemoveOutcome::AbortedNonInteractive) => ExitCode::FAILURE,
                Err(e) => {
                    eprintln!("error: {e}");
                    ExitCode::FAILURE
                }
            }
        }

        Commands::Protect {
            output_dir,
            file_path,
            verbose,
            log_format,
        } => {
            init_logging(&log_format, verbose);

            let args = ProtectArgs { output_dir, file_path };

            match commands::protect::run(args) {
                Ok(true) => ExitCode::SUCCESS,
                Ok(false) => ExitCode::FAILURE,
                Err(e) => {
                    eprintln!("error: {e}");
                    ExitCode::FAILURE
                }
            }
        }
    }
}

fn init_logging(log_format: &str, verbose: bool) {
    let format = LogFormat::parse(log_format).unwrap_or(LogFormat::Text);
    logging::init(format, verbose);
}
