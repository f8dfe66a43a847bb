mod logging;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use takeout_sync_core::report::{render_summary, SummaryLine, Tone};
use takeout_sync_core::{BatchReport, CancellationToken, SyncControl, SyncOptions};

#[derive(Parser)]
#[command(
    name = "takeout-sync",
    version,
    about = "Synchronize photo and video metadata with Google Photos Takeout sidecar files",
    after_help = "Supported formats:\n  Photos: .jpg, .jpeg, .png, .tiff, .tif, .bmp\n  Videos: .mp4, .mov, .avi, .mkv, .webm, .m4v, .3gp"
)]
struct Cli {
    /// Path to the Google Photos Takeout directory
    path: PathBuf,

    /// Show what would be changed without modifying files
    #[arg(long, visible_alias = "preview")]
    dry_run: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Also write log output to this file
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,

    /// Number of worker threads (default: CPU cores * 2, at most 32)
    #[arg(long, value_parser = clap::value_parser!(u16).range(1..))]
    threads: Option<u16>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = logging::configure(cli.verbose, cli.log_file.as_deref()) {
        eprintln!("{}", style(format!("Error: {:#}", e)).red());
        return ExitCode::FAILURE;
    }

    if !cli.path.exists() {
        eprintln!("{}", style(format!("Error: Path does not exist: {}", cli.path.display())).red());
        return ExitCode::FAILURE;
    }
    if !cli.path.is_dir() {
        eprintln!("{}", style(format!("Error: Path is not a directory: {}", cli.path.display())).red());
        return ExitCode::FAILURE;
    }

    match run(&cli) {
        Ok(report) => {
            if report.cancelled {
                println!("\n{}", style("Processing interrupted by user").yellow());
            }
            for line in render_summary(&report) {
                println!("{}", paint(&line));
            }
            if report.cancelled {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            eprintln!("{}", style(format!("Unexpected error: {:#}", e)).red());
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<BatchReport> {
    let token = CancellationToken::new();
    let handler_token = token.clone();
    ctrlc::set_handler(move || {
        // A second interrupt gives up on the in-flight files.
        if handler_token.cancel() {
            std::process::exit(130);
        }
        eprintln!("\nInterrupted, finishing files in progress...");
    })
    .context("Failed to install interrupt handler")?;

    let options = SyncOptions {
        root: cli.path.clone(),
        preview: cli.dry_run,
        workers: cli.threads.map(usize::from),
    };
    if options.preview {
        println!("{}", style("DRY RUN MODE - No files will be modified").yellow());
    }

    // Debug output is line-oriented; a redrawn bar would shred it.
    let pb = if cli.verbose {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(0)
    };
    pb.set_style(ProgressStyle::default_bar().template("[{bar:40}] {pos}/{len} {msg}")?);

    let t_total = Instant::now();
    let control = SyncControl::new().with_cancel_token(token);
    let on_progress = |_stage: &str, done: u64, total: u64, file_name: &str| {
        pb.set_length(total);
        pb.set_position(done + 1);
        pb.set_message(file_name.chars().take(30).collect::<String>());
    };
    let report = takeout_sync_core::sync(&options, &control, &on_progress);
    pb.finish_and_clear();

    let report = report?;
    log::debug!(
        "Done: {} files in {:.2}s",
        report.stats.files_processed,
        t_total.elapsed().as_secs_f64()
    );
    Ok(report)
}

fn paint(line: &SummaryLine) -> console::StyledObject<&str> {
    let text = style(line.text.as_str());
    match line.tone {
        Tone::Plain => text,
        Tone::Heading => text.cyan(),
        Tone::Good => text.green(),
        Tone::Warning => text.yellow(),
        Tone::Bad => text.red(),
    }
}
