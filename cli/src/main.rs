//! copyjob - Command-line interface for the copy job engine.
//!
//! Copies files and folders into a destination folder with progress on
//! stderr. Collisions and errors can be answered interactively on stdin.

use clap::Parser;
use copyjob::{
    ChecksumAlgorithm, CollisionAction, CollisionChoice, CollisionContext, CollisionDecision,
    CollisionKind, CopyJob, CopyOptions, DecisionProvider, DeleteSource, EntryOutcome, EntryRecord,
    ErrorContext, ErrorDecision, FileSet, FixedDecisions, JobHandle, JobReport, JobState, Mode,
    ProgressCallback,
};
use parking_lot::Mutex;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// copyjob - Recursive copy into a destination folder
#[derive(Parser, Debug)]
#[command(name = "copyjob")]
#[command(version = "0.1.0")]
#[command(about = "Copy files and folders into a destination folder with progress tracking")]
struct Args {
    /// Files and folders to copy
    #[arg(value_name = "SRC", required = true)]
    sources: Vec<PathBuf>,

    /// Destination folder (must exist)
    #[arg(long, value_name = "DIR")]
    dst: PathBuf,

    /// New name for the single source
    #[arg(long, value_name = "NAME")]
    rename: Option<String>,

    /// Operation mode: copy or download
    #[arg(long, value_name = "MODE", default_value = "copy")]
    mode: String,

    /// What to do with existing destinations: ask, overwrite, overwrite-older, skip, or rename
    #[arg(long, value_name = "ACTION", default_value = "ask")]
    on_collision: String,

    /// Append to existing destination files instead of truncating them
    #[arg(long)]
    append: bool,

    /// Delete sources once they were copied
    #[arg(long = "move")]
    move_sources: bool,

    /// Enable verification after copy (compares checksums)
    #[arg(long)]
    verify: bool,

    /// Checksum algorithm for verification: crc32, md5, sha256, blake3
    #[arg(long, value_name = "ALGORITHM", default_value = "sha256", requires = "verify")]
    hash: String,

    /// JSON file with engine options
    #[arg(long, value_name = "FILE")]
    options: Option<PathBuf>,

    /// Print the job report as JSON on stdout
    #[arg(long)]
    report_json: bool,

    /// Enable verbose output
    #[arg(long)]
    verbose: bool,
}

/// CLI implementation of ProgressCallback for displaying transfer progress
struct CliProgress {
    verbose: bool,
    start_time: Instant,
    last_progress_update: Mutex<Instant>,
}

impl CliProgress {
    fn new(verbose: bool) -> Self {
        let now = Instant::now();
        CliProgress {
            verbose,
            start_time: now,
            last_progress_update: Mutex::new(now),
        }
    }

    fn format_bytes(bytes: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = bytes as f64;
        let mut unit_idx = 0;

        while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
            size /= 1024.0;
            unit_idx += 1;
        }

        format!("{:.2} {}", size, UNITS[unit_idx])
    }

    fn format_duration(elapsed: Duration) -> String {
        let secs = elapsed.as_secs();
        let hours = secs / 3600;
        let mins = (secs % 3600) / 60;
        let secs = secs % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, mins, secs)
        } else if mins > 0 {
            format!("{}m {}s", mins, secs)
        } else {
            format!("{}s", secs)
        }
    }

    fn print_progress_bar(percent: u32) -> String {
        let percent = percent.min(100);
        let filled = (percent / 5) as usize;
        let empty = 20 - filled;
        format!("[{}{}] {}%", "=".repeat(filled), " ".repeat(empty), percent)
    }

    fn print_progress(&self, job: &JobHandle) {
        let percent = (job.total_percent_done() * 100.0) as u32;
        eprint!(
            "\r{} | {} | {}\x1b[K",
            Self::print_progress_bar(percent),
            Self::format_bytes(job.bytes_transferred()),
            job.status_string()
        );
        let _ = std::io::stderr().flush();
    }

    fn entry_name(record: &EntryRecord) -> String {
        record
            .source_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| record.source_path.display().to_string())
    }
}

impl ProgressCallback for CliProgress {
    fn on_job_started(&self, job: &JobHandle) {
        eprintln!("{} {} ({})", job.mode().verb(), job.id(), job.mode());
    }

    fn on_entry_started(&self, job: &JobHandle, _source: &std::path::Path) {
        self.print_progress(job);
    }

    fn on_bytes(&self, job: &JobHandle, _bytes: u64) {
        // Throttle progress updates to avoid spam (max once per 200ms)
        let mut last = self.last_progress_update.lock();
        if last.elapsed() < Duration::from_millis(200) {
            return;
        }
        *last = Instant::now();
        drop(last);
        self.print_progress(job);
    }

    fn on_entry_completed(&self, _job: &JobHandle, record: &EntryRecord) {
        if self.verbose {
            let status = match record.outcome {
                EntryOutcome::Done => "Done",
                EntryOutcome::Skipped => "Skipped",
                EntryOutcome::Failed => "Failed",
                EntryOutcome::Interrupted => "Interrupted",
            };
            eprintln!("\r{}: {}\x1b[K", status, record.source_path.display());
        }
    }

    fn on_job_completed(&self, job: &JobHandle, report: &JobReport) {
        self.print_progress(job);
        eprintln!();
        match report.state {
            JobState::Interrupted => eprintln!("Transfer cancelled."),
            _ => eprintln!("Transfer complete!"),
        }

        eprintln!(
            "Summary: {} done, {} skipped, {} failed",
            report.count(EntryOutcome::Done),
            report.count(EntryOutcome::Skipped),
            report.count(EntryOutcome::Failed)
        );
        eprintln!(
            "Bytes copied: {} ({} skipped)",
            Self::format_bytes(report.bytes_transferred),
            Self::format_bytes(report.bytes_skipped)
        );
        eprintln!("Elapsed: {}", Self::format_duration(self.start_time.elapsed()));

        if report.has_failures() {
            eprintln!();
            eprintln!("Failed files:");
            for record in report.entries.iter().filter(|e| e.outcome == EntryOutcome::Failed) {
                let msg = record.error_message.as_deref().unwrap_or("(unknown error)");
                eprintln!("  {}: {}", Self::entry_name(record), msg);
            }
        }
    }

    fn select_file(&self, path: &std::path::Path) {
        eprintln!("Created {}", path.display());
    }
}

/// Asks the user on stderr and reads the answer from stdin.
///
/// End of input counts as cancel.
struct PromptDecisions {
    input: Mutex<Box<dyn BufRead + Send>>,
}

impl PromptDecisions {
    fn stdin() -> Self {
        PromptDecisions {
            input: Mutex::new(Box::new(std::io::BufReader::new(std::io::stdin()))),
        }
    }

    fn ask(&self, question: &str) -> Option<String> {
        let mut input = self.input.lock();
        loop {
            eprint!("\r\x1b[K{}", question);
            let _ = std::io::stderr().flush();
            let mut line = String::new();
            match input.read_line(&mut line) {
                Ok(0) | Err(_) => return None,
                Ok(_) if line.trim().is_empty() => continue,
                Ok(_) => return Some(line.trim().to_string()),
            }
        }
    }
}

fn parse_error_answer(answer: &str) -> Option<ErrorDecision> {
    match answer.to_lowercase().as_str() {
        "r" | "retry" => Some(ErrorDecision::Retry),
        "s" | "skip" => Some(ErrorDecision::Skip),
        "c" | "cancel" => Some(ErrorDecision::Cancel),
        _ => None,
    }
}

/// Lower case applies once, upper case to every later collision.
fn parse_collision_answer(answer: &str) -> Option<CollisionDecision> {
    let apply_to_all = answer.chars().all(|c| !c.is_alphabetic() || c.is_uppercase());
    let choice = match answer.to_lowercase().as_str() {
        "o" | "overwrite" => CollisionChoice::Overwrite,
        "l" | "older" => CollisionChoice::OverwriteIfOlder,
        "s" | "skip" => CollisionChoice::Skip,
        "r" | "rename" => CollisionChoice::Rename,
        "c" | "cancel" => return Some(CollisionDecision::once(CollisionChoice::Cancel)),
        _ => return None,
    };
    Some(if apply_to_all {
        CollisionDecision::for_all(choice)
    } else {
        CollisionDecision::once(choice)
    })
}

impl DecisionProvider for PromptDecisions {
    fn ask_retry_skip_cancel(&self, context: &ErrorContext) -> ErrorDecision {
        let question = format!(
            "{}: {} {}: {}\n[r]etry, [s]kip, [c]ancel? ",
            context.title,
            context.operation,
            context.path.display(),
            context.message
        );
        loop {
            let Some(answer) = self.ask(&question) else {
                return ErrorDecision::Cancel;
            };
            if let Some(decision) = parse_error_answer(&answer) {
                return decision;
            }
        }
    }

    fn ask_collision(&self, context: &CollisionContext) -> Option<CollisionDecision> {
        let what = match context.kind {
            CollisionKind::FileExists => "Destination exists",
            CollisionKind::SameSourceAndDestination => "Source and destination are the same",
        };
        let question = format!(
            "{}: {}\n[o]verwrite, overwrite if o[l]der, [s]kip, [r]ename, [c]ancel (upper case: apply to all)? ",
            what,
            context.destination.display()
        );
        loop {
            let answer = self.ask(&question)?;
            if let Some(decision) = parse_collision_answer(&answer) {
                return Some(decision);
            }
        }
    }
}

fn parse_collision_action(value: &str) -> Result<CollisionAction, String> {
    match value.to_lowercase().as_str() {
        "ask" => Ok(CollisionAction::Ask),
        "overwrite" => Ok(CollisionAction::Overwrite),
        "overwrite-older" | "overwrite-if-older" => Ok(CollisionAction::OverwriteIfOlder),
        "skip" => Ok(CollisionAction::Skip),
        "rename" => Ok(CollisionAction::Rename),
        _ => Err(format!(
            "Invalid collision action '{}'. Must be 'ask', 'overwrite', 'overwrite-older', 'skip', or 'rename'",
            value
        )),
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    // RUST_LOG wins over the flag
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("copyjob={}", level)));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_file(verbose)
                .with_line_number(verbose),
        )
        .try_init();
}

/// Process exit code for a finished run.
fn exit_code(report: &JobReport) -> i32 {
    match report.state {
        JobState::Interrupted => 130,
        _ if report.has_failures() => 1,
        _ => 0,
    }
}

/// Parse and validate command-line arguments, then run the job
fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    let exit_code = match run_cli(&args) {
        Ok(report) => {
            if args.report_json {
                match serde_json::to_string_pretty(&report) {
                    Ok(json) => println!("{}", json),
                    Err(e) => eprintln!("Error: cannot serialize report: {}", e),
                }
            }
            exit_code(&report)
        }
        Err(msg) => {
            eprintln!("Error: {}", msg);
            2
        }
    };

    std::process::exit(exit_code);
}

/// Main CLI logic - separated for testability
fn run_cli(args: &Args) -> Result<JobReport, String> {
    let mode = match args.mode.to_lowercase().as_str() {
        "copy" => Mode::Copy,
        "download" => Mode::Download,
        _ => {
            return Err(format!(
                "Invalid mode '{}'. Must be 'copy' or 'download'",
                args.mode
            ))
        }
    };

    let on_collision = parse_collision_action(&args.on_collision)?;

    let mut options = match &args.options {
        Some(path) => CopyOptions::load(path).map_err(|e| format!("Cannot load options: {}", e))?,
        None => CopyOptions::default(),
    };
    if args.verify {
        let algorithm: ChecksumAlgorithm = args.hash.parse()?;
        options.integrity_check = Some(algorithm);
    }
    debug!(?options, "options");

    let decisions: Arc<dyn DecisionProvider> = if on_collision == CollisionAction::Ask {
        Arc::new(PromptDecisions::stdin())
    } else {
        Arc::new(FixedDecisions::skip_all())
    };

    let files: FileSet = args.sources.iter().cloned().collect();
    let mut builder = CopyJob::builder(files, &args.dst)
        .new_name(args.rename.clone())
        .mode(mode)
        .on_collision(on_collision)
        .append(args.append)
        .options(options)
        .decisions(decisions);
    if args.move_sources {
        builder = builder.source_disposal(Box::new(DeleteSource));
    }
    let mut job = builder
        .build()
        .map_err(|e| format!("Job creation failed: {}", e))?;
    info!(job = %job.handle().id(), sources = args.sources.len(), "starting");

    let progress = CliProgress::new(args.verbose);
    job.run(Some(&progress))
        .map_err(|e| format!("Job execution failed: {}", e))
}
