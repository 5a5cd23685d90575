use anyhow::{bail, Result};
use indicatif::{ProgressBar, ProgressStyle};
use photosync_core::{CancelFlag, FileOutcome, RunReport, SyncConfig, SyncProgress};
use tracing::warn;

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "  {bar:30.cyan/blue} {spinner:.green} {pos:>5}/{len:<5} {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("━╸─")
}

pub fn run(config: &SyncConfig, erase: bool) -> Result<()> {
    let Some(source) = config.source_dir.clone() else {
        bail!("no source directory: pass --source or set source_dir in the config");
    };
    let pipeline = config.build_pipeline()?;

    let cancel = CancelFlag::new();
    let handler_flag = cancel.clone();
    ctrlc::set_handler(move || {
        warn!("cancellation requested, finishing files in progress");
        handler_flag.cancel();
    })?;

    let pb = ProgressBar::new(0);
    pb.set_style(bar_style());
    let on_progress = |event: SyncProgress| match event {
        SyncProgress::Discovered { total } => {
            pb.set_length(total as u64);
            pb.set_message(format!("syncing {}", source.display()));
        }
        SyncProgress::FileDone { filename, outcome } => {
            pb.inc(1);
            match outcome {
                FileOutcome::Skipped => pb.println(format!("  skipped {filename}")),
                FileOutcome::Synced {
                    failed_variants, ..
                } if failed_variants > 0 => {
                    pb.println(format!("  {filename}: {failed_variants} variant(s) not synced"))
                }
                _ => pb.set_message(filename),
            }
        }
        SyncProgress::Complete => pb.finish_and_clear(),
    };

    let report = pipeline.run_with(&source, erase, &cancel, Some(&on_progress))?;
    print_report(&report);
    Ok(())
}

fn print_report(report: &RunReport) {
    println!();
    println!("  Sync finished");
    println!("  -------------");
    println!("   Discovered:  {:>8}", report.discovered);
    println!("   Processed:   {:>8}", report.processed);
    println!("   New records: {:>8}", report.records_created);
    println!(
        "   Uploaded:    {:>8}  ({} originals, {} thumbnails, {} medium)",
        report.uploads.total(),
        report.uploads.original,
        report.uploads.thumbnail,
        report.uploads.medium
    );
    if report.failed > 0 {
        println!("   Skipped:     {:>8}", report.failed);
    }
    if report.cancelled > 0 {
        println!("   Cancelled:   {:>8}", report.cancelled);
    }
    if !report.errors.is_empty() {
        println!();
        println!("  Errors (re-run to retry)");
        for error in &report.errors {
            match error.variant {
                Some(variant) => println!("   {} [{variant}]: {}", error.filename, error.message),
                None => println!("   {}: {}", error.filename, error.message),
            }
        }
    }
    println!();
}
