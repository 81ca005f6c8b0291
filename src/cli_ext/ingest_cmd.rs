//! Filepath: src/cli_ext/ingest_cmd.rs
//! Commit the staged session, digest every file on the worker pool and
//! hand the plan plus report to the JSON exporter.
//!
//! The progress bar is driven by a subscriber thread reading the progress
//! feed, so the bar never sees a partially updated snapshot.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use tabled::{Table, Tabled};
use tracing::info;

use crate::cli::{AppContext, IngestArgs};
use crate::cli_ext::common::{build_options, open_session, paint, print_warnings};
use crate::core::commit::PlanTotals;
use crate::core::export::{ExportBundle, ExportSink, JsonExport};
use crate::core::orchestrator::{IngestControl, IngestReport, Orchestrator, ProgressFeed};
use crate::core::processor::DigestProcessor;
use crate::infra::config::load_config;

#[derive(Tabled)]
struct SummaryRow {
    collections: usize,
    manifests: usize,
    canvases: usize,
    files: String,
    failed: usize,
    bytes: u64,
}

pub fn run(args: IngestArgs, ctx: &AppContext) -> Result<()> {
    let config = load_config().unwrap_or_default();

    let options = build_options(&config, args.split_loose);
    let (mut session, warnings) = open_session(&args.source, &config, &options)?;
    print_warnings(ctx, &warnings);

    let output: PathBuf = args
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.output.plan_file));

    if ctx.dry_run {
        let plan = session.preview()?;
        if !ctx.quiet {
            println!("{}", paint(ctx, "DRY RUN: Would ingest:", |s| s.yellow().to_string()));
            print_totals(&plan.totals);
            println!("  Output: {}", output.display());
        }
        print_warnings(ctx, &plan.warnings);
        return Ok(());
    }

    let files_total = session.commit()?.tasks.len();

    let orchestrator = Orchestrator::new(
        args.workers.unwrap_or(config.ingest.workers),
        config.ingest.activity_log_len,
    );
    info!(workers = orchestrator.workers(), files = files_total, "starting ingest");

    let feed = ProgressFeed::new();
    let progress = progress_bar(files_total, ctx.quiet);
    let watcher = {
        let rx = feed.subscribe();
        let pb = progress.clone();
        thread::spawn(move || {
            for snapshot in rx {
                pb.set_position((snapshot.files_completed + snapshot.files_error) as u64);
                if let Some(line) = snapshot.activity_log.last() {
                    pb.set_message(line.clone());
                }
            }
        })
    };

    let control = IngestControl::new();
    let result = session.ingest(&orchestrator, Arc::new(DigestProcessor), &feed, &control);

    feed.close();
    watcher
        .join()
        .map_err(|_| anyhow::anyhow!("progress thread panicked"))?;

    let report = result?.clone();
    progress.finish_with_message("Ingest complete");

    let plan = session
        .plan()
        .context("Session lost its committed plan")?;

    JsonExport::new(&output).export(&ExportBundle { plan, report: &report })?;

    if !ctx.quiet {
        print_report(&report, ctx);
        println!("Wrote plan to {}", output.display());
    }
    print_warnings(ctx, &report.warnings);

    Ok(())
}

fn progress_bar(len: usize, quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );
    pb
}

fn print_totals(totals: &PlanTotals) {
    println!("  Collections: {}", totals.collections);
    println!("  Manifests: {}", totals.manifests);
    println!("  Canvases: {}", totals.canvases);
    println!("  Files: {}", totals.files);
}

fn print_report(report: &IngestReport, ctx: &AppContext) {
    let row = SummaryRow {
        collections: report.collections,
        manifests: report.manifests,
        canvases: report.canvases,
        files: format!("{}/{}", report.files_completed, report.files_total),
        failed: report.files_failed,
        bytes: report.bytes_processed,
    };
    println!("{}", Table::new(vec![row]));

    if report.is_clean() {
        println!("{}", paint(ctx, "All files ingested", |s| s.green().to_string()));
    } else if report.cancelled {
        println!("{}", paint(ctx, "Ingest cancelled", |s| s.yellow().to_string()));
    } else {
        println!(
            "{}",
            paint(ctx, &format!("{} files failed", report.files_failed), |s| s
                .red()
                .to_string())
        );
    }
}
