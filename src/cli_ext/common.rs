//! Filepath: src/cli_ext/common.rs
//! Loading shared by the handlers: picked root, walker, session and edits.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use tracing::debug;

use crate::cli::{AppContext, SourceArgs};
use crate::core::diagnostics::Warning;
use crate::core::edits::StagingEdits;
use crate::core::manifest::BuildOptions;
use crate::core::session::IngestSession;
use crate::infra::config::Config;
use crate::infra::walk::FileWalker;

/// Expand `~` and `$VAR`, then canonicalize without UNC prefixes
pub fn resolve_root(raw: &Path) -> Result<PathBuf> {
    let text = raw.to_string_lossy();
    let expanded =
        shellexpand::full(&text).with_context(|| format!("Failed to expand path {text}"))?;

    dunce::canonicalize(expanded.as_ref())
        .with_context(|| format!("Picked directory not found: {}", expanded))
}

/// Config ignores plus CLI ignores; CLI extensions replace configured ones
pub fn build_walker(config: &Config, source: &SourceArgs) -> Result<FileWalker> {
    let mut ignore_patterns = config.ignore_patterns.clone();
    ignore_patterns.extend(source.ignore.iter().cloned());

    let extensions = if source.extensions.is_empty() {
        &config.extensions
    } else {
        &source.extensions
    };

    Ok(FileWalker::new(&ignore_patterns)?
        .with_extensions(extensions)
        .with_include_hidden(source.hidden || config.include_hidden))
}

pub fn build_options(config: &Config, split_loose: bool) -> BuildOptions {
    let mut options = config.build_options();
    options.split_loose_files |= split_loose;
    options
}

/// Scan the picked directory and replay the edits file, if any
pub fn open_session(
    source: &SourceArgs,
    config: &Config,
    options: &BuildOptions,
) -> Result<(IngestSession, Vec<Warning>)> {
    let root = resolve_root(&source.path)?;
    let walker = build_walker(config, source)?;

    let mut session = IngestSession::scan(&root, &walker, options)
        .with_context(|| format!("Failed to stage {}", root.display()))?;

    let mut warnings = Vec::new();
    if let Some(path) = &source.edits {
        let edits = StagingEdits::load(path)?;
        debug!(path = %path.display(), "replaying staging edits");
        warnings = session.apply_edits(&edits, options)?;
    }

    Ok((session, warnings))
}

/// What a read-only handler would scan, for `--dry-run`
pub fn print_scan_plan(ctx: &AppContext, config: &Config, source: &SourceArgs) {
    if ctx.quiet {
        return;
    }

    let mut ignore_patterns = config.ignore_patterns.clone();
    ignore_patterns.extend(source.ignore.iter().cloned());

    println!("{}", paint(ctx, "DRY RUN: Would scan:", |s| s.yellow().to_string()));
    println!("  Root: {}", source.path.display());
    println!("  Ignore patterns: {:?}", ignore_patterns);
    if let Some(edits) = &source.edits {
        println!("  Edits: {}", edits.display());
    }
}

/// Apply `style` unless color is disabled
pub fn paint(ctx: &AppContext, text: &str, style: impl Fn(&str) -> String) -> String {
    if ctx.no_color {
        text.to_string()
    } else {
        style(text)
    }
}

/// Warnings go to stderr so JSON on stdout stays parseable
pub fn print_warnings(ctx: &AppContext, warnings: &[Warning]) {
    if ctx.quiet {
        return;
    }

    for warning in warnings {
        eprintln!(
            "{} {}",
            paint(ctx, "warning:", |s| s.yellow().to_string()),
            warning
        );
    }
}
