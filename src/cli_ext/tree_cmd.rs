//! Filepath: src/cli_ext/tree_cmd.rs
//! Prints the flattened projection one row per line, indented by depth.
//! Collapsed directories show `+`, expanded ones `-`; both carry their
//! recursive file count. Overlay labels and flags are appended.

use std::collections::HashSet;

use anyhow::Result;
use owo_colors::OwoColorize;

use crate::cli::{AppContext, TreeArgs};
use crate::cli_ext::common::{build_options, open_session, paint, print_scan_plan, print_warnings};
use crate::core::apply::apply_annotations_to_tree;
use crate::core::flatten::{
    FileCountCache, FlatFileTreeNode, expand_all, filter_flat_nodes, flatten_file_tree_cached,
    visible_window,
};
use crate::infra::config::load_config;
use crate::infra::utils::PathUtils;

pub fn run(args: TreeArgs, ctx: &AppContext) -> Result<()> {
    let config = load_config().unwrap_or_default();

    if ctx.dry_run {
        print_scan_plan(ctx, &config, &args.source);
        return Ok(());
    }

    let options = build_options(&config, false);
    let (session, warnings) = open_session(&args.source, &config, &options)?;
    print_warnings(ctx, &warnings);

    let tree = if args.applied {
        apply_annotations_to_tree(session.tree(), session.overlay())
    } else {
        session.tree().clone()
    };

    let expanded: HashSet<String> = if args.expand_all {
        expand_all(&tree)
    } else {
        args.expand
            .iter()
            .filter_map(|p| PathUtils::normalize(p))
            .flat_map(|p| {
                // Expanding a nested path opens its ancestors too
                let mut chain: Vec<String> = PathUtils::ancestors(&p)
                    .into_iter()
                    .map(str::to_string)
                    .collect();
                chain.push(p);
                chain
            })
            .collect()
    };

    let cache = FileCountCache::default();
    let rows = flatten_file_tree_cached(&tree, &expanded, session.overlay(), 0, &cache);

    let rows = match &args.filter {
        Some(query) => filter_flat_nodes(&rows, query),
        None => rows,
    };

    let limit = args.limit.unwrap_or(rows.len());
    let window = visible_window(&rows, args.offset, limit);

    if ctx.quiet {
        return Ok(());
    }

    for row in window {
        println!("{}", format_row(row, ctx));
    }

    if window.len() < rows.len() {
        println!(
            "{}",
            paint(
                ctx,
                &format!(
                    "rows {}-{} of {}",
                    args.offset.min(rows.len()),
                    args.offset.min(rows.len()) + window.len(),
                    rows.len()
                ),
                |s| s.dimmed().to_string()
            )
        );
    }

    Ok(())
}

fn format_row(row: &FlatFileTreeNode, ctx: &AppContext) -> String {
    let indent = "  ".repeat(row.depth);
    let ann = &row.annotations;

    let mut line = if row.is_directory {
        let marker = if row.is_expanded { "-" } else { "+" };
        format!(
            "{indent}{marker} {}/ ({} files)",
            paint(ctx, &row.name, |s| s.blue().to_string()),
            row.total_file_count
        )
    } else {
        format!("{indent}  {}", row.name)
    };

    if let Some(label) = &ann.label {
        line.push_str(&format!(" \"{label}\""));
    }
    if let Some(intent) = ann.intent {
        line.push_str(&paint(ctx, &format!(" [{intent:?}]"), |s| s.cyan().to_string()));
    }
    if ann.start {
        line.push_str(&paint(ctx, " [start]", |s| s.green().to_string()));
    }
    if ann.excluded {
        line.push_str(&paint(ctx, " [excluded]", |s| s.red().to_string()));
    }

    line
}
