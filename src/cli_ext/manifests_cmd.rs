//! Filepath: src/cli_ext/manifests_cmd.rs
//! Lists provisional manifests as a table (or JSON), optional merge
//! suggestions, and the collection layout when edits declared one.

use anyhow::Result;
use owo_colors::OwoColorize;
use ptree::TreeBuilder;
use serde_json::json;
use tabled::{Table, Tabled};

use crate::cli::{AppContext, ManifestsArgs};
use crate::cli_ext::common::{build_options, open_session, paint, print_scan_plan, print_warnings};
use crate::core::layout::{ArchiveLayout, ArchiveNode};
use crate::core::manifest::{SourceManifest, SourceManifests};
use crate::core::similarity::{MergeSuggestion, suggest_merges};
use crate::infra::config::load_config;

#[derive(Tabled)]
struct ManifestRow {
    id: String,
    label: String,
    canvases: usize,
    pattern: String,
    source: String,
}

#[derive(Tabled)]
struct SuggestionRow {
    key: String,
    target: String,
    sources: String,
}

pub fn run(args: ManifestsArgs, ctx: &AppContext) -> Result<()> {
    let config = load_config().unwrap_or_default();

    if ctx.dry_run {
        print_scan_plan(ctx, &config, &args.source);
        return Ok(());
    }

    let options = build_options(&config, args.split_loose);
    let (session, warnings) = open_session(&args.source, &config, &options)?;
    print_warnings(ctx, &warnings);

    let manifests = session.manifests();
    let suggestions = if args.suggestions {
        suggest_merges(manifests, config.similarity.candidate_cap)
    } else {
        Vec::new()
    };

    if args.json {
        let output = json!({
            "manifests": manifests.iter().collect::<Vec<_>>(),
            "suggestions": suggestions,
            "unassigned": session.layout().unassigned(manifests),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    if ctx.quiet {
        return Ok(());
    }

    print_manifest_table(manifests, ctx);

    if args.suggestions {
        print_suggestions(&suggestions, manifests, ctx);
    }

    let layout = session.layout();
    if layout.root.collection_count() > 0 {
        println!();
        print_layout(layout, manifests)?;
    }

    Ok(())
}

fn print_manifest_table(manifests: &SourceManifests, ctx: &AppContext) {
    if manifests.is_empty() {
        println!("{}", paint(ctx, "No manifests", |s| s.yellow().to_string()));
        return;
    }

    let rows: Vec<ManifestRow> = manifests.iter().map(manifest_row).collect();
    println!("{}", Table::new(rows));
    println!(
        "{} manifests, {} canvases",
        manifests.len(),
        manifests.canvas_count()
    );
}

fn manifest_row(m: &SourceManifest) -> ManifestRow {
    let pattern = match (&m.detected_pattern, m.is_partial) {
        (Some(p), true) => format!("{p} (gaps)"),
        (Some(p), false) => p.clone(),
        (None, _) => String::new(),
    };

    ManifestRow {
        id: m.id.clone(),
        label: m.label.clone(),
        canvases: m.canvases.len(),
        pattern,
        source: m
            .source_dir
            .clone()
            .or_else(|| m.source_file.clone())
            .unwrap_or_default(),
    }
}

fn print_suggestions(
    suggestions: &[MergeSuggestion],
    manifests: &SourceManifests,
    ctx: &AppContext,
) {
    println!();
    if suggestions.is_empty() {
        println!("{}", paint(ctx, "No merge suggestions", |s| s.dimmed().to_string()));
        return;
    }

    let label = |id: &str| {
        manifests
            .get(id)
            .map(|m| m.label.clone())
            .unwrap_or_else(|| id.to_string())
    };

    let rows: Vec<SuggestionRow> = suggestions
        .iter()
        .map(|s| SuggestionRow {
            key: s.key.clone(),
            target: label(&s.target),
            sources: s
                .sources
                .iter()
                .map(|id| label(id))
                .collect::<Vec<_>>()
                .join(", "),
        })
        .collect();

    println!("{}", paint(ctx, "Merge suggestions", |s| s.bold().to_string()));
    println!("{}", Table::new(rows));
}

fn print_layout(layout: &ArchiveLayout, manifests: &SourceManifests) -> Result<()> {
    let mut builder = TreeBuilder::new(format!("{}/", layout.root.name));
    add_collection(&mut builder, &layout.root, manifests);

    let unassigned = layout.unassigned(manifests);
    if !unassigned.is_empty() {
        builder.begin_child("(unassigned)".to_string());
        for id in unassigned {
            builder.add_empty_child(manifest_label(manifests, &id));
        }
        builder.end_child();
    }

    ptree::print_tree(&builder.build())?;
    Ok(())
}

fn add_collection(builder: &mut TreeBuilder, node: &ArchiveNode, manifests: &SourceManifests) {
    for child in &node.children {
        builder.begin_child(format!("{}/", child.name));
        add_collection(builder, child, manifests);
        builder.end_child();
    }

    for id in &node.manifest_ids {
        builder.add_empty_child(manifest_label(manifests, id));
    }
}

fn manifest_label(manifests: &SourceManifests, id: &str) -> String {
    match manifests.get(id) {
        Some(m) => format!("{} ({} canvases)", m.label, m.canvases.len()),
        None => id.to_string(),
    }
}
