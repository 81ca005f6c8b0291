//! Filepath: src/cli_ext/extract_cmd.rs
//! Applies a user regex to every picked file and maps capture groups to
//! named properties.

use anyhow::Result;
use owo_colors::OwoColorize;
use tabled::{Table, Tabled};

use crate::cli::{AppContext, ExtractArgs};
use crate::cli_ext::common::{build_options, open_session, paint, print_scan_plan, print_warnings};
use crate::core::diagnostics::{Warning, WarningKind};
use crate::core::pattern::{CompiledPattern, Extraction, PatternMatcher, PropertyMapping};
use crate::infra::config::load_config;

#[derive(Tabled)]
struct ExtractionRow {
    item: String,
    matched: String,
    properties: String,
}

pub fn run(args: ExtractArgs, ctx: &AppContext) -> Result<()> {
    let mappings = args
        .mappings
        .iter()
        .map(|m| m.parse::<PropertyMapping>())
        .collect::<Result<Vec<_>, _>>()?;

    let compiled = PatternMatcher::compile(&args.pattern, mappings);
    if let CompiledPattern::Invalid { pattern, error } = &compiled {
        print_warnings(
            ctx,
            &[Warning::new(WarningKind::InvalidPattern, pattern.clone(), error.clone())],
        );
        anyhow::bail!("Invalid pattern: {}", args.pattern);
    }

    let config = load_config().unwrap_or_default();

    if ctx.dry_run {
        print_scan_plan(ctx, &config, &args.source);
        return Ok(());
    }

    let options = build_options(&config, false);
    let (session, warnings) = open_session(&args.source, &config, &options)?;
    print_warnings(ctx, &warnings);

    let items: Vec<&str> = session
        .tree()
        .files()
        .into_iter()
        .map(|f| if args.full_path { f.path.as_str() } else { f.name.as_str() })
        .collect();

    let extractions = compiled.extract(&items);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&extractions)?);
        return Ok(());
    }

    if ctx.quiet {
        return Ok(());
    }

    let matched = extractions.iter().filter(|e| e.matched).count();
    let rows: Vec<ExtractionRow> = extractions.iter().map(|e| extraction_row(e, ctx)).collect();

    println!("{}", Table::new(rows));
    println!("{matched} of {} files matched", extractions.len());

    Ok(())
}

fn extraction_row(e: &Extraction, ctx: &AppContext) -> ExtractionRow {
    let matched = if e.matched {
        paint(ctx, "yes", |s| s.green().to_string())
    } else {
        paint(ctx, "no", |s| s.red().to_string())
    };

    ExtractionRow {
        item: e.item.clone(),
        matched,
        properties: e
            .properties
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(", "),
    }
}
