//! Filepath: src/cli_ext/similar_cmd.rs

use anyhow::Result;
use owo_colors::OwoColorize;

use crate::cli::{AppContext, SimilarArgs};
use crate::cli_ext::common::{build_options, open_session, paint, print_scan_plan, print_warnings};
use crate::core::similarity::find_similar_filenames_capped;
use crate::infra::config::load_config;

pub fn run(args: SimilarArgs, ctx: &AppContext) -> Result<()> {
    let config = load_config().unwrap_or_default();

    if ctx.dry_run {
        print_scan_plan(ctx, &config, &args.source);
        return Ok(());
    }

    let options = build_options(&config, false);
    let (session, warnings) = open_session(&args.source, &config, &options)?;
    print_warnings(ctx, &warnings);

    let names: Vec<&str> = session
        .tree()
        .files()
        .into_iter()
        .map(|f| f.name.as_str())
        .collect();

    let cap = args.cap.unwrap_or(config.similarity.candidate_cap);
    let groups = find_similar_filenames_capped(&names, cap);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&groups)?);
        return Ok(());
    }

    if ctx.quiet {
        return Ok(());
    }

    if groups.is_empty() {
        println!("{}", paint(ctx, "No similar filenames", |s| s.dimmed().to_string()));
        return Ok(());
    }

    for group in &groups {
        println!(
            "{} ({} files)",
            paint(ctx, &group.key, |s| s.bold().to_string()),
            group.names.len()
        );
        for name in &group.names {
            println!("  {name}");
        }
        if group.truncated {
            println!("  {}", paint(ctx, "... more not shown", |s| s.dimmed().to_string()));
        }
    }

    Ok(())
}
