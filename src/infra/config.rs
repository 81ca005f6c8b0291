use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{
    cli::{AppContext, InitArgs},
    core::{manifest::BuildOptions, similarity::SIMILARITY_CANDIDATE_CAP},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config
{
    /// Ignore globs applied on top of .gitignore while scanning
    pub ignore_patterns: Vec<String>,

    /// Include dotfiles when scanning
    pub include_hidden: bool,

    /// Extension allow-list; empty keeps every file
    pub extensions: Vec<String>,

    /// Worker pool settings
    pub ingest: IngestConfig,

    /// Filename similarity settings
    pub similarity: SimilarityConfig,

    /// Source manifest builder settings
    pub manifests: ManifestConfig,

    /// Output settings
    pub output: OutputConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig
{
    /// Worker threads; 0 uses one per CPU
    pub workers: usize,

    /// Lines kept in the progress activity log
    pub activity_log_len: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimilarityConfig
{
    pub candidate_cap: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManifestConfig
{
    pub split_loose_files: bool,
    pub min_sequence_len: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig
{
    /// Where `stage ingest` writes the committed plan
    pub plan_file: String,
}

impl Default for Config
{
    fn default() -> Self
    {
        Self {
            ignore_patterns: vec![
                "**/.DS_Store".to_string(),
                "**/Thumbs.db".to_string(),
                "**/desktop.ini".to_string(),
                "**/.git/**".to_string(),
                "**/*.tmp".to_string(),
            ],
            include_hidden: false,
            extensions: Vec::new(),
            ingest: IngestConfig::default(),
            similarity: SimilarityConfig::default(),
            manifests: ManifestConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl Default for IngestConfig
{
    fn default() -> Self
    {
        Self { workers: 0, activity_log_len: 20 }
    }
}

impl Default for SimilarityConfig
{
    fn default() -> Self
    {
        Self { candidate_cap: SIMILARITY_CANDIDATE_CAP }
    }
}

impl Default for ManifestConfig
{
    fn default() -> Self
    {
        let defaults = BuildOptions::default();
        Self {
            split_loose_files: defaults.split_loose_files,
            min_sequence_len: defaults.min_sequence_len,
        }
    }
}

impl Default for OutputConfig
{
    fn default() -> Self
    {
        Self { plan_file: "stagecraft-plan.json".to_string() }
    }
}

impl Config
{
    pub fn build_options(&self) -> BuildOptions
    {
        BuildOptions {
            split_loose_files: self
                .manifests
                .split_loose_files,
            min_sequence_len: self
                .manifests
                .min_sequence_len,
        }
    }
}

pub fn load_config() -> Result<Config>
{
    load_config_from(Path::new("."))
}

/// Load the first config file found in `dir`, then `STAGECRAFT_` env vars
/// (`STAGECRAFT_INGEST__WORKERS=4`)
pub fn load_config_from(dir: &Path) -> Result<Config>
{
    let mut builder = config::Config::builder();

    // Load from config files in priority order
    let config_names = ["stagecraft.toml", "stagecraft.yaml", "stagecraft.json", ".stagecraft.toml"];

    for name in &config_names
    {
        let path = dir.join(name);
        if path.exists()
        {
            builder = builder.add_source(config::File::from(path));
            break;
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("STAGECRAFT")
            .prefix_separator("_")
            .separator("__"),
    );

    let cfg = builder
        .build()
        .context("Failed to load configuration")?;
    let parsed: Config = cfg
        .try_deserialize()
        .context("Failed to parse configuration")?;

    Ok(parsed)
}

pub fn init(
    args: InitArgs,
    ctx: &AppContext,
) -> Result<()>
{
    let config_path = args
        .path
        .join("stagecraft.toml");

    if config_path.exists() && !args.force
    {
        anyhow::bail!(
            "Config file already exists at {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    let config = Config::default();
    let toml_string =
        toml::to_string_pretty(&config).context("Failed to serialize default config")?;

    if ctx.dry_run
    {
        if !ctx.quiet
        {
            println!("Would create {}:\n{toml_string}", config_path.display());
        }
        return Ok(());
    }

    std::fs::write(&config_path, toml_string).context("Failed to write config file")?;

    if !ctx.quiet
    {
        println!("Created config file at {}", config_path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn default_config_round_trips_through_toml()
    {
        let text = toml::to_string_pretty(&Config::default()).unwrap();
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back, Config::default());
    }

    #[test]
    fn partial_file_keeps_defaults()
    {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join("stagecraft.toml"),
            "[ingest]\nworkers = 3\n\n[manifests]\nsplit_loose_files = true\n",
        )
        .unwrap();

        let cfg = load_config_from(tmp.path()).unwrap();
        assert_eq!(cfg.ingest.workers, 3);
        assert_eq!(cfg.ingest.activity_log_len, 20);
        assert!(cfg.build_options().split_loose_files);
        assert_eq!(cfg.similarity.candidate_cap, SIMILARITY_CANDIDATE_CAP);
    }
}
