use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Shared application context for global flags
#[derive(Clone, Debug)]
pub struct AppContext {
    pub quiet: bool,    // global --quiet
    pub no_color: bool, // global --no-color
    pub dry_run: bool,  // global --dry-run
}

#[derive(Parser)]
#[command(name = "stage")]
#[command(about = "Stage loose file trees into collections, manifests and canvases, then ingest them")]
#[command(version, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Suppress progress bars and non-essential output
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Show what would be done without executing
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the picked tree as the flattener projects it
    Tree(TreeArgs),

    /// List provisional manifests and merge suggestions
    Manifests(ManifestsArgs),

    /// Group similar filenames
    Similar(SimilarArgs),

    /// Extract metadata from filenames with a regex
    Extract(ExtractArgs),

    /// Commit staging edits, process every file and write the plan
    Ingest(IngestArgs),

    /// Initialize a stagecraft.toml config file
    Init(InitArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Where the files come from and which staging edits to replay
#[derive(Debug, Clone, Args)]
pub struct SourceArgs {
    /// Picked directory
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Additional glob patterns to ignore
    #[arg(short, long)]
    pub ignore: Vec<String>,

    /// Staging edits file (JSON or TOML)
    #[arg(short, long)]
    pub edits: Option<PathBuf>,

    /// Include hidden files
    #[arg(long)]
    pub hidden: bool,

    /// Only keep files with these extensions (repeatable)
    #[arg(long = "ext")]
    pub extensions: Vec<String>,
}

#[derive(Parser)]
pub struct TreeArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Directory paths to expand (repeatable)
    #[arg(short = 'x', long)]
    pub expand: Vec<String>,

    /// Expand every directory
    #[arg(short = 'a', long)]
    pub expand_all: bool,

    /// Only show rows matching this text (plus their ancestors)
    #[arg(short, long)]
    pub filter: Option<String>,

    /// Show the tree after staging edits are applied
    #[arg(long)]
    pub applied: bool,

    /// Skip this many rows
    #[arg(long, default_value_t = 0)]
    pub offset: usize,

    /// Show at most this many rows
    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Parser)]
pub struct ManifestsArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Emit JSON instead of a table
    #[arg(long)]
    pub json: bool,

    /// Also list merge suggestions for similar single-canvas manifests
    #[arg(long)]
    pub suggestions: bool,

    /// Loose root files become single-canvas manifests
    #[arg(long)]
    pub split_loose: bool,
}

#[derive(Parser)]
pub struct SimilarArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Names kept per group before it is marked truncated
    #[arg(long)]
    pub cap: Option<usize>,

    /// Emit JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser)]
pub struct ExtractArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Regex applied to each file name
    #[arg(short, long)]
    pub pattern: String,

    /// Capture group to property mapping, GROUP=PROPERTY (repeatable)
    #[arg(short, long = "map")]
    pub mappings: Vec<String>,

    /// Match against the full snapshot path instead of the file name
    #[arg(long)]
    pub full_path: bool,

    /// Emit JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser)]
pub struct IngestArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Where to write the committed plan and report
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Worker threads (0 = one per CPU)
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Loose root files become single-canvas manifests
    #[arg(long)]
    pub split_loose: bool,
}

#[derive(Parser)]
pub struct InitArgs {
    /// Directory to initialize config in
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Overwrite existing config file
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

#[derive(Parser)]
pub struct CompletionsArgs {
    /// Target shell
    #[arg(value_enum)]
    pub shell: Shell,

    /// Output directory; if omitted and --stdout not set, prints error
    #[arg(long)]
    pub out_dir: Option<PathBuf>,

    /// Print completion script to stdout instead of a file
    #[arg(long)]
    pub stdout: bool,
}
