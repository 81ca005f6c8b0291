//! **stagecraft** - Staging engine that turns loose file trees into archive hierarchies
//!
//! Raw files become a snapshot tree, user intent lives in a sparse path-keyed
//! overlay, provisional manifests are grouped from directories and filename
//! sequences, and a separate archive layout of collections is reconciled with
//! all of it in a single commit step. Ingestion then runs per-file processing
//! on a bounded worker pool and folds the results into one report.

/// Command-line interface with clap integration
pub mod cli;

/// Shell completion generation
pub mod completion;

/// Command handlers wiring the CLI onto the staging pipeline
pub mod cli_ext {
    /// `stage tree` - flattened, lazily expanded view of the snapshot
    pub mod tree_cmd;

    /// `stage manifests` - provisional manifests and merge suggestions
    pub mod manifests_cmd;

    /// `stage similar` - filename similarity groups
    pub mod similar_cmd;

    /// `stage extract` - regex driven metadata extraction
    pub mod extract_cmd;

    /// `stage ingest` - commit, process and export
    pub mod ingest_cmd;

    /// Shared snapshot/edits loading for handlers
    pub mod common;
}

/// Core staging pipeline - pure data transformations plus the ingest orchestrator
pub mod core {
    /// Immutable snapshot of the picked files and directories
    pub mod snapshot;
    pub use snapshot::{FileEntry, FileHandle, FileTree, FileTreeNode, SnapshotError};

    /// Sparse path-keyed annotation overlay
    pub mod annotations;
    pub use annotations::{
        BehaviorSet, BehaviorTag, NodeAnnotations, Overlay, StructuralIntent, ViewingDirection,
    };

    /// Non-blocking warnings shared by every stage
    pub mod diagnostics;
    pub use diagnostics::{Warning, WarningKind};

    /// Pure clone-and-filter of the snapshot under the overlay
    pub mod apply;
    pub use apply::{apply_annotations_to_tree, validate_start_markers};

    /// Ordered, lazily expanded projection for virtualized display
    pub mod flatten;
    pub use flatten::{FileCountCache, FlatFileTreeNode, filter_flat_nodes, flatten_file_tree};

    /// Filename sequences and user-supplied regex extraction
    pub mod pattern;
    pub use pattern::{CompiledPattern, Extraction, PatternMatcher, PropertyMapping};

    /// Provisional manifests derived from the snapshot
    pub mod manifest;
    pub use manifest::{SourceCanvas, SourceManifest, SourceManifests};

    /// Heuristic filename grouping for merge suggestions
    pub mod similarity;
    pub use similarity::{SimilarGroup, find_similar_filenames};

    /// Target tree of collections over manifest ids
    pub mod layout;
    pub use layout::{ArchiveLayout, ArchiveNode, LayoutError};

    /// Folds snapshot, overlay, manifests and layout into one canonical tree
    pub mod commit;
    pub use commit::{CommittedPlan, commit};

    /// Declarative staging edits loaded from JSON or TOML
    pub mod edits;
    pub use edits::StagingEdits;

    /// Per-file processing contract and the default digest processor
    pub mod processor;
    pub use processor::{DigestProcessor, FileArtifact, FileProcessor, ProcessError};

    /// Bounded worker pool, progress feed and commutative report
    pub mod orchestrator;
    pub use orchestrator::{IngestControl, IngestReport, Orchestrator, ProgressFeed, ProgressSnapshot};

    /// Session state machine from building to complete
    pub mod session;
    pub use session::{IngestSession, SessionError, SessionState};

    /// Export collaborator interface
    pub mod export;
    pub use export::{ExportSink, JsonExport};
}

/// Infrastructure - Configuration, I/O, walking and utilities
pub mod infra {
    /// Configuration management with TOML support
    pub mod config;
    pub use config::{Config, init as config_init, load_config};

    /// Memory-mapped binary reads for large files
    pub mod io;
    pub use io::{FileBytes, read_bytes_smart};

    /// Gitignore-aware directory walking that yields file handles
    pub mod walk;
    pub use walk::FileWalker;

    /// Path, ordering and id helpers
    pub mod utils;
}

// Strategic re-exports for clean CLI interface
pub use cli::{AppContext, Cli, Commands};
pub use infra::{Config, FileWalker, load_config};
