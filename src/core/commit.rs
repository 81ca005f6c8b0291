//! Filepath: src/core/commit.rs
//! The single point where snapshot, overlay, manifests and layout meet.
//!
//! `commit` folds the overlay into the snapshot, drops canvases whose files
//! were excluded, reconciles the layout against what survives and lays the
//! result out as one canonical collection tree plus the ordered file tasks
//! the orchestrator will run.

use std::collections::HashSet;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::{
    core::{
        annotations::{BehaviorTag, Overlay, ViewingDirection},
        apply::{apply_annotations_to_tree, validate_start_markers},
        diagnostics::{Warning, WarningKind},
        flatten::{expand_all, flatten_file_tree},
        layout::{ArchiveLayout, ArchiveNode},
        manifest::{SourceCanvas, SourceManifest, SourceManifests, find_start_file},
        orchestrator::FileTask,
        snapshot::FileTree,
    },
    infra::utils::IdUtils,
};

/// Id of the synthetic collection holding unassigned manifests
pub const UNASSIGNED_ID: &str = "unassigned";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommitError
{
    #[error("every file was excluded; nothing left to ingest")]
    NothingToIngest,
}

/// Manifest with its overlay-resolved properties
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CanonicalManifest
{
    pub id: String,
    pub label: String,
    pub canvases: Vec<SourceCanvas>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub behaviors: Vec<BehaviorTag>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub viewing_direction: Option<ViewingDirection>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub rights: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub nav_date: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_canvas: Option<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub breadcrumbs: Vec<String>,

    pub is_partial: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CanonicalCollection
{
    pub id: String,
    pub label: String,
    pub collections: Vec<CanonicalCollection>,
    pub manifests: Vec<CanonicalManifest>,
}

impl CanonicalCollection
{
    pub fn manifest_count(&self) -> usize
    {
        self.manifests.len()
            + self
                .collections
                .iter()
                .map(CanonicalCollection::manifest_count)
                .sum::<usize>()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PlanTotals
{
    pub collections: usize,
    pub manifests: usize,
    pub canvases: usize,
    pub files: usize,
}

/// Everything the orchestrator and the export collaborator need
#[derive(Debug, Clone, Serialize)]
pub struct CommittedPlan
{
    /// Snapshot with the overlay folded in
    pub tree: FileTree,
    pub root: CanonicalCollection,
    pub manifests: SourceManifests,
    pub layout: ArchiveLayout,

    /// Submission order for ingest workers
    pub tasks: Vec<FileTask>,
    pub warnings: Vec<Warning>,
    pub totals: PlanTotals,
}

/// Combine the staging stores into one canonical plan. Inputs are untouched.
#[instrument(level = "info", skip_all, fields(manifests = manifests.len()))]
pub fn commit(
    tree: &FileTree,
    overlay: &Overlay,
    manifests: &SourceManifests,
    layout: &ArchiveLayout,
) -> Result<CommittedPlan, CommitError>
{
    let applied = apply_annotations_to_tree(tree, overlay);
    let mut warnings = validate_start_markers(tree, overlay);

    let surviving = filter_manifests(&applied, manifests, &mut warnings);

    let mut layout = layout.clone();
    for id in layout.reconcile(&surviving)
    {
        warnings.push(Warning::new(
            WarningKind::DanglingReference,
            id,
            "layout referenced a manifest that is no longer part of the import",
        ));
    }

    let tasks = plan_tasks(&applied);
    if tasks.is_empty()
    {
        warn!("commit produced no file tasks");
        return Err(CommitError::NothingToIngest);
    }

    let mut root = build_collection(&layout.root, &applied, &surviving);

    let unassigned = layout.unassigned(&surviving);
    if !unassigned.is_empty()
    {
        root.collections.push(CanonicalCollection {
            id: UNASSIGNED_ID.to_string(),
            label: "Unassigned".to_string(),
            collections: Vec::new(),
            manifests: unassigned
                .iter()
                .filter_map(|id| surviving.get(id))
                .map(|m| canonical_manifest(m, &applied))
                .collect(),
        });
    }

    warnings.sort();

    let totals = PlanTotals {
        collections: layout.root.collection_count(),
        manifests: surviving.len(),
        canvases: surviving.canvas_count(),
        files: tasks.len(),
    };

    info!(
        collections = totals.collections,
        manifests = totals.manifests,
        canvases = totals.canvases,
        files = totals.files,
        warnings = warnings.len(),
        "staging committed"
    );

    Ok(CommittedPlan { tree: applied, root, manifests: surviving, layout, tasks, warnings, totals })
}

/// Drop canvases whose file no longer exists in `applied`, and manifests
/// left without canvases
fn filter_manifests(
    applied: &FileTree,
    manifests: &SourceManifests,
    warnings: &mut Vec<Warning>,
) -> SourceManifests
{
    let mut out = Vec::with_capacity(manifests.len());

    for manifest in manifests.iter()
    {
        let canvases: Vec<SourceCanvas> = manifest
            .canvases
            .iter()
            .filter(|c| {
                c.source_path
                    .as_deref()
                    .is_none_or(|p| applied.find_file(p).is_some())
            })
            .cloned()
            .collect();

        if canvases.is_empty()
        {
            warnings.push(Warning::new(
                WarningKind::EmptyManifest,
                manifest.id.clone(),
                format!("'{}' lost every canvas to exclusions and was dropped", manifest.label),
            ));
            continue;
        }

        let mut kept = manifest.clone();
        kept.canvases = canvases;
        out.push(kept);
    }

    out.into_iter()
        .collect()
}

/// Files of the committed tree in fully expanded flattener order
fn plan_tasks(applied: &FileTree) -> Vec<FileTask>
{
    flatten_file_tree(applied, &expand_all(applied), &Overlay::new(), 0)
        .into_iter()
        .filter_map(|row| row.file)
        .enumerate()
        .map(|(index, file)| FileTask {
            index,
            path: file.path,
            source: file.source,
            size: file.size,
        })
        .collect()
}

fn build_collection(
    node: &ArchiveNode,
    applied: &FileTree,
    manifests: &SourceManifests,
) -> CanonicalCollection
{
    CanonicalCollection {
        id: node.id.clone(),
        label: node.name.clone(),
        collections: node
            .children
            .iter()
            .map(|c| build_collection(c, applied, manifests))
            .collect(),
        manifests: node
            .manifest_ids
            .iter()
            .filter_map(|id| manifests.get(id))
            .map(|m| canonical_manifest(m, applied))
            .collect(),
    }
}

/// Resolve a manifest's properties from the node it came from
fn canonical_manifest(
    manifest: &SourceManifest,
    applied: &FileTree,
) -> CanonicalManifest
{
    let present: HashSet<&str> = manifest
        .canvases
        .iter()
        .map(|c| c.id.as_str())
        .collect();

    let mut canonical = CanonicalManifest {
        id: manifest.id.clone(),
        label: manifest.label.clone(),
        canvases: manifest.canvases.clone(),
        behaviors: Vec::new(),
        viewing_direction: None,
        rights: None,
        nav_date: None,
        provider: None,
        start_canvas: manifest
            .start_canvas
            .clone()
            .filter(|id| present.contains(id.as_str())),
        breadcrumbs: manifest.breadcrumbs.clone(),
        is_partial: manifest.is_partial,
    };

    // Split loose files carry only their own file annotations; the root
    // directory's overrides belong to no manifest
    if let Some(path) = &manifest.source_file
    {
        if let Some(file) = applied.find_file(path)
        {
            if let Some(label) = &file.label
            {
                canonical.label = label.clone();
            }
            canonical.behaviors = file
                .behaviors
                .iter()
                .collect();
        }
        return canonical;
    }

    let Some(dir) = manifest
        .source_dir
        .as_deref()
        .and_then(|d| applied.find_dir(d))
    else
    {
        return canonical;
    };

    // A start marker set after the manifests were built wins over the
    // builder's choice, as long as its canvas is still here
    if let Some(id) = find_start_file(dir)
        .map(|path| IdUtils::stable_id("canvas", &path))
        .filter(|id| present.contains(id.as_str()))
    {
        canonical.start_canvas = Some(id);
    }

    if let Some(label) = &dir.label
    {
        canonical.label = label.clone();
    }
    canonical.behaviors = dir
        .behaviors
        .iter()
        .collect();
    canonical.viewing_direction = dir.viewing_direction;
    canonical.rights = dir.rights.clone();
    canonical.nav_date = dir.nav_date.clone();
    canonical.provider = dir.provider.clone();

    canonical
}
