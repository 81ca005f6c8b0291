//! Filepath: src/core/manifest.rs
//! Provisional source manifests derived from the snapshot.
//!
//! `SourceManifests` keeps `all_ids` as the only ordering truth and `by_id`
//! as the lookup; both fields are private so the two key sets can only change
//! together. Every operation here is a pure `&SourceManifests -> SourceManifests`
//! transformation; layout cleanup after a removal belongs to the caller.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::{
    core::{
        annotations::{Overlay, StructuralIntent},
        apply::apply_annotations_to_tree,
        pattern::detect_sequence,
        snapshot::{FileEntry, FileTree, FileTreeNode},
    },
    infra::utils::{IdUtils, PathUtils},
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ManifestError
{
    #[error("no manifest with id '{0}'")]
    UnknownManifest(String),

    #[error("manifest '{manifest}' has no canvas '{canvas}'")]
    UnknownCanvas
    {
        manifest: String, canvas: String
    },

    #[error("reorder of '{manifest}' omits canvas '{canvas}'")]
    MissingCanvas
    {
        manifest: String, canvas: String
    },

    #[error("reorder of '{manifest}' lists canvas '{canvas}' twice")]
    DuplicateCanvas
    {
        manifest: String, canvas: String
    },
}

/// One page/view slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCanvas
{
    pub id: String,
    pub label: String,

    /// Content reference for thumbnails (absolute source location)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,

    /// Snapshot path of the file behind this canvas
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_path: Option<String>,
}

impl SourceCanvas
{
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
    ) -> Self
    {
        Self {
            id: id.into(),
            label: label.into(),
            blob: None,
            width: None,
            height: None,
            source_path: None,
        }
    }

    fn from_file(file: &FileEntry) -> Self
    {
        Self {
            id: IdUtils::stable_id("canvas", &file.path),
            label: file
                .label
                .clone()
                .unwrap_or_else(|| file.name.clone()),
            blob: file
                .source
                .as_ref()
                .map(|p| p.display().to_string()),
            width: None,
            height: None,
            source_path: Some(file.path.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceManifest
{
    pub id: String,
    pub label: String,

    /// Insertion order is display order
    pub canvases: Vec<SourceCanvas>,

    /// Ancestor directory labels, outermost first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub breadcrumbs: Vec<String>,

    #[serde(default)]
    pub is_partial: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detected_pattern: Option<String>,

    /// Canvas id of the marked start file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_canvas: Option<String>,

    /// Snapshot directory this manifest was derived from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_dir: Option<String>,

    /// Loose root file this single-canvas manifest was split from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
}

impl SourceManifest
{
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
    ) -> Self
    {
        Self {
            id: id.into(),
            label: label.into(),
            canvases: Vec::new(),
            breadcrumbs: Vec::new(),
            is_partial: false,
            detected_pattern: None,
            start_canvas: None,
            source_dir: None,
            source_file: None,
        }
    }

    pub fn with_canvases(
        mut self,
        canvases: Vec<SourceCanvas>,
    ) -> Self
    {
        self.canvases = canvases;
        self
    }

    pub fn canvas_ids(&self) -> Vec<&str>
    {
        self.canvases
            .iter()
            .map(|c| c.id.as_str())
            .collect()
    }

    /// Append canvases whose id is not present yet, keeping first-seen order
    fn union_canvases(
        &mut self,
        incoming: impl IntoIterator<Item = SourceCanvas>,
    )
    {
        let mut seen: HashSet<String> = self
            .canvases
            .iter()
            .map(|c| c.id.clone())
            .collect();

        for canvas in incoming
        {
            if seen.insert(canvas.id.clone())
            {
                self.canvases.push(canvas);
            }
        }
    }
}

/// Ordered manifest collection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SourceManifests
{
    by_id: BTreeMap<String, SourceManifest>,
    all_ids: Vec<String>,
}

impl SourceManifests
{
    pub fn new() -> Self
    {
        Self::default()
    }

    pub fn get(
        &self,
        id: &str,
    ) -> Option<&SourceManifest>
    {
        self.by_id.get(id)
    }

    pub fn contains(
        &self,
        id: &str,
    ) -> bool
    {
        self.by_id.contains_key(id)
    }

    /// Ids in display order
    pub fn ids(&self) -> &[String]
    {
        &self.all_ids
    }

    /// Manifests in display order
    pub fn iter(&self) -> impl Iterator<Item = &SourceManifest>
    {
        self.all_ids
            .iter()
            .filter_map(|id| self.by_id.get(id))
    }

    pub fn len(&self) -> usize
    {
        self.all_ids.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.all_ids.is_empty()
    }

    pub fn canvas_count(&self) -> usize
    {
        self.by_id
            .values()
            .map(|m| m.canvases.len())
            .sum()
    }

    /// Both key sets agree and `all_ids` holds no duplicates
    pub fn is_consistent(&self) -> bool
    {
        let unique: HashSet<&str> = self
            .all_ids
            .iter()
            .map(String::as_str)
            .collect();

        unique.len() == self.all_ids.len()
            && unique.len() == self.by_id.len()
            && self
                .by_id
                .keys()
                .all(|k| unique.contains(k.as_str()))
    }
}

impl FromIterator<SourceManifest> for SourceManifests
{
    fn from_iter<T: IntoIterator<Item = SourceManifest>>(iter: T) -> Self
    {
        iter.into_iter()
            .fold(Self::new(), |acc, m| add_source_manifest(&acc, m))
    }
}

/// Insert `manifest`, or union its canvases into the existing entry with the
/// same id (deduplicated by canvas id, new ones appended). Idempotent.
pub fn add_source_manifest(
    collection: &SourceManifests,
    manifest: SourceManifest,
) -> SourceManifests
{
    let mut out = collection.clone();

    match out.by_id.get_mut(&manifest.id)
    {
        Some(existing) => existing.union_canvases(manifest.canvases),
        None =>
        {
            out.all_ids.push(manifest.id.clone());
            out.by_id.insert(manifest.id.clone(), manifest);
        }
    }

    out
}

/// Remove `id` from both the lookup and the ordering. Layout references to
/// it become dangling until the layout is reconciled.
pub fn remove_source_manifest(
    collection: &SourceManifests,
    id: &str,
) -> SourceManifests
{
    let mut out = collection.clone();

    if out.by_id.remove(id).is_some()
    {
        out.all_ids.retain(|x| x != id);
    }

    out
}

/// Reorder canvases of `manifest_id` to `new_order`. Ids that are not in the
/// manifest are dropped, and so are canvases `new_order` omits; pass a full
/// permutation, or use [`reorder_canvases_strict`] to have that checked.
pub fn reorder_canvases(
    collection: &SourceManifests,
    manifest_id: &str,
    new_order: &[String],
) -> SourceManifests
{
    let mut out = collection.clone();

    let Some(manifest) = out.by_id.get_mut(manifest_id)
    else
    {
        return out;
    };

    let mut pool: BTreeMap<String, SourceCanvas> = manifest
        .canvases
        .drain(..)
        .map(|c| (c.id.clone(), c))
        .collect();

    let before = pool.len();
    manifest.canvases = new_order
        .iter()
        .filter_map(|id| pool.remove(id))
        .collect();

    if manifest.canvases.len() != before
    {
        debug!(
            manifest = manifest_id,
            dropped = before - manifest.canvases.len(),
            "reorder dropped canvases"
        );
    }

    out
}

/// Like [`reorder_canvases`] but rejects anything that is not an exact
/// permutation of the manifest's canvas ids.
pub fn reorder_canvases_strict(
    collection: &SourceManifests,
    manifest_id: &str,
    new_order: &[String],
) -> Result<SourceManifests, ManifestError>
{
    let manifest = collection
        .get(manifest_id)
        .ok_or_else(|| ManifestError::UnknownManifest(manifest_id.to_string()))?;

    let existing: HashSet<&str> = manifest
        .canvases
        .iter()
        .map(|c| c.id.as_str())
        .collect();
    let mut seen: HashSet<&str> = HashSet::new();

    for id in new_order
    {
        if !existing.contains(id.as_str())
        {
            return Err(ManifestError::UnknownCanvas {
                manifest: manifest_id.to_string(),
                canvas: id.clone(),
            });
        }

        if !seen.insert(id.as_str())
        {
            return Err(ManifestError::DuplicateCanvas {
                manifest: manifest_id.to_string(),
                canvas: id.clone(),
            });
        }
    }

    if let Some(missing) = manifest
        .canvases
        .iter()
        .find(|c| !seen.contains(c.id.as_str()))
    {
        return Err(ManifestError::MissingCanvas {
            manifest: manifest_id.to_string(),
            canvas: missing.id.clone(),
        });
    }

    Ok(reorder_canvases(collection, manifest_id, new_order))
}

/// Fold every manifest in `source_ids` into `target_id`: target canvases
/// first, then each source's canvases in the order given (canvas ids already
/// present are skipped). Merged sources are removed. When the target does
/// not exist the collection comes back unchanged.
pub fn merge_source_manifests(
    collection: &SourceManifests,
    source_ids: &[String],
    target_id: &str,
) -> SourceManifests
{
    if !collection.contains(target_id)
    {
        return collection.clone();
    }

    let mut out = collection.clone();
    let mut merged: Vec<SourceManifest> = Vec::new();

    for id in source_ids
    {
        if id == target_id
        {
            continue;
        }

        if let Some(source) = out.by_id.remove(id)
        {
            out.all_ids.retain(|x| x != id);
            merged.push(source);
        }
    }

    if let Some(target) = out.by_id.get_mut(target_id)
    {
        for source in merged
        {
            target.is_partial |= source.is_partial;
            target.union_canvases(source.canvases);
        }
    }

    out
}

/// Knobs for [`build_source_manifests`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOptions
{
    /// Loose files at the root become single-canvas manifests
    pub split_loose_files: bool,

    /// Shortest run that is reported as a detected pattern
    pub min_sequence_len: usize,
}

impl Default for BuildOptions
{
    fn default() -> Self
    {
        Self { split_loose_files: false, min_sequence_len: 2 }
    }
}

/// Derive provisional manifests from the snapshot as seen through `overlay`.
///
/// A directory marked with the `Manifest` intent becomes one manifest holding
/// every file beneath it. Otherwise each directory that directly contains
/// files becomes one manifest, and its sub-directories are visited in turn.
#[instrument(level = "debug", skip_all, fields(files = tree.total_files()))]
pub fn build_source_manifests(
    tree: &FileTree,
    overlay: &Overlay,
    options: &BuildOptions,
) -> SourceManifests
{
    let applied = apply_annotations_to_tree(tree, overlay);
    let mut out = SourceManifests::new();
    let mut crumbs = Vec::new();

    visit(applied.root(), &mut crumbs, options, &mut out);

    debug!(manifests = out.len(), canvases = out.canvas_count(), "source manifests built");
    out
}

fn visit(
    node: &FileTreeNode,
    crumbs: &mut Vec<String>,
    options: &BuildOptions,
    out: &mut SourceManifests,
)
{
    let is_root = node
        .path
        .is_empty();

    if node.intent == Some(StructuralIntent::Manifest) && !is_root
    {
        let mut files = Vec::new();
        collect_manifest_files(node, &mut files);
        let start = find_start_file(node);
        push_manifest(node, &files, start, crumbs, options, out);
        return;
    }

    if !node.files.is_empty()
    {
        if is_root && options.split_loose_files
        {
            for file in node.files.values()
            {
                let mut manifest = SourceManifest::new(
                    IdUtils::stable_id("manifest", &file.path),
                    file.label
                        .clone()
                        .unwrap_or_else(|| PathUtils::split_extension(&file.name).0.to_string()),
                )
                .with_canvases(vec![SourceCanvas::from_file(file)]);
                manifest.source_file = Some(file.path.clone());
                out.all_ids.push(manifest.id.clone());
                out.by_id.insert(manifest.id.clone(), manifest);
            }
        }
        else
        {
            let files: Vec<&FileEntry> = node
                .files
                .values()
                .collect();
            let start = node
                .start_file
                .as_ref()
                .map(|name| PathUtils::join(&node.path, name));
            push_manifest(node, &files, start, crumbs, options, out);
        }
    }

    if !is_root
    {
        crumbs.push(node.display_label().to_string());
    }

    for dir in node.directories.values()
    {
        visit(dir, crumbs, options, out);
    }

    if !is_root
    {
        crumbs.pop();
    }
}

/// Own files first, then each sub-directory depth-first
fn collect_manifest_files<'a>(
    node: &'a FileTreeNode,
    out: &mut Vec<&'a FileEntry>,
)
{
    out.extend(node.files.values());

    for dir in node.directories.values()
    {
        collect_manifest_files(dir, out);
    }
}

/// Nearest start file at or below `node`
pub(crate) fn find_start_file(node: &FileTreeNode) -> Option<String>
{
    if let Some(name) = &node.start_file
    {
        return Some(PathUtils::join(&node.path, name));
    }

    node.directories
        .values()
        .find_map(find_start_file)
}

fn push_manifest(
    node: &FileTreeNode,
    files: &[&FileEntry],
    start_path: Option<String>,
    crumbs: &[String],
    options: &BuildOptions,
    out: &mut SourceManifests,
)
{
    if files.is_empty()
    {
        return;
    }

    let label = match node.display_label()
    {
        "" => "Untitled".to_string(),
        l => l.to_string(),
    };

    let mut manifest = SourceManifest::new(IdUtils::stable_id("manifest", &node.path), label)
        .with_canvases(
            files
                .iter()
                .map(|f| SourceCanvas::from_file(f))
                .collect(),
        );

    manifest.breadcrumbs = crumbs.to_vec();
    manifest.source_dir = Some(node.path.clone());

    let names: Vec<&str> = files
        .iter()
        .map(|f| f.name.as_str())
        .collect();

    if let Some(seq) = detect_sequence(&names)
        && seq.members.len() >= options.min_sequence_len
    {
        manifest.is_partial = seq.is_partial();
        manifest.detected_pattern = Some(seq.template);
    }

    manifest.start_canvas = start_path.map(|path| IdUtils::stable_id("canvas", &path));

    out.all_ids.push(manifest.id.clone());
    out.by_id.insert(manifest.id.clone(), manifest);
}
