//! Filepath: src/core/edits.rs
//! Declarative staging edits loaded from a JSON or TOML file.
//!
//! Lets the CLI replay overlay and layout edits non-interactively. Every
//! edit goes through the same validating operations an interactive caller
//! would use; references that resolve to nothing become warnings.
//!
//! ```toml
//! [annotations."book"]
//! intent = "manifest"
//! behaviors = ["paged"]
//!
//! [[merges]]
//! target = "book"
//! sources = ["book-extras"]
//!
//! [[collections]]
//! name = "Letters"
//! manifests = ["letters/1923"]
//! ```

use std::{collections::BTreeMap, fs, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::{
    annotations::{NodeAnnotations, Overlay},
    diagnostics::{Warning, WarningKind},
    layout::{ArchiveLayout, LayoutError},
    manifest::{SourceManifests, merge_source_manifests},
    snapshot::FileTree,
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StagingEdits
{
    /// Overlay entries keyed by snapshot path
    pub annotations: BTreeMap<String, NodeAnnotations>,

    /// Directories whose inheritable overrides are copied downwards
    pub cascade: Vec<String>,

    pub merges: Vec<MergeEdit>,
    pub collections: Vec<CollectionEdit>,
}

/// Manifest references accept an id, a source directory path or a label
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeEdit
{
    pub target: String,
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionEdit
{
    pub name: String,

    #[serde(default)]
    pub manifests: Vec<String>,

    #[serde(default)]
    pub children: Vec<CollectionEdit>,
}

impl StagingEdits
{
    /// Parse by extension: `.toml` as TOML, anything else as JSON
    pub fn load(path: &Path) -> Result<Self>
    {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read edits file {}", path.display()))?;

        let is_toml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("toml"));

        if is_toml
        {
            toml::from_str(&text)
                .with_context(|| format!("Failed to parse TOML edits {}", path.display()))
        }
        else
        {
            serde_json::from_str(&text)
                .with_context(|| format!("Failed to parse JSON edits {}", path.display()))
        }
    }

    pub fn is_empty(&self) -> bool
    {
        *self == Self::default()
    }

    /// Install overlay entries, then run cascades
    pub fn apply_annotations(
        &self,
        tree: &FileTree,
        overlay: &mut Overlay,
    ) -> Vec<Warning>
    {
        let mut warnings = Vec::new();

        for (path, ann) in &self.annotations
        {
            if tree
                .find_dir(path)
                .is_none()
                && tree
                    .find_file(path)
                    .is_none()
            {
                warnings.push(Warning::new(
                    WarningKind::UnknownTarget,
                    path.clone(),
                    "annotation targets a path that is not in the snapshot",
                ));
                continue;
            }

            warnings.extend(overlay.insert(tree, path, ann.clone()));
        }

        for path in &self.cascade
        {
            if tree
                .find_dir(path)
                .is_none()
            {
                warnings.push(Warning::new(
                    WarningKind::UnknownTarget,
                    path.clone(),
                    "cascade targets a directory that is not in the snapshot",
                ));
                continue;
            }

            overlay.cascade(tree, path);
        }

        debug!(entries = overlay.len(), warnings = warnings.len(), "annotation edits applied");
        warnings
    }

    /// Run merge edits in file order
    pub fn apply_merges(
        &self,
        manifests: &SourceManifests,
    ) -> (SourceManifests, Vec<Warning>)
    {
        let mut out = manifests.clone();
        let mut warnings = Vec::new();

        for merge in &self.merges
        {
            let Some(target) = resolve_manifest_ref(&out, &merge.target)
            else
            {
                warnings.push(unknown_manifest(&merge.target));
                continue;
            };

            let mut sources = Vec::with_capacity(merge.sources.len());
            for reference in &merge.sources
            {
                match resolve_manifest_ref(&out, reference)
                {
                    Some(id) => sources.push(id),
                    None => warnings.push(unknown_manifest(reference)),
                }
            }

            out = merge_source_manifests(&out, &sources, &target);
        }

        (out, warnings)
    }

    /// Create the declared collections under the layout root
    pub fn apply_collections(
        &self,
        layout: &mut ArchiveLayout,
        manifests: &SourceManifests,
    ) -> Result<Vec<Warning>, LayoutError>
    {
        let mut warnings = Vec::new();

        for edit in &self.collections
        {
            create_collection(edit, None, layout, manifests, &mut warnings)?;
        }

        Ok(warnings)
    }
}

fn create_collection(
    edit: &CollectionEdit,
    parent: Option<&str>,
    layout: &mut ArchiveLayout,
    manifests: &SourceManifests,
    warnings: &mut Vec<Warning>,
) -> Result<(), LayoutError>
{
    let id = layout.create_collection(&edit.name, parent)?;

    let mut ids = Vec::with_capacity(edit.manifests.len());
    for reference in &edit.manifests
    {
        match resolve_manifest_ref(manifests, reference)
        {
            Some(m) => ids.push(m),
            None => warnings.push(unknown_manifest(reference)),
        }
    }
    layout.add_to_collection(&id, &ids)?;

    for child in &edit.children
    {
        create_collection(child, Some(&id), layout, manifests, warnings)?;
    }

    Ok(())
}

/// Resolve a manifest by id, then by source directory or file, then by
/// unique label
pub fn resolve_manifest_ref(
    manifests: &SourceManifests,
    reference: &str,
) -> Option<String>
{
    if manifests.contains(reference)
    {
        return Some(reference.to_string());
    }

    if let Some(m) = manifests
        .iter()
        .find(|m| {
            m.source_dir.as_deref() == Some(reference)
                || m.source_file.as_deref() == Some(reference)
        })
    {
        return Some(m.id.clone());
    }

    let mut by_label = manifests
        .iter()
        .filter(|m| m.label == reference);

    match (by_label.next(), by_label.next())
    {
        (Some(m), None) => Some(m.id.clone()),
        _ => None,
    }
}

fn unknown_manifest(reference: &str) -> Warning
{
    Warning::new(
        WarningKind::UnknownTarget,
        reference,
        "no manifest matches this id, directory or label",
    )
}
