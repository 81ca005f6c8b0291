//! Pure clone-and-filter of a snapshot under an overlay.
//!
//! Nothing here mutates its inputs, and identical inputs always produce
//! structurally identical output, so callers may run it speculatively for
//! previews. Applying the same overlay twice changes nothing the second time.

use std::collections::BTreeMap;

use tracing::instrument;

use crate::{
    core::{
        annotations::Overlay,
        diagnostics::{Warning, WarningKind},
        snapshot::{FileEntry, FileTree, FileTreeNode},
    },
    infra::utils::PathUtils,
};

/// Fold `overlay` into a fresh copy of `tree`.
///
/// - excluded files are dropped
/// - excluded directories drop their whole subtree without consulting any
///   descendant annotation
/// - scalar fields take the overlay value when present, else keep the original
/// - a kept file marked `start` becomes its directory's start file; when several
///   are marked the last in traversal order wins
#[instrument(level = "debug", skip_all, fields(overlay_entries = overlay.len()))]
pub fn apply_annotations_to_tree(
    tree: &FileTree,
    overlay: &Overlay,
) -> FileTree
{
    FileTree::from_root(apply_dir(tree.root(), overlay))
}

fn apply_dir(
    node: &FileTreeNode,
    overlay: &Overlay,
) -> FileTreeNode
{
    let ann = overlay.resolve(&node.path);

    let mut out = FileTreeNode {
        name: node.name.clone(),
        path: node.path.clone(),
        directories: Default::default(),
        files: Default::default(),
        label: ann
            .label
            .or_else(|| node.label.clone()),
        intent: ann.intent.or(node.intent),
        behaviors: ann
            .behaviors
            .unwrap_or_else(|| node.behaviors.clone()),
        viewing_direction: ann
            .viewing_direction
            .or(node.viewing_direction),
        rights: ann
            .rights
            .or_else(|| node.rights.clone()),
        nav_date: ann
            .nav_date
            .or_else(|| node.nav_date.clone()),
        provider: ann
            .provider
            .or_else(|| node.provider.clone()),
        start_file: None,
    };

    let mut start_file = None;

    for (name, file) in &node.files
    {
        let path = PathUtils::join(&node.path, name);
        let file_ann = overlay.resolve(&path);

        if file_ann.excluded
        {
            continue;
        }

        if file_ann.start
        {
            start_file = Some(name.clone());
        }

        out.files.insert(
            name.clone(),
            FileEntry {
                label: file_ann
                    .label
                    .or_else(|| file.label.clone()),
                behaviors: file_ann
                    .behaviors
                    .unwrap_or_else(|| file.behaviors.clone()),
                ..file.clone()
            },
        );
    }

    // Keep the inherited start file only while that file survives
    out.start_file = start_file.or_else(|| {
        node.start_file
            .clone()
            .filter(|name| out.files.contains_key(name))
    });

    for (name, dir) in &node.directories
    {
        if overlay.is_excluded(&dir.path)
        {
            continue;
        }

        out.directories
            .insert(name.clone(), apply_dir(dir, overlay));
    }

    out
}

/// Report manifest scopes that carry more than one start marker. A scope
/// is a plain directory, or a whole `Manifest`-intent subtree. Uses the
/// snapshot, not the applied tree, so excluded files are not reported.
pub fn validate_start_markers(
    tree: &FileTree,
    overlay: &Overlay,
) -> Vec<Warning>
{
    let mut by_scope: BTreeMap<String, Vec<&str>> = BTreeMap::new();

    for (path, ann) in overlay.iter()
    {
        if !ann.start || overlay.is_excluded_effective(path) || tree.find_file(path).is_none()
        {
            continue;
        }

        by_scope
            .entry(overlay.start_scope(tree, path))
            .or_default()
            .push(path);
    }

    by_scope
        .into_iter()
        .filter(|(_, marked)| marked.len() > 1)
        .map(|(scope, marked)| {
            Warning::new(
                WarningKind::MultipleStartMarkers,
                scope,
                format!("{} files marked as start ({})", marked.len(), marked.join(", ")),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::core::{
        annotations::{BehaviorTag, NodeAnnotations, StructuralIntent},
        snapshot::FileHandle,
    };

    fn tree() -> FileTree
    {
        FileTree::from_handles(vec![
            FileHandle::new("A/1.jpg", 1),
            FileHandle::new("A/2.jpg", 1),
            FileHandle::new("B/1.jpg", 1),
        ])
        .unwrap()
    }

    #[test]
    fn cascading_exclusion_ignores_descendant_annotations()
    {
        let tree = tree();
        let mut overlay = Overlay::new();
        overlay.set_excluded("A", true);
        overlay.set_label("A/1.jpg", Some("Front".into()));
        overlay.set_start(&tree, "A/1.jpg", true);

        let out = apply_annotations_to_tree(&tree, &overlay);

        assert_eq!(out.dir_paths(), vec!["".to_string(), "B".to_string()]);
        assert!(out.find_file("B/1.jpg").is_some());
        assert_eq!(out.total_files(), 1);
    }

    #[test]
    fn overrides_win_and_originals_are_inherited()
    {
        let tree = tree();
        let mut overlay = Overlay::new();
        overlay.set_intent(&tree, "A", Some(StructuralIntent::Manifest));
        overlay.add_behavior("A", BehaviorTag::Paged);
        overlay.set_label("A/2.jpg", Some("Back".into()));

        let out = apply_annotations_to_tree(&tree, &overlay);
        let a = out.find_dir("A").unwrap();

        assert_eq!(a.intent, Some(StructuralIntent::Manifest));
        assert!(a.behaviors.contains(BehaviorTag::Paged));
        assert_eq!(out.find_file("A/2.jpg").unwrap().label.as_deref(), Some("Back"));
        // Untouched directory keeps its (empty) originals
        let b = out.find_dir("B").unwrap();
        assert_eq!(b.intent, None);
        assert!(b.behaviors.is_empty());
    }

    #[test]
    fn start_file_recorded_and_excluded_start_dropped()
    {
        let tree = tree();
        let mut overlay = Overlay::new();
        overlay.set_start(&tree, "A/2.jpg", true);

        let out = apply_annotations_to_tree(&tree, &overlay);
        assert_eq!(out.find_dir("A").unwrap().start_file.as_deref(), Some("2.jpg"));

        // Re-apply with the start file excluded: inherited marker vanishes
        let mut second = Overlay::new();
        second.set_excluded("A/2.jpg", true);
        let again = apply_annotations_to_tree(&out, &second);
        assert_eq!(again.find_dir("A").unwrap().start_file, None);
    }

    #[test]
    fn last_start_marker_in_traversal_order_wins()
    {
        let tree = tree();
        // Bypass the unique-start setter to model raw conflicting input
        let overlay: Overlay = serde_json::from_value(serde_json::json!({
            "A/1.jpg": { "start": true },
            "A/2.jpg": { "start": true },
        }))
        .unwrap();

        let out = apply_annotations_to_tree(&tree, &overlay);
        assert_eq!(out.find_dir("A").unwrap().start_file.as_deref(), Some("2.jpg"));

        let warnings = validate_start_markers(&tree, &overlay);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].kind, WarningKind::MultipleStartMarkers);
        assert_eq!(warnings[0].subject.as_deref(), Some("A"));
    }

    #[test]
    fn start_markers_are_counted_per_manifest_subtree()
    {
        let tree = FileTree::from_handles(vec![
            FileHandle::new("obj/front.jpg", 1),
            FileHandle::new("obj/detail/a.jpg", 1),
        ])
        .unwrap();

        // Markers set before the intent made them share one manifest
        let mut overlay = Overlay::new();
        overlay.set_start(&tree, "obj/detail/a.jpg", true);
        overlay.set_start(&tree, "obj/front.jpg", true);
        assert!(validate_start_markers(&tree, &overlay).is_empty());

        overlay.set_intent(&tree, "obj", Some(StructuralIntent::Manifest));
        let warnings = validate_start_markers(&tree, &overlay);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].kind, WarningKind::MultipleStartMarkers);
        assert_eq!(warnings[0].subject.as_deref(), Some("obj"));

        // Re-marking through the setter resolves the conflict
        overlay.set_start(&tree, "obj/detail/a.jpg", true);
        assert!(validate_start_markers(&tree, &overlay).is_empty());
        assert!(!overlay.resolve("obj/front.jpg").start);
    }

    #[test]
    fn apply_does_not_mutate_inputs_and_is_idempotent()
    {
        let tree = tree();
        let before = tree.clone();
        let mut overlay = Overlay::new();
        overlay.set_excluded("A/1.jpg", true);
        overlay.set_rights("B", Some("rights".into()));
        let overlay_before = overlay.clone();

        let once = apply_annotations_to_tree(&tree, &overlay);
        let twice = apply_annotations_to_tree(&once, &overlay);

        assert_eq!(once, twice);
        assert_eq!(tree, before);
        assert_eq!(overlay, overlay_before);
        assert!(NodeAnnotations::default().is_empty());
    }
}
