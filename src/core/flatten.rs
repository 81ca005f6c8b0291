//! Ordered, lazily expanded projection of the snapshot for virtualized display.
//!
//! Within a directory, sub-directories come before files and each group is in
//! display order (case-folded, numeric-aware). Children are only emitted for
//! directories whose path is expanded, so cost is bounded by what is visible.
//! The output is derived data; nothing here is authoritative.

use std::collections::HashSet;

use moka::sync::Cache;
use serde::Serialize;

use crate::{
    core::{
        annotations::{NodeAnnotations, Overlay},
        snapshot::{FileEntry, FileTree, FileTreeNode},
    },
    infra::utils::{NameOrder, PathUtils},
};

/// One visible row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlatFileTreeNode
{
    pub path: String,
    pub name: String,
    pub depth: usize,
    pub is_directory: bool,
    pub file: Option<FileEntry>,

    /// Direct children (directories + files)
    pub child_count: usize,

    /// Recursive file count; zero for files
    pub total_file_count: usize,

    pub is_expanded: bool,
    pub annotations: NodeAnnotations,
}

/// Memoized recursive file counts keyed by `(tree version, path)`
#[derive(Clone)]
pub struct FileCountCache
{
    inner: Cache<(u64, String), usize>,
}

impl FileCountCache
{
    pub fn new(capacity: u64) -> Self
    {
        Self { inner: Cache::new(capacity) }
    }

    pub fn count(
        &self,
        tree: &FileTree,
        node: &FileTreeNode,
    ) -> usize
    {
        self.inner
            .get_with((tree.version(), node.path.clone()), || node.count_files())
    }

    pub fn entry_count(&self) -> u64
    {
        self.inner.run_pending_tasks();
        self.inner.entry_count()
    }
}

impl Default for FileCountCache
{
    fn default() -> Self
    {
        Self::new(50_000)
    }
}

/// Flatten `tree` starting below the root at `depth`.
pub fn flatten_file_tree(
    tree: &FileTree,
    expanded_paths: &HashSet<String>,
    overlay: &Overlay,
    depth: usize,
) -> Vec<FlatFileTreeNode>
{
    let mut out = Vec::new();
    flatten_dir(tree.root(), expanded_paths, overlay, depth, &|n| n.count_files(), &mut out);
    out
}

/// Same as [`flatten_file_tree`] with recursive counts served from `cache`
pub fn flatten_file_tree_cached(
    tree: &FileTree,
    expanded_paths: &HashSet<String>,
    overlay: &Overlay,
    depth: usize,
    cache: &FileCountCache,
) -> Vec<FlatFileTreeNode>
{
    let mut out = Vec::new();
    flatten_dir(
        tree.root(),
        expanded_paths,
        overlay,
        depth,
        &|n| cache.count(tree, n),
        &mut out,
    );
    out
}

/// Every directory path, for a fully expanded projection
pub fn expand_all(tree: &FileTree) -> HashSet<String>
{
    tree.dir_paths()
        .into_iter()
        .collect()
}

fn flatten_dir(
    node: &FileTreeNode,
    expanded: &HashSet<String>,
    overlay: &Overlay,
    depth: usize,
    count: &dyn Fn(&FileTreeNode) -> usize,
    out: &mut Vec<FlatFileTreeNode>,
)
{
    let mut dirs: Vec<&FileTreeNode> = node
        .directories
        .values()
        .collect();
    dirs.sort_by(|a, b| NameOrder::compare(&a.name, &b.name));

    for dir in dirs
    {
        let is_expanded = expanded.contains(&dir.path);

        out.push(FlatFileTreeNode {
            path: dir.path.clone(),
            name: dir.name.clone(),
            depth,
            is_directory: true,
            file: None,
            child_count: dir.directories.len() + dir.files.len(),
            total_file_count: count(dir),
            is_expanded,
            annotations: overlay.resolve(&dir.path),
        });

        if is_expanded
        {
            flatten_dir(dir, expanded, overlay, depth + 1, count, out);
        }
    }

    let mut files: Vec<&FileEntry> = node
        .files
        .values()
        .collect();
    files.sort_by(|a, b| NameOrder::compare(&a.name, &b.name));

    for file in files
    {
        out.push(FlatFileTreeNode {
            path: file.path.clone(),
            name: file.name.clone(),
            depth,
            is_directory: false,
            file: Some(file.clone()),
            child_count: 0,
            total_file_count: 0,
            is_expanded: false,
            annotations: overlay.resolve(&file.path),
        });
    }
}

/// Case-insensitive text filter that keeps matches plus their ancestors,
/// in the original order. An empty query keeps everything.
pub fn filter_flat_nodes(
    nodes: &[FlatFileTreeNode],
    query: &str,
) -> Vec<FlatFileTreeNode>
{
    let needle = query
        .trim()
        .to_lowercase();

    if needle.is_empty()
    {
        return nodes.to_vec();
    }

    let matches = |n: &FlatFileTreeNode| {
        n.name
            .to_lowercase()
            .contains(&needle)
            || n.annotations
                .label
                .as_deref()
                .is_some_and(|l| l.to_lowercase().contains(&needle))
    };

    let mut keep: HashSet<&str> = HashSet::new();

    for node in nodes
        .iter()
        .filter(|n| matches(n))
    {
        keep.insert(node.path.as_str());
        keep.extend(PathUtils::ancestors(&node.path));
    }

    nodes
        .iter()
        .filter(|n| keep.contains(n.path.as_str()))
        .cloned()
        .collect()
}

/// Rows `offset..offset + len`, clamped to the list
pub fn visible_window(
    nodes: &[FlatFileTreeNode],
    offset: usize,
    len: usize,
) -> &[FlatFileTreeNode]
{
    let start = offset.min(nodes.len());
    let end = start
        .saturating_add(len)
        .min(nodes.len());
    &nodes[start..end]
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::core::snapshot::FileHandle;

    fn tree() -> FileTree
    {
        FileTree::from_handles(vec![
            FileHandle::new("b.jpg", 1),
            FileHandle::new("Zeta/1.jpg", 1),
            FileHandle::new("alpha/sub/x.jpg", 1),
            FileHandle::new("alpha/2.jpg", 1),
            FileHandle::new("alpha/10.jpg", 1),
            FileHandle::new("A.jpg", 1),
        ])
        .unwrap()
    }

    fn paths(nodes: &[FlatFileTreeNode]) -> Vec<&str>
    {
        nodes
            .iter()
            .map(|n| n.path.as_str())
            .collect()
    }

    #[test]
    fn collapsed_tree_shows_top_level_only()
    {
        let nodes = flatten_file_tree(&tree(), &HashSet::new(), &Overlay::new(), 0);
        assert_eq!(paths(&nodes), vec!["alpha", "Zeta", "A.jpg", "b.jpg"]);

        let alpha = &nodes[0];
        assert!(alpha.is_directory);
        assert_eq!(alpha.child_count, 3);
        assert_eq!(alpha.total_file_count, 3);
        assert!(!alpha.is_expanded);
    }

    #[test]
    fn expansion_emits_children_directories_first()
    {
        let expanded: HashSet<String> = ["alpha".to_string()].into();
        let nodes = flatten_file_tree(&tree(), &expanded, &Overlay::new(), 0);

        assert_eq!(
            paths(&nodes),
            vec!["alpha", "alpha/sub", "alpha/2.jpg", "alpha/10.jpg", "Zeta", "A.jpg", "b.jpg"]
        );
        assert_eq!(nodes[1].depth, 1);
        assert!(nodes[0].is_expanded);
    }

    #[test]
    fn cached_counts_match_and_are_memoized()
    {
        let tree = tree();
        let cache = FileCountCache::new(100);
        let all = expand_all(&tree);

        let plain = flatten_file_tree(&tree, &all, &Overlay::new(), 0);
        let cached = flatten_file_tree_cached(&tree, &all, &Overlay::new(), 0, &cache);

        assert_eq!(plain, cached);
        assert_eq!(cache.entry_count(), 3);
    }

    #[test]
    fn annotations_are_resolved_per_row()
    {
        let mut overlay = Overlay::new();
        overlay.set_label("alpha", Some("Album".into()));

        let nodes = flatten_file_tree(&tree(), &HashSet::new(), &overlay, 0);
        assert_eq!(nodes[0].annotations.label.as_deref(), Some("Album"));
        assert!(nodes[1].annotations.is_empty());
    }

    #[test]
    fn filter_keeps_ancestors_of_matches()
    {
        let tree = tree();
        let nodes = flatten_file_tree(&tree, &expand_all(&tree), &Overlay::new(), 0);

        let hits = filter_flat_nodes(&nodes, "X.JPG");
        assert_eq!(paths(&hits), vec!["alpha", "alpha/sub", "alpha/sub/x.jpg"]);
        assert_eq!(filter_flat_nodes(&nodes, "  ").len(), nodes.len());
    }

    #[test]
    fn window_is_clamped()
    {
        let nodes = flatten_file_tree(&tree(), &HashSet::new(), &Overlay::new(), 0);
        assert_eq!(visible_window(&nodes, 2, 10).len(), 2);
        assert!(visible_window(&nodes, 10, 10).is_empty());
    }
}
