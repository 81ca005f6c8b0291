//! Filepath: src/core/snapshot.rs
//! Immutable-by-convention snapshot of the picked files.
//!
//! Built once per session from file handles (or from a directory walk) and
//! then only read. Every node carries a canonical `/`-separated path relative
//! to the picked root; that path is the join key for the overlay, the
//! flattener and the manifest builder. The root itself has path `""`.
//!
//! Directories and files live in insertion-ordered maps that are sorted by
//! display order once at build time, so traversal never depends on the
//! order the file system enumerated entries in.

use std::{
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    core::annotations::{BehaviorSet, StructuralIntent, ViewingDirection},
    infra::{
        utils::{NameOrder, PathUtils},
        walk::FileWalker,
    },
};

static NEXT_TREE_VERSION: AtomicU64 = AtomicU64::new(1);

/// One picked file as delivered by the file-picking collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHandle
{
    /// Path relative to the picked root (any separator)
    pub path: String,

    /// Size in bytes
    pub size: u64,

    /// Where the content can be read from, if anywhere
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,
}

impl FileHandle
{
    pub fn new(
        path: impl Into<String>,
        size: u64,
    ) -> Self
    {
        Self { path: path.into(), size, source: None }
    }

    pub fn with_source(
        mut self,
        source: impl Into<PathBuf>,
    ) -> Self
    {
        self.source = Some(source.into());
        self
    }
}

/// A file leaf in the snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry
{
    pub name: String,
    pub path: String,
    pub size: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,

    /// Display label; defaults to the name when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    #[serde(default, skip_serializing_if = "BehaviorSet::is_empty")]
    pub behaviors: BehaviorSet,
}

/// A directory in the snapshot. The scalar fields are legacy defaults that
/// the overlay supersedes when it carries a value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileTreeNode
{
    pub name: String,
    pub path: String,

    pub directories: IndexMap<String, FileTreeNode>,
    pub files: IndexMap<String, FileEntry>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<StructuralIntent>,

    #[serde(default, skip_serializing_if = "BehaviorSet::is_empty")]
    pub behaviors: BehaviorSet,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewing_direction: Option<ViewingDirection>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rights: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nav_date: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    /// Name of the file in this directory marked as start
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_file: Option<String>,
}

impl FileTreeNode
{
    fn new_dir(
        name: String,
        path: String,
    ) -> Self
    {
        Self { name, path, ..Default::default() }
    }

    /// Recursive file count; the flattener memoizes this per version
    pub fn count_files(&self) -> usize
    {
        self.files.len()
            + self
                .directories
                .values()
                .map(FileTreeNode::count_files)
                .sum::<usize>()
    }

    /// This directory's path followed by every descendant directory
    /// path, in traversal order
    pub fn collect_dir_paths(
        &self,
        out: &mut Vec<String>,
    )
    {
        out.push(self.path.clone());

        for dir in self.directories.values()
        {
            dir.collect_dir_paths(out);
        }
    }

    /// Files in traversal order: directories first, then own files
    pub fn collect_files<'a>(
        &'a self,
        out: &mut Vec<&'a FileEntry>,
    )
    {
        for dir in self.directories.values()
        {
            dir.collect_files(out);
        }

        out.extend(self.files.values());
    }

    /// Display label: explicit label, else the directory name
    pub fn display_label(&self) -> &str
    {
        self.label
            .as_deref()
            .unwrap_or(&self.name)
    }

    /// Re-sort both maps into display order, recursively
    fn sort_recursive(&mut self)
    {
        self.directories
            .sort_by(|a, _, b, _| NameOrder::compare(a, b));
        self.files
            .sort_by(|a, _, b, _| NameOrder::compare(a, b));

        for dir in self.directories.values_mut()
        {
            dir.sort_recursive();
        }
    }
}

/// Errors raised while building a snapshot
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SnapshotError
{
    #[error("no files were picked")]
    EmptyFileSet,

    #[error("invalid file path: {0:?}")]
    InvalidPath(String),

    #[error("duplicate file path: {0}")]
    DuplicatePath(String),

    #[error("path is used both as a file and a directory: {0}")]
    FileDirectoryClash(String),
}

/// The snapshot root plus a version token for memoization. The root is
/// read-only; any change goes through [`FileTree::into_root`] and
/// [`FileTree::from_root`], so a version always names one structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileTree
{
    root: FileTreeNode,

    #[serde(skip, default = "next_version")]
    version: u64,
}

fn next_version() -> u64
{
    NEXT_TREE_VERSION.fetch_add(1, Ordering::Relaxed)
}

/// Equality is structural; the version token only keys caches
impl PartialEq for FileTree
{
    fn eq(
        &self,
        other: &Self,
    ) -> bool
    {
        self.root == other.root
    }
}

impl Eq for FileTree {}

impl FileTree
{
    /// Wrap an already-built root, assigning a fresh version
    pub fn from_root(root: FileTreeNode) -> Self
    {
        Self { root, version: next_version() }
    }

    /// Build the snapshot from picked file handles.
    /// An empty handle list is a fatal error for the session.
    pub fn from_handles(handles: Vec<FileHandle>) -> Result<Self, SnapshotError>
    {
        Self::from_handles_named("", handles)
    }

    /// Same as [`FileTree::from_handles`] with a display name for the root
    pub fn from_handles_named(
        root_name: &str,
        handles: Vec<FileHandle>,
    ) -> Result<Self, SnapshotError>
    {
        if handles.is_empty()
        {
            return Err(SnapshotError::EmptyFileSet);
        }

        let mut root = FileTreeNode::new_dir(root_name.to_string(), String::new());

        for handle in handles
        {
            insert_handle(&mut root, handle)?;
        }

        root.sort_recursive();

        let tree = Self::from_root(root);
        debug!(files = tree.total_files(), version = tree.version, "snapshot built");

        Ok(tree)
    }

    /// Walk `root` with `walker` and build the snapshot from what it finds
    pub fn scan(
        root: &Path,
        walker: &FileWalker,
    ) -> Result<Self, SnapshotError>
    {
        let handles = walker.walk_handles(root);
        info!(root = %root.display(), files = handles.len(), "scanned picked directory");

        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        Self::from_handles_named(&name, handles)
    }

    pub fn version(&self) -> u64
    {
        self.version
    }

    pub fn root(&self) -> &FileTreeNode
    {
        &self.root
    }

    /// Give up the root for editing; rewrap it with [`FileTree::from_root`]
    pub fn into_root(self) -> FileTreeNode
    {
        self.root
    }

    pub fn find_dir(
        &self,
        path: &str,
    ) -> Option<&FileTreeNode>
    {
        let path = PathUtils::normalize(path)?;
        let mut cur = &self.root;

        if path.is_empty()
        {
            return Some(cur);
        }

        for seg in path.split('/')
        {
            cur = cur.directories.get(seg)?;
        }

        Some(cur)
    }

    pub fn find_file(
        &self,
        path: &str,
    ) -> Option<&FileEntry>
    {
        let path = PathUtils::normalize(path)?;
        let dir = self.find_dir(PathUtils::parent(&path))?;

        dir.files
            .get(PathUtils::file_name(&path))
    }

    pub fn total_files(&self) -> usize
    {
        self.root.count_files()
    }

    /// Every file in traversal order
    pub fn files(&self) -> Vec<&FileEntry>
    {
        let mut out = Vec::new();
        self.root.collect_files(&mut out);
        out
    }

    /// Every directory path (root included as `""`) in traversal order
    pub fn dir_paths(&self) -> Vec<String>
    {
        let mut out = Vec::new();
        self.root.collect_dir_paths(&mut out);
        out
    }
}

fn insert_handle(
    root: &mut FileTreeNode,
    handle: FileHandle,
) -> Result<(), SnapshotError>
{
    let path = PathUtils::normalize(&handle.path)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| SnapshotError::InvalidPath(handle.path.clone()))?;

    let mut cur = root;
    let segments: Vec<&str> = path.split('/').collect();
    let (file_name, dirs) = match segments.split_last()
    {
        Some(split) => split,
        None => return Err(SnapshotError::InvalidPath(handle.path)),
    };

    for seg in dirs
    {
        if cur.files.contains_key(*seg)
        {
            return Err(SnapshotError::FileDirectoryClash(PathUtils::join(&cur.path, seg)));
        }

        let child_path = PathUtils::join(&cur.path, seg);
        cur = cur
            .directories
            .entry(seg.to_string())
            .or_insert_with(|| FileTreeNode::new_dir(seg.to_string(), child_path));
    }

    if cur.directories.contains_key(*file_name)
    {
        return Err(SnapshotError::FileDirectoryClash(path));
    }

    if cur.files.contains_key(*file_name)
    {
        return Err(SnapshotError::DuplicatePath(path));
    }

    cur.files.insert(
        file_name.to_string(),
        FileEntry {
            name: file_name.to_string(),
            path: path.clone(),
            size: handle.size,
            source: handle.source,
            label: None,
            behaviors: BehaviorSet::new(),
        },
    );

    Ok(())
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn handles(paths: &[&str]) -> Vec<FileHandle>
    {
        paths
            .iter()
            .map(|p| FileHandle::new(*p, 1))
            .collect()
    }

    #[test]
    fn builds_nested_directories_in_display_order()
    {
        let tree =
            FileTree::from_handles(handles(&["b/2.jpg", "a/10.jpg", "a/9.jpg", "root.txt"])).unwrap();

        let top: Vec<&str> = tree
            .root
            .directories
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(top, vec!["a", "b"]);

        let a = tree.find_dir("a").unwrap();
        let files: Vec<&str> = a
            .files
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(files, vec!["9.jpg", "10.jpg"]);
        assert_eq!(tree.find_file("a/10.jpg").unwrap().path, "a/10.jpg");
        assert_eq!(tree.total_files(), 4);
    }

    #[test]
    fn empty_file_set_is_fatal()
    {
        assert_eq!(FileTree::from_handles(Vec::new()), Err(SnapshotError::EmptyFileSet));
    }

    #[test]
    fn rejects_duplicates_and_clashes()
    {
        assert_eq!(
            FileTree::from_handles(handles(&["a/1.jpg", "a\\1.jpg"])),
            Err(SnapshotError::DuplicatePath("a/1.jpg".into()))
        );
        assert_eq!(
            FileTree::from_handles(handles(&["a", "a/1.jpg"])),
            Err(SnapshotError::FileDirectoryClash("a".into()))
        );
        assert_eq!(
            FileTree::from_handles(handles(&["../x.jpg"])),
            Err(SnapshotError::InvalidPath("../x.jpg".into()))
        );
    }

    #[test]
    fn traversal_lists_directories_before_files()
    {
        let tree = FileTree::from_handles(handles(&["z.jpg", "a/1.jpg", "a/b/2.jpg"])).unwrap();
        let paths: Vec<&str> = tree
            .files()
            .into_iter()
            .map(|f| f.path.as_str())
            .collect();
        assert_eq!(paths, vec!["a/b/2.jpg", "a/1.jpg", "z.jpg"]);
        assert_eq!(tree.dir_paths(), vec!["".to_string(), "a".into(), "a/b".into()]);
    }

    #[test]
    fn versions_differ_but_equality_is_structural()
    {
        let a = FileTree::from_handles(handles(&["x/1.jpg"])).unwrap();
        let b = FileTree::from_handles(handles(&["x/1.jpg"])).unwrap();
        assert_ne!(a.version(), b.version());

        // Clones share a version; an edited root is a new version
        let c = a.clone();
        assert_eq!(c.version(), a.version());
        let mut root = c.into_root();
        root.label = Some("Renamed".into());
        let d = FileTree::from_root(root);
        assert_ne!(d.version(), a.version());
        assert_eq!(a, b);
    }
}
