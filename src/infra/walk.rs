//! Filepath: src/infra/walk.rs
//! Gitignore-aware walker that turns a picked directory into file handles.
//! - Respects .gitignore, .git/info/exclude, and global gitignore
//! - Extra ignore globs (early prune + late filter)
//! - Optional extension allow-list (e.g. "jpg", "tif", "wav")
//! - Optional hidden file policy, following symlinks, and max depth
//! - Deterministic ordering for stable tests/CI
//!
//! Backed by ripgrep's `ignore` crate and `globset`.

use std::path::{Path, PathBuf};

use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::{DirEntry, WalkBuilder};
use tracing::{trace, warn};

use crate::core::snapshot::FileHandle;

/// Gitignore-aware walker with optional extra ignore globs and filters.
/// Extra globs are applied in two places:
///   1) Early: prune directories during traversal (filter_entry).
///   2) Late: filter out files that still slipped through.
pub struct FileWalker
{
    /// Compiled set of additional ignore patterns
    ignore_patterns: GlobSet,

    /// Lowercase extensions to keep; empty keeps everything
    extensions: Vec<String>,

    /// Include hidden (dot) files; default false for media trees
    include_hidden: bool,

    /// Follow symbolic links; default false
    follow_symlinks: bool,

    /// Maximum recursion depth; default None (unbounded)
    max_depth: Option<usize>,
}

impl FileWalker
{
    /// Build a walker with additional ignore patterns (e.g. "**/Thumbs.db",
    /// "**/.DS_Store", "scratch/**"). Patterns match on (relative) paths.
    pub fn new(additional_ignores: &[String]) -> Result<Self>
    {
        let mut builder = GlobSetBuilder::new();

        for pattern in additional_ignores
        {
            builder.add(Glob::new(pattern)?);
        }

        Ok(Self {
            ignore_patterns: builder.build()?,
            extensions: Vec::new(),
            include_hidden: false,
            follow_symlinks: false,
            max_depth: None,
        })
    }

    /// (Optional) Keep only files whose extension is in `exts`
    /// (case-insensitive, with or without the leading dot).
    pub fn with_extensions(
        mut self,
        exts: &[String],
    ) -> Self
    {
        self.extensions = exts
            .iter()
            .map(|e| {
                e.trim_start_matches('.')
                    .to_ascii_lowercase()
            })
            .filter(|e| !e.is_empty())
            .collect();
        self
    }

    /// (Optional) Include or exclude hidden files (dotfiles).
    pub fn with_include_hidden(
        mut self,
        include_hidden: bool,
    ) -> Self
    {
        self.include_hidden = include_hidden;
        self
    }

    /// (Optional) Follow or skip symbolic links (default false).
    pub fn with_follow_symlinks(
        mut self,
        follow: bool,
    ) -> Self
    {
        self.follow_symlinks = follow;
        self
    }

    /// (Optional) Limit recursion depth (`None` = unbounded).
    pub fn with_max_depth(
        mut self,
        depth: Option<usize>,
    ) -> Self
    {
        self.max_depth = depth;
        self
    }

    /// Internal: construct a configured WalkBuilder for `root`.
    fn build_walk(
        &self,
        root: &Path,
    ) -> WalkBuilder
    {
        let mut b = WalkBuilder::new(root);

        // WalkBuilder::hidden(true) skips dotfiles
        b.hidden(!self.include_hidden);

        b.git_ignore(true);
        b.git_global(true);
        b.git_exclude(true);
        // Picked folders are rarely repositories
        b.require_git(false);

        b.follow_links(self.follow_symlinks);
        b.max_depth(self.max_depth);

        // Early directory pruning using extra ignores, on RELATIVE paths
        let extra = self
            .ignore_patterns
            .clone();
        let base = root.to_path_buf();
        b.filter_entry(move |ent: &DirEntry| {
            let is_dir = ent
                .file_type()
                .map(|ft| ft.is_dir())
                .unwrap_or(false);

            if !is_dir
            {
                return true;
            }

            let rel = ent
                .path()
                .strip_prefix(&base)
                .unwrap_or(ent.path());

            !(extra.is_match(rel) || extra.is_match(ent.path()))
        });

        b
    }

    fn extension_allowed(
        &self,
        path: &Path,
    ) -> bool
    {
        if self
            .extensions
            .is_empty()
        {
            return true;
        }

        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .is_some_and(|e| {
                self.extensions
                    .contains(&e)
            })
    }

    /// Traverse files under `root`, respecting ignore rules, extra globs and
    /// the extension allow-list. Returns a **sorted** list for determinism.
    pub fn walk_files<P: AsRef<Path>>(
        &self,
        root: P,
    ) -> Vec<PathBuf>
    {
        let root_path = root.as_ref();
        let walker = self
            .build_walk(root_path)
            .build();

        let mut out: Vec<PathBuf> = walker
            .filter_map(|res| match res
            {
                Ok(entry) => Some(entry),
                Err(err) =>
                {
                    warn!(%err, "skipping unreadable entry");
                    None
                }
            })
            .filter(|entry| {
                entry
                    .file_type()
                    .is_some_and(|ft| ft.is_file())
            })
            .map(|entry| entry.into_path())
            .filter(|abs| {
                let rel = abs
                    .strip_prefix(root_path)
                    .unwrap_or(abs);
                !self
                    .ignore_patterns
                    .is_match(rel)
            })
            .filter(|abs| self.extension_allowed(abs))
            .collect();

        out.sort();

        out
    }

    /// Walk `root` and describe every kept file as a [`FileHandle`] with a
    /// root-relative `/` path, its size, and its absolute source location.
    pub fn walk_handles<P: AsRef<Path>>(
        &self,
        root: P,
    ) -> Vec<FileHandle>
    {
        let root_path = root.as_ref();

        self.walk_files(root_path)
            .into_iter()
            .filter_map(|abs| {
                let rel = abs
                    .strip_prefix(root_path)
                    .ok()?
                    .to_string_lossy()
                    .replace('\\', "/");

                let size = match std::fs::metadata(&abs)
                {
                    Ok(meta) => meta.len(),
                    Err(err) =>
                    {
                        warn!(path = %abs.display(), %err, "cannot stat file");
                        0
                    }
                };

                trace!(path = %rel, size, "picked");
                Some(FileHandle { path: rel, size, source: Some(abs) })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests
{
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    /// Create a file with parent dirs as needed
    fn write_file(
        root: &Path,
        rel: &str,
        contents: &str,
    ) -> Result<()>
    {
        let path = root.join(rel);
        if let Some(parent) = path.parent()
        {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, contents)?;
        Ok(())
    }

    #[test]
    fn test_walk_handles_relative_and_sorted() -> Result<()>
    {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();

        write_file(root, "album/002.jpg", "bb")?;
        write_file(root, "album/001.jpg", "a")?;
        write_file(root, "notes.txt", "n")?;

        let walker = FileWalker::new(&[])?;
        let handles = walker.walk_handles(root);

        let paths: Vec<&str> = handles
            .iter()
            .map(|h| h.path.as_str())
            .collect();
        assert_eq!(paths, vec!["album/001.jpg", "album/002.jpg", "notes.txt"]);
        assert_eq!(handles[1].size, 2);
        assert!(
            handles[0]
                .source
                .as_ref()
                .is_some_and(|s| s.is_absolute() || s.starts_with(root))
        );
        Ok(())
    }

    #[test]
    fn test_additional_globs_prune_and_filter() -> Result<()>
    {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();

        write_file(root, "scratch/tmp/a.jpg", "x")?;
        write_file(root, "scans/Thumbs.db", "x")?;
        write_file(root, "scans/p1.tif", "x")?;

        let ignores = vec!["scratch/**".to_string(), "**/Thumbs.db".to_string()];
        let walker = FileWalker::new(&ignores)?;
        let files = walker.walk_files(root);

        assert_eq!(files.len(), 1, "unexpected files: {files:?}");
        assert_eq!(
            files[0]
                .strip_prefix(root)
                .unwrap(),
            Path::new("scans/p1.tif")
        );
        Ok(())
    }

    #[test]
    fn test_extension_allow_list_and_hidden() -> Result<()>
    {
        let tmp = TempDir::new()?;
        let root = tmp.path();

        write_file(root, "a.JPG", "x")?;
        write_file(root, "b.wav", "x")?;
        write_file(root, "c.txt", "x")?;
        write_file(root, ".hidden.jpg", "x")?;

        let walker = FileWalker::new(&[])?.with_extensions(&[".jpg".into(), "wav".into()]);
        let names: Vec<String> = walker
            .walk_handles(root)
            .into_iter()
            .map(|h| h.path)
            .collect();
        assert_eq!(names, vec!["a.JPG".to_string(), "b.wav".to_string()]);

        let walker = FileWalker::new(&[])?
            .with_extensions(&["jpg".into()])
            .with_include_hidden(true);
        let names: Vec<String> = walker
            .walk_handles(root)
            .into_iter()
            .map(|h| h.path)
            .collect();
        assert_eq!(names, vec![".hidden.jpg".to_string(), "a.JPG".to_string()]);
        Ok(())
    }

    #[test]
    fn test_max_depth() -> Result<()>
    {
        let tmp = TempDir::new()?;
        let root = tmp.path();

        write_file(root, "a.txt", "a")?;
        write_file(root, "sub/b.txt", "b")?;

        let walker = FileWalker::new(&[])?.with_max_depth(Some(1));
        let names: Vec<String> = walker
            .walk_handles(root)
            .into_iter()
            .map(|h| h.path)
            .collect();
        assert_eq!(names, vec!["a.txt".to_string()]);
        Ok(())
    }
}
