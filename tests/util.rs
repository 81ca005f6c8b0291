//! Shared fixtures for integration tests
//!
//! In-memory snapshots for the pure pipeline and an on-disk archive for
//! the CLI and ingest tests.

#![allow(dead_code)]

use assert_fs::prelude::*;
use stagecraft::core::{FileHandle, FileTree};

/// Build a snapshot from relative paths, one byte per file
pub fn tree(paths: &[&str]) -> FileTree
{
    FileTree::from_handles(
        paths
            .iter()
            .map(|p| FileHandle::new(*p, 1))
            .collect(),
    )
    .expect("non-empty snapshot")
}

/// A small scanned archive:
///
/// ```text
/// book/page_001.jpg .. page_003.jpg
/// letters/1923/a.jpg, b.jpg
/// letters/1924/c.jpg
/// cover-front.jpg, cover-back.jpg
/// ```
pub fn make_archive_fixture() -> assert_fs::TempDir
{
    let tmp = assert_fs::TempDir::new().expect("tempdir");

    let files = [
        "book/page_001.jpg",
        "book/page_002.jpg",
        "book/page_003.jpg",
        "letters/1923/a.jpg",
        "letters/1923/b.jpg",
        "letters/1924/c.jpg",
        "cover-front.jpg",
        "cover-back.jpg",
    ];

    for (i, path) in files
        .iter()
        .enumerate()
    {
        // Distinct contents so digests differ
        tmp.child(path)
            .write_str(&format!("image {i} at {path}\n"))
            .expect("write fixture file");
    }

    tmp
}
