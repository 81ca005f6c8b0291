//! Per-file work executed by ingest workers.
//!
//! Workers only see a [`FileTask`] and return a [`FileArtifact`]; they never
//! touch staging state.

use std::path::Path;

use serde::Serialize;
use thiserror::Error;
use tracing::trace;

use crate::{
    core::orchestrator::FileTask,
    infra::{io::read_bytes_smart, utils::PathUtils},
};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProcessError
{
    #[error("{0}: no content source")]
    NoSource(String),

    #[error("{path}: {message}")]
    Read
    {
        path: String, message: String
    },

    #[error("{path}: worker panicked: {message}")]
    Panicked
    {
        path: String, message: String
    },
}

/// Coarse media family derived from the extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MediaKind
{
    Image,
    Audio,
    Video,
    Document,
    Other,
}

impl MediaKind
{
    pub fn from_name(name: &str) -> Self
    {
        let (_, ext) = PathUtils::split_extension(name);

        match ext
            .trim_start_matches('.')
            .to_ascii_lowercase()
            .as_str()
        {
            "jpg" | "jpeg" | "png" | "tif" | "tiff" | "gif" | "webp" | "bmp" | "jp2" | "heic" =>
            {
                MediaKind::Image
            }
            "wav" | "mp3" | "flac" | "ogg" | "m4a" | "aac" => MediaKind::Audio,
            "mp4" | "mov" | "mkv" | "webm" | "avi" => MediaKind::Video,
            "pdf" | "txt" | "md" | "doc" | "docx" | "odt" | "xml" | "json" => MediaKind::Document,
            _ => MediaKind::Other,
        }
    }
}

/// Result of processing one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileArtifact
{
    pub path: String,
    pub bytes: u64,

    /// `blake3:<hex>`
    pub digest: String,
    pub media_kind: MediaKind,

    /// Thumbnail reference when a processor produces one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
}

/// Work applied to every committed file. Implementations must be safe to
/// call from several worker threads at once.
pub trait FileProcessor: Send + Sync
{
    fn process(
        &self,
        task: &FileTask,
    ) -> Result<FileArtifact, ProcessError>;
}

/// Reads content (memory-mapped when large) and records a blake3 digest
#[derive(Debug, Clone, Copy, Default)]
pub struct DigestProcessor;

impl DigestProcessor
{
    fn digest_file(
        path: &str,
        source: &Path,
    ) -> Result<FileArtifact, ProcessError>
    {
        let content = read_bytes_smart(source).map_err(|e| ProcessError::Read {
            path: path.to_string(),
            message: format!("{e:#}"),
        })?;

        let hash = blake3::hash(content.as_ref());
        trace!(path, bytes = content.len(), "digested");

        Ok(FileArtifact {
            path: path.to_string(),
            bytes: content.len() as u64,
            digest: format!("blake3:{}", hash.to_hex()),
            media_kind: MediaKind::from_name(path),
            thumbnail: None,
        })
    }
}

impl FileProcessor for DigestProcessor
{
    fn process(
        &self,
        task: &FileTask,
    ) -> Result<FileArtifact, ProcessError>
    {
        let source = task
            .source
            .as_deref()
            .ok_or_else(|| ProcessError::NoSource(task.path.clone()))?;

        Self::digest_file(&task.path, source)
    }
}
