//! Non-blocking warnings.
//!
//! Structural conflicts are resolved automatically and surfaced here instead
//! of being returned as errors. Warnings are totally ordered so reports built
//! from out-of-order worker results can be sorted into a canonical form.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WarningKind
{
    /// An older behavior tag was cleared by a mutually exclusive one
    BehaviorConflict,
    /// Navigation date was not ISO-8601
    InvalidNavDate,
    /// Structural intent set on a file
    IntentOnFile,
    /// Start marker set on a directory
    StartOnDirectory,
    /// More than one start marker in a directory
    MultipleStartMarkers,
    /// Layout referenced a manifest that no longer exists
    DanglingReference,
    /// Every canvas of a manifest was excluded
    EmptyManifest,
    /// Per-file ingest failure
    FileFailed,
    /// User supplied regex failed to compile
    InvalidPattern,
    /// A staging edit named something that does not exist
    UnknownTarget,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Warning
{
    pub kind: WarningKind,

    /// Snapshot path or id the warning is about
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,

    pub message: String,
}

impl Warning
{
    pub fn new(
        kind: WarningKind,
        subject: impl Into<String>,
        message: impl Into<String>,
    ) -> Self
    {
        Self { kind, subject: Some(subject.into()), message: message.into() }
    }

    pub fn general(
        kind: WarningKind,
        message: impl Into<String>,
    ) -> Self
    {
        Self { kind, subject: None, message: message.into() }
    }
}

impl fmt::Display for Warning
{
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result
    {
        match &self.subject
        {
            Some(subject) => write!(f, "{subject}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}
