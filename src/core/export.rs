//! Hand-off to the export collaborator. Emission formats live elsewhere;
//! this crate only passes the committed plan and the ingest report on.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use crate::core::{commit::CommittedPlan, orchestrator::IngestReport};

/// What an export collaborator receives
#[derive(Debug, Clone, Serialize)]
pub struct ExportBundle<'a>
{
    pub plan: &'a CommittedPlan,
    pub report: &'a IngestReport,
}

pub trait ExportSink
{
    fn export(
        &self,
        bundle: &ExportBundle<'_>,
    ) -> Result<()>;
}

/// Writes the bundle as pretty JSON
#[derive(Debug, Clone)]
pub struct JsonExport
{
    path: PathBuf,
}

impl JsonExport
{
    pub fn new(path: impl Into<PathBuf>) -> Self
    {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path
    {
        &self.path
    }
}

impl ExportSink for JsonExport
{
    fn export(
        &self,
        bundle: &ExportBundle<'_>,
    ) -> Result<()>
    {
        if let Some(parent) = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let json = serde_json::to_string_pretty(bundle).context("Failed to serialize plan")?;
        fs::write(&self.path, json)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;

        info!(path = %self.path.display(), "plan exported");
        Ok(())
    }
}

/// Keeps serialized bundles in memory; handy for previews and tests
#[derive(Debug, Default)]
pub struct MemoryExport
{
    bundles: Mutex<Vec<serde_json::Value>>,
}

impl MemoryExport
{
    pub fn new() -> Self
    {
        Self::default()
    }

    pub fn take(&self) -> Vec<serde_json::Value>
    {
        self.bundles
            .lock()
            .map(|mut b| std::mem::take(&mut *b))
            .unwrap_or_default()
    }
}

impl ExportSink for MemoryExport
{
    fn export(
        &self,
        bundle: &ExportBundle<'_>,
    ) -> Result<()>
    {
        let value = serde_json::to_value(bundle).context("Failed to serialize plan")?;

        self.bundles
            .lock()
            .map_err(|_| anyhow::anyhow!("export buffer poisoned"))?
            .push(value);
        Ok(())
    }
}
