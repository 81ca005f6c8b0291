//! Filepath: src/core/session.rs
//! One ingest session as an explicit state machine.
//!
//! ```text
//! Building -> Staging -> Committing -> Ingesting -> Complete
//!                ^           |             |-----> Cancelled
//!                |           v             '-----> Error
//!                '-------- Error
//! ```
//!
//! Staging edits are reversible and only allowed while staging. Commit is
//! the only irreversible step; a failed commit or ingest lands in `Error`
//! from where the user may return to staging and retry.

use std::{path::Path, sync::Arc};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::{
    core::{
        annotations::Overlay,
        commit::{CommitError, CommittedPlan, commit},
        diagnostics::Warning,
        edits::StagingEdits,
        layout::{ArchiveLayout, LayoutError},
        manifest::{BuildOptions, SourceManifests, build_source_manifests, remove_source_manifest},
        orchestrator::{IngestControl, IngestReport, Orchestrator, OrchestratorError, ProgressSink},
        processor::FileProcessor,
        snapshot::{FileHandle, FileTree, SnapshotError},
    },
    infra::walk::FileWalker,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionState
{
    Building,
    Staging,
    Committing,
    Ingesting,
    Complete,
    Cancelled,
    Error,
}

impl SessionState
{
    pub fn can_transition_to(
        self,
        next: SessionState,
    ) -> bool
    {
        use SessionState::*;

        matches!(
            (self, next),
            (Building, Staging)
                | (Building, Error)
                | (Staging, Committing)
                | (Committing, Ingesting)
                | (Committing, Error)
                | (Ingesting, Complete)
                | (Ingesting, Cancelled)
                | (Ingesting, Error)
                | (Error, Staging)
        )
    }

    pub fn is_terminal(self) -> bool
    {
        matches!(self, SessionState::Complete | SessionState::Cancelled)
    }
}

#[derive(Debug, Error)]
pub enum SessionError
{
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error(transparent)]
    Commit(#[from] CommitError),

    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),

    #[error("invalid session transition {from:?} -> {to:?}")]
    InvalidTransition
    {
        from: SessionState, to: SessionState
    },

    #[error("operation needs a committed plan")]
    NotCommitted,
}

#[derive(Debug)]
pub struct IngestSession
{
    state: SessionState,
    tree: FileTree,
    overlay: Overlay,
    manifests: SourceManifests,
    layout: ArchiveLayout,
    plan: Option<CommittedPlan>,
    report: Option<IngestReport>,
    warnings: Vec<Warning>,
}

impl IngestSession
{
    /// Build the snapshot and provisional manifests. An empty file set is
    /// fatal and ends the session before staging begins.
    pub fn build(
        handles: Vec<FileHandle>,
        options: &BuildOptions,
    ) -> Result<Self, SessionError>
    {
        let tree = FileTree::from_handles(handles)?;
        Ok(Self::from_tree(tree, options))
    }

    /// Scan `root` and build from what the walker finds
    pub fn scan(
        root: &Path,
        walker: &FileWalker,
        options: &BuildOptions,
    ) -> Result<Self, SessionError>
    {
        let tree = FileTree::scan(root, walker)?;
        Ok(Self::from_tree(tree, options))
    }

    pub fn from_tree(
        tree: FileTree,
        options: &BuildOptions,
    ) -> Self
    {
        let manifests = build_source_manifests(&tree, &Overlay::new(), options);
        info!(files = tree.total_files(), manifests = manifests.len(), "session staged");

        Self {
            state: SessionState::Staging,
            tree,
            overlay: Overlay::new(),
            manifests,
            layout: ArchiveLayout::default(),
            plan: None,
            report: None,
            warnings: Vec::new(),
        }
    }

    fn transition(
        &mut self,
        to: SessionState,
    ) -> Result<(), SessionError>
    {
        if !self.state.can_transition_to(to)
        {
            return Err(SessionError::InvalidTransition { from: self.state, to });
        }

        info!(from = ?self.state, ?to, "session transition");
        self.state = to;
        Ok(())
    }

    fn require_staging(&self) -> Result<(), SessionError>
    {
        match self.state
        {
            SessionState::Staging => Ok(()),
            from => Err(SessionError::InvalidTransition { from, to: SessionState::Staging }),
        }
    }

    pub fn state(&self) -> SessionState
    {
        self.state
    }

    pub fn tree(&self) -> &FileTree
    {
        &self.tree
    }

    pub fn overlay(&self) -> &Overlay
    {
        &self.overlay
    }

    pub fn manifests(&self) -> &SourceManifests
    {
        &self.manifests
    }

    pub fn layout(&self) -> &ArchiveLayout
    {
        &self.layout
    }

    pub fn plan(&self) -> Option<&CommittedPlan>
    {
        self.plan.as_ref()
    }

    pub fn report(&self) -> Option<&IngestReport>
    {
        self.report.as_ref()
    }

    /// Warnings collected from staging edits so far
    pub fn warnings(&self) -> &[Warning]
    {
        &self.warnings
    }

    pub fn overlay_mut(&mut self) -> Result<&mut Overlay, SessionError>
    {
        self.require_staging()?;
        Ok(&mut self.overlay)
    }

    pub fn layout_mut(&mut self) -> Result<&mut ArchiveLayout, SessionError>
    {
        self.require_staging()?;
        Ok(&mut self.layout)
    }

    /// Swap in the result of a manifest operation; the layout is reconciled
    /// so it never references a manifest that no longer exists.
    pub fn update_manifests(
        &mut self,
        f: impl FnOnce(&SourceManifests) -> SourceManifests,
    ) -> Result<Vec<String>, SessionError>
    {
        self.require_staging()?;

        self.manifests = f(&self.manifests);
        let dangling = self.layout.reconcile(&self.manifests);

        if !dangling.is_empty()
        {
            warn!(count = dangling.len(), "layout references removed with their manifests");
        }

        Ok(dangling)
    }

    pub fn remove_manifest(
        &mut self,
        id: &str,
    ) -> Result<Vec<String>, SessionError>
    {
        self.update_manifests(|m| remove_source_manifest(m, id))
    }

    /// Re-derive manifests from the snapshot under the current overlay
    pub fn rebuild_manifests(
        &mut self,
        options: &BuildOptions,
    ) -> Result<Vec<String>, SessionError>
    {
        let (tree, overlay) = (&self.tree, &self.overlay);
        let rebuilt = build_source_manifests(tree, overlay, options);
        self.update_manifests(|_| rebuilt)
    }

    /// Replay declarative edits: overlay first, then merges, then layout.
    ///
    /// All-or-nothing: the edits run against copies of the staging stores,
    /// which replace the live ones only when every step succeeded. Manifests
    /// are re-derived only when the edits actually changed the overlay, so
    /// earlier merges and reorders survive an edit set without annotations.
    #[instrument(level = "debug", skip_all)]
    pub fn apply_edits(
        &mut self,
        edits: &StagingEdits,
        options: &BuildOptions,
    ) -> Result<Vec<Warning>, SessionError>
    {
        self.require_staging()?;

        let mut overlay = self.overlay.clone();
        let mut warnings = edits.apply_annotations(&self.tree, &mut overlay);

        let manifests = if overlay != self.overlay
        {
            debug!("overlay changed, re-deriving manifests");
            build_source_manifests(&self.tree, &overlay, options)
        }
        else
        {
            self.manifests.clone()
        };

        let (manifests, merge_warnings) = edits.apply_merges(&manifests);
        warnings.extend(merge_warnings);

        let mut layout = self.layout.clone();
        let dangling = layout.reconcile(&manifests);
        if !dangling.is_empty()
        {
            warn!(count = dangling.len(), "layout references removed with their manifests");
        }

        warnings.extend(edits.apply_collections(&mut layout, &manifests)?);

        self.overlay = overlay;
        self.manifests = manifests;
        self.layout = layout;
        self.warnings.extend(warnings.iter().cloned());
        Ok(warnings)
    }

    /// Speculative commit; leaves the session in staging
    pub fn preview(&self) -> Result<CommittedPlan, SessionError>
    {
        self.require_staging()?;
        Ok(commit(&self.tree, &self.overlay, &self.manifests, &self.layout)?)
    }

    /// Run the irreversible commit. On failure the session moves to `Error`.
    pub fn commit(&mut self) -> Result<&CommittedPlan, SessionError>
    {
        self.transition(SessionState::Committing)?;

        match commit(&self.tree, &self.overlay, &self.manifests, &self.layout)
        {
            Ok(mut plan) =>
            {
                plan.warnings.extend(self.warnings.iter().cloned());
                plan.warnings.sort();
                Ok(self.plan.insert(plan))
            }
            Err(err) =>
            {
                self.state = SessionState::Error;
                Err(err.into())
            }
        }
    }

    /// Execute the committed plan. Cancellation ends in `Cancelled` with a
    /// partial report; only infrastructure failures end in `Error`.
    pub fn ingest(
        &mut self,
        orchestrator: &Orchestrator,
        processor: Arc<dyn FileProcessor>,
        sink: &dyn ProgressSink,
        control: &IngestControl,
    ) -> Result<&IngestReport, SessionError>
    {
        if self.plan.is_none()
        {
            return Err(SessionError::NotCommitted);
        }
        self.transition(SessionState::Ingesting)?;

        let plan = self
            .plan
            .as_ref()
            .ok_or(SessionError::NotCommitted)?;

        match orchestrator.run(&plan.tasks, processor, sink, control, plan.totals)
        {
            Ok(mut report) =>
            {
                report.absorb_warnings(plan.warnings.iter().cloned());
                self.state =
                    if report.cancelled { SessionState::Cancelled } else { SessionState::Complete };
                info!(state = ?self.state, "ingest session finished");
                Ok(self.report.insert(report))
            }
            Err(err) =>
            {
                self.state = SessionState::Error;
                Err(err.into())
            }
        }
    }

    /// Return from `Error` to staging so annotations can be corrected
    pub fn retry(&mut self) -> Result<(), SessionError>
    {
        self.transition(SessionState::Staging)?;
        self.plan = None;
        self.report = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn handles() -> Vec<FileHandle>
    {
        vec![FileHandle::new("A/1.jpg", 1), FileHandle::new("B/1.jpg", 1)]
    }

    #[test]
    fn empty_file_set_is_fatal()
    {
        let err = IngestSession::build(Vec::new(), &BuildOptions::default()).unwrap_err();
        assert!(matches!(err, SessionError::Snapshot(SnapshotError::EmptyFileSet)));
    }

    #[test]
    fn transition_table()
    {
        use SessionState::*;

        assert!(Staging.can_transition_to(Committing));
        assert!(Error.can_transition_to(Staging));
        assert!(!Complete.can_transition_to(Staging));
        assert!(!Committing.can_transition_to(Staging));
        assert!(!Staging.can_transition_to(Ingesting));
    }

    #[test]
    fn failed_commit_enters_error_and_retry_returns_to_staging()
    {
        let mut session = IngestSession::build(handles(), &BuildOptions::default()).unwrap();
        {
            let overlay = session.overlay_mut().unwrap();
            overlay.set_excluded("A", true);
            overlay.set_excluded("B", true);
        }

        assert!(matches!(
            session.commit(),
            Err(SessionError::Commit(CommitError::NothingToIngest))
        ));
        assert_eq!(session.state(), SessionState::Error);
        assert!(session.overlay_mut().is_err());

        session.retry().unwrap();
        session.overlay_mut().unwrap().set_excluded("B", false);
        session.commit().unwrap();
        assert_eq!(session.state(), SessionState::Committing);
        assert!(session.commit().is_err());
    }

    #[test]
    fn removing_a_manifest_reconciles_the_layout()
    {
        let mut session = IngestSession::build(handles(), &BuildOptions::default()).unwrap();
        let id = session.manifests().ids()[0].clone();

        let layout = session.layout_mut().unwrap();
        let col = layout.create_collection("C", None).unwrap();
        layout.add_to_collection(&col, &[id.clone()]).unwrap();

        let dangling = session.remove_manifest(&id).unwrap();
        assert_eq!(dangling, vec![id]);
        assert!(session.layout().assigned_ids().is_empty());
    }

    #[test]
    fn failing_edit_set_leaves_the_session_untouched()
    {
        use crate::core::{
            annotations::NodeAnnotations,
            edits::CollectionEdit,
        };

        let mut session = IngestSession::build(handles(), &BuildOptions::default()).unwrap();
        let before = (session.overlay().clone(), session.manifests().clone(), session.layout().clone());

        let mut edits = StagingEdits::default();
        edits
            .annotations
            .insert("A".into(), NodeAnnotations { excluded: true, ..Default::default() });
        edits.collections = vec![
            CollectionEdit { name: "Good".into(), manifests: vec!["B".into()], children: vec![] },
            CollectionEdit { name: "  ".into(), manifests: vec![], children: vec![] },
        ];

        assert!(matches!(
            session.apply_edits(&edits, &BuildOptions::default()),
            Err(SessionError::Layout(_))
        ));
        assert_eq!(session.state(), SessionState::Staging);
        assert_eq!(session.overlay(), &before.0);
        assert_eq!(session.manifests(), &before.1);
        assert_eq!(session.layout(), &before.2);
        assert!(session.warnings().is_empty());
    }

    #[test]
    fn edits_without_annotations_keep_earlier_merges()
    {
        use crate::core::{edits::CollectionEdit, manifest::merge_source_manifests};

        let mut session = IngestSession::build(handles(), &BuildOptions::default()).unwrap();
        let ids = session.manifests().ids().to_vec();
        session
            .update_manifests(|m| merge_source_manifests(m, &ids[1..], &ids[0]))
            .unwrap();

        let edits = StagingEdits {
            collections: vec![CollectionEdit {
                name: "All".into(),
                manifests: vec![ids[0].clone()],
                children: vec![],
            }],
            ..Default::default()
        };
        session.apply_edits(&edits, &BuildOptions::default()).unwrap();

        assert_eq!(session.manifests().len(), 1);
        assert_eq!(session.manifests().canvas_count(), 2);
        assert_eq!(session.layout().assigned_ids(), vec![ids[0].as_str()]);
    }
}
