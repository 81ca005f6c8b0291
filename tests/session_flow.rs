//! A whole session over a scanned directory: stage, edit, commit, ingest,
//! export.

mod util;

use std::{fs, sync::Arc};

use stagecraft::{
    FileWalker,
    core::{
        DigestProcessor, IngestControl, IngestSession, Orchestrator, ProgressFeed, SessionError,
        SessionState, StagingEdits,
        commit::UNASSIGNED_ID,
        export::{ExportBundle, ExportSink, MemoryExport},
        manifest::BuildOptions,
    },
};

const EDITS: &str = r#"
[annotations."letters"]
intent = "manifest"
rights = "http://rightsstatements.org/vocab/InC/1.0/"

[annotations."book/page_002.jpg"]
start = true

[annotations."cover-back.jpg"]
excluded = true

[[collections]]
name = "Letters"
manifests = ["letters"]
"#;

fn staged(tmp: &assert_fs::TempDir) -> IngestSession
{
    let walker = FileWalker::new(&[]).unwrap();
    let options = BuildOptions::default();
    let mut session = IngestSession::scan(tmp.path(), &walker, &options).unwrap();

    let path = tmp.path().join("edits.toml");
    fs::write(&path, EDITS).unwrap();
    let edits = StagingEdits::load(&path).unwrap();
    fs::remove_file(&path).unwrap();

    let warnings = session
        .apply_edits(&edits, &options)
        .unwrap();
    assert!(warnings.is_empty(), "{warnings:?}");
    session
}

#[test]
fn staged_edits_flow_into_the_committed_plan()
{
    let tmp = util::make_archive_fixture();
    let mut session = staged(&tmp);
    assert_eq!(session.state(), SessionState::Staging);
    assert_eq!(session.tree().total_files(), 8);

    let plan = session
        .commit()
        .unwrap()
        .clone();

    assert_eq!(plan.totals.collections, 1);
    assert_eq!(plan.totals.manifests, 3);
    assert_eq!(plan.totals.canvases, 7);
    assert_eq!(plan.totals.files, 7);
    assert!(plan.warnings.is_empty());

    // Tasks follow the fully expanded display order
    let order: Vec<&str> = plan
        .tasks
        .iter()
        .map(|t| t.path.as_str())
        .collect();
    assert_eq!(
        order,
        [
            "book/page_001.jpg",
            "book/page_002.jpg",
            "book/page_003.jpg",
            "letters/1923/a.jpg",
            "letters/1923/b.jpg",
            "letters/1924/c.jpg",
            "cover-front.jpg",
        ]
    );

    let letters = &plan.root.collections[0];
    assert_eq!(letters.label, "Letters");
    assert_eq!(letters.manifests[0].label, "letters");
    assert_eq!(letters.manifests[0].canvases.len(), 3);
    assert!(letters.manifests[0].rights.is_some());

    let unassigned = &plan.root.collections[1];
    assert_eq!(unassigned.id, UNASSIGNED_ID);
    assert_eq!(unassigned.manifests.len(), 2);

    let book = unassigned
        .manifests
        .iter()
        .find(|m| m.label == "book")
        .unwrap();
    assert_eq!(book.start_canvas.as_deref(), Some(book.canvases[1].id.as_str()));
    assert!(!book.is_partial);

    // Staging is closed once the commit ran
    assert!(matches!(session.layout_mut(), Err(SessionError::InvalidTransition { .. })));
}

#[test]
fn ingest_completes_and_exports_plan_with_report()
{
    let tmp = util::make_archive_fixture();
    let mut session = staged(&tmp);
    session.commit().unwrap();

    let feed = ProgressFeed::new();
    let report = session
        .ingest(&Orchestrator::new(3, 10), Arc::new(DigestProcessor), &feed, &IngestControl::new())
        .unwrap()
        .clone();

    assert_eq!(session.state(), SessionState::Complete);
    assert!(report.is_clean());
    assert_eq!(report.files_completed, 7);
    assert_eq!(report.manifests, 3);

    let export = MemoryExport::new();
    let plan = session.plan().unwrap();
    export
        .export(&ExportBundle { plan, report: &report })
        .unwrap();

    let bundles = export.take();
    assert_eq!(bundles.len(), 1);
    assert_eq!(bundles[0]["report"]["files_completed"], 7);
    assert_eq!(bundles[0]["plan"]["totals"]["files"], 7);
    assert_eq!(bundles[0]["plan"]["tasks"].as_array().unwrap().len(), 7);
}

#[test]
fn cancelled_ingest_keeps_a_partial_report()
{
    let tmp = util::make_archive_fixture();
    let mut session = staged(&tmp);
    session.commit().unwrap();

    let control = IngestControl::new();
    control.cancel();

    let report = session
        .ingest(&Orchestrator::new(2, 10), Arc::new(DigestProcessor), &ProgressFeed::new(), &control)
        .unwrap()
        .clone();

    assert_eq!(session.state(), SessionState::Cancelled);
    assert!(report.cancelled);
    assert_eq!(report.files_skipped, 7);
    assert!(session.state().is_terminal());
}

#[test]
fn ingest_without_commit_is_rejected()
{
    let tmp = util::make_archive_fixture();
    let mut session = staged(&tmp);

    let err = session
        .ingest(&Orchestrator::default(), Arc::new(DigestProcessor), &ProgressFeed::new(), &IngestControl::new())
        .unwrap_err();

    assert!(matches!(err, SessionError::NotCommitted));
    assert_eq!(session.state(), SessionState::Staging);
}
