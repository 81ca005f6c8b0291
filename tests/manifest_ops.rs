//! Building provisional manifests and the pure operations over them.

mod util;

use stagecraft::core::{
    ArchiveLayout, Overlay, StructuralIntent,
    commit::{CanonicalManifest, CommittedPlan, UNASSIGNED_ID, commit},
    manifest::{
        BuildOptions, ManifestError, SourceManifests, add_source_manifest,
        build_source_manifests, merge_source_manifests, remove_source_manifest, reorder_canvases,
        reorder_canvases_strict,
    },
};

fn labels(manifests: &SourceManifests) -> Vec<&str>
{
    manifests
        .iter()
        .map(|m| m.label.as_str())
        .collect()
}

fn unassigned(plan: &CommittedPlan) -> &[CanonicalManifest]
{
    &plan
        .root
        .collections
        .iter()
        .find(|c| c.id == UNASSIGNED_ID)
        .expect("unassigned collection")
        .manifests
}

fn id_of<'a>(
    manifests: &'a SourceManifests,
    label: &str,
) -> &'a str
{
    manifests
        .iter()
        .find(|m| m.label == label)
        .map(|m| m.id.as_str())
        .expect("manifest with label")
}

#[test]
fn every_directory_with_files_becomes_a_manifest()
{
    let tree = util::tree(&[
        "book/page_001.jpg",
        "book/page_002.jpg",
        "book/page_004.jpg",
        "letters/1923/a.jpg",
        "letters/1924/b.jpg",
    ]);

    let manifests = build_source_manifests(&tree, &Overlay::new(), &BuildOptions::default());

    assert_eq!(labels(&manifests), ["book", "1923", "1924"]);
    assert!(manifests.is_consistent());

    let book = manifests
        .get(id_of(&manifests, "book"))
        .unwrap();
    assert_eq!(book.canvases.len(), 3);
    assert_eq!(book.detected_pattern.as_deref(), Some("page_{n}.jpg"));
    assert!(book.is_partial);

    let year = manifests
        .get(id_of(&manifests, "1923"))
        .unwrap();
    assert_eq!(year.breadcrumbs, ["letters"]);
    assert_eq!(year.source_dir.as_deref(), Some("letters/1923"));
}

#[test]
fn manifest_intent_absorbs_the_whole_subtree()
{
    let tree = util::tree(&["letters/1923/a.jpg", "letters/1924/b.jpg", "letters/cover.jpg"]);

    let mut overlay = Overlay::new();
    assert!(overlay.set_intent(&tree, "letters", Some(StructuralIntent::Manifest)).is_none());

    let manifests = build_source_manifests(&tree, &overlay, &BuildOptions::default());
    assert_eq!(labels(&manifests), ["letters"]);

    let letters = manifests
        .get(id_of(&manifests, "letters"))
        .unwrap();
    let sources: Vec<&str> = letters
        .canvases
        .iter()
        .filter_map(|c| c.source_path.as_deref())
        .collect();
    assert_eq!(sources, ["letters/cover.jpg", "letters/1923/a.jpg", "letters/1924/b.jpg"]);
}

#[test]
fn loose_root_files_split_into_single_canvas_manifests()
{
    let tree = util::tree(&["one.jpg", "two.jpg", "album/x.jpg"]);
    let options = BuildOptions { split_loose_files: true, ..BuildOptions::default() };

    let manifests = build_source_manifests(&tree, &Overlay::new(), &options);

    assert_eq!(labels(&manifests), ["one", "two", "album"]);
    assert!(
        manifests
            .iter()
            .take(2)
            .all(|m| m.canvases.len() == 1)
    );
}

#[test]
fn add_is_idempotent_and_merge_dedupes_canvases()
{
    let tree = util::tree(&["a/1.jpg", "a/2.jpg", "b/3.jpg"]);
    let manifests = build_source_manifests(&tree, &Overlay::new(), &BuildOptions::default());
    let a = id_of(&manifests, "a").to_string();
    let b = id_of(&manifests, "b").to_string();

    let again = add_source_manifest(&manifests, manifests.get(&a).unwrap().clone());
    assert_eq!(again, manifests);

    let merged = merge_source_manifests(&manifests, &[b.clone(), b.clone()], &a);
    assert_eq!(merged.len(), 1);
    assert_eq!(merged.get(&a).unwrap().canvases.len(), 3);
    assert!(!merged.contains(&b));
    assert!(merged.is_consistent());

    // Unknown target leaves the collection alone
    assert_eq!(merge_source_manifests(&manifests, &[b.clone()], "nope"), manifests);

    let removed = remove_source_manifest(&manifests, &b);
    assert_eq!(removed.ids(), [a]);
}

#[test]
fn reorder_drops_what_it_does_not_name_and_strict_refuses()
{
    let tree = util::tree(&["a/1.jpg", "a/2.jpg", "a/3.jpg"]);
    let manifests = build_source_manifests(&tree, &Overlay::new(), &BuildOptions::default());
    let a = id_of(&manifests, "a").to_string();

    let ids: Vec<String> = manifests
        .get(&a)
        .unwrap()
        .canvas_ids()
        .into_iter()
        .map(str::to_string)
        .collect();

    let reversed: Vec<String> = ids
        .iter()
        .rev()
        .cloned()
        .collect();
    let out = reorder_canvases_strict(&manifests, &a, &reversed).unwrap();
    assert_eq!(out.get(&a).unwrap().canvas_ids(), reversed);

    let partial = vec![ids[2].clone(), "ghost".to_string()];
    let out = reorder_canvases(&manifests, &a, &partial);
    assert_eq!(out.get(&a).unwrap().canvas_ids(), [ids[2].as_str()]);

    assert!(matches!(
        reorder_canvases_strict(&manifests, &a, &partial),
        Err(ManifestError::UnknownCanvas { .. })
    ));
    assert!(matches!(
        reorder_canvases_strict(&manifests, &a, &ids[..2]),
        Err(ManifestError::MissingCanvas { .. })
    ));
}

#[test]
fn root_overrides_do_not_leak_into_split_loose_manifests()
{
    let tree = util::tree(&["cover.jpg", "back.jpg", "book/p1.jpg"]);
    let options = BuildOptions { split_loose_files: true, ..BuildOptions::default() };
    let manifests = build_source_manifests(&tree, &Overlay::new(), &options);

    let mut overlay = Overlay::new();
    overlay.set_label("", Some("My Archive".into()));
    overlay.set_rights("", Some("http://rightsstatements.org/vocab/InC/1.0/".into()));
    overlay.set_label("cover.jpg", Some("Front cover".into()));

    let plan = commit(&tree, &overlay, &manifests, &ArchiveLayout::default()).unwrap();
    let committed = unassigned(&plan);

    let mut labels: Vec<&str> = committed
        .iter()
        .map(|m| m.label.as_str())
        .collect();
    labels.sort();
    assert_eq!(labels, ["Front cover", "back", "book"]);
    assert!(committed.iter().all(|m| m.rights.is_none()));
}

#[test]
fn start_marker_in_a_manifest_subtree_is_the_only_one()
{
    let tree = util::tree(&["obj/front.jpg", "obj/detail/a.jpg"]);
    let mut overlay = Overlay::new();
    overlay.set_intent(&tree, "obj", Some(StructuralIntent::Manifest));
    overlay.set_start(&tree, "obj/detail/a.jpg", true);
    overlay.set_start(&tree, "obj/front.jpg", true);

    assert!(!overlay.resolve("obj/detail/a.jpg").start);

    let manifests = build_source_manifests(&tree, &overlay, &BuildOptions::default());
    assert_eq!(manifests.len(), 1);

    let plan = commit(&tree, &overlay, &manifests, &ArchiveLayout::default()).unwrap();
    assert!(plan.warnings.is_empty());

    let obj = &unassigned(&plan)[0];
    let front = obj
        .canvases
        .iter()
        .find(|c| c.source_path.as_deref() == Some("obj/front.jpg"))
        .expect("front canvas");
    assert_eq!(obj.start_canvas.as_deref(), Some(front.id.as_str()));
}
