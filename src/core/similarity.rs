//! Heuristic filename grouping used to suggest manifest merges
//! (multi-angle shots, numbered takes of the same object).

use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::{core::manifest::SourceManifests, infra::utils::PathUtils};

/// Names kept per base key; beyond this a group is marked truncated
pub const SIMILARITY_CANDIDATE_CAP: usize = 500;

static NUMERIC_TAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\s_\-.(]*\d+\)?$").unwrap());

static VIEW_TAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)[\s_\-.]+(front|back|left|right|top|bottom|recto|verso|detail)$").unwrap()
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SimilarGroup
{
    pub key: String,

    /// Members in input order
    pub names: Vec<String>,

    /// More names shared the key than the cap allowed
    pub truncated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeSuggestion
{
    pub key: String,
    pub target: String,
    pub sources: Vec<String>,
}

/// Case-folded stem with the extension, a trailing number and a trailing
/// view word removed: `Page_001.jpg`, `page (2).png` and `page-front.tif`
/// all map to `page`.
pub fn base_key(name: &str) -> String
{
    let (stem, _) = PathUtils::split_extension(name);
    let stem = NUMERIC_TAIL.replace(stem, "");
    let stem = VIEW_TAIL.replace(&stem, "");

    stem.trim()
        .to_lowercase()
}

/// Group `names` by [`base_key`] using the default candidate cap
pub fn find_similar_filenames<S: AsRef<str>>(names: &[S]) -> Vec<SimilarGroup>
{
    find_similar_filenames_capped(names, SIMILARITY_CANDIDATE_CAP)
}

/// Group `names` by [`base_key`]. One pass, so cost stays linear; each key
/// keeps at most `cap` names. Only groups of two or more are returned, in
/// the order their key was first seen.
pub fn find_similar_filenames_capped<S: AsRef<str>>(
    names: &[S],
    cap: usize,
) -> Vec<SimilarGroup>
{
    let cap = cap.max(2);
    let mut buckets: IndexMap<String, SimilarGroup> = IndexMap::new();

    for name in names
    {
        let name = name.as_ref();
        let key = base_key(name);

        let group = buckets
            .entry(key.clone())
            .or_insert_with(|| SimilarGroup { key, names: Vec::new(), truncated: false });

        if group.names.len() < cap
        {
            group
                .names
                .push(name.to_string());
        }
        else
        {
            group.truncated = true;
        }
    }

    let groups: Vec<SimilarGroup> = buckets
        .into_values()
        .filter(|g| g.names.len() >= 2)
        .collect();

    debug!(names = names.len(), groups = groups.len(), "similar filenames grouped");
    groups
}

/// Suggest folding single-canvas manifests with similar labels into the
/// first of each group.
pub fn suggest_merges(
    collection: &SourceManifests,
    cap: usize,
) -> Vec<MergeSuggestion>
{
    let singles: Vec<(&str, &str)> = collection
        .iter()
        .filter(|m| m.canvases.len() == 1)
        .map(|m| {
            let name = m.canvases[0]
                .source_path
                .as_deref()
                .map(PathUtils::file_name)
                .unwrap_or(&m.label);
            (m.id.as_str(), name)
        })
        .collect();

    let names: Vec<&str> = singles
        .iter()
        .map(|(_, name)| *name)
        .collect();

    find_similar_filenames_capped(&names, cap)
        .into_iter()
        .filter_map(|group| {
            // Map member names back to manifest ids in collection order
            let mut ids = singles
                .iter()
                .filter(|(_, name)| group.names.iter().any(|n| n == name))
                .map(|(id, _)| id.to_string());

            let target = ids.next()?;
            let sources: Vec<String> = ids.collect();

            (!sources.is_empty()).then_some(MergeSuggestion { key: group.key, target, sources })
        })
        .collect()
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::core::manifest::{SourceCanvas, SourceManifest};

    #[test]
    fn numbered_pages_group_and_cover_stays_alone()
    {
        let groups = find_similar_filenames(&["page_001.jpg", "page_002.jpg", "cover.jpg"]);

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].key, "page");
        assert_eq!(groups[0].names, vec!["page_001.jpg", "page_002.jpg"]);
        assert!(!groups[0].truncated);
    }

    #[test]
    fn base_key_strips_common_suffix_shapes()
    {
        assert_eq!(base_key("Vase (2).JPG"), "vase");
        assert_eq!(base_key("vase-front.tif"), "vase");
        assert_eq!(base_key("vase_back_3.png"), "vase");
        assert_eq!(base_key("IMG.0042.jpg"), "img");
        assert_eq!(base_key("cover.jpg"), "cover");
    }

    #[test]
    fn cap_bounds_group_size()
    {
        let names: Vec<String> = (0..10)
            .map(|i| format!("shot_{i}.jpg"))
            .collect();
        let groups = find_similar_filenames_capped(&names, 4);

        assert_eq!(groups[0].names.len(), 4);
        assert!(groups[0].truncated);
    }

    #[test]
    fn suggestions_target_first_single_canvas_manifest()
    {
        let single = |id: &str, file: &str| {
            let mut canvas = SourceCanvas::new(format!("c-{id}"), file);
            canvas.source_path = Some(format!("root/{file}"));
            SourceManifest::new(id, id).with_canvases(vec![canvas])
        };

        let coll: SourceManifests = [
            single("m1", "jug_front.jpg"),
            single("m2", "cover.jpg"),
            single("m3", "jug_back.jpg"),
            SourceManifest::new("m4", "book").with_canvases(vec![
                SourceCanvas::new("a", "jug_1.jpg"),
                SourceCanvas::new("b", "jug_2.jpg"),
            ]),
        ]
        .into_iter()
        .collect();

        let suggestions = suggest_merges(&coll, SIMILARITY_CANDIDATE_CAP);
        assert_eq!(
            suggestions,
            vec![MergeSuggestion {
                key: "jug".into(),
                target: "m1".into(),
                sources: vec!["m3".into()],
            }]
        );
    }
}
