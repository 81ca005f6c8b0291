//! Filename grouping and merge suggestions.

mod util;

use stagecraft::core::{
    Overlay,
    manifest::{BuildOptions, build_source_manifests},
    similarity::{base_key, find_similar_filenames, find_similar_filenames_capped, suggest_merges},
};

#[test]
fn numbering_and_view_words_collapse_to_one_key()
{
    for name in ["Page_001.jpg", "page (2).png", "page-front.tif", "PAGE 3.JPG"]
    {
        assert_eq!(base_key(name), "page", "{name}");
    }
    assert_eq!(base_key("frontispiece.jpg"), "frontispiece");
}

#[test]
fn groups_keep_input_order_and_drop_singletons()
{
    let names = ["map.jpg", "letter_2.jpg", "letter_1.jpg", "letter-back.jpg", "map2.jpg", "solo.tif"];
    let groups = find_similar_filenames(&names);

    let keys: Vec<&str> = groups
        .iter()
        .map(|g| g.key.as_str())
        .collect();
    assert_eq!(keys, ["map", "letter"]);
    assert_eq!(groups[1].names, ["letter_2.jpg", "letter_1.jpg", "letter-back.jpg"]);
    assert!(groups.iter().all(|g| !g.truncated));
}

#[test]
fn cap_bounds_group_size_and_marks_truncation()
{
    let names: Vec<String> = (0..20)
        .map(|i| format!("scan_{i}.tif"))
        .collect();

    let groups = find_similar_filenames_capped(&names, 5);
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].names.len(), 5);
    assert!(groups[0].truncated);

    // A cap below two still yields pairs
    let groups = find_similar_filenames_capped(&names[..3], 0);
    assert_eq!(groups[0].names.len(), 2);
}

#[test]
fn single_canvas_manifests_are_suggested_for_merging()
{
    let tree = util::tree(&["cover-front.jpg", "cover-back.jpg", "index.jpg", "album/1.jpg"]);
    let options = BuildOptions { split_loose_files: true, ..BuildOptions::default() };
    let manifests = build_source_manifests(&tree, &Overlay::new(), &options);

    let suggestions = suggest_merges(&manifests, 50);
    assert_eq!(suggestions.len(), 1);

    let s = &suggestions[0];
    assert_eq!(s.key, "cover");
    assert_eq!(manifests.get(&s.target).unwrap().label, "cover-back");
    assert_eq!(s.sources.len(), 1);
    assert_eq!(manifests.get(&s.sources[0]).unwrap().label, "cover-front");
}
