//! Sparse, path-keyed annotation overlay.
//!
//! The overlay never touches the snapshot. It records per-node overrides
//! (structural intent, behaviors, viewing direction, label, exclusion, rights,
//! navigation date, start marker, provider) keyed by canonical snapshot path.
//! Edits are reversible: entries can be cleared one at a time or per subtree.

use std::{collections::BTreeMap, fmt, str::FromStr};

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tracing::debug;

use crate::{
    core::{
        diagnostics::{Warning, WarningKind},
        snapshot::FileTree,
    },
    infra::utils::PathUtils,
};

/// What a directory should become in the output hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StructuralIntent
{
    Collection,
    Manifest,
    Range,
    Canvas,
}

/// Structural hints drawn from a constrained vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BehaviorTag
{
    AutoAdvance,
    NoAutoAdvance,
    Repeat,
    NoRepeat,
    Unordered,
    Individuals,
    Continuous,
    Paged,
    FacingPages,
    NonPaged,
    MultiPart,
    Together,
    Sequence,
    ThumbnailNav,
    NoNav,
    Hidden,
}

/// Mutually exclusive pairs; order inside a pair is irrelevant
const EXCLUSIVE_PAIRS: &[(BehaviorTag, BehaviorTag)] = &[
    (BehaviorTag::AutoAdvance, BehaviorTag::NoAutoAdvance),
    (BehaviorTag::Repeat, BehaviorTag::NoRepeat),
    (BehaviorTag::Paged, BehaviorTag::NonPaged),
    (BehaviorTag::FacingPages, BehaviorTag::NonPaged),
    (BehaviorTag::Continuous, BehaviorTag::Individuals),
    (BehaviorTag::Continuous, BehaviorTag::Paged),
    (BehaviorTag::Individuals, BehaviorTag::Paged),
    (BehaviorTag::Unordered, BehaviorTag::Sequence),
    (BehaviorTag::Together, BehaviorTag::Sequence),
    (BehaviorTag::MultiPart, BehaviorTag::Together),
];

impl BehaviorTag
{
    pub const ALL: [BehaviorTag; 16] = [
        BehaviorTag::AutoAdvance,
        BehaviorTag::NoAutoAdvance,
        BehaviorTag::Repeat,
        BehaviorTag::NoRepeat,
        BehaviorTag::Unordered,
        BehaviorTag::Individuals,
        BehaviorTag::Continuous,
        BehaviorTag::Paged,
        BehaviorTag::FacingPages,
        BehaviorTag::NonPaged,
        BehaviorTag::MultiPart,
        BehaviorTag::Together,
        BehaviorTag::Sequence,
        BehaviorTag::ThumbnailNav,
        BehaviorTag::NoNav,
        BehaviorTag::Hidden,
    ];

    pub fn conflicts_with(
        self,
        other: BehaviorTag,
    ) -> bool
    {
        EXCLUSIVE_PAIRS
            .iter()
            .any(|&(a, b)| (a == self && b == other) || (a == other && b == self))
    }

    pub fn as_str(self) -> &'static str
    {
        match self
        {
            BehaviorTag::AutoAdvance => "auto-advance",
            BehaviorTag::NoAutoAdvance => "no-auto-advance",
            BehaviorTag::Repeat => "repeat",
            BehaviorTag::NoRepeat => "no-repeat",
            BehaviorTag::Unordered => "unordered",
            BehaviorTag::Individuals => "individuals",
            BehaviorTag::Continuous => "continuous",
            BehaviorTag::Paged => "paged",
            BehaviorTag::FacingPages => "facing-pages",
            BehaviorTag::NonPaged => "non-paged",
            BehaviorTag::MultiPart => "multi-part",
            BehaviorTag::Together => "together",
            BehaviorTag::Sequence => "sequence",
            BehaviorTag::ThumbnailNav => "thumbnail-nav",
            BehaviorTag::NoNav => "no-nav",
            BehaviorTag::Hidden => "hidden",
        }
    }
}

impl fmt::Display for BehaviorTag
{
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result
    {
        f.write_str(self.as_str())
    }
}

impl FromStr for BehaviorTag
{
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        let wanted = s.trim().to_ascii_lowercase();

        BehaviorTag::ALL
            .iter()
            .copied()
            .find(|tag| tag.as_str() == wanted)
            .ok_or_else(|| format!("unknown behavior tag: {s}"))
    }
}

/// Ordered set of behavior tags with exclusivity enforced on insert.
/// The newest tag wins; older conflicting tags are cleared.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BehaviorSet(SmallVec<[BehaviorTag; 4]>);

impl BehaviorSet
{
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Build from tags in order, returning the tags that were cleared
    pub fn from_tags(tags: impl IntoIterator<Item = BehaviorTag>) -> (Self, Vec<BehaviorTag>)
    {
        let mut set = Self::new();
        let mut cleared = Vec::new();

        for tag in tags
        {
            cleared.extend(set.insert(tag));
        }

        (set, cleared)
    }

    /// Insert `tag`, clearing older conflicting tags. Re-inserting an
    /// existing tag is a no-op.
    pub fn insert(
        &mut self,
        tag: BehaviorTag,
    ) -> Vec<BehaviorTag>
    {
        if self.contains(tag)
        {
            return Vec::new();
        }

        let cleared: Vec<BehaviorTag> = self
            .0
            .iter()
            .copied()
            .filter(|existing| existing.conflicts_with(tag))
            .collect();

        self.0
            .retain(|existing| !existing.conflicts_with(tag));
        self.0.push(tag);

        cleared
    }

    pub fn remove(
        &mut self,
        tag: BehaviorTag,
    ) -> bool
    {
        let before = self.0.len();
        self.0.retain(|t| *t != tag);
        before != self.0.len()
    }

    pub fn contains(
        &self,
        tag: BehaviorTag,
    ) -> bool
    {
        self.0.contains(&tag)
    }

    pub fn iter(&self) -> impl Iterator<Item = BehaviorTag> + '_
    {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize
    {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ViewingDirection
{
    LeftToRight,
    RightToLeft,
    TopToBottom,
    BottomToTop,
}

fn is_false(b: &bool) -> bool
{
    !*b
}

/// One overlay entry. `None` means "inherit from the snapshot".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeAnnotations
{
    /// Directories only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<StructuralIntent>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub behaviors: Option<BehaviorSet>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub viewing_direction: Option<ViewingDirection>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    #[serde(skip_serializing_if = "is_false")]
    pub excluded: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub rights: Option<String>,

    /// ISO-8601 date or date-time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nav_date: Option<String>,

    /// Files only; at most one per directory
    #[serde(skip_serializing_if = "is_false")]
    pub start: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

impl NodeAnnotations
{
    pub fn is_empty(&self) -> bool
    {
        *self == Self::default()
    }
}

/// Accepts RFC 3339 date-times, naive date-times and plain dates
pub fn is_valid_nav_date(value: &str) -> bool
{
    DateTime::parse_from_rfc3339(value).is_ok()
        || NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S").is_ok()
        || NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok()
}

/// Path-keyed overrides applied non-destructively over a [`FileTree`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Overlay
{
    entries: BTreeMap<String, NodeAnnotations>,
}

impl Overlay
{
    pub fn new() -> Self
    {
        Self::default()
    }

    fn key(path: &str) -> String
    {
        PathUtils::normalize(path).unwrap_or_else(|| path.to_string())
    }

    pub fn get(
        &self,
        path: &str,
    ) -> Option<&NodeAnnotations>
    {
        self.entries.get(&Self::key(path))
    }

    /// Entry for `path`, or an all-inherit default
    pub fn resolve(
        &self,
        path: &str,
    ) -> NodeAnnotations
    {
        self.get(path)
            .cloned()
            .unwrap_or_default()
    }

    pub fn is_excluded(
        &self,
        path: &str,
    ) -> bool
    {
        self.get(path)
            .is_some_and(|a| a.excluded)
    }

    /// Excluded directly or through any ancestor
    pub fn is_excluded_effective(
        &self,
        path: &str,
    ) -> bool
    {
        let key = Self::key(path);

        self.is_excluded(&key)
            || PathUtils::ancestors(&key)
                .into_iter()
                .any(|a| self.is_excluded(a))
    }

    pub fn len(&self) -> usize
    {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &NodeAnnotations)>
    {
        self.entries
            .iter()
            .map(|(k, v)| (k.as_str(), v))
    }

    /// Mutate one entry, dropping it again if it ends up empty
    fn edit<R>(
        &mut self,
        path: &str,
        f: impl FnOnce(&mut NodeAnnotations) -> R,
    ) -> R
    {
        let key = Self::key(path);
        let entry = self
            .entries
            .entry(key.clone())
            .or_default();
        let out = f(entry);

        if entry.is_empty()
        {
            self.entries.remove(&key);
        }

        out
    }

    /// Directories only; a file path yields a warning and no change
    pub fn set_intent(
        &mut self,
        tree: &FileTree,
        path: &str,
        intent: Option<StructuralIntent>,
    ) -> Option<Warning>
    {
        if tree
            .find_file(path)
            .is_some()
        {
            return Some(Warning::new(
                WarningKind::IntentOnFile,
                path,
                "structural intent applies to directories only",
            ));
        }

        self.edit(path, |a| a.intent = intent);
        None
    }

    /// Add a behavior; conflicting older tags are cleared and reported
    pub fn add_behavior(
        &mut self,
        path: &str,
        tag: BehaviorTag,
    ) -> Vec<Warning>
    {
        let cleared = self.edit(path, |a| {
            a.behaviors
                .get_or_insert_with(BehaviorSet::new)
                .insert(tag)
        });

        cleared
            .into_iter()
            .map(|old| {
                debug!(path, %old, new = %tag, "cleared conflicting behavior");
                Warning::new(
                    WarningKind::BehaviorConflict,
                    path,
                    format!("'{old}' cleared by mutually exclusive '{tag}'"),
                )
            })
            .collect()
    }

    pub fn remove_behavior(
        &mut self,
        path: &str,
        tag: BehaviorTag,
    ) -> bool
    {
        self.edit(path, |a| {
            a.behaviors
                .as_mut()
                .is_some_and(|set| set.remove(tag))
        })
    }

    /// Replace the whole behavior override (`None` inherits again)
    pub fn set_behaviors(
        &mut self,
        path: &str,
        tags: Option<Vec<BehaviorTag>>,
    ) -> Vec<Warning>
    {
        let Some(tags) = tags
        else
        {
            self.edit(path, |a| a.behaviors = None);
            return Vec::new();
        };

        let (set, cleared) = BehaviorSet::from_tags(tags);
        self.edit(path, |a| a.behaviors = Some(set));

        cleared
            .into_iter()
            .map(|old| {
                Warning::new(
                    WarningKind::BehaviorConflict,
                    path,
                    format!("'{old}' cleared by a later mutually exclusive tag"),
                )
            })
            .collect()
    }

    pub fn set_viewing_direction(
        &mut self,
        path: &str,
        direction: Option<ViewingDirection>,
    )
    {
        self.edit(path, |a| a.viewing_direction = direction);
    }

    pub fn set_label(
        &mut self,
        path: &str,
        label: Option<String>,
    )
    {
        self.edit(path, |a| a.label = label);
    }

    pub fn set_excluded(
        &mut self,
        path: &str,
        excluded: bool,
    )
    {
        self.edit(path, |a| a.excluded = excluded);
    }

    pub fn set_rights(
        &mut self,
        path: &str,
        rights: Option<String>,
    )
    {
        self.edit(path, |a| a.rights = rights);
    }

    /// Rejects values that are not ISO-8601, leaving the entry unchanged
    pub fn set_nav_date(
        &mut self,
        path: &str,
        nav_date: Option<&str>,
    ) -> Option<Warning>
    {
        if let Some(value) = nav_date
            && !is_valid_nav_date(value)
        {
            return Some(Warning::new(
                WarningKind::InvalidNavDate,
                path,
                format!("'{value}' is not an ISO-8601 date"),
            ));
        }

        self.edit(path, |a| a.nav_date = nav_date.map(str::to_string));
        None
    }

    /// Directory whose manifest owns a file's start marker: the outermost
    /// non-root ancestor with the `Manifest` intent, else the file's own
    /// directory.
    pub fn start_scope(
        &self,
        tree: &FileTree,
        path: &str,
    ) -> String
    {
        let key = Self::key(path);

        PathUtils::ancestors(&key)
            .into_iter()
            .rev()
            .find(|dir| {
                let intent = self
                    .get(dir)
                    .and_then(|a| a.intent)
                    .or_else(|| {
                        tree.find_dir(dir)
                            .and_then(|n| n.intent)
                    });
                intent == Some(StructuralIntent::Manifest)
            })
            .unwrap_or_else(|| PathUtils::parent(&key))
            .to_string()
    }

    /// Files only. Marking a file as start clears every other start
    /// marker within the same manifest scope (see [`Overlay::start_scope`]),
    /// so at most one exists per manifest.
    pub fn set_start(
        &mut self,
        tree: &FileTree,
        path: &str,
        start: bool,
    ) -> Option<Warning>
    {
        if tree
            .find_dir(path)
            .is_some()
        {
            return Some(Warning::new(
                WarningKind::StartOnDirectory,
                path,
                "start marker applies to files only",
            ));
        }

        let key = Self::key(path);

        if start
        {
            let scope = self.start_scope(tree, &key);
            let others: Vec<String> = self
                .entries
                .iter()
                .filter(|(k, a)| a.start && *k != &key)
                .filter(|(k, _)| self.start_scope(tree, k) == scope)
                .map(|(k, _)| k.clone())
                .collect();

            for other in others
            {
                self.edit(&other, |a| a.start = false);
            }
        }

        self.edit(&key, |a| a.start = start);
        None
    }

    pub fn set_provider(
        &mut self,
        path: &str,
        provider: Option<String>,
    )
    {
        self.edit(path, |a| a.provider = provider);
    }

    /// Discard every override on one node
    pub fn clear(
        &mut self,
        path: &str,
    ) -> Option<NodeAnnotations>
    {
        self.entries.remove(&Self::key(path))
    }

    /// Discard overrides on a node and all of its descendants
    pub fn clear_subtree(
        &mut self,
        path: &str,
    ) -> usize
    {
        let key = Self::key(path);
        let before = self.entries.len();

        self.entries
            .retain(|k, _| !PathUtils::is_within(k, &key));

        before - self.entries.len()
    }

    /// Copy a directory's inheritable overrides (behaviors, viewing
    /// direction, rights, navigation date, provider) onto every
    /// descendant directory. Returns the number of entries written.
    pub fn cascade(
        &mut self,
        tree: &FileTree,
        path: &str,
    ) -> usize
    {
        let key = Self::key(path);
        let Some(dir) = tree.find_dir(&key)
        else
        {
            return 0;
        };

        let source = self.resolve(&key);
        let mut targets = Vec::new();
        dir.collect_dir_paths(&mut targets);

        let mut written = 0;

        for target in targets
            .into_iter()
            .filter(|t| *t != key)
        {
            self.edit(&target, |a| {
                a.behaviors = source.behaviors.clone();
                a.viewing_direction = source.viewing_direction;
                a.rights = source.rights.clone();
                a.nav_date = source.nav_date.clone();
                a.provider = source.provider.clone();
            });
            written += 1;
        }

        debug!(path = %key, written, "cascaded annotations");
        written
    }

    /// Install a whole entry through the validating setters.
    /// Used when loading declarative edits.
    pub fn insert(
        &mut self,
        tree: &FileTree,
        path: &str,
        annotations: NodeAnnotations,
    ) -> Vec<Warning>
    {
        let mut warnings = Vec::new();

        if annotations.intent.is_some()
        {
            warnings.extend(self.set_intent(tree, path, annotations.intent));
        }

        if let Some(set) = annotations.behaviors
        {
            warnings.extend(self.set_behaviors(path, Some(set.iter().collect())));
        }

        if annotations.viewing_direction.is_some()
        {
            self.set_viewing_direction(path, annotations.viewing_direction);
        }

        if annotations.label.is_some()
        {
            self.set_label(path, annotations.label);
        }

        if annotations.excluded
        {
            self.set_excluded(path, true);
        }

        if annotations.rights.is_some()
        {
            self.set_rights(path, annotations.rights);
        }

        if let Some(date) = annotations.nav_date.as_deref()
        {
            warnings.extend(self.set_nav_date(path, Some(date)));
        }

        if annotations.start
        {
            warnings.extend(self.set_start(tree, path, true));
        }

        if annotations.provider.is_some()
        {
            self.set_provider(path, annotations.provider);
        }

        warnings
    }
}
