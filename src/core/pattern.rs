//! Regex metadata extraction and filename sequence detection.
//!
//! User patterns are compiled into a tagged [`CompiledPattern`]; a pattern
//! that fails to compile is carried as a value and matches nothing, so bad
//! input never reaches the apply pipeline as an error.

use std::{collections::HashSet, str::FromStr, sync::LazyLock};

use indexmap::IndexMap;
use itertools::Itertools;
use regex::Regex;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::infra::utils::NameOrder;

/// Upper bound on gap numbers reported per sequence
const MAX_REPORTED_GAPS: usize = 256;

#[derive(Debug, Error)]
pub enum PatternError
{
    #[error("invalid pattern '{pattern}': {source}")]
    InvalidRegex
    {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("pattern has no capture group '{0}'")]
    UnknownGroup(String),

    #[error("invalid mapping '{0}', expected GROUP=PROPERTY")]
    InvalidMapping(String),
}

/// Capture group addressed by position or by name
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum CaptureRef
{
    Index(usize),
    Name(String),
}

impl std::fmt::Display for CaptureRef
{
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result
    {
        match self
        {
            CaptureRef::Index(i) => write!(f, "{i}"),
            CaptureRef::Name(n) => f.write_str(n),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PropertyMapping
{
    pub group: CaptureRef,
    pub property: String,
}

impl PropertyMapping
{
    pub fn new(
        group: CaptureRef,
        property: impl Into<String>,
    ) -> Self
    {
        Self { group, property: property.into() }
    }
}

/// Parses `GROUP=PROPERTY`; numeric groups address captures by position
impl FromStr for PropertyMapping
{
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        let (group, property) = s
            .split_once('=')
            .ok_or_else(|| PatternError::InvalidMapping(s.to_string()))?;

        let (group, property) = (group.trim(), property.trim());
        if group.is_empty() || property.is_empty()
        {
            return Err(PatternError::InvalidMapping(s.to_string()));
        }

        let group = match group.parse::<usize>()
        {
            Ok(idx) => CaptureRef::Index(idx),
            Err(_) => CaptureRef::Name(group.to_string()),
        };

        Ok(Self::new(group, property))
    }
}

/// A compiled, validated pattern plus its group mappings
#[derive(Debug, Clone)]
pub struct PatternMatcher
{
    regex: Regex,
    mappings: Vec<PropertyMapping>,
}

/// Outcome of compiling a user pattern
#[derive(Debug, Clone)]
pub enum CompiledPattern
{
    Valid(PatternMatcher),
    Invalid
    {
        pattern: String, error: String
    },
}

/// Per-item extraction result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Extraction
{
    pub item: String,
    pub properties: IndexMap<String, String>,
    pub matched: bool,
}

impl PatternMatcher
{
    /// Compile `pattern` and check every mapping against its capture groups.
    /// Never panics; failures come back as [`CompiledPattern::Invalid`].
    pub fn compile(
        pattern: &str,
        mappings: Vec<PropertyMapping>,
    ) -> CompiledPattern
    {
        match Self::try_compile(pattern, mappings)
        {
            Ok(matcher) => CompiledPattern::Valid(matcher),
            Err(err) =>
            {
                debug!(%err, "pattern rejected");
                CompiledPattern::Invalid { pattern: pattern.to_string(), error: err.to_string() }
            }
        }
    }

    pub fn try_compile(
        pattern: &str,
        mappings: Vec<PropertyMapping>,
    ) -> Result<Self, PatternError>
    {
        let regex = Regex::new(pattern).map_err(|source| PatternError::InvalidRegex {
            pattern: pattern.to_string(),
            source,
        })?;

        for mapping in &mappings
        {
            let known = match &mapping.group
            {
                CaptureRef::Index(i) => *i < regex.captures_len(),
                CaptureRef::Name(n) => regex
                    .capture_names()
                    .flatten()
                    .any(|name| name == n),
            };

            if !known
            {
                return Err(PatternError::UnknownGroup(mapping.group.to_string()));
            }
        }

        Ok(Self { regex, mappings })
    }

    pub fn as_str(&self) -> &str
    {
        self.regex.as_str()
    }

    fn extract_one(
        &self,
        item: &str,
    ) -> Extraction
    {
        let Some(caps) = self.regex.captures(item)
        else
        {
            return Extraction::unmatched(item);
        };

        let mut properties = IndexMap::new();

        for mapping in &self.mappings
        {
            let value = match &mapping.group
            {
                CaptureRef::Index(i) => caps.get(*i),
                CaptureRef::Name(n) => caps.name(n),
            };

            // Optional groups that did not participate contribute nothing
            if let Some(m) = value
            {
                properties.insert(mapping.property.clone(), m.as_str().to_string());
            }
        }

        Extraction { item: item.to_string(), properties, matched: true }
    }
}

impl Extraction
{
    fn unmatched(item: &str) -> Self
    {
        Self { item: item.to_string(), properties: IndexMap::new(), matched: false }
    }
}

impl CompiledPattern
{
    pub fn is_valid(&self) -> bool
    {
        matches!(self, CompiledPattern::Valid(_))
    }

    pub fn error(&self) -> Option<&str>
    {
        match self
        {
            CompiledPattern::Valid(_) => None,
            CompiledPattern::Invalid { error, .. } => Some(error),
        }
    }

    /// One result per item in input order. An invalid pattern yields
    /// `matched = false` with no properties for every item.
    pub fn extract<S: AsRef<str>>(
        &self,
        items: &[S],
    ) -> Vec<Extraction>
    {
        match self
        {
            CompiledPattern::Valid(matcher) => items
                .iter()
                .map(|item| matcher.extract_one(item.as_ref()))
                .collect(),
            CompiledPattern::Invalid { .. } => items
                .iter()
                .map(|item| Extraction::unmatched(item.as_ref()))
                .collect(),
        }
    }
}

static SEQUENCE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.*?)(\d+)(\D*)$").unwrap());

/// A numbered run of sibling names such as `page_001.jpg .. page_040.jpg`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SequencePattern
{
    /// Display template, e.g. `page_{n}.jpg`
    pub template: String,
    pub prefix: String,
    pub suffix: String,

    /// Zero-padding width when every member is padded alike, else 0
    pub width: usize,
    pub first: u64,
    pub last: u64,

    /// Missing numbers between `first` and `last` (capped)
    pub gaps: Vec<u64>,

    /// Member names in numeric order
    pub members: Vec<String>,
}

impl SequencePattern
{
    pub fn is_partial(&self) -> bool
    {
        !self.gaps.is_empty()
    }
}

/// Find the dominant `prefix{n}suffix` template among `names`.
///
/// Names are grouped by case-folded prefix and suffix around their last run
/// of digits. The largest group wins (ties go to the group seen first); a
/// group needs at least two distinct numbers to count as a sequence.
pub fn detect_sequence<S: AsRef<str>>(names: &[S]) -> Option<SequencePattern>
{
    let parsed: Vec<(String, &str, &str, u64, &str)> = names
        .iter()
        .filter_map(|name| {
            let name = name.as_ref();
            let caps = SEQUENCE_NAME.captures(name)?;
            let prefix = caps.get(1)?.as_str();
            let digits = caps.get(2)?.as_str();
            let suffix = caps.get(3)?.as_str();
            let number = digits.parse::<u64>().ok()?;
            Some((name.to_string(), prefix, suffix, number, digits))
        })
        .collect();

    // Group indices by key, remembering first-seen order
    let mut groups: IndexMap<(String, String), Vec<usize>> = IndexMap::new();
    for (idx, (_, prefix, suffix, ..)) in parsed.iter().enumerate()
    {
        groups
            .entry((prefix.to_lowercase(), suffix.to_lowercase()))
            .or_default()
            .push(idx);
    }

    let best = groups
        .values()
        .filter(|members| {
            members
                .iter()
                .map(|&i| parsed[i].3)
                .unique()
                .count()
                >= 2
        })
        .rev()
        .max_by_key(|members| members.len())?;

    let mut members: Vec<&(String, &str, &str, u64, &str)> = best
        .iter()
        .map(|&i| &parsed[i])
        .collect();
    members.sort_by(|a, b| a.3.cmp(&b.3).then_with(|| NameOrder::compare(&a.0, &b.0)));

    let (_, prefix, suffix, first, _) = members[0];
    let last = members[members.len() - 1].3;

    let widths: Vec<usize> = members
        .iter()
        .map(|m| m.4.len())
        .unique()
        .collect();
    let padded = members
        .iter()
        .any(|m| m.4.starts_with('0') && m.4.len() > 1);
    let width = if widths.len() == 1 && padded { widths[0] } else { 0 };

    let present: HashSet<u64> = members
        .iter()
        .map(|m| m.3)
        .collect();
    let gaps: Vec<u64> = (*first..=last)
        .filter(|n| !present.contains(n))
        .take(MAX_REPORTED_GAPS)
        .collect();

    Some(SequencePattern {
        template: format!("{prefix}{{n}}{suffix}"),
        prefix: prefix.to_string(),
        suffix: suffix.to_string(),
        width,
        first: *first,
        last,
        gaps,
        members: members
            .iter()
            .map(|m| m.0.clone())
            .collect(),
    })
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn mapping(s: &str) -> PropertyMapping
    {
        s.parse().unwrap()
    }

    #[test]
    fn named_and_indexed_groups_extract_properties()
    {
        let compiled = PatternMatcher::compile(
            r"^(?<year>\d{4})-(\d{2})_(?<title>\w+)\.jpg$",
            vec![mapping("year=date"), mapping("2=month"), mapping("title=label")],
        );
        assert!(compiled.is_valid());

        let out = compiled.extract(&["1923-04_harbour.jpg", "notes.txt"]);
        assert!(out[0].matched);
        assert_eq!(out[0].properties["date"], "1923");
        assert_eq!(out[0].properties["month"], "04");
        assert_eq!(out[0].properties["label"], "harbour");

        assert!(!out[1].matched);
        assert!(out[1].properties.is_empty());
    }

    #[test]
    fn malformed_pattern_degrades_to_no_matches()
    {
        let compiled = PatternMatcher::compile(r"(unclosed", vec![]);
        assert!(!compiled.is_valid());
        assert!(compiled.error().is_some());

        let out = compiled.extract(&["a", "b"]);
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|e| !e.matched && e.properties.is_empty()));
    }

    #[test]
    fn unknown_group_is_a_compile_error()
    {
        let compiled = PatternMatcher::compile(r"(\d+)", vec![mapping("5=page")]);
        assert!(compiled.error().is_some_and(|e| e.contains("'5'")));

        let compiled = PatternMatcher::compile(r"(\d+)", vec![mapping("missing=page")]);
        assert!(!compiled.is_valid());
    }

    #[test]
    fn mapping_parse_rejects_garbage()
    {
        assert!("nope".parse::<PropertyMapping>().is_err());
        assert!("=x".parse::<PropertyMapping>().is_err());
        assert_eq!(mapping("1=page").group, CaptureRef::Index(1));
    }

    #[test]
    fn sequence_template_and_gaps()
    {
        let names = ["page_003.jpg", "page_001.jpg", "cover.jpg", "page_002.jpg", "page_005.jpg"];
        let seq = detect_sequence(&names).unwrap();

        assert_eq!(seq.template, "page_{n}.jpg");
        assert_eq!(seq.width, 3);
        assert_eq!((seq.first, seq.last), (1, 5));
        assert_eq!(seq.gaps, vec![4]);
        assert!(seq.is_partial());
        assert_eq!(seq.members[0], "page_001.jpg");
    }

    #[test]
    fn no_sequence_without_two_distinct_numbers()
    {
        assert!(detect_sequence(&["cover.jpg", "back.jpg"]).is_none());
        assert!(detect_sequence(&["scan1.tif"]).is_none());
        assert!(detect_sequence::<&str>(&[]).is_none());
    }
}
