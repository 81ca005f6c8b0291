//! Filepath: src/infra/utils.rs
//! Utility helpers organized by small, focused structs.
//! All functions are associated fns to keep call sites
//! ergonomic, testable, and discoverable.

use std::cmp::Ordering;

use xxhash_rust::xxh64::xxh64;

/// Canonical `/`-separated path helpers. Snapshot paths are
/// relative to the picked root and the root itself is `""`.
pub struct PathUtils;

impl PathUtils
{
    /// Join a directory path and a child name; the root
    /// directory contributes no prefix
    pub fn join(
        dir: &str,
        name: &str,
    ) -> String
    {
        if dir.is_empty()
        {
            return name.to_string();
        }

        // Pre-size for the separator
        let mut out = String::with_capacity(dir.len() + name.len() + 1);
        out.push_str(dir);
        out.push('/');
        out.push_str(name);
        out
    }

    /// Normalize user or OS supplied paths: backslashes become
    /// `/`, empty and `.` segments vanish, leading and trailing
    /// separators are dropped. Returns None on `..` segments.
    pub fn normalize(raw: &str) -> Option<String>
    {
        let replaced = raw.replace('\\', "/");
        let mut parts: Vec<&str> = Vec::new();

        for seg in replaced.split('/')
        {
            match seg
            {
                "" | "." => continue,
                ".." => return None,
                s => parts.push(s),
            }
        }

        Some(parts.join("/"))
    }

    /// Parent directory path (`""` for top-level entries)
    pub fn parent(path: &str) -> &str
    {
        match path.rfind('/')
        {
            Some(idx) => &path[..idx],
            None => "",
        }
    }

    /// Final path segment
    pub fn file_name(path: &str) -> &str
    {
        match path.rfind('/')
        {
            Some(idx) => &path[idx + 1..],
            None => path,
        }
    }

    /// Every proper ancestor of `path`, nearest first, excluding the root
    pub fn ancestors(path: &str) -> Vec<&str>
    {
        let mut out = Vec::new();
        let mut cur = Self::parent(path);

        while !cur.is_empty()
        {
            out.push(cur);
            cur = Self::parent(cur);
        }

        out
    }

    /// True when `path` equals `ancestor` or lives beneath it.
    /// The root (`""`) contains everything.
    pub fn is_within(
        path: &str,
        ancestor: &str,
    ) -> bool
    {
        if ancestor.is_empty() || path == ancestor
        {
            return true;
        }

        path.len() > ancestor.len()
            && path.starts_with(ancestor)
            && path.as_bytes()[ancestor.len()] == b'/'
    }

    /// Split a file name into (stem, extension-with-dot)
    pub fn split_extension(name: &str) -> (&str, &str)
    {
        match name.rfind('.')
        {
            // Dotfiles like `.hidden` have no extension
            Some(0) | None => (name, ""),
            Some(idx) => (&name[..idx], &name[idx..]),
        }
    }
}

/// Display ordering for names: case-folded, digit runs
/// compared by numeric value, raw bytes as the final
/// tie-break so the order is total and stable.
pub struct NameOrder;

impl NameOrder
{
    pub fn compare(
        a: &str,
        b: &str,
    ) -> Ordering
    {
        Self::natural(a, b).then_with(|| a.cmp(b))
    }

    fn natural(
        a: &str,
        b: &str,
    ) -> Ordering
    {
        let mut ai = a.chars().peekable();
        let mut bi = b.chars().peekable();

        loop
        {
            match (ai.peek().copied(), bi.peek().copied())
            {
                (None, None) => return Ordering::Equal,
                (None, Some(_)) => return Ordering::Less,
                (Some(_), None) => return Ordering::Greater,
                (Some(ca), Some(cb)) if ca.is_ascii_digit() && cb.is_ascii_digit() =>
                {
                    let na = Self::take_digits(&mut ai);
                    let nb = Self::take_digits(&mut bi);

                    // Compare by magnitude without parsing: strip
                    // leading zeros, then longer wins, then lexical
                    let ta = na.trim_start_matches('0');
                    let tb = nb.trim_start_matches('0');
                    let ord = ta
                        .len()
                        .cmp(&tb.len())
                        .then_with(|| ta.cmp(tb))
                        .then_with(|| na.len().cmp(&nb.len()));

                    if ord != Ordering::Equal
                    {
                        return ord;
                    }
                }
                (Some(ca), Some(cb)) =>
                {
                    let la = ca.to_lowercase();
                    let lb = cb.to_lowercase();
                    let ord = Iterator::cmp(la, lb);

                    if ord != Ordering::Equal
                    {
                        return ord;
                    }

                    ai.next();
                    bi.next();
                }
            }
        }
    }

    fn take_digits(it: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String
    {
        let mut out = String::new();

        while let Some(c) = it.peek().copied()
        {
            if !c.is_ascii_digit()
            {
                break;
            }

            out.push(c);
            it.next();
        }

        out
    }
}

/// Stable opaque ids derived from content, never from memory
/// addresses, so cross references survive cloning and re-runs.
pub struct IdUtils;

impl IdUtils
{
    /// `prefix-<16 hex>` from an xxh64 of `key`
    pub fn stable_id(
        prefix: &str,
        key: &str,
    ) -> String
    {
        format!("{prefix}-{:016x}", xxh64(key.as_bytes(), 0))
    }
}
