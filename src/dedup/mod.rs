//! Duplicate detection on normalized key columns
//!
//! A dedup key is built from user-chosen columns: each value is trimmed and
//! case-folded, and the values are joined with a unit separator (U+001F) that
//! does not occur in ordinary field values. Keys are stored as 128-bit BLAKE3
//! digests so large key sets stay compact.
//!
//! A row whose key columns are all empty never counts as a duplicate, no
//! matter how many other empty-key rows exist.

mod corpus;

pub use corpus::*;

use crate::error::{Error, Result};
use crate::reader::{Row, RowSink};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::str::FromStr;

/// Separator between key parts
pub const KEY_SEPARATOR: char = '\u{1f}';

/// Which dedup passes an import runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DedupMode {
    /// Within the incoming file only
    File,
    /// Against the owner's previously imported tables only
    Database,
    /// Both passes
    Both,
}

impl DedupMode {
    pub fn in_file(self) -> bool {
        matches!(self, DedupMode::File | DedupMode::Both)
    }

    pub fn database(self) -> bool {
        matches!(self, DedupMode::Database | DedupMode::Both)
    }
}

impl std::fmt::Display for DedupMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DedupMode::File => write!(f, "file"),
            DedupMode::Database => write!(f, "database"),
            DedupMode::Both => write!(f, "both"),
        }
    }
}

impl FromStr for DedupMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "file" => Ok(DedupMode::File),
            "database" | "db" => Ok(DedupMode::Database),
            "both" => Ok(DedupMode::Both),
            _ => Err(Error::Config(format!("Unknown dedup mode: {}", s))),
        }
    }
}

/// Compact form of a normalized key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DedupKey([u8; 16]);

impl DedupKey {
    pub fn of(normalized: &str) -> Self {
        let hash = blake3::hash(normalized.as_bytes());
        let mut digest = [0u8; 16];
        digest.copy_from_slice(&hash.as_bytes()[..16]);
        Self(digest)
    }
}

/// Normalize one key part: NBSP folded to space, trimmed, lower-cased
pub fn normalize_value(value: &str) -> String {
    value
        .replace(['\u{a0}', KEY_SEPARATOR], " ")
        .trim()
        .to_lowercase()
}

/// Key columns resolved against one header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpec {
    columns: Vec<usize>,
}

impl KeySpec {
    /// Resolve column names (trimmed, case-insensitive) to positions
    pub fn resolve(headers: &[String], key_columns: &[String], context: &str) -> Result<Self> {
        let columns = key_columns
            .iter()
            .map(|name| {
                let wanted = name.trim();
                headers
                    .iter()
                    .position(|h| h.trim().eq_ignore_ascii_case(wanted))
                    .ok_or_else(|| Error::UnknownColumn {
                        column: name.clone(),
                        context: context.to_string(),
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { columns })
    }

    pub fn columns(&self) -> &[usize] {
        &self.columns
    }

    /// Readable normalized key, `None` when every key column is empty
    pub fn normalized_key(&self, fields: &[String]) -> Option<String> {
        let parts: Vec<String> = self
            .columns
            .iter()
            .map(|&idx| fields.get(idx).map(|v| normalize_value(v)).unwrap_or_default())
            .collect();
        if parts.iter().all(String::is_empty) {
            return None;
        }
        Some(parts.join(&KEY_SEPARATOR.to_string()))
    }

    pub fn key(&self, fields: &[String]) -> Option<DedupKey> {
        self.normalized_key(fields).map(|k| DedupKey::of(&k))
    }
}

/// Set of keys seen during one run. Owned by the run, never shared.
#[derive(Debug, Default)]
pub struct KeySet {
    seen: HashSet<DedupKey>,
}

impl KeySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the key was already present
    pub fn insert(&mut self, key: DedupKey) -> bool {
        self.seen.insert(key)
    }

    pub fn contains(&self, key: &DedupKey) -> bool {
        self.seen.contains(key)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// Decides whether a row is a duplicate
pub trait Deduplicator {
    fn is_duplicate(&mut self, fields: &[String]) -> bool;
}

/// A disabled stage flags nothing
impl<D: Deduplicator> Deduplicator for Option<D> {
    fn is_duplicate(&mut self, fields: &[String]) -> bool {
        match self {
            Some(dedup) => dedup.is_duplicate(fields),
            None => false,
        }
    }
}

/// Flags rows repeating a key seen earlier in the same stream
#[derive(Debug)]
pub struct InFileDeduplicator {
    spec: KeySpec,
    seen: KeySet,
}

impl InFileDeduplicator {
    pub fn new(spec: KeySpec) -> Self {
        Self {
            spec,
            seen: KeySet::new(),
        }
    }

    /// Distinct non-empty keys seen so far
    pub fn distinct_keys(&self) -> usize {
        self.seen.len()
    }
}

impl Deduplicator for InFileDeduplicator {
    fn is_duplicate(&mut self, fields: &[String]) -> bool {
        match self.spec.key(fields) {
            Some(key) => !self.seen.insert(key),
            None => false,
        }
    }
}

/// Unique/duplicate tallies for one dedup stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupCounts {
    pub unique: u64,
    pub duplicates: u64,
}

impl DedupCounts {
    pub fn total(&self) -> u64 {
        self.unique + self.duplicates
    }
}

/// Iterator adaptor that writes duplicates to a side sink and yields the rest
pub struct DivertDuplicates<'a, I, D: ?Sized> {
    inner: I,
    dedup: &'a mut D,
    duplicates: &'a mut dyn RowSink,
    counts: &'a mut DedupCounts,
}

impl<'a, I, D> Iterator for DivertDuplicates<'a, I, D>
where
    I: Iterator<Item = Result<Row>>,
    D: Deduplicator + ?Sized,
{
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let row = match self.inner.next()? {
                Ok(row) => row,
                Err(e) => return Some(Err(e)),
            };
            if self.dedup.is_duplicate(&row.fields) {
                self.counts.duplicates += 1;
                if let Err(e) = self.duplicates.write_row(&row.fields) {
                    return Some(Err(e));
                }
                continue;
            }
            self.counts.unique += 1;
            return Some(Ok(row));
        }
    }
}

pub trait DivertDuplicatesExt: Iterator<Item = Result<Row>> + Sized {
    /// Route rows `dedup` flags into `duplicates`, tallying into `counts`
    fn divert_duplicates<'a, D: Deduplicator + ?Sized>(
        self,
        dedup: &'a mut D,
        duplicates: &'a mut dyn RowSink,
        counts: &'a mut DedupCounts,
    ) -> DivertDuplicates<'a, Self, D> {
        DivertDuplicates {
            inner: self,
            dedup,
            duplicates,
            counts,
        }
    }
}

impl<I: Iterator<Item = Result<Row>>> DivertDuplicatesExt for I {}

/// Drain `rows` into two sinks
pub fn partition<I, D>(
    rows: I,
    dedup: &mut D,
    unique: &mut dyn RowSink,
    duplicates: &mut dyn RowSink,
) -> Result<DedupCounts>
where
    I: Iterator<Item = Result<Row>>,
    D: Deduplicator + ?Sized,
{
    let mut counts = DedupCounts::default();
    for row in rows.divert_duplicates(dedup, duplicates, &mut counts) {
        unique.write_row(&row?.fields)?;
    }
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn rows(data: &[&[&str]]) -> Vec<Result<Row>> {
        data.iter()
            .enumerate()
            .map(|(i, r)| Ok(Row::new(i as u64 + 2, r.iter().map(|s| s.to_string()).collect())))
            .collect()
    }

    #[test]
    fn test_key_is_trimmed_and_case_folded() {
        let spec = KeySpec::resolve(&headers(&["name", "Email"]), &["email".to_string()], "t").unwrap();
        let a = spec.key(&headers(&["x", "  Ann@X.io "])).unwrap();
        let b = spec.key(&headers(&["y", "ann@x.io"])).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_multi_column_key_keeps_parts_apart() {
        let spec = KeySpec::resolve(
            &headers(&["first", "last"]),
            &["first".to_string(), "last".to_string()],
            "t",
        )
        .unwrap();
        assert_ne!(
            spec.key(&headers(&["ab", "c"])),
            spec.key(&headers(&["a", "bc"]))
        );
        assert_eq!(
            spec.normalized_key(&headers(&["", "Smith"])).unwrap(),
            format!("{KEY_SEPARATOR}smith")
        );
    }

    #[test]
    fn test_unknown_key_column() {
        let err = KeySpec::resolve(&headers(&["a"]), &["email".to_string()], "upload").unwrap_err();
        assert!(matches!(err, Error::UnknownColumn { .. }));
    }

    #[test]
    fn test_partition_counts_add_up() {
        let spec = KeySpec::resolve(&headers(&["id", "email"]), &["email".to_string()], "t").unwrap();
        let mut dedup = InFileDeduplicator::new(spec);
        let input = rows(&[
            &["1", "a@x.io"],
            &["2", "b@x.io"],
            &["3", "A@X.IO "],
            &["4", "a@x.io"],
            &["5", "c@x.io"],
        ]);

        let mut unique: Vec<Vec<String>> = Vec::new();
        let mut dups: Vec<Vec<String>> = Vec::new();
        let counts = partition(input.into_iter(), &mut dedup, &mut unique, &mut dups).unwrap();

        assert_eq!(counts, DedupCounts { unique: 3, duplicates: 2 });
        assert_eq!(counts.total(), 5);
        assert_eq!(dups[0][0], "3");
        assert_eq!(dups[1][0], "4");
        assert_eq!(dedup.distinct_keys(), 3);
    }

    #[test]
    fn test_all_empty_keys_are_never_duplicates() {
        let spec = KeySpec::resolve(
            &headers(&["id", "email", "phone"]),
            &["email".to_string(), "phone".to_string()],
            "t",
        )
        .unwrap();
        let mut dedup = InFileDeduplicator::new(spec);
        let input = rows(&[
            &["1", "", ""],
            &["2", "  ", "\u{a0}"],
            &["3", "", ""],
            &["4", "", "555"],
            &["5", "", "555"],
        ]);

        let mut unique: Vec<Vec<String>> = Vec::new();
        let mut dups: Vec<Vec<String>> = Vec::new();
        let counts = partition(input.into_iter(), &mut dedup, &mut unique, &mut dups).unwrap();

        assert_eq!(counts.unique, 4);
        assert_eq!(counts.duplicates, 1);
        assert_eq!(dups, vec![vec!["5", "", "555"]]);
    }

    #[test]
    fn test_dedup_mode_flags() {
        assert!(DedupMode::Both.in_file() && DedupMode::Both.database());
        assert!(!DedupMode::File.database());
        assert!(!DedupMode::Database.in_file());
        assert_eq!("db".parse::<DedupMode>().unwrap(), DedupMode::Database);
    }
}
