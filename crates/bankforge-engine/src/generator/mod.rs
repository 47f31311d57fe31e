//! Entity generator capability and shared generation helpers.
//!
//! A generator turns `(upstream references, cursor, batch size)` into one
//! bounded batch of rows plus the cursor that follows it. Generators never
//! touch a store: the executor loads reference data for them and imports
//! what they return.
//!
//! Every random draw is seeded from `(seed, stage, row key)`, so producing
//! a batch twice from the same cursor yields the same rows.

pub mod activity;
pub mod channel;
pub mod customer;
pub mod reference;

use std::collections::HashMap;
use std::ops::Range;

use bankforge_types::cursor::StageCursor;
use bankforge_types::row::Row;
use bankforge_types::state::StageName;
use chrono::{Duration, NaiveDate};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::types::CountRange;
use crate::error::GeneratorError;

/// Upstream data a generator reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceNeed {
    /// Full, sorted key set of the stage, loaded once when the stage starts.
    Lookup(StageName),
    /// Keys of the stage that drive generation, paged per batch after the
    /// stage's `LastKey` cursor.
    Window(StageName),
    /// Keys of the stage shaped `{prefix}{window key}...`, reloaded for each
    /// batch and limited to the current window. Requires a `Window`.
    Scoped {
        stage: StageName,
        prefix: &'static str,
    },
}

impl ReferenceNeed {
    #[must_use]
    pub fn stage(&self) -> &StageName {
        match self {
            Self::Lookup(s) | Self::Window(s) | Self::Scoped { stage: s, .. } => s,
        }
    }

    /// Half-open key range `[start, end)` covering every key of a scoped
    /// reference owned by `window`. `end` is `None` when unbounded.
    #[must_use]
    pub fn scope_range(prefix: &str, window: &[String]) -> Option<(String, Option<String>)> {
        let (first, last) = (window.first()?, window.last()?);
        Some((
            format!("{prefix}{first}"),
            prefix_successor(&format!("{prefix}{last}")),
        ))
    }
}

/// Smallest string greater than every string starting with `prefix`.
fn prefix_successor(prefix: &str) -> Option<String> {
    let mut chars: Vec<char> = prefix.chars().collect();
    while let Some(last) = chars.pop() {
        if let Some(next) = char::from_u32(u32::from(last) + 1) {
            chars.push(next);
            return Some(chars.into_iter().collect());
        }
    }
    None
}

/// Sorted set of upstream keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceSet {
    keys: Vec<String>,
}

impl ReferenceSet {
    /// Build from keys in any order.
    #[must_use]
    pub fn new(mut keys: Vec<String>) -> Self {
        keys.sort_unstable();
        keys.dedup();
        Self { keys }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.keys.binary_search_by(|k| k.as_str().cmp(key)).is_ok()
    }

    #[must_use]
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Contiguous run of keys starting with `prefix`.
    #[must_use]
    pub fn with_prefix(&self, prefix: &str) -> &[String] {
        let start = self.keys.partition_point(|k| k.as_str() < prefix);
        let len = self.keys[start..]
            .iter()
            .take_while(|k| k.starts_with(prefix))
            .count();
        &self.keys[start..start + len]
    }

    /// Uniformly chosen key.
    pub fn choose<'a>(&'a self, rng: &mut StdRng) -> Option<&'a str> {
        if self.keys.is_empty() {
            None
        } else {
            Some(self.keys[rng.gen_range(0..self.keys.len())].as_str())
        }
    }
}

/// Reference data handed to [`EntityGenerator::produce_batch`].
#[derive(Debug, Clone, Default)]
pub struct UpstreamRefs {
    lookups: HashMap<StageName, ReferenceSet>,
    window: Vec<String>,
}

impl UpstreamRefs {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_lookup(&mut self, stage: StageName, set: ReferenceSet) {
        self.lookups.insert(stage, set);
    }

    pub fn set_window(&mut self, keys: Vec<String>) {
        self.window = keys;
    }

    /// Loaded lookup for `stage`.
    ///
    /// # Errors
    ///
    /// Returns [`GeneratorError::MissingReference`] if it was never loaded.
    pub fn lookup(&self, stage: &str) -> Result<&ReferenceSet, GeneratorError> {
        self.lookups
            .get(&StageName::new(stage))
            .ok_or_else(|| GeneratorError::MissingReference(StageName::new(stage)))
    }

    /// Driving keys for the current batch, ascending.
    #[must_use]
    pub fn window(&self) -> &[String] {
        &self.window
    }
}

/// One generated batch.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedBatch {
    pub rows: Vec<Row>,
    /// Position after this batch; persisted once the rows are imported.
    pub next_cursor: StageCursor,
    /// No further batches follow.
    pub exhausted: bool,
}

/// Per-stage generation capability.
///
/// Implementations must be deterministic for a given cursor and reference
/// data.
pub trait EntityGenerator: Send + Sync {
    /// Upstream data this generator reads. Every stage named here must be
    /// a declared dependency, and at most one may be a window. Scoped
    /// references need that window.
    fn references(&self) -> Vec<ReferenceNeed> {
        Vec::new()
    }

    /// Produce the batch that follows `cursor`.
    ///
    /// # Errors
    ///
    /// Returns [`GeneratorError`] on unusable cursors or reference data.
    fn produce_batch(
        &self,
        refs: &UpstreamRefs,
        cursor: &StageCursor,
        batch_size: usize,
    ) -> Result<GeneratedBatch, GeneratorError>;
}

// ---------------------------------------------------------------------------
// Helpers shared by the bank generators
// ---------------------------------------------------------------------------

/// RNG seeded from `(seed, stage, key)` with 64-bit FNV-1a.
#[must_use]
pub fn keyed_rng(seed: u64, stage: &str, key: &str) -> StdRng {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0100_0000_01b3;

    let mut hash = OFFSET;
    let bytes = seed
        .to_le_bytes()
        .into_iter()
        .chain(stage.bytes())
        .chain(std::iter::once(0xff))
        .chain(key.bytes());
    for b in bytes {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(PRIME);
    }
    StdRng::seed_from_u64(hash)
}

/// Row-index window for offset-paged stages.
///
/// # Errors
///
/// Returns [`GeneratorError::UnexpectedCursor`] for key cursors.
pub fn offset_window(
    cursor: &StageCursor,
    total: u64,
    batch_size: usize,
) -> Result<Range<u64>, GeneratorError> {
    let start = cursor
        .as_offset()
        .ok_or_else(|| GeneratorError::UnexpectedCursor(cursor.clone()))?;
    let start = start.min(total);
    let end = start.saturating_add(batch_size as u64).min(total);
    Ok(start..end)
}

/// Wrap rows generated for an offset window.
#[must_use]
pub fn offset_batch(rows: Vec<Row>, window: &Range<u64>, total: u64) -> GeneratedBatch {
    GeneratedBatch {
        rows,
        next_cursor: StageCursor::offset(window.end),
        exhausted: window.end >= total,
    }
}

/// Wrap rows generated for a key window.
///
/// The window is exhausted once fewer keys than requested came back.
#[must_use]
pub fn window_batch(
    rows: Vec<Row>,
    window: &[String],
    cursor: &StageCursor,
    batch_size: usize,
) -> GeneratedBatch {
    let next_cursor = window
        .last()
        .map_or_else(|| cursor.clone(), |k| StageCursor::last_key(k.as_str()));
    GeneratedBatch {
        rows,
        next_cursor,
        exhausted: window.len() < batch_size,
    }
}

/// Draw a count from an inclusive range.
pub fn draw_count(rng: &mut StdRng, range: CountRange) -> u32 {
    if range.max <= range.min {
        range.min
    } else {
        rng.gen_range(range.min..=range.max)
    }
}

/// Date uniformly drawn from `[start, start + days)`.
pub fn draw_date(rng: &mut StdRng, start: NaiveDate, days: i64) -> NaiveDate {
    if days <= 1 {
        return start;
    }
    start + Duration::days(rng.gen_range(0..days))
}

/// Money amount rounded to cents.
pub fn draw_amount(rng: &mut StdRng, low: f64, high: f64) -> f64 {
    (rng.gen_range(low..high) * 100.0).round() / 100.0
}

/// Pick one element of a non-empty slice.
pub fn pick<'a, T>(rng: &mut StdRng, items: &'a [T]) -> &'a T {
    &items[rng.gen_range(0..items.len())]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(ks: &[&str]) -> Vec<String> {
        ks.iter().map(|k| (*k).to_string()).collect()
    }

    #[test]
    fn keyed_rng_is_deterministic_and_key_sensitive() {
        let a: u64 = keyed_rng(42, "customer", "C00000001").gen();
        let b: u64 = keyed_rng(42, "customer", "C00000001").gen();
        let c: u64 = keyed_rng(42, "customer", "C00000002").gen();
        let d: u64 = keyed_rng(43, "customer", "C00000001").gen();
        let e: u64 = keyed_rng(42, "app_user", "C00000001").gen();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
        assert_ne!(a, e);
    }

    #[test]
    fn offset_window_clamps_to_total() {
        assert_eq!(offset_window(&StageCursor::Start, 950, 100).unwrap(), 0..100);
        assert_eq!(
            offset_window(&StageCursor::offset(900), 950, 100).unwrap(),
            900..950
        );
        assert_eq!(
            offset_window(&StageCursor::offset(2000), 950, 100).unwrap(),
            950..950
        );
        assert!(offset_window(&StageCursor::last_key("x"), 950, 100).is_err());
    }

    #[test]
    fn offset_batch_exhausts_at_total() {
        let b = offset_batch(Vec::new(), &(900..950), 950);
        assert!(b.exhausted);
        assert_eq!(b.next_cursor, StageCursor::offset(950));
        let b = offset_batch(Vec::new(), &(0..100), 950);
        assert!(!b.exhausted);
    }

    #[test]
    fn window_batch_cursor_follows_last_key() {
        let window = keys(&["C1", "C2"]);
        let b = window_batch(Vec::new(), &window, &StageCursor::Start, 2);
        assert_eq!(b.next_cursor, StageCursor::last_key("C2"));
        assert!(!b.exhausted);

        let b = window_batch(Vec::new(), &[], &StageCursor::last_key("C2"), 2);
        assert_eq!(b.next_cursor, StageCursor::last_key("C2"));
        assert!(b.exhausted);
    }

    #[test]
    fn reference_set_sorts_and_finds_prefixes() {
        let set = ReferenceSet::new(keys(&[
            "FA-C2-01", "FA-C1-02", "FA-C1-01", "FA-C10-01", "FA-C1-01",
        ]));
        assert_eq!(set.len(), 4);
        assert!(set.contains("FA-C1-02"));
        assert!(!set.contains("FA-C3-01"));
        assert_eq!(set.with_prefix("FA-C1-"), &keys(&["FA-C1-01", "FA-C1-02"])[..]);
        assert!(set.with_prefix("FA-C9-").is_empty());
    }

    #[test]
    fn reference_set_choose_empty() {
        let set = ReferenceSet::default();
        let mut rng = keyed_rng(1, "s", "k");
        assert!(set.choose(&mut rng).is_none());
    }

    #[test]
    fn upstream_lookup_missing_is_error() {
        let refs = UpstreamRefs::new();
        assert!(matches!(
            refs.lookup("product"),
            Err(GeneratorError::MissingReference(_))
        ));
    }

    #[test]
    fn draws_stay_in_bounds() {
        let mut rng = keyed_rng(7, "t", "k");
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        for _ in 0..200 {
            let n = draw_count(&mut rng, CountRange::new(2, 5));
            assert!((2..=5).contains(&n));
            let d = draw_date(&mut rng, start, 31);
            assert!(d >= start && d < start + Duration::days(31));
            let amt = draw_amount(&mut rng, 10.0, 20.0);
            assert!((10.0..=20.0).contains(&amt));
        }
        assert_eq!(draw_count(&mut rng, CountRange::new(3, 3)), 3);
    }

    #[test]
    fn scope_range_covers_only_window_owners() {
        let window = keys(&["C00000002", "C00000003"]);
        let (start, end) = ReferenceNeed::scope_range("FA-", &window).unwrap();
        let end = end.unwrap();
        let inside = |k: &str| k >= start.as_str() && k < end.as_str();
        assert!(inside("FA-C00000002-01"));
        assert!(inside("FA-C00000003-99"));
        assert!(!inside("FA-C00000001-05"));
        assert!(!inside("FA-C00000004-01"));
        assert!(ReferenceNeed::scope_range("FA-", &[]).is_none());
    }

    #[test]
    fn prefix_successor_carries_past_max_char() {
        assert_eq!(prefix_successor("AB").as_deref(), Some("AC"));
        assert_eq!(prefix_successor("A\u{10FFFF}").as_deref(), Some("B"));
        assert_eq!(prefix_successor("\u{10FFFF}"), None);
    }
}
