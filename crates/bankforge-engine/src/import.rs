//! Seams between the executor and the relational target store.

use bankforge_types::row::Row;
use bankforge_types::state::StageName;

use crate::error::ImportError;

/// Commits generated batches.
pub trait BatchImporter: Send + Sync {
    /// Import `rows` into `stage`'s table as a single atomic unit and return
    /// the number of rows committed. On error nothing from the batch is
    /// visible.
    ///
    /// Re-importing a row with an existing key replaces it.
    ///
    /// # Errors
    ///
    /// Returns [`ImportError`] if the batch was not committed.
    fn import(&self, stage: &StageName, rows: &[Row]) -> Result<u64, ImportError>;
}

/// Reads upstream keys for generators.
pub trait ReferenceSource: Send + Sync {
    /// Up to `limit` keys of `stage` strictly after `after`, ascending.
    /// A stage that has produced nothing yields an empty page.
    ///
    /// # Errors
    ///
    /// Returns [`ImportError`] on read failure.
    fn page_keys(
        &self,
        stage: &StageName,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<String>, ImportError>;

    /// Every key of `stage` in `[start, end)`, ascending. `end = None` reads
    /// to the last key.
    ///
    /// # Errors
    ///
    /// Returns [`ImportError`] on read failure.
    fn range_keys(
        &self,
        stage: &StageName,
        start: &str,
        end: Option<&str>,
    ) -> Result<Vec<String>, ImportError>;
}

/// Read every key of `stage` in pages of `page_size`.
///
/// # Errors
///
/// Returns the first [`ImportError`] from the source.
pub fn load_all_keys(
    source: &dyn ReferenceSource,
    stage: &StageName,
    page_size: usize,
) -> Result<Vec<String>, ImportError> {
    let page_size = page_size.max(1);
    let mut keys: Vec<String> = Vec::new();
    loop {
        let page = source.page_keys(stage, keys.last().map(String::as_str), page_size)?;
        let done = page.len() < page_size;
        keys.extend(page);
        if done {
            return Ok(keys);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Paged {
        keys: Vec<String>,
        calls: Mutex<usize>,
    }

    impl ReferenceSource for Paged {
        fn page_keys(
            &self,
            _stage: &StageName,
            after: Option<&str>,
            limit: usize,
        ) -> Result<Vec<String>, ImportError> {
            *self.calls.lock().unwrap() += 1;
            Ok(self
                .keys
                .iter()
                .filter(|k| after.map_or(true, |a| k.as_str() > a))
                .take(limit)
                .cloned()
                .collect())
        }

        fn range_keys(
            &self,
            _stage: &StageName,
            start: &str,
            end: Option<&str>,
        ) -> Result<Vec<String>, ImportError> {
            Ok(self
                .keys
                .iter()
                .filter(|k| k.as_str() >= start && end.map_or(true, |e| k.as_str() < e))
                .cloned()
                .collect())
        }
    }

    #[test]
    fn loads_every_page() {
        let source = Paged {
            keys: (1..=25).map(|i| format!("K{i:03}")).collect(),
            calls: Mutex::new(0),
        };
        let keys = load_all_keys(&source, &StageName::new("s"), 10).unwrap();
        assert_eq!(keys.len(), 25);
        assert_eq!(keys.last().map(String::as_str), Some("K025"));
        assert_eq!(*source.calls.lock().unwrap(), 3);
    }

    #[test]
    fn exact_multiple_needs_one_empty_page() {
        let source = Paged {
            keys: (1..=20).map(|i| format!("K{i:03}")).collect(),
            calls: Mutex::new(0),
        };
        let keys = load_all_keys(&source, &StageName::new("s"), 10).unwrap();
        assert_eq!(keys.len(), 20);
        assert_eq!(*source.calls.lock().unwrap(), 3);
    }
}
