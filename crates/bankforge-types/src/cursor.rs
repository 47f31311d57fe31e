//! Stage-scoped progress cursor.
//!
//! Each stage pages through a different sequence: fixed-volume stages
//! count rows, per-parent stages walk an ordered upstream key set. The
//! cursor is therefore a tagged union and each generator decides which
//! variant it emits.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// Resumable position within a stage's generation sequence.
///
/// Serialized as `{"type": "offset", "value": 700}` so the stored form is
/// self-describing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StageCursor {
    /// Nothing generated yet.
    #[default]
    Start,
    /// Number of rows (or items) already generated.
    Offset { value: u64 },
    /// Last upstream key fully processed; keys are consumed in ascending order.
    LastKey { value: String },
}

impl StageCursor {
    /// Offset cursor helper.
    #[must_use]
    pub fn offset(value: u64) -> Self {
        Self::Offset { value }
    }

    /// Last-key cursor helper.
    #[must_use]
    pub fn last_key(value: impl Into<String>) -> Self {
        Self::LastKey {
            value: value.into(),
        }
    }

    /// Whether this is the initial position.
    #[must_use]
    pub fn is_start(&self) -> bool {
        matches!(self, Self::Start)
    }

    /// Position as a row offset, `None` for key-based cursors.
    #[must_use]
    pub fn as_offset(&self) -> Option<u64> {
        match self {
            Self::Start => Some(0),
            Self::Offset { value } => Some(*value),
            Self::LastKey { .. } => None,
        }
    }

    /// Last processed key, `None` for the start position.
    ///
    /// # Errors
    ///
    /// Returns `Err(())` for offset cursors, which carry no key.
    #[allow(clippy::result_unit_err)]
    pub fn as_last_key(&self) -> Result<Option<&str>, ()> {
        match self {
            Self::Start => Ok(None),
            Self::LastKey { value } => Ok(Some(value.as_str())),
            Self::Offset { .. } => Err(()),
        }
    }

    /// Compare two cursors of the same kind.
    ///
    /// `Start` precedes everything. Cursors of different kinds are
    /// incomparable.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Start, Self::Start) => Some(Ordering::Equal),
            (Self::Start, _) => Some(Ordering::Less),
            (_, Self::Start) => Some(Ordering::Greater),
            (Self::Offset { value: a }, Self::Offset { value: b }) => Some(a.cmp(b)),
            (Self::LastKey { value: a }, Self::LastKey { value: b }) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Whether moving from `previous` to `self` keeps the cursor monotonic.
    #[must_use]
    pub fn advances_from(&self, previous: &Self) -> bool {
        matches!(
            self.compare(previous),
            Some(Ordering::Greater | Ordering::Equal)
        )
    }
}

impl std::fmt::Display for StageCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Start => f.write_str("start"),
            Self::Offset { value } => write!(f, "offset:{value}"),
            Self::LastKey { value } => write!(f, "key:{value}"),
        }
    }
}
