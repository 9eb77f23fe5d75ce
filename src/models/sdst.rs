//! Sequence-dependent setup time matrix.
//!
//! Setup minutes depend on the transition between surgery types: preparing a
//! room for a knee replacement after an appendectomy takes a different time
//! than after another knee replacement. The matrix is loaded once per
//! optimization run into an immutable snapshot and is safe to share across
//! readers.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ids::SurgeryTypeId;

/// One matrix entry. `from = None` is the initial-setup row, used when the
/// room's sequence is empty or the surgery opens the day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetupTimeEntry {
    pub from: Option<SurgeryTypeId>,
    pub to: SurgeryTypeId,
    pub minutes: i64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SetupMatrixError {
    #[error("negative setup time {minutes} for transition {from:?} -> {to}")]
    NegativeMinutes {
        from: Option<SurgeryTypeId>,
        to: SurgeryTypeId,
        minutes: i64,
    },
    #[error("duplicate entry for transition {from:?} -> {to}")]
    DuplicateEntry {
        from: Option<SurgeryTypeId>,
        to: SurgeryTypeId,
    },
}

/// O(1) resolver for `(from_type?, to_type) -> setup minutes`.
///
/// Missing pairs resolve to the configured default. Construction rejects
/// negative values and duplicate keys.
#[derive(Debug, Clone, Default)]
pub struct SetupTimeMatrix {
    entries: HashMap<(Option<SurgeryTypeId>, SurgeryTypeId), i64>,
    default_minutes: i64,
}

impl SetupTimeMatrix {
    pub fn new(
        entries: impl IntoIterator<Item = SetupTimeEntry>,
        default_minutes: i64,
    ) -> Result<Self, SetupMatrixError> {
        let mut map = HashMap::new();
        for entry in entries {
            if entry.minutes < 0 {
                return Err(SetupMatrixError::NegativeMinutes {
                    from: entry.from,
                    to: entry.to,
                    minutes: entry.minutes,
                });
            }
            if map.insert((entry.from, entry.to), entry.minutes).is_some() {
                return Err(SetupMatrixError::DuplicateEntry {
                    from: entry.from,
                    to: entry.to,
                });
            }
        }
        Ok(Self {
            entries: map,
            default_minutes: default_minutes.max(0),
        })
    }

    /// Empty matrix: every transition resolves to `default_minutes`.
    pub fn empty(default_minutes: i64) -> Self {
        Self {
            entries: HashMap::new(),
            default_minutes: default_minutes.max(0),
        }
    }

    /// Replace the fallback used for missing pairs (the configuration owns
    /// this value; stored snapshots may carry a different one).
    pub fn with_default_minutes(mut self, default_minutes: i64) -> Self {
        self.default_minutes = default_minutes.max(0);
        self
    }

    /// Setup minutes for scheduling `to` immediately after `from`.
    /// `from = None` selects the initial-setup row.
    pub fn setup_minutes(&self, from: Option<SurgeryTypeId>, to: SurgeryTypeId) -> i64 {
        self.entries
            .get(&(from, to))
            .copied()
            .unwrap_or(self.default_minutes)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(v: i64) -> SurgeryTypeId {
        SurgeryTypeId::new(v)
    }

    fn entry(from: Option<i64>, to: i64, minutes: i64) -> SetupTimeEntry {
        SetupTimeEntry {
            from: from.map(t),
            to: t(to),
            minutes,
        }
    }

    #[test]
    fn test_lookup_and_initial_row() {
        let matrix = SetupTimeMatrix::new(
            [entry(None, 1, 15), entry(Some(1), 2, 30)],
            0,
        )
        .unwrap();
        assert_eq!(matrix.setup_minutes(None, t(1)), 15);
        assert_eq!(matrix.setup_minutes(Some(t(1)), t(2)), 30);
    }

    #[test]
    fn test_missing_pair_uses_default() {
        let matrix = SetupTimeMatrix::new([entry(None, 1, 15)], 5).unwrap();
        assert_eq!(matrix.setup_minutes(Some(t(9)), t(1)), 5);
    }

    #[test]
    fn test_negative_minutes_rejected_at_load() {
        let err = SetupTimeMatrix::new([entry(Some(1), 2, -3)], 0).unwrap_err();
        assert!(matches!(err, SetupMatrixError::NegativeMinutes { .. }));
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let err =
            SetupTimeMatrix::new([entry(Some(1), 2, 10), entry(Some(1), 2, 20)], 0).unwrap_err();
        assert_eq!(
            err,
            SetupMatrixError::DuplicateEntry {
                from: Some(t(1)),
                to: t(2)
            }
        );
    }
}
