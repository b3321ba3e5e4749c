//! Multi-key ordering of eligible candidates

use crate::models::{RankedResultRow, SortKey};
use crate::observability::RunLogger;
use std::cmp::Ordering;

/// Key used when the workload gives no usable sort order
pub const DEFAULT_SORT_KEY: SortKey = SortKey::Cpu;

/// Orders eligible rows ascending by a sequence of utilization columns
#[derive(Debug, Clone, Copy, Default)]
pub struct Ranker;

impl Ranker {
    pub fn new() -> Self {
        Self
    }

    /// Turn workload sort tags into keys
    ///
    /// Unknown tags are dropped with a warning. An absent order, or one with
    /// no recognised tag, yields the default key so ranking always proceeds.
    pub fn resolve_keys(&self, sort_order: Option<&[String]>, logger: &RunLogger) -> Vec<SortKey> {
        let Some(tags) = sort_order else {
            return vec![DEFAULT_SORT_KEY];
        };

        let mut keys = Vec::with_capacity(tags.len());
        for tag in tags {
            match SortKey::parse(tag) {
                Some(key) => keys.push(key),
                None => logger.log_unknown_sort_tag(tag),
            }
        }

        if keys.is_empty() {
            logger.log_sort_fallback(tags, DEFAULT_SORT_KEY.column());
            keys.push(DEFAULT_SORT_KEY);
        }
        keys
    }

    /// Stable sort of `rows` by `keys`, first key most significant
    pub fn rank(&self, rows: &mut [RankedResultRow], keys: &[SortKey]) {
        let keys = if keys.is_empty() {
            &[DEFAULT_SORT_KEY][..]
        } else {
            keys
        };

        rows.sort_by(|a, b| {
            keys.iter()
                .map(|key| sort_value(a, *key).total_cmp(&sort_value(b, *key)))
                .find(|ord| *ord != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });
    }
}

/// Unscored rows sort last
fn sort_value(row: &RankedResultRow, key: SortKey) -> f64 {
    row.utilization
        .as_ref()
        .map_or(f64::INFINITY, |score| key.value(score))
}
