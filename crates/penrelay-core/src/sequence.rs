//! Batch deduplication and sequencing
//!
//! A buffer snapshot may hold several revisions of the same note, in any
//! order. The plan built here:
//! - orders entries by creation date, ties broken by queue key (arrival);
//! - keeps only the last entry per note id, because the vault index may
//!   lag behind rapid writes and intermediate revisions would otherwise
//!   clobber each other;
//! - remembers the full pre-dedup order, so acknowledging a survivor also
//!   purges the duplicates it superseded.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::error::RelayError;
use crate::models::{BufferEntry, NoteEvent, QueueKey};
use crate::normalize::normalize;

/// The outcome of sequencing one batch
#[derive(Debug)]
pub struct Plan {
    /// Events to apply, one per note id, in processing order
    pub events: Vec<NoteEvent>,
    /// Entries that failed validation; never retried, always purged
    pub rejected: Vec<RelayError>,
    /// Every valid entry's key in established order, duplicates included
    order: Vec<QueueKey>,
    rejected_keys: Vec<QueueKey>,
}

impl Plan {
    /// Watermark covering the whole batch: the last key in established order
    pub fn watermark(&self) -> Option<&QueueKey> {
        self.order.last()
    }

    /// Number of raw entries observed (valid and rejected)
    pub fn observed(&self) -> usize {
        self.order.len() + self.rejected_keys.len()
    }

    /// Number of valid entries dropped because a later revision superseded them
    pub fn superseded(&self) -> usize {
        self.order.len() - self.events.len()
    }

    /// Keys that may be purged once everything up to `watermark` is applied
    ///
    /// Covers every valid entry at or before the watermark in established
    /// order plus all rejected entries. With no watermark only rejected
    /// entries are covered.
    pub fn covered_through(&self, watermark: Option<&QueueKey>) -> HashSet<QueueKey> {
        let mut covered: HashSet<QueueKey> = self.rejected_keys.iter().cloned().collect();

        if let Some(mark) = watermark {
            if let Some(pos) = self.order.iter().position(|k| k == mark) {
                covered.extend(self.order[..=pos].iter().cloned());
            }
        }

        covered
    }
}

/// Normalize, order and deduplicate a batch
pub fn sequence(entries: &[BufferEntry]) -> Plan {
    let mut valid = Vec::with_capacity(entries.len());
    let mut rejected = Vec::new();
    let mut rejected_keys = Vec::new();

    for entry in entries {
        match normalize(entry) {
            Ok(event) => valid.push(event),
            Err(e) => {
                rejected_keys.push(entry.key.clone());
                rejected.push(e);
            }
        }
    }

    // Undated events sort first; the key keeps the order total
    valid.sort_by(|a, b| {
        a.created_at
            .at
            .cmp(&b.created_at.at)
            .then_with(|| a.queue_key.cmp(&b.queue_key))
    });

    let order: Vec<QueueKey> = valid.iter().map(|e| e.queue_key.clone()).collect();

    let mut last_for_id: HashMap<&str, usize> = HashMap::new();
    for (idx, event) in valid.iter().enumerate() {
        last_for_id.insert(event.id.as_str(), idx);
    }
    let keep: HashSet<usize> = last_for_id.into_values().collect();

    let events: Vec<NoteEvent> = valid
        .into_iter()
        .enumerate()
        .filter_map(|(idx, event)| keep.contains(&idx).then_some(event))
        .collect();

    debug!(
        "Sequenced batch: {} entries, {} to apply, {} rejected",
        entries.len(),
        events.len(),
        rejected_keys.len()
    );

    Plan {
        events,
        rejected,
        order,
        rejected_keys,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BufferRecord;
    use serde_json::json;

    fn entry(key: &str, id: &str, date: &str) -> BufferEntry {
        BufferEntry::new(
            key,
            BufferRecord {
                platform: None,
                exp: None,
                data: Some(json!({"id": id, "title": id, "body": key, "date_created": date})),
            },
        )
    }

    fn empty_entry(key: &str) -> BufferEntry {
        BufferEntry::new(
            key,
            BufferRecord {
                platform: None,
                exp: None,
                data: None,
            },
        )
    }

    #[test]
    fn test_latest_revision_wins_regardless_of_arrival() {
        // t=2 arrived before t=1
        let batch = vec![
            entry("k1", "A", "2024-01-02"),
            entry("k2", "A", "2024-01-01"),
        ];

        let plan = sequence(&batch);
        assert_eq!(plan.events.len(), 1);
        assert_eq!(plan.events[0].queue_key, QueueKey::from("k1"));
        assert_eq!(plan.events[0].created_at.raw, "2024-01-02");
    }

    #[test]
    fn test_three_revisions_collapse_to_one() {
        let batch = vec![
            entry("k1", "A", "2024-01-01T10:00:00Z"),
            entry("k2", "A", "2024-01-01T11:00:00Z"),
            entry("k3", "A", "2024-01-01T12:00:00Z"),
        ];

        let plan = sequence(&batch);
        assert_eq!(plan.events.len(), 1);
        assert_eq!(plan.events[0].body, "k3");
        assert_eq!(plan.superseded(), 2);
    }

    #[test]
    fn test_ties_broken_by_arrival() {
        let batch = vec![
            entry("k2", "B", "2024-01-01"),
            entry("k1", "A", "2024-01-01"),
            entry("k3", "A", "2024-01-01"),
        ];

        let plan = sequence(&batch);
        let keys: Vec<_> = plan.events.iter().map(|e| e.queue_key.as_str()).collect();
        assert_eq!(keys, vec!["k2", "k3"]);
    }

    #[test]
    fn test_events_ordered_by_creation_date() {
        let batch = vec![
            entry("k1", "late", "2024-02-01"),
            entry("k2", "early", "2024-01-01"),
            entry("k3", "undated", ""),
        ];

        let plan = sequence(&batch);
        let ids: Vec<_> = plan.events.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["undated", "early", "late"]);
    }

    #[test]
    fn test_watermark_covers_superseded_duplicates() {
        let batch = vec![
            entry("k1", "A", "2024-01-01"),
            entry("k2", "B", "2024-01-02"),
            entry("k3", "A", "2024-01-03"),
            entry("k4", "C", "2024-01-04"),
            entry("k5", "B", "2024-01-05"),
        ];

        let plan = sequence(&batch);
        assert_eq!(plan.events.len(), 3);
        assert_eq!(plan.observed(), 5);
        assert_eq!(plan.watermark(), Some(&QueueKey::from("k5")));

        let covered = plan.covered_through(plan.watermark());
        assert_eq!(covered.len(), 5);
    }

    #[test]
    fn test_partial_watermark_stops_at_failure_point() {
        let batch = vec![
            entry("k1", "A", "2024-01-01"),
            entry("k2", "B", "2024-01-02"),
            entry("k3", "A", "2024-01-03"),
        ];

        let plan = sequence(&batch);
        // B applied, A (k3) failed: k1 is superseded by k3, which must stay
        let covered = plan.covered_through(Some(&QueueKey::from("k2")));
        assert!(covered.contains(&QueueKey::from("k1")));
        assert!(covered.contains(&QueueKey::from("k2")));
        assert!(!covered.contains(&QueueKey::from("k3")));
    }

    #[test]
    fn test_rejected_entries_always_covered() {
        let batch = vec![empty_entry("k1"), entry("k2", "A", "2024-01-01")];

        let plan = sequence(&batch);
        assert_eq!(plan.rejected.len(), 1);
        assert_eq!(plan.events.len(), 1);

        let covered = plan.covered_through(None);
        assert_eq!(covered.len(), 1);
        assert!(covered.contains(&QueueKey::from("k1")));
    }

    #[test]
    fn test_all_rejected_batch() {
        let batch = vec![empty_entry("k1"), empty_entry("k2")];

        let plan = sequence(&batch);
        assert!(plan.events.is_empty());
        assert!(plan.watermark().is_none());
        assert_eq!(plan.covered_through(None).len(), 2);
    }
}
