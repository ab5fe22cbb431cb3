//! Bounded decision history.
//!
//! An explicit, owned store with FIFO retention instead of an unbounded map:
//! feedback can legitimately arrive after eviction, which callers must treat
//! as a tolerated miss.

use std::collections::VecDeque;
use std::sync::Mutex;

use dashmap::DashMap;

use crate::engine::decision::{DecisionFeedback, DecisionRecord};
use crate::memory::RecentDecision;

/// FIFO-bounded store of [`DecisionRecord`]s keyed by generated id.
pub struct DecisionHistory {
    records: DashMap<String, DecisionRecord>,
    order: Mutex<VecDeque<String>>,
    capacity: usize,
}

impl DecisionHistory {
    /// Create a history bounded to `capacity` records.
    pub fn new(capacity: usize) -> Self {
        Self {
            records: DashMap::new(),
            order: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    /// Insert a record, evicting the oldest when at capacity.
    pub fn insert(&self, record: DecisionRecord) {
        let mut order = self.lock_order();
        while self.records.len() >= self.capacity {
            match order.pop_front() {
                Some(oldest) => {
                    self.records.remove(&oldest);
                }
                None => break,
            }
        }
        order.push_back(record.id.clone());
        self.records.insert(record.id.clone(), record);
    }

    /// Fetch a record snapshot by id.
    pub fn get(&self, id: &str) -> Option<DecisionRecord> {
        self.records.get(id).map(|entry| entry.value().clone())
    }

    /// Attach feedback to a stored record. Returns the matched rule ids, or
    /// `None` when the record is unknown (evicted or never recorded).
    pub fn attach_feedback(&self, id: &str, feedback: DecisionFeedback) -> Option<Vec<String>> {
        let mut record = self.records.get_mut(id)?;
        record.feedback = Some(feedback);
        Some(record.decision.matched_rules.clone())
    }

    /// The most recent decisions, newest first, truncated to `limit`.
    pub fn recent(&self, limit: usize) -> Vec<RecentDecision> {
        let order = self.lock_order();
        order
            .iter()
            .rev()
            .filter_map(|id| self.records.get(id))
            .take(limit)
            .map(|entry| {
                let record = entry.value();
                RecentDecision {
                    decision_id: record.id.clone(),
                    destination: record.decision.destination.clone(),
                    confidence: record.decision.confidence,
                    decided_at: record.recorded_at,
                }
            })
            .collect()
    }

    /// Number of retained records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether any records are retained.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn lock_order(&self) -> std::sync::MutexGuard<'_, VecDeque<String>> {
        self.order.lock().unwrap_or_else(|e| e.into_inner())
    }
}
