//! Per-identity match aggregation.
//!
//! Folds detection events into a running list of [`MatchRecord`]s keyed by
//! name. Pure data transformation: callers own the record list and always
//! receive a freshly merged copy, sorted most-recently-seen first.

use std::collections::HashMap;

use crate::types::{DetectionEvent, MatchRecord};

impl MatchRecord {
    /// Seed a record from the first event observed for a name.
    fn seed(event: &DetectionEvent) -> Self {
        Self {
            name: event.name.clone(),
            confidence: event.confidence,
            first_seen: event.timestamp,
            last_seen: event.timestamp,
            first_frame: event.frame,
            last_frame: event.frame,
            thumbnail: event.thumbnail.clone(),
            count: 1,
            sources: event.source.into_iter().collect(),
        }
    }

    /// Fold one more event sharing this record's name into it.
    ///
    /// Confidence is monotonically non-decreasing, seen/frame bounds only
    /// widen, the thumbnail is first-write-wins, and `sources` keeps set
    /// semantics in first-appearance order.
    fn absorb(&mut self, event: &DetectionEvent) {
        self.confidence = self.confidence.max(event.confidence);
        self.first_seen = self.first_seen.min(event.timestamp);
        self.last_seen = self.last_seen.max(event.timestamp);

        if let Some(frame) = event.frame {
            self.first_frame = Some(self.first_frame.map_or(frame, |f| f.min(frame)));
            self.last_frame = Some(self.last_frame.map_or(frame, |f| f.max(frame)));
        }

        if self.thumbnail.is_none() {
            self.thumbnail = event.thumbnail.clone();
        }

        self.count += 1;

        if let Some(source) = event.source {
            if !self.sources.contains(&source) {
                self.sources.push(source);
            }
        }
    }
}

/// Merge `incoming` events into `existing` records, returning the full list
/// re-sorted by `last_seen` descending.
///
/// Events must already be canonical (see
/// [`RawDetection::normalize`](crate::normalize::RawDetection::normalize)).
/// The sort is stable: records tied on `last_seen` keep their prior relative
/// order. Merging is not deduplicating: a repeated event is a legitimate
/// re-detection and increments `count` again.
pub fn merge(existing: &[MatchRecord], incoming: &[DetectionEvent]) -> Vec<MatchRecord> {
    let mut records = existing.to_vec();
    let mut by_name: HashMap<String, usize> = records
        .iter()
        .enumerate()
        .map(|(i, r)| (r.name.clone(), i))
        .collect();

    for event in incoming {
        match by_name.get(&event.name) {
            Some(&i) => records[i].absorb(event),
            None => {
                by_name.insert(event.name.clone(), records.len());
                records.push(MatchRecord::seed(event));
            }
        }
    }

    records.sort_by(|a, b| b.last_seen.cmp(&a.last_seen));
    records
}
