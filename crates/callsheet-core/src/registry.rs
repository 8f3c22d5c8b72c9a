use std::collections::{HashSet, VecDeque};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, trace};

pub const DEFAULT_CAPACITY: usize = 4096;
pub const DEFAULT_RETENTION_MS: i64 = 24 * 60 * 60 * 1000;

/// Messages that have already been surfaced.
///
/// Entries leave only through eviction (oldest first, once `capacity` is
/// exceeded or `retention` has elapsed) or through [`DedupRegistry::reset`].
/// Dismissing a popup never removes its message from here.
#[derive(Debug, Clone)]
pub struct DedupRegistry {
    order: VecDeque<(String, DateTime<Utc>)>,
    seen: HashSet<String>,
    capacity: usize,
    retention: Duration,
}

impl DedupRegistry {
    pub fn new(capacity: usize, retention: Duration) -> Self {
        Self {
            order: VecDeque::new(),
            seen: HashSet::new(),
            capacity: capacity.max(1),
            retention,
        }
    }

    pub fn contains(&mut self, message: &str, now: DateTime<Utc>) -> bool {
        self.prune(now);
        self.seen.contains(message)
    }

    /// Returns `false` when the message was already remembered.
    pub fn remember(&mut self, message: &str, now: DateTime<Utc>) -> bool {
        if self.contains(message, now) {
            return false;
        }

        self.seen.insert(message.to_string());
        self.order.push_back((message.to_string(), now));

        while self.order.len() > self.capacity {
            if let Some((evicted, _)) = self.order.pop_front() {
                debug!(message = %evicted, "dedup registry over capacity; evicting oldest");
                self.seen.remove(&evicted);
            }
        }

        true
    }

    pub fn reset(&mut self) {
        debug!(entries = self.order.len(), "resetting dedup registry");
        self.order.clear();
        self.seen.clear();
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn prune(&mut self, now: DateTime<Utc>) {
        while let Some((message, remembered_at)) = self.order.front() {
            if now - *remembered_at <= self.retention {
                break;
            }
            trace!(message = %message, "dedup entry past retention");
            self.seen.remove(message);
            self.order.pop_front();
        }
    }
}

impl Default for DedupRegistry {
    fn default() -> Self {
        Self::new(
            DEFAULT_CAPACITY,
            Duration::milliseconds(DEFAULT_RETENTION_MS),
        )
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_736_942_400 + secs, 0)
            .single()
            .expect("valid instant")
    }

    #[test]
    fn remembers_each_message_once() {
        let mut registry = DedupRegistry::default();

        assert!(registry.remember("a", at(0)));
        assert!(!registry.remember("a", at(5)));
        assert!(registry.remember("b", at(5)));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn evicts_oldest_over_capacity() {
        let mut registry = DedupRegistry::new(2, Duration::hours(1));

        registry.remember("a", at(0));
        registry.remember("b", at(1));
        registry.remember("c", at(2));

        assert!(!registry.contains("a", at(3)));
        assert!(registry.contains("b", at(3)));
        assert!(registry.contains("c", at(3)));
    }

    #[test]
    fn forgets_entries_past_retention() {
        let mut registry = DedupRegistry::new(16, Duration::seconds(60));

        registry.remember("a", at(0));
        registry.remember("b", at(30));

        assert!(registry.contains("a", at(60)));
        assert!(!registry.contains("a", at(61)));
        assert!(registry.contains("b", at(61)));
    }

    #[test]
    fn reset_clears_everything() {
        let mut registry = DedupRegistry::default();
        registry.remember("a", at(0));

        registry.reset();

        assert!(registry.is_empty());
        assert!(registry.remember("a", at(1)));
    }
}
