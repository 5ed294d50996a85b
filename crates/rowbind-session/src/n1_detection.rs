//! N+1 lookup detection.
//!
//! The N+1 pattern shows up here as code that fetches a list of records and
//! then calls `get` once per record to load something related, resulting in
//! N+1 queries instead of 2. The tracker counts single-row lookups per model
//! and warns once the count reaches a threshold.
//!
//! ```ignore
//! // Triggers a warning after `n1_threshold` lookups:
//! for post in &posts {
//!     let author = db.model("user")?.get(post.get("userId").cloned().unwrap()).await?;
//! }
//!
//! // The fix: one batched query.
//! let posts = db.model("post")?.all_with(&Predicate::new(), &QueryOptions::new().include("user")).await?;
//! ```

use std::collections::HashMap;

/// Counts single-row lookups per model.
#[derive(Debug)]
pub struct N1QueryTracker {
    /// model name -> lookup count
    counts: HashMap<String, usize>,
    /// Threshold for warning (lookups per model)
    threshold: usize,
    /// Whether detection is enabled
    enabled: bool,
}

impl Default for N1QueryTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics about N+1 detection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct N1Stats {
    /// Total number of single-row lookups recorded
    pub total_lookups: usize,
    /// Number of distinct models looked up
    pub models_looked_up: usize,
    /// Number of models that reached the threshold
    pub potential_n1: usize,
}

impl N1QueryTracker {
    /// Create a new tracker with default threshold (3).
    #[must_use]
    pub fn new() -> Self {
        Self {
            counts: HashMap::new(),
            threshold: 3,
            enabled: true,
        }
    }

    /// Set the threshold. Zero disables detection.
    #[must_use]
    pub fn with_threshold(mut self, threshold: usize) -> Self {
        self.threshold = threshold;
        self.enabled = threshold > 0;
        self
    }

    /// Get the current threshold.
    #[must_use]
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Check if detection is enabled.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Disable N+1 detection.
    pub fn disable(&mut self) {
        self.enabled = false;
    }

    /// Enable N+1 detection.
    pub fn enable(&mut self) {
        self.enabled = true;
    }

    /// Record one single-row lookup of `model`, returning the new count.
    pub fn record_lookup(&mut self, model: &str) -> usize {
        if !self.enabled {
            return 0;
        }

        let count = self.counts.entry(model.to_string()).or_insert(0);
        *count += 1;
        let count = *count;

        if count == self.threshold {
            tracing::warn!(
                target: "rowbind::n1",
                model,
                lookups = count,
                threshold = self.threshold,
                "N+1 QUERY PATTERN DETECTED! Consider mget() or an include for batch loading."
            );
        }
        count
    }

    /// Reset all counts.
    ///
    /// Call this at the start of a new request.
    pub fn reset(&mut self) {
        self.counts.clear();
    }

    /// Current count for one model.
    #[must_use]
    pub fn count_for(&self, model: &str) -> usize {
        self.counts.get(model).copied().unwrap_or(0)
    }

    /// Get statistics about N+1 detection.
    #[must_use]
    pub fn stats(&self) -> N1Stats {
        N1Stats {
            total_lookups: self.counts.values().sum(),
            models_looked_up: self.counts.len(),
            potential_n1: self
                .counts
                .values()
                .filter(|c| **c >= self.threshold)
                .count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracker_new_defaults() {
        let tracker = N1QueryTracker::new();
        assert_eq!(tracker.threshold(), 3);
        assert!(tracker.is_enabled());
    }

    #[test]
    fn test_zero_threshold_disables() {
        let mut tracker = N1QueryTracker::new().with_threshold(0);
        assert!(!tracker.is_enabled());
        assert_eq!(tracker.record_lookup("person"), 0);
        assert_eq!(tracker.count_for("person"), 0);
    }

    #[test]
    fn test_tracker_counts_per_model() {
        let mut tracker = N1QueryTracker::new().with_threshold(10);
        for _ in 0..4 {
            tracker.record_lookup("person");
        }
        tracker.record_lookup("post");
        assert_eq!(tracker.count_for("person"), 4);
        assert_eq!(tracker.count_for("post"), 1);
        assert_eq!(tracker.count_for("comment"), 0);
    }

    #[test]
    fn test_tracker_enable_disable() {
        let mut tracker = N1QueryTracker::new();
        tracker.disable();
        tracker.record_lookup("person");
        assert_eq!(tracker.count_for("person"), 0);
        tracker.enable();
        tracker.record_lookup("person");
        assert_eq!(tracker.count_for("person"), 1);
    }

    #[test]
    fn test_tracker_reset_clears_counts() {
        let mut tracker = N1QueryTracker::new();
        tracker.record_lookup("person");
        tracker.reset();
        assert_eq!(tracker.count_for("person"), 0);
        assert_eq!(tracker.stats(), N1Stats::default());
    }

    #[test]
    fn test_stats() {
        let mut tracker = N1QueryTracker::new().with_threshold(2);
        tracker.record_lookup("person");
        tracker.record_lookup("person"); // reaches threshold
        tracker.record_lookup("post");

        let stats = tracker.stats();
        assert_eq!(stats.total_lookups, 3);
        assert_eq!(stats.models_looked_up, 2);
        assert_eq!(stats.potential_n1, 1);
    }
}
