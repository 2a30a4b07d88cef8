//! Change detection between refresh cycles.
//!
//! The feed is polled, not pushed, and most polls return exactly what was
//! already rendered. The detector keeps the last rendered list and reports
//! whether a freshly fetched one differs from it in any way.

use crate::models::EarthquakeEvent;

/// Keeps the previously rendered list and poll statistics.
#[derive(Debug, Default)]
pub struct ChangeDetector {
    /// Last list that was rendered (empty before the first render)
    previous: Vec<EarthquakeEvent>,
    /// Total lists observed
    total_seen: u64,
    /// Lists that matched the previous one
    total_unchanged: u64,
}

impl ChangeDetector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Compare a fetched list against the previous snapshot.
    ///
    /// Equality is structural and order sensitive: a different length,
    /// order, or any field value counts as a change. On change the fetched
    /// list becomes the new snapshot.
    pub fn observe(&mut self, fetched: &[EarthquakeEvent]) -> ChangeResult {
        self.total_seen += 1;

        if self.previous.as_slice() == fetched {
            self.total_unchanged += 1;
            return ChangeResult::Unchanged;
        }

        self.previous = fetched.to_vec();
        ChangeResult::Changed
    }

    /// The last rendered list.
    #[must_use]
    pub fn previous(&self) -> &[EarthquakeEvent] {
        &self.previous
    }

    /// Get total lists observed.
    #[must_use]
    pub fn total_seen(&self) -> u64 {
        self.total_seen
    }

    /// Get the fraction of polls that changed nothing (0.0 to 1.0).
    #[must_use]
    pub fn unchanged_rate(&self) -> f64 {
        if self.total_seen == 0 {
            0.0
        } else {
            self.total_unchanged as f64 / self.total_seen as f64
        }
    }
}

/// Result of a change check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeResult {
    /// Differs from the previous snapshot; re-render
    Changed,
    /// Same as the previous snapshot; do nothing
    Unchanged,
}

impl ChangeResult {
    #[must_use]
    pub fn should_render(self) -> bool {
        matches!(self, Self::Changed)
    }
}
