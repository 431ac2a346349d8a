//! Behavioral pacing for humanized browser interaction.
//!
//! Fixed, mechanical timing is the primary signal automation detection keys
//! on. The pacing engine draws every per-action delay from a bounded random
//! range, so interaction timing varies like manual use while the run still
//! completes in bounded time.
//!
//! # Example
//!
//! ```
//! use login_sync::pacing::{ActionKind, PacingEngine, PacingProfile};
//!
//! let engine = PacingEngine::new(PacingProfile::default());
//! let delay = engine.delay_before(ActionKind::Click);
//! assert!(delay <= engine.profile().click.max);
//! ```

use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

/// The kinds of interactive actions the browser driver paces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    /// Focusing an input field before typing into it.
    FieldFocus,
    /// A single keystroke while typing.
    Keystroke,
    /// Clicking a button or link.
    Click,
    /// Waiting after a navigation or form submission.
    PageTransition,
}

/// A bounded delay range to sample from.
#[derive(Debug, Clone, Copy)]
pub struct DelayRange {
    /// Lower bound (inclusive).
    pub min: Duration,
    /// Upper bound (inclusive). Must be finite so runs complete in bounded time.
    pub max: Duration,
}

impl DelayRange {
    /// Creates a range from millisecond bounds.
    #[must_use]
    pub const fn from_millis(min: u64, max: u64) -> Self {
        Self {
            min: Duration::from_millis(min),
            max: Duration::from_millis(max),
        }
    }

    /// Draws a random duration from the range.
    #[must_use]
    pub fn sample(&self) -> Duration {
        let min_ms = self.min.as_millis().min(u128::from(u64::MAX)) as u64;
        let max_ms = self.max.as_millis().min(u128::from(u64::MAX)) as u64;
        if max_ms <= min_ms {
            return self.min;
        }
        let ms = rand::rng().random_range(min_ms..=max_ms);
        Duration::from_millis(ms)
    }
}

/// Configuration describing randomized delay ranges and interaction-simulation
/// toggles.
///
/// Read-only; shared by reference across all actions in a session.
#[derive(Debug, Clone)]
pub struct PacingProfile {
    /// Delay before focusing a field.
    pub field_focus: DelayRange,
    /// Inter-keystroke interval while typing.
    pub keystroke: DelayRange,
    /// Delay before clicking.
    pub click: DelayRange,
    /// Settling time after navigation or submission.
    pub page_transition: DelayRange,
    /// Simulate pointer attention (DOM reads at random points) before
    /// interacting with a field.
    pub simulate_pointer: bool,
}

impl Default for PacingProfile {
    fn default() -> Self {
        Self {
            field_focus: DelayRange::from_millis(300, 1200),
            keystroke: DelayRange::from_millis(60, 220),
            click: DelayRange::from_millis(200, 900),
            page_transition: DelayRange::from_millis(1500, 4000),
            simulate_pointer: true,
        }
    }
}

impl PacingProfile {
    /// A near-zero profile for tests and local demos against cooperative sites.
    #[must_use]
    pub fn fast() -> Self {
        Self {
            field_focus: DelayRange::from_millis(0, 1),
            keystroke: DelayRange::from_millis(0, 1),
            click: DelayRange::from_millis(0, 1),
            page_transition: DelayRange::from_millis(0, 5),
            simulate_pointer: false,
        }
    }
}

/// Draws randomized, human-plausible delays from a shared [`PacingProfile`].
///
/// Pure function of the profile and a random source; no mutable state beyond
/// the thread-local RNG.
#[derive(Debug, Clone)]
pub struct PacingEngine {
    profile: Arc<PacingProfile>,
}

impl PacingEngine {
    /// Creates an engine over the given profile.
    #[must_use]
    pub fn new(profile: PacingProfile) -> Self {
        Self {
            profile: Arc::new(profile),
        }
    }

    /// Returns the shared profile.
    #[must_use]
    pub fn profile(&self) -> &PacingProfile {
        &self.profile
    }

    /// Returns a randomized delay for the given action kind.
    #[must_use]
    pub fn delay_before(&self, kind: ActionKind) -> Duration {
        let range = match kind {
            ActionKind::FieldFocus => self.profile.field_focus,
            ActionKind::Keystroke => self.profile.keystroke,
            ActionKind::Click => self.profile.click,
            ActionKind::PageTransition => self.profile.page_transition,
        };
        range.sample()
    }

    /// Returns a randomized inter-keystroke interval.
    ///
    /// Modeled on human typing cadence: the interval varies per keystroke
    /// rather than filling fields instantaneously.
    #[must_use]
    pub fn per_character_delay(&self) -> Duration {
        self.profile.keystroke.sample()
    }

    /// Sleeps for a randomized delay before the given action kind.
    pub async fn pause_before(&self, kind: ActionKind) {
        tokio::time::sleep(self.delay_before(kind)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_within_bounds() {
        let range = DelayRange::from_millis(100, 500);
        for _ in 0..100 {
            let d = range.sample();
            assert!(d >= Duration::from_millis(100));
            assert!(d <= Duration::from_millis(500));
        }
    }

    #[test]
    fn test_degenerate_range_returns_min() {
        let range = DelayRange::from_millis(250, 250);
        assert_eq!(range.sample(), Duration::from_millis(250));

        let inverted = DelayRange::from_millis(300, 100);
        assert_eq!(inverted.sample(), Duration::from_millis(300));
    }

    #[test]
    fn test_delays_vary() {
        // With a wide range, 50 samples should not all be identical.
        let engine = PacingEngine::new(PacingProfile::default());
        let first = engine.per_character_delay();
        let varied = (0..50).any(|_| engine.per_character_delay() != first);
        assert!(varied, "keystroke delays never varied");
    }

    #[test]
    fn test_every_action_kind_bounded() {
        let engine = PacingEngine::new(PacingProfile::default());
        for kind in [
            ActionKind::FieldFocus,
            ActionKind::Keystroke,
            ActionKind::Click,
            ActionKind::PageTransition,
        ] {
            let d = engine.delay_before(kind);
            assert!(d <= Duration::from_secs(10), "unbounded delay for {kind:?}");
        }
    }

    #[test]
    fn test_fast_profile_near_zero() {
        let engine = PacingEngine::new(PacingProfile::fast());
        assert!(engine.delay_before(ActionKind::PageTransition) <= Duration::from_millis(5));
        assert!(!engine.profile().simulate_pointer);
    }
}
