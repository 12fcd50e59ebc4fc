//! Recency weighting of tweets.

use chrono::{DateTime, Utc};

use crate::EngineConfig;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Exponential decay by age with a discount for replies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemporalWeighting {
    half_life_secs: f64,
    reply_weight: f64,
}

impl Default for TemporalWeighting {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl TemporalWeighting {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            half_life_secs: config.half_life_days * SECONDS_PER_DAY,
            reply_weight: config.reply_weight,
        }
    }

    /// Weight of a tweet posted at `created_at`, seen from `reference`.
    ///
    /// Tweets dated after `reference` count as age zero.
    pub fn weight(
        &self,
        created_at: DateTime<Utc>,
        reference: DateTime<Utc>,
        is_reply: bool,
    ) -> f64 {
        let age_secs = ((reference - created_at).num_milliseconds() as f64 / 1000.0).max(0.0);
        let decay = (-std::f64::consts::LN_2 / self.half_life_secs * age_secs).exp();
        if is_reply {
            decay * self.reply_weight
        } else {
            decay
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    fn reference() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_fresh_tweet_has_full_weight() {
        let w = TemporalWeighting::default();
        assert_eq!(w.weight(reference(), reference(), false), 1.0);
        assert_eq!(w.weight(reference(), reference(), true), 0.5);
    }

    #[test]
    fn test_half_life_halves_weight() {
        let w = TemporalWeighting::default();
        let old = reference() - Duration::days(90);
        assert!((w.weight(old, reference(), false) - 0.5).abs() < 1e-12);
        assert!((w.weight(old, reference(), true) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_future_tweet_clamps_to_zero_age() {
        let w = TemporalWeighting::default();
        let future = reference() + Duration::days(3);
        assert_eq!(w.weight(future, reference(), false), 1.0);
    }

    proptest! {
        #[test]
        fn weight_is_bounded_and_monotonic(age_a in 0i64..10_000_000, age_b in 0i64..10_000_000) {
            let w = TemporalWeighting::default();
            let (young, old) = if age_a <= age_b { (age_a, age_b) } else { (age_b, age_a) };
            let wy = w.weight(reference() - Duration::seconds(young), reference(), false);
            let wo = w.weight(reference() - Duration::seconds(old), reference(), false);
            prop_assert!(wy > 0.0 && wy <= 1.0);
            prop_assert!(wo <= wy);
        }
    }
}
