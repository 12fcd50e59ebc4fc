//! Posting cadence metrics.

use chrono::{DateTime, Utc};

use vigil_store::ActivityMetrics;

const SECONDS_PER_DAY: f64 = 86_400.0;
const SECONDS_PER_HOUR: f64 = 3_600.0;

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / 1000.0
}

/// Compute metrics over the full tweet history as of `now`.
///
/// `tweetsPerDay` spans from the oldest tweet to `now` (at least one day) and
/// is rounded to two decimals. `maxSilenceHours` is the longest gap between
/// consecutive tweets or between the latest tweet and `now`, rounded to one
/// decimal.
pub fn compute(timestamps: &[DateTime<Utc>], now: DateTime<Utc>) -> ActivityMetrics {
    let mut sorted = timestamps.to_vec();
    sorted.sort();

    let (Some(oldest), Some(latest)) = (sorted.first().copied(), sorted.last().copied()) else {
        return ActivityMetrics {
            tweets_per_day: 0.0,
            max_silence_hours: 0.0,
            window_start: now,
            window_end: now,
        };
    };

    let days = (seconds_between(oldest, now) / SECONDS_PER_DAY).max(1.0);
    let tweets_per_day = round_to(sorted.len() as f64 / days, 2);

    let mut max_gap = seconds_between(latest, now).max(0.0);
    for pair in sorted.windows(2) {
        max_gap = max_gap.max(seconds_between(pair[0], pair[1]));
    }

    ActivityMetrics {
        tweets_per_day,
        max_silence_hours: round_to(max_gap / SECONDS_PER_HOUR, 1),
        window_start: oldest,
        window_end: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_no_tweets_is_zero_window() {
        let metrics = compute(&[], now());
        assert_eq!(metrics.tweets_per_day, 0.0);
        assert_eq!(metrics.max_silence_hours, 0.0);
        assert_eq!(metrics.window_start, now());
        assert_eq!(metrics.window_end, now());
    }

    #[test_case(&[120, 60], 2.0, 1.0 ; "young history counts as one day")]
    #[test_case(&[60, 300], 2.0, 4.0 ; "unsorted input")]
    #[test_case(&[7200, 5760], 0.4, 96.0 ; "trailing silence counts")]
    #[test_case(&[4320, 10], 0.67, 71.8 ; "rounds rate and silence")]
    fn test_rate_and_silence(minutes_ago: &[i64], tweets_per_day: f64, silence_hours: f64) {
        let stamps: Vec<DateTime<Utc>> = minutes_ago
            .iter()
            .map(|m| now() - Duration::minutes(*m))
            .collect();
        let metrics = compute(&stamps, now());
        assert_eq!(metrics.tweets_per_day, tweets_per_day);
        assert_eq!(metrics.max_silence_hours, silence_hours);
    }

    #[test]
    fn test_rate_and_silence_over_ten_days() {
        let stamps = vec![
            now() - Duration::days(10),
            now() - Duration::days(9),
            now() - Duration::days(3),
            now() - Duration::hours(30),
        ];
        let metrics = compute(&stamps, now());
        assert_eq!(metrics.tweets_per_day, 0.4);
        // six days between day 9 and day 3
        assert_eq!(metrics.max_silence_hours, 144.0);
        assert_eq!(metrics.window_start, now() - Duration::days(10));
    }
}
