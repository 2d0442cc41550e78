//! Timecode parsing and proportional-delta inheritance for transcript chunks
//! (C11 §4.8), generalized from `Smebbs-lytt::chunking::temporal`'s
//! fixed-duration bucketing to timecode-anchored inheritance.

use regex::Regex;
use std::sync::OnceLock;

fn timecode_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\[(?:(\d{1,2}):)?(\d{1,2}):(\d{2})\]").expect("static pattern is valid"))
}

/// Finds the first `[MM:SS]` or `[HH:MM:SS]` timecode in `text` and returns
/// its value in seconds.
pub fn find_timecode_seconds(text: &str) -> Option<f64> {
    let caps = timecode_pattern().captures(text)?;
    let hours: f64 = caps.get(1).and_then(|m| m.as_str().parse().ok()).unwrap_or(0.0);
    let minutes: f64 = caps.get(2)?.as_str().parse().ok()?;
    let seconds: f64 = caps.get(3)?.as_str().parse().ok()?;
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

/// Assigns a `start_seconds` to every chunk: parsed timecodes take priority
/// (rejected, falling back to inheritance, if they exceed `duration_seconds`,
/// or — when `strict_ordering` is set — if they fall before the previous
/// chunk's assigned value); chunks without one, or when `enable_timecodes`
/// is false, inherit the last known value plus a proportional delta
/// `duration_seconds / total_chunks`.
pub fn assign_start_seconds(chunk_contents: &[String], duration_seconds: Option<f64>, enable_timecodes: bool, strict_ordering: bool) -> Vec<f64> {
    let total = chunk_contents.len().max(1);
    let delta = duration_seconds.unwrap_or(0.0) / total as f64;

    let mut out = Vec::with_capacity(chunk_contents.len());
    let mut last = 0.0f64;
    for content in chunk_contents {
        let parsed = if enable_timecodes {
            find_timecode_seconds(content)
                .filter(|&t| duration_seconds.is_none_or(|d| t <= d))
                .filter(|&t| !strict_ordering || t >= last)
        } else {
            None
        };
        let value = match parsed {
            Some(t) => t,
            None => last + delta,
        };
        last = value;
        out.push(value);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mm_ss_and_hh_mm_ss() {
        assert_eq!(find_timecode_seconds("[00:10] hello"), Some(10.0));
        assert_eq!(find_timecode_seconds("[01:02:03] hello"), Some(3723.0));
    }

    #[test]
    fn returns_none_when_absent() {
        assert_eq!(find_timecode_seconds("no timecode here"), None);
    }

    #[test]
    fn inheritance_matches_seed_scenario() {
        let chunks = vec!["[00:10] a".to_string(), "b".to_string(), "[02:00] c".to_string()];
        let seconds = assign_start_seconds(&chunks, Some(120.0), true, false);
        assert_eq!(seconds, vec![10.0, 10.0 + 120.0 / 3.0, 120.0]);
    }

    #[test]
    fn timecode_exceeding_duration_is_rejected_and_inherited() {
        let chunks = vec!["[05:00] a".to_string()];
        let seconds = assign_start_seconds(&chunks, Some(60.0), true, false);
        assert_eq!(seconds, vec![60.0]);
    }

    #[test]
    fn disabling_timecodes_falls_back_to_pure_proportional_spacing() {
        let chunks = vec!["[00:10] a".to_string(), "[00:20] b".to_string(), "[00:30] c".to_string()];
        let seconds = assign_start_seconds(&chunks, Some(90.0), false, false);
        assert_eq!(seconds, vec![30.0, 60.0, 90.0]);
    }

    #[test]
    fn strict_ordering_rejects_an_out_of_order_timecode() {
        let chunks = vec!["[00:50] a".to_string(), "[00:10] b".to_string()];
        let seconds = assign_start_seconds(&chunks, Some(100.0), true, true);
        assert_eq!(seconds[0], 50.0);
        assert!(seconds[1] > seconds[0]);
    }
}
