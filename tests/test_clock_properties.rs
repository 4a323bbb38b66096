//! Property tests for displayed-clock parsing.

use proptest::prelude::*;
use slideskip::engine::clock::{parse_clock, parse_progress};

proptest! {
    #[test]
    fn parse_clock_never_panics(raw in "\\PC*") {
        let _ = parse_clock(&raw);
    }

    #[test]
    fn parse_progress_never_panics(raw in "\\PC*") {
        let _ = parse_progress(&raw);
    }

    #[test]
    fn minute_second_clock_round_trips(m in 0u32..600, s in 0u32..60) {
        let raw = format!("{m:02}:{s:02}");
        prop_assert_eq!(parse_clock(&raw), m * 60 + s);
    }

    #[test]
    fn hour_clock_round_trips(h in 0u32..100, m in 0u32..60, s in 0u32..60) {
        let raw = format!("{h}:{m:02}:{s:02}");
        prop_assert_eq!(parse_clock(&raw), h * 3600 + m * 60 + s);
    }

    #[test]
    fn padding_and_whitespace_are_irrelevant(m in 0u32..600, s in 0u32..60) {
        let bare = format!("{m}:{s:02}");
        let padded = format!("  {m:04}:{s:02}\t");
        prop_assert_eq!(parse_clock(&bare), parse_clock(&padded));
    }

    #[test]
    fn compound_label_parses_both_sides(a in 0u32..36_000, b in 0u32..36_000) {
        let raw = format!("{}:{:02} / {}:{:02}", a / 60, a % 60, b / 60, b % 60);
        prop_assert_eq!(parse_progress(&raw), Some((a, b)));
    }

    #[test]
    fn label_without_separator_is_none(raw in "[^/]*") {
        prop_assert_eq!(parse_progress(&raw), None);
    }

    #[test]
    fn letters_degrade_to_zero(raw in "[a-zA-Z ]+") {
        prop_assert_eq!(parse_clock(&raw), 0);
    }
}
