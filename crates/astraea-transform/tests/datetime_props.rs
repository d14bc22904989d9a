use proptest::prelude::*;

use astraea_transform::{
    format_partial_iso8601, parse_iso_date, parse_string_date_to_iso, sas_date_to_iso,
};

proptest! {
    /// Any in-range SAS day number converts to a parseable ISO date, and
    /// the round trip through chrono preserves the day offset.
    #[test]
    fn sas_date_round_trips(days in -40_000i64..80_000i64) {
        let iso = sas_date_to_iso(days as f64).unwrap();
        let date = parse_iso_date(&iso).unwrap();
        let epoch = parse_iso_date("1960-01-01").unwrap();
        prop_assert_eq!((date - epoch).num_days(), days);
    }

    /// A formatted full date always survives the string-date parser.
    #[test]
    fn iso_dates_parse_back(days in -20_000i64..40_000i64) {
        let iso = sas_date_to_iso(days as f64).unwrap();
        prop_assert_eq!(parse_string_date_to_iso(&iso), Some(iso));
    }

    /// Partial output never contains gaps: every produced value is a
    /// prefix of the fully-specified rendering.
    #[test]
    fn partials_are_prefixes(
        year in 1920i32..2100,
        month in 1u32..=12,
        day in 1u32..=28,
        with_month in any::<bool>(),
        with_day in any::<bool>(),
    ) {
        let full = format_partial_iso8601(
            Some(year), Some(month), Some(day), None, None, None,
        ).unwrap();
        let partial = format_partial_iso8601(
            Some(year),
            with_month.then_some(month),
            (with_month && with_day).then_some(day),
            None,
            None,
            None,
        ).unwrap();
        prop_assert!(full.starts_with(&partial));
        prop_assert!(!partial.contains("--"));
    }
}
