//! Human-readable booking references.
//!
//! References come from a per-year sequence in the store (see
//! `db::queries::next_reference_seq`), so they are collision-free and
//! strictly monotonic within a year. The zero-padding keeps early references
//! at the familiar 4-digit width; past 9999 the number simply grows.

/// Format an allocated sequence value as `<PREFIX>-<year>-<NNNN>`.
pub fn format_reference(prefix: &str, year: i32, seq: i64) -> String {
    format!("{}-{}-{:04}", prefix, year, seq)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pads_to_four_digits() {
        assert_eq!(format_reference("GLN", 2026, 7), "GLN-2026-0007");
    }

    #[test]
    fn test_grows_past_four_digits() {
        assert_eq!(format_reference("GLN", 2026, 12345), "GLN-2026-12345");
    }

    #[test]
    fn test_prefix_is_configurable() {
        assert_eq!(format_reference("WASH", 2027, 42), "WASH-2027-0042");
    }
}
