//! Per-year request-id formatting
//!
//! Request ids are human-readable and sequential per calendar year,
//! `CST-2026-0042`. Allocation itself goes through the persistence
//! collaborator's atomic counter; this module only owns the format and its
//! inverse, which the self-healing resync path uses to recover the counter
//! from the highest id already assigned.

use crate::request::types::RequestId;

/// Render a request id from its parts
pub fn format_request_id(prefix: &str, year: i32, seq: u64) -> RequestId {
    format!("{}-{}-{:04}", prefix, year, seq)
}

/// Recover the sequence number from a request id of the given prefix/year
///
/// Returns `None` for ids from other years or malformed ids, which the
/// resync scan simply skips.
pub fn parse_sequence(prefix: &str, year: i32, request_id: &str) -> Option<u64> {
    let head = format!("{}-{}-", prefix, year);
    request_id.strip_prefix(&head)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_pads_to_four_digits() {
        assert_eq!(format_request_id("CST", 2026, 7), "CST-2026-0007");
        assert_eq!(format_request_id("CST", 2026, 12345), "CST-2026-12345");
    }

    #[test]
    fn test_parse_roundtrip() {
        let id = format_request_id("CST", 2026, 42);
        assert_eq!(parse_sequence("CST", 2026, &id), Some(42));
    }

    #[test]
    fn test_parse_rejects_other_years_and_garbage() {
        assert_eq!(parse_sequence("CST", 2025, "CST-2026-0042"), None);
        assert_eq!(parse_sequence("CST", 2026, "REQ-2026-0042"), None);
        assert_eq!(parse_sequence("CST", 2026, "CST-2026-00x2"), None);
    }
}
