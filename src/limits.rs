pub const MAX_FACILITY_ID_LEN: usize = 64;
pub const MAX_RESERVATION_ID_LEN: usize = 128;
pub const MAX_REQUESTER_NAME_LEN: usize = 200;
pub const MAX_CONTACT_LEN: usize = 100;
pub const MAX_NOTES_LEN: usize = 2_000;
pub const MAX_FACILITIES: usize = 256;
/// Widest `[start, end]` window a status-range query may cover, in days.
pub const MAX_QUERY_WINDOW_DAYS: i64 = 400;
/// Live records a single session ledger will index.
pub const MAX_LEDGER_RECORDS: usize = 100_000;
/// Cancelled/removed records kept for inspection, oldest dropped first.
pub const MAX_AUDIT_RECORDS: usize = 1_000;

/// Longest prefix of `s` that fits in `max` bytes without splitting a character.
pub fn clip(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
