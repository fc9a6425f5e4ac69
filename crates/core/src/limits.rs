//! Result-size limits for history queries.

/// Normalise a caller-supplied limit.
///
/// `None` or any value below 1 means "unlimited" and yields `None`;
/// otherwise the positive limit is returned as a `usize`.
pub fn normalize_limit(limit: Option<i64>) -> Option<usize> {
    match limit {
        Some(n) if n >= 1 => Some(usize::try_from(n).unwrap_or(usize::MAX)),
        _ => None,
    }
}
