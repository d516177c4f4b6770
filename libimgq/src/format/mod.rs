//! Human-readable formatting for rendering query results.

use chrono::{DateTime, Utc};
use chrono_humanize::Humanize;
use std::collections::HashMap;


/// Number of hex characters kept by [`short_digest`].
pub const SHORT_DIGEST_LEN: usize = 12;

/// Formats a timestamp into a human-readable relative string.
///
/// # Examples
///
/// ```
/// use libimgq::format::format_timestamp;
/// use chrono::{Duration, Utc};
///
/// let one_day_ago = Utc::now() - Duration::days(1);
/// assert_eq!(format_timestamp(&one_day_ago), "a day ago");
/// ```
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.humanize()
}

/// Shortens a digest to its first [`SHORT_DIGEST_LEN`] hex characters,
/// dropping the algorithm prefix.
///
/// # Examples
///
/// ```
/// use libimgq::format::short_digest;
///
/// assert_eq!(
///     short_digest("sha256:b5b2b2c507a0944348e0303114d8d93aaaa081732b86451d9bce1f432a537bc7"),
///     "b5b2b2c507a0"
/// );
/// assert_eq!(short_digest("abc"), "abc");
/// ```
pub fn short_digest(digest: &str) -> &str {
    let hex = digest.split_once(':').map_or(digest, |(_, hex)| hex);
    hex.get(..SHORT_DIGEST_LEN).unwrap_or(hex)
}

/// Renders labels as `key=value` pairs sorted by key, joined by `sep`.
pub fn format_labels(labels: &HashMap<String, String>, sep: &str) -> String {
    let mut pairs: Vec<_> = labels.iter().collect();
    pairs.sort();
    pairs
        .into_iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(sep)
}
