//! Search method selection, fuzzy scoring, and timezone post-processing.
//!
//! The three retrieval paths share one contract across all six managers:
//! empty query returns the most recent rows, `string_match` is a SQL
//! substring scan ordered by recency, `fuzzy_match` scores candidates in
//! memory with a partial-ratio similarity, and `semantic_match` ranks by
//! cosine distance inside SQLite.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::MemoryError;

/// How a search query is matched against a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMethod {
    /// Case-insensitive SQL substring containment, recency order.
    StringMatch,
    /// Partial-ratio similarity scored in memory, best first.
    FuzzyMatch,
    /// Cosine distance against the field embedding, nearest first.
    SemanticMatch,
}

impl SearchMethod {
    /// Parses a method string (case-insensitive). Unknown values map to
    /// [`SearchMethod::SemanticMatch`], the default retrieval path.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "string_match" => Self::StringMatch,
            "fuzzy_match" => Self::FuzzyMatch,
            _ => Self::SemanticMatch,
        }
    }

    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::StringMatch => "string_match",
            Self::FuzzyMatch => "fuzzy_match",
            Self::SemanticMatch => "semantic_match",
        }
    }
}

impl std::fmt::Display for SearchMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Partial-ratio similarity between `query` and `text`, normalized 0–100.
///
/// The shorter string slides over every equally-sized window of the
/// longer one; the best windowed Levenshtein similarity wins. This makes
/// short queries match well against long fields, which plain edit
/// distance does not.
#[must_use]
pub fn partial_ratio(query: &str, text: &str) -> f64 {
    let query = query.to_lowercase();
    let text = text.to_lowercase();

    let (needle, haystack) = if query.chars().count() <= text.chars().count() {
        (query, text)
    } else {
        (text, query)
    };

    if needle.is_empty() {
        return if haystack.is_empty() { 100.0 } else { 0.0 };
    }

    let needle_len = needle.chars().count();
    let hay_chars: Vec<char> = haystack.chars().collect();

    let mut best = 0.0f64;
    for start in 0..=hay_chars.len().saturating_sub(needle_len) {
        let window: String = hay_chars[start..start + needle_len].iter().collect();
        let score = strsim::normalized_levenshtein(&needle, &window) * 100.0;
        if score > best {
            best = score;
            if best >= 100.0 {
                break;
            }
        }
    }
    best
}

/// Sorts fuzzy-scored items best-first and truncates to `limit`.
///
/// Ties keep recency order (newest first) so repeated queries are stable.
pub fn rank_fuzzy<T>(mut scored: Vec<(f64, DateTime<Utc>, T)>, limit: usize) -> Vec<T> {
    scored.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.1.cmp(&a.1))
    });
    scored.truncate(limit);
    scored.into_iter().map(|(_, _, item)| item).collect()
}

/// Parses a timezone string into a [`Tz`].
///
/// Accepts both bare IANA names (`"Asia/Shanghai"`) and the UI form with
/// a trailing offset annotation (`"Asia/Shanghai (UTC+8:00)"`).
pub fn parse_timezone(tz_str: &str) -> Result<Tz, MemoryError> {
    let name = tz_str.split(" (").next().unwrap_or(tz_str).trim();
    name.parse::<Tz>().map_err(|_| MemoryError::Timezone {
        value: tz_str.to_string(),
    })
}

/// Renders a UTC timestamp in the caller's timezone (RFC 3339).
///
/// With no timezone the UTC rendering is returned unchanged.
#[must_use]
pub fn to_local_string(ts: DateTime<Utc>, tz: Option<Tz>) -> String {
    tz.map_or_else(
        || ts.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        |tz| {
            ts.with_timezone(&tz)
                .to_rfc3339_opts(chrono::SecondsFormat::Secs, false)
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_parse() {
        assert_eq!(SearchMethod::parse("string_match"), SearchMethod::StringMatch);
        assert_eq!(SearchMethod::parse("FUZZY_MATCH"), SearchMethod::FuzzyMatch);
        assert_eq!(SearchMethod::parse("anything"), SearchMethod::SemanticMatch);
    }

    #[test]
    fn test_partial_ratio_exact_substring() {
        assert!((partial_ratio("terminal", "user opened terminal") - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_partial_ratio_near_miss_beats_unrelated() {
        let near = partial_ratio("terminl", "user opened terminal");
        let far = partial_ratio("terminl", "walked the dog");
        assert!(near > far);
        assert!(near > 80.0);
    }

    #[test]
    fn test_partial_ratio_empty_query() {
        assert!((partial_ratio("", "") - 100.0).abs() < 1e-9);
        assert!(partial_ratio("", "text").abs() < 1e-9);
    }

    #[test]
    fn test_rank_fuzzy_orders_and_truncates() {
        let now = Utc::now();
        let ranked = rank_fuzzy(
            vec![(50.0, now, "mid"), (90.0, now, "best"), (10.0, now, "worst")],
            2,
        );
        assert_eq!(ranked, vec!["best", "mid"]);
    }

    #[test]
    fn test_parse_timezone_with_offset_suffix() {
        let tz = parse_timezone("Asia/Shanghai (UTC+8:00)");
        assert!(tz.is_ok());
        assert!(parse_timezone("Not/AZone").is_err());
    }

    #[test]
    fn test_to_local_string_applies_offset() {
        let ts = DateTime::parse_from_rfc3339("2024-06-01T00:00:00Z")
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| unreachable!());
        let tz = parse_timezone("Asia/Shanghai").unwrap_or_else(|_| unreachable!());
        let local = to_local_string(ts, Some(tz));
        assert!(local.starts_with("2024-06-01T08:00:00"));
    }
}
