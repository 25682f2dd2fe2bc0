use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// An opaque version token, conventionally dot-separated non-negative integers
/// (e.g. `"1.12.3"`).
///
/// The token carries no semantics beyond ordering. No canonical form is
/// enforced: two different strings may compare equal (`"1.2"` and `"1.2.0"`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct VersionId(String);

impl VersionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for VersionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for VersionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A caller-supplied ordering override.
///
/// When configured, it replaces [`compare_versions`] unconditionally, including
/// for string-identical inputs.
pub type VersionCompareFn = Arc<dyn Fn(&VersionId, &VersionId) -> Ordering + Send + Sync>;

/// Orders two version tokens by dotted numeric comparison.
///
/// String-identical tokens compare equal without being parsed. Otherwise each
/// token is split on `.`, non-numeric or missing segments count as 0, the
/// shorter tail is zero-padded, and segments are compared numerically left to
/// right. Malformed input degrades to 0-valued segments; this function never
/// fails.
pub fn compare_versions(a: &VersionId, b: &VersionId) -> Ordering {
    if a.as_str() == b.as_str() {
        return Ordering::Equal;
    }

    let left: Vec<u64> = a.as_str().split('.').map(parse_segment).collect();
    let right: Vec<u64> = b.as_str().split('.').map(parse_segment).collect();

    let len = left.len().max(right.len());
    for i in 0..len {
        let l = left.get(i).copied().unwrap_or(0);
        let r = right.get(i).copied().unwrap_or(0);
        match l.cmp(&r) {
            Ordering::Equal => continue,
            other => return other,
        }
    }

    Ordering::Equal
}

fn parse_segment(segment: &str) -> u64 {
    segment.trim().parse::<u64>().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmp(a: &str, b: &str) -> Ordering {
        compare_versions(&VersionId::from(a), &VersionId::from(b))
    }

    #[test]
    fn test_identical_strings_compare_equal() {
        assert_eq!(cmp("1.2.3", "1.2.3"), Ordering::Equal);
        assert_eq!(cmp("not-a-version", "not-a-version"), Ordering::Equal);
    }

    #[test]
    fn test_trailing_zero_segments_are_insignificant() {
        assert_eq!(cmp("1.2", "1.2.0"), Ordering::Equal);
        assert_eq!(cmp("1.2.0.0", "1.2"), Ordering::Equal);
    }

    #[test]
    fn test_numeric_not_lexicographic_ordering() {
        assert_eq!(cmp("1.10.0", "1.9.0"), Ordering::Greater);
        assert_eq!(cmp("1.9.0", "1.10.0"), Ordering::Less);
    }

    #[test]
    fn test_shorter_version_is_older_when_tail_nonzero() {
        assert_eq!(cmp("1.2", "1.2.1"), Ordering::Less);
        assert_eq!(cmp("1.2.1", "1.2"), Ordering::Greater);
    }

    #[test]
    fn test_antisymmetry_over_well_formed_tokens() {
        let tokens = ["0.1", "1.0.0", "1.2", "1.2.0", "1.2.3", "2.0", "10.0.1"];
        for a in &tokens {
            for b in &tokens {
                assert_eq!(cmp(a, b), cmp(b, a).reverse(), "{a} vs {b}");
            }
        }
    }

    #[test]
    fn test_non_numeric_segments_degrade_to_zero() {
        assert_eq!(cmp("1.beta", "1.0"), Ordering::Equal);
        assert_eq!(cmp("1.beta", "1.1"), Ordering::Less);
        assert_eq!(cmp("garbage", "0"), Ordering::Equal);
    }
}
