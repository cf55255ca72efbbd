// Decides whether an update is due by comparing dot-separated version
// strings component-wise as integers, never lexicographically.

/// Returns `true` when `remote` is a strictly newer version than `local`.
///
/// Components are compared as integer tuples, so `"1.2.0" < "1.10.0"`.
/// A shorter version that is a prefix of a longer one compares lower
/// (`"1.2" < "1.2.1"`). A malformed version string on either side means no
/// update is due: on a fleet of unattended terminals, a bad document must
/// never trigger a download storm.
pub fn is_update_due(local: &str, remote: &str) -> bool {
    match (parse_components(local), parse_components(remote)) {
        (Some(local), Some(remote)) => local < remote,
        _ => false,
    }
}

/// Parse `"1.2.3"` into `[1, 2, 3]`; `None` when any component is not a
/// non-negative integer.
fn parse_components(version: &str) -> Option<Vec<u64>> {
    let trimmed = version.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed
        .split('.')
        .map(|component| component.trim().parse::<u64>().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_not_lexicographic() {
        assert!(is_update_due("1.2.0", "1.10.0"));
        assert!(!is_update_due("1.10.0", "1.2.0"));
        assert!(!is_update_due("2.0.0", "1.9.9"));
    }

    #[test]
    fn equal_versions_are_not_due() {
        assert!(!is_update_due("1.0.0", "1.0.0"));
        assert!(!is_update_due("0.0.0", "0.0.0"));
    }

    #[test]
    fn shorter_prefix_compares_lower() {
        assert!(is_update_due("1.2", "1.2.1"));
        assert!(is_update_due("1.2", "1.2.0"));
        assert!(!is_update_due("1.2.0", "1.2"));
    }

    #[test]
    fn malformed_versions_fail_safe() {
        assert!(!is_update_due("1.0.0", "not-a-version"));
        assert!(!is_update_due("garbage", "9.9.9"));
        assert!(!is_update_due("", "1.0.0"));
        assert!(!is_update_due("1.0.0", ""));
        assert!(!is_update_due("1..0", "1.0.1"));
    }

    #[test]
    fn surrounding_whitespace_is_tolerated() {
        assert!(is_update_due(" 1.0.0 ", "1.0.1"));
        assert!(is_update_due("1.0.0", " 1.0.1\n"));
    }
}
