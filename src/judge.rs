use std::sync::LazyLock;

use regex::Regex;

/// Largest absolute difference at which two numeric outputs are still equal
pub const FLOAT_EPS: f64 = 1e-5;

static NUMERIC_LITERAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[-+]?(?:\d+\.?\d*|\.\d+)(?:[eE][-+]?\d+)?$").expect("numeric literal regex")
});

/// Compares program output with expected output
///
/// Both sides are trimmed of surrounding whitespace. When both trimmed values
/// are a single numeric literal they are compared as floats within
/// [`FLOAT_EPS`], so `1`, `1.0` and `1e0` all match each other. Anything else
/// is compared byte for byte. Identical trimmed text always matches.
pub fn compare(actual: &str, expected: &str) -> bool {
    let actual = actual.trim();
    let expected = expected.trim();

    if actual == expected {
        return true;
    }
    match (parse_numeric(actual), parse_numeric(expected)) {
        (Some(a), Some(b)) => (a - b).abs() <= FLOAT_EPS,
        _ => false,
    }
}

/// `f64::from_str` also takes `inf` and `NaN`, which must stay plain text here
fn parse_numeric(s: &str) -> Option<f64> {
    if NUMERIC_LITERAL.is_match(s) {
        s.parse().ok()
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_surrounding_whitespace_is_ignored() {
        assert!(compare("4\n", "4"));
        assert!(compare("hello world\n\n", "  hello world"));
        assert!(compare("", "\n"));
    }

    #[test]
    fn test_numeric_tolerance() {
        assert!(compare(" 4.0 ", "4"));
        assert!(compare("1.000001", "1.0"));
        assert!(compare("-2.5e-1", "-0.25"));
        assert!(compare("+3", "3."));
        assert!(compare(".5", "0.5"));
        assert!(!compare("1.01", "1.0"));
        assert!(!compare("1.0001", "1"));
    }

    #[test]
    fn test_exact_match_fallback() {
        assert!(!compare("abc", "abd"));
        assert!(!compare("Yes", "yes"));
        assert!(!compare("1  2", "1 2"));
        assert!(compare("1 2\n3 4", "1 2\n3 4\n"));
        // only one side numeric
        assert!(!compare("1", "one"));
    }

    #[test]
    fn test_non_literal_floats_compare_as_text() {
        assert!(compare("inf", "inf"));
        assert!(!compare("inf", "infinity"));
        assert!(!compare("NaN", "nan"));
        assert!(!compare("0x10", "16"));
    }

    #[test]
    fn test_identical_overflowing_literals_match() {
        assert!(compare("1e400", "1e400\n"));
        assert!(compare("-1e400", " -1e400"));
        // both overflow to infinity but differ as text
        assert!(!compare("1e400", "2e400"));
    }

    #[test]
    fn test_inner_lines_are_not_numeric() {
        assert!(!compare("1.0\n2.0", "1\n2"));
    }

    #[test]
    fn test_compare_is_deterministic() {
        for _ in 0..3 {
            assert!(compare("2.000004", "2"));
            assert!(!compare("abc", "abd"));
        }
    }
}
