//! Human-readable sequential codes (`HN0001`, `HN0002`, ... `HN10000`).

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A rendered sequential code
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SequentialCode(String);

impl SequentialCode {
    pub fn from_string(code: String) -> Self {
        Self(code)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric value of the trailing digit run, if any
    pub fn number(&self) -> Option<u64> {
        numeric_suffix(&self.0)
    }
}

impl fmt::Display for SequentialCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SequentialCode {
    fn from(code: &str) -> Self {
        Self(code.to_string())
    }
}

/// Parse the trailing run of ASCII digits of `code`.
///
/// `HN0042` → 42, `HN10000` → 10000, `HN` → None.
pub fn numeric_suffix(code: &str) -> Option<u64> {
    let digits_at = code
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(i, _)| i)?;
    code[digits_at..].parse().ok()
}

/// Ordering used wherever "highest code" matters: by numeric suffix, so a
/// widened `HN10000` sorts after `HN9999`. Codes without digits sort first.
pub fn compare_codes(a: &str, b: &str) -> Ordering {
    numeric_suffix(a)
        .cmp(&numeric_suffix(b))
        .then_with(|| a.cmp(b))
}

/// Prefix + zero padding rules for one deployment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeFormat {
    prefix: String,
    width: usize,
}

impl CodeFormat {
    pub fn new<S: Into<String>>(prefix: S, width: usize) -> Self {
        Self {
            prefix: prefix.into(),
            width: width.max(1),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The code handed to the first record of an empty namespace
    pub fn first(&self) -> SequentialCode {
        self.render(1)
    }

    /// Render `n` with the configured padding; wider numbers are never
    /// truncated, they just take more digits.
    pub fn render(&self, n: u64) -> SequentialCode {
        SequentialCode(format!("{}{:0width$}", self.prefix, n, width = self.width))
    }

    /// Parse a code that follows this format exactly
    pub fn parse(&self, code: &str) -> Option<u64> {
        let digits = code.strip_prefix(&self.prefix)?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }

    /// Successor of the highest existing code, or the first code
    pub fn next_after(&self, highest: Option<&str>) -> SequentialCode {
        match highest.and_then(numeric_suffix) {
            Some(n) => self.render(n.saturating_add(1)),
            None => self.first(),
        }
    }
}

impl Default for CodeFormat {
    fn default() -> Self {
        Self::new("HN", 4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn renders_with_padding_and_widens() {
        let format = CodeFormat::default();
        assert_eq!(format.first().as_str(), "HN0001");
        assert_eq!(format.render(42).as_str(), "HN0042");
        assert_eq!(format.render(9999).as_str(), "HN9999");
        assert_eq!(format.render(10000).as_str(), "HN10000");
    }

    #[test]
    fn next_after_rolls_past_padding() {
        let format = CodeFormat::default();
        assert_eq!(format.next_after(None).as_str(), "HN0001");
        assert_eq!(format.next_after(Some("HN0009")).as_str(), "HN0010");
        assert_eq!(format.next_after(Some("HN9999")).as_str(), "HN10000");
        assert_eq!(format.next_after(Some("garbage")).as_str(), "HN0001");
    }

    #[test]
    fn parse_requires_exact_prefix_and_digits() {
        let format = CodeFormat::default();
        assert_eq!(format.parse("HN0007"), Some(7));
        assert_eq!(format.parse("HN12345"), Some(12345));
        assert_eq!(format.parse("XX0007"), None);
        assert_eq!(format.parse("HN"), None);
        assert_eq!(format.parse("HN12a"), None);
    }

    #[test]
    fn widened_codes_sort_after_padded_ones() {
        assert_eq!(compare_codes("HN10000", "HN9999"), Ordering::Greater);
        assert_eq!(compare_codes("HN0002", "HN0010"), Ordering::Less);
        assert_eq!(compare_codes("nodigits", "HN0001"), Ordering::Less);
    }

    proptest! {
        #[test]
        fn rendered_codes_order_like_their_numbers(a in 1u64..2_000_000, b in 1u64..2_000_000) {
            let format = CodeFormat::default();
            let (ca, cb) = (format.render(a), format.render(b));
            prop_assert_eq!(compare_codes(ca.as_str(), cb.as_str()), a.cmp(&b));
            prop_assert_eq!(format.parse(ca.as_str()), Some(a));
        }

        #[test]
        fn successor_is_strictly_greater(n in 0u64..5_000_000) {
            let format = CodeFormat::default();
            let current = format.render(n);
            let next = format.next_after(Some(current.as_str()));
            prop_assert_eq!(compare_codes(next.as_str(), current.as_str()), Ordering::Greater);
            prop_assert_ne!(next, current);
        }
    }
}
