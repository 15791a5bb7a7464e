//! Value Objects for order economics

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Coupon code value object. Codes are case-insensitive and stored upper-cased.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CouponCode(String);

impl CouponCode {
    pub fn new(value: impl Into<String>) -> Result<Self, CouponCodeError> {
        let value = value.into().trim().to_uppercase();
        if value.is_empty() { return Err(CouponCodeError::Empty); }
        if value.len() > 64 { return Err(CouponCodeError::TooLong); }
        Ok(Self(value))
    }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for CouponCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[derive(Debug, Clone)] pub enum CouponCodeError { Empty, TooLong }
impl std::error::Error for CouponCodeError {}
impl fmt::Display for CouponCodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self { Self::Empty => write!(f, "Coupon code empty"), Self::TooLong => write!(f, "Coupon code too long") }
    }
}

/// Rounds a currency amount to two decimal places, halves away from zero.
pub fn round2(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Renders an amount without trailing zeros (`500.00` -> `500`, `99.50` -> `99.5`).
pub fn display_amount(amount: Decimal) -> String { amount.normalize().to_string() }

/// One entry of a coupon's email allow-list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmailPattern {
    /// Exact address, compared case-insensitively.
    Literal(String),
    /// `*` matches any run of characters and everything else is literal, so `.`
    /// matches only a dot rather than any single character.
    Glob(String),
}

impl EmailPattern {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim().to_lowercase();
        if raw.contains('*') { Self::Glob(raw) } else { Self::Literal(raw) }
    }

    pub fn matches(&self, email: &str) -> bool {
        let email = email.trim().to_lowercase();
        match self {
            Self::Literal(address) => *address == email,
            Self::Glob(pattern) => glob_match(pattern, &email),
        }
    }
}

/// Parses the stored allow-list (a JSON array of strings). `None` when the
/// stored value is not a valid list.
pub fn parse_allowed_emails(stored: &str) -> Option<Vec<EmailPattern>> {
    let raw: Vec<String> = serde_json::from_str(stored).ok()?;
    Some(raw.iter().map(|p| EmailPattern::parse(p)).collect())
}

fn glob_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    let (first, rest) = match parts.split_first() { Some(split) => split, None => return text.is_empty() };
    let Some(mut remaining) = text.strip_prefix(first) else { return false };
    let Some((last, middle)) = rest.split_last() else { return remaining.is_empty() };
    for part in middle {
        match remaining.find(part) {
            Some(idx) => remaining = &remaining[idx + part.len()..],
            None => return false,
        }
    }
    remaining.len() >= last.len() && remaining.ends_with(last)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_coupon_code() { let code = CouponCode::new(" save10 ").unwrap(); assert_eq!(code.as_str(), "SAVE10"); }

    #[test]
    fn test_coupon_code_empty() { assert!(CouponCode::new("   ").is_err()); }

    #[test]
    fn test_round2() {
        assert_eq!(round2(dec!(10.005)), dec!(10.01));
        assert_eq!(round2(dec!(33.3333)), dec!(33.33));
    }

    #[test]
    fn test_display_amount() {
        assert_eq!(display_amount(dec!(500.00)), "500");
        assert_eq!(display_amount(dec!(99.50)), "99.5");
    }

    #[test]
    fn test_literal_email_is_case_insensitive() {
        let p = EmailPattern::parse("Jane@Example.com");
        assert!(p.matches("jane@example.COM"));
        assert!(!p.matches("jane@example.org"));
    }

    #[test]
    fn test_glob_email() {
        let p = EmailPattern::parse("*@staff.example.com");
        assert!(matches!(p, EmailPattern::Glob(_)));
        assert!(p.matches("ops@STAFF.example.com"));
        assert!(!p.matches("ops@staff.example.com.evil"));
        // `.` is a literal dot, not a wildcard
        assert!(!p.matches("ops@staffxexample.com"));
        assert!(EmailPattern::parse("vip-*@*.in").matches("vip-7@shop.in"));
        assert!(EmailPattern::parse("*").matches("anyone@anywhere"));
    }

    #[test]
    fn test_glob_overlapping_prefix_and_suffix() {
        assert!(!EmailPattern::parse("ab*ba").matches("aba"));
        assert!(EmailPattern::parse("ab*ba").matches("abba"));
    }

    #[test]
    fn test_parse_allowed_emails() {
        let list = parse_allowed_emails(r#"["a@x.com", "*@y.com"]"#).unwrap();
        assert_eq!(list.len(), 2);
        assert!(parse_allowed_emails("not json").is_none());
    }
}
