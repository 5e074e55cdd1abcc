//! Withdrawal amounts
//!
//! Amounts travel as decimal text from the caller to the exchange. They are
//! never converted through floating point, so the value on the wire is the
//! value the caller typed.

use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Most fraction digits any supported platform accepts
pub const MAX_FRACTION_DIGITS: usize = 18;

/// Positive decimal amount in canonical form
///
/// Canonical means no sign, no exponent, no leading zeros in the integer
/// part and no trailing zeros in the fraction: `"007.50"` becomes `"7.5"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Amount(String);

impl Amount {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Amount {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| Error::InvalidInput(format!("amount {:?} {}", input, reason));
        let text = input.trim();

        if text.is_empty() {
            return Err(invalid("is empty"));
        }
        if text.starts_with('-') {
            return Err(invalid("must be positive"));
        }
        if text.contains(['e', 'E']) {
            return Err(invalid("must be written without an exponent"));
        }

        let (whole, fraction) = match text.split_once('.') {
            Some((whole, fraction)) => (whole, fraction),
            None => (text, ""),
        };
        let digits_only = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
        if (whole.is_empty() && fraction.is_empty()) || !digits_only(whole) || !digits_only(fraction) {
            return Err(invalid("is not a decimal number"));
        }

        let whole = whole.trim_start_matches('0');
        let fraction = fraction.trim_end_matches('0');
        if fraction.len() > MAX_FRACTION_DIGITS {
            return Err(invalid(&format!(
                "has more than {} decimal places",
                MAX_FRACTION_DIGITS
            )));
        }
        if whole.is_empty() && fraction.is_empty() {
            return Err(invalid("must be greater than zero"));
        }

        let whole = if whole.is_empty() { "0" } else { whole };
        let canonical = if fraction.is_empty() {
            whole.to_string()
        } else {
            format!("{}.{}", whole, fraction)
        };
        Ok(Amount(canonical))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn amount(s: &str) -> String {
        s.parse::<Amount>().unwrap().to_string()
    }

    #[test]
    fn test_canonical_form() {
        assert_eq!(amount("10"), "10");
        assert_eq!(amount(" 10.50 "), "10.5");
        assert_eq!(amount("007.000"), "7");
        assert_eq!(amount(".5"), "0.5");
        assert_eq!(amount("1."), "1");
        assert_eq!(amount("123456789012345678901234567890"), "123456789012345678901234567890");
    }

    #[test]
    fn test_tiny_amounts_keep_every_digit() {
        assert_eq!(amount("0.0000000000001"), "0.0000000000001");
        assert_eq!(amount("1.000000000000000001"), "1.000000000000000001");
    }

    #[test]
    fn test_rejected_amounts() {
        for bad in ["", " ", "0", "0.000", "-1", "1e-13", "1E5", "abc", "1.2.3", ".", "1,5", "+"] {
            assert!(
                matches!(bad.parse::<Amount>(), Err(Error::InvalidInput(_))),
                "{:?} should be rejected",
                bad
            );
        }
        // One digit past the limit
        assert!("0.0000000000000000001".parse::<Amount>().is_err());
        // Trailing zeros do not count against the limit
        assert!("0.1000000000000000000000".parse::<Amount>().is_ok());
    }

    #[test]
    fn test_serializes_as_string() {
        let value = serde_json::to_value("0.25".parse::<Amount>().unwrap()).unwrap();
        assert_eq!(value, serde_json::json!("0.25"));
    }
}
