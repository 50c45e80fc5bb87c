//! Dial-string validation for outgoing calls.

use std::fmt;

use crate::error::{BridgeError, Result};

/// A validated, normalized dial string.
///
/// Holds only digits, `*`, `#` and an optional leading `+`. Visual
/// separators (spaces, dashes, dots, parentheses) are accepted on input
/// and dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialString(String);

impl DialString {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let mut normalized = String::with_capacity(trimmed.len());

        for (i, c) in trimmed.chars().enumerate() {
            match c {
                '0'..='9' | '*' | '#' => normalized.push(c),
                '+' if i == 0 => normalized.push(c),
                ' ' | '-' | '.' | '(' | ')' => {}
                '+' => {
                    return Err(BridgeError::Command(format!(
                        "`+` is only allowed at the start of a number: `{trimmed}`"
                    )));
                }
                other => {
                    return Err(BridgeError::Command(format!(
                        "unsupported character `{other}` in number `{trimmed}`"
                    )));
                }
            }
        }

        if !normalized.chars().any(|c| c.is_ascii_digit()) {
            return Err(BridgeError::Command(format!(
                "number `{trimmed}` contains no digits"
            )));
        }
        Ok(Self(normalized))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `tel:` URI handed to the platform dialer.
    #[must_use]
    pub fn tel_uri(&self) -> String {
        format!("tel:{}", self.0)
    }
}

impl fmt::Display for DialString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_separators() {
        let dial = DialString::parse(" +1 (555) 010-0.123 ").unwrap();
        assert_eq!(dial.as_str(), "+15550100123");
        assert_eq!(dial.tel_uri(), "tel:+15550100123");
    }

    #[test]
    fn keeps_service_codes() {
        let dial = DialString::parse("*#06#").unwrap();
        assert_eq!(dial.tel_uri(), "tel:*#06#");
    }

    #[test]
    fn rejects_inner_plus() {
        assert!(DialString::parse("555+0100").is_err());
    }

    #[test]
    fn rejects_letters() {
        assert!(DialString::parse("1-800-FLOWERS").is_err());
    }

    #[test]
    fn requires_a_digit() {
        assert!(DialString::parse("").is_err());
        assert!(DialString::parse("  ").is_err());
        assert!(DialString::parse("*#").is_err());
        assert!(DialString::parse("+").is_err());
    }
}
