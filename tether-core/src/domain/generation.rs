//! Generation identifiers for backend-set snapshots.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// A caller-assigned identifier for one backend-set snapshot and its table.
///
/// Generations travel to clients as decimal integers and come back as
/// opaque tokens, so parsing is deliberately strict: anything that is not
/// a plain unsigned decimal is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Generation(pub u64);

impl Generation {
    /// The generation following this one.
    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A generation token that is not a plain unsigned decimal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid generation token {0:?}")]
pub struct ParseGenerationError(pub String);

impl FromStr for Generation {
    type Err = ParseGenerationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.trim();
        // u64::from_str would also take a leading '+'
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ParseGenerationError(s.to_string()));
        }
        digits
            .parse::<u64>()
            .map(Self)
            .map_err(|_| ParseGenerationError(s.to_string()))
    }
}

impl From<u64> for Generation {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_decimal_token() {
        assert_eq!("17".parse::<Generation>(), Ok(Generation(17)));
        assert_eq!(" 3 ".parse::<Generation>(), Ok(Generation(3)));
    }

    #[test]
    fn test_reject_garbage_tokens() {
        assert!("".parse::<Generation>().is_err());
        assert!("-1".parse::<Generation>().is_err());
        assert!("abc".parse::<Generation>().is_err());
        assert!("1.5".parse::<Generation>().is_err());
        assert!("+1".parse::<Generation>().is_err());
        assert!("1 2".parse::<Generation>().is_err());
        assert!("18446744073709551616".parse::<Generation>().is_err());
    }

    #[test]
    fn test_display_round_trips_through_header_form() {
        assert_eq!(Generation(42).to_string(), "42");
    }
}
