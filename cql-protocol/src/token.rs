use std::fmt;

use crate::error::{Error, Result};

/// A point on the ring. Ordering only makes sense between tokens of the same partitioner.
#[derive(Clone, Ord, PartialOrd, Eq, PartialEq, Debug, Hash)]
pub enum Token {
    Murmur3(i64),
    /// Raw key bytes, as used by the byte ordered partitioner.
    Bytes(Vec<u8>),
}

impl Token {
    /// Parses a Murmur3 token as stored in `system.local.tokens`.
    pub fn parse_murmur3(value: &str) -> Result<Self> {
        value
            .parse()
            .map(Token::Murmur3)
            .map_err(|error| Error::General(format!("Error parsing token {value}: {error}")))
    }

    /// Parses a byte ordered token, which is stored hex encoded.
    pub fn parse_bytes(value: &str) -> Result<Self> {
        let value = value.strip_prefix("0x").unwrap_or(value);
        if value.len() % 2 != 0 {
            return Err(Error::General(format!("Odd length hex token: {value}")));
        }

        (0..value.len())
            .step_by(2)
            .map(|index| {
                value
                    .get(index..index + 2)
                    .and_then(|digits| u8::from_str_radix(digits, 16).ok())
                    .ok_or_else(|| Error::General(format!("Invalid hex token: {value}")))
            })
            .collect::<Result<Vec<_>>>()
            .map(Token::Bytes)
    }
}

impl From<i64> for Token {
    fn from(value: i64) -> Self {
        Token::Murmur3(value)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Murmur3(value) => write!(f, "{value}"),
            Token::Bytes(bytes) => bytes.iter().try_for_each(|byte| write!(f, "{byte:02x}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_murmur3() {
        assert_eq!(
            Token::parse_murmur3("-9223372036854775808").unwrap(),
            Token::Murmur3(i64::MIN)
        );
        assert!(Token::parse_murmur3("abc").is_err());
    }

    #[test]
    fn test_parse_bytes() {
        let token = Token::parse_bytes("00ff1a").unwrap();
        assert_eq!(token, Token::Bytes(vec![0x00, 0xff, 0x1a]));
        assert_eq!(token.to_string(), "00ff1a");
        assert!(Token::parse_bytes("0f0").is_err());
        assert!(Token::parse_bytes("zz").is_err());
    }

    #[test]
    fn test_ordering() {
        assert!(Token::Murmur3(-5) < Token::Murmur3(3));
        assert!(Token::Bytes(vec![1]) < Token::Bytes(vec![1, 0]));
    }
}
