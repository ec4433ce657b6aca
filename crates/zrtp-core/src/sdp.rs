//! The `a=zrtp-hash` SDP attribute (RFC 6189 section 8.1)
//!
//! ```text
//! a=zrtp-hash:1.10 fe30efd02423cb054e50efd0248742ac7a52c8f91bc2df881ae642c371ba46df
//! ```

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// SDP attribute name
pub const ZRTP_HASH_ATTRIBUTE: &str = "zrtp-hash";

/// Hash of a Hello message announced in signaling
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ZrtpHashAttribute {
    /// ZRTP protocol version, e.g. `1.10`
    pub version: String,
    /// Lower-case hex SHA-256 of the Hello message
    pub hash: String,
}

impl ZrtpHashAttribute {
    pub fn new(version: impl Into<String>, hash: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            hash: hash.into(),
        }
    }
}

impl fmt::Display for ZrtpHashAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a={}:{} {}", ZRTP_HASH_ATTRIBUTE, self.version, self.hash)
    }
}

/// Parses a full `a=zrtp-hash:` line, an attribute value (`zrtp-hash:...`)
/// or the bare `<version> <hash>` pair an engine reports.
impl FromStr for ZrtpHashAttribute {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let s = s.strip_prefix("a=").unwrap_or(s);
        let value = match s.strip_prefix(ZRTP_HASH_ATTRIBUTE) {
            Some(rest) => rest.strip_prefix(':').ok_or_else(|| {
                Error::InvalidParameter(format!("Malformed {} attribute: {}", ZRTP_HASH_ATTRIBUTE, s))
            })?,
            None => s,
        };

        let mut parts = value.split_whitespace();
        let (Some(version), Some(hash), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(Error::InvalidParameter(format!(
                "Expected '<version> <hash>' in {} attribute, got {:?}",
                ZRTP_HASH_ATTRIBUTE, value
            )));
        };

        if !version.chars().all(|c| c.is_ascii_digit() || c == '.') {
            return Err(Error::InvalidParameter(format!("Invalid ZRTP version: {}", version)));
        }
        if !hash.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::InvalidParameter(format!("Invalid Hello hash: {}", hash)));
        }

        Ok(Self::new(version, hash.to_ascii_lowercase()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HASH: &str = "fe30efd02423cb054e50efd0248742ac7a52c8f91bc2df881ae642c371ba46df";

    #[test]
    fn test_display() {
        let attr = ZrtpHashAttribute::new("1.10", HASH);
        assert_eq!(attr.to_string(), format!("a=zrtp-hash:1.10 {}", HASH));
    }

    #[test]
    fn test_parse_forms() {
        let expected = ZrtpHashAttribute::new("1.10", HASH);
        for input in [
            format!("a=zrtp-hash:1.10 {}", HASH),
            format!("zrtp-hash:1.10 {}", HASH),
            format!("1.10 {}", HASH),
            format!("  a=zrtp-hash:1.10   {}\r\n", HASH.to_uppercase()),
        ] {
            assert_eq!(input.parse::<ZrtpHashAttribute>().unwrap(), expected, "{}", input);
        }
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("a=zrtp-hash:1.10".parse::<ZrtpHashAttribute>().is_err());
        assert!("a=zrtp-hashx 1.10 abcd".parse::<ZrtpHashAttribute>().is_err());
        assert!("1.10 xyz".parse::<ZrtpHashAttribute>().is_err());
        assert!("v1 abcd".parse::<ZrtpHashAttribute>().is_err());
        assert!("1.10 abcd extra".parse::<ZrtpHashAttribute>().is_err());
        assert!("".parse::<ZrtpHashAttribute>().is_err());
    }
}
