//! Dotted-decimal IPv4 codec.
//!
//! Rules implemented:
//! - exactly four `.`-separated octets, each a decimal value in `0..=255`
//! - no sign characters, no whitespace, no leading zeros (`"01.2.3.4"` is invalid)
//! - the encoded key is big-endian: the first octet is most significant
//!
//! Parse failures are ordinary values, never panics; the resolver downgrades them
//! to an absent lookup key.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IpParseError {
    #[error("empty address")]
    Empty,
    #[error("expected 4 octets, found {0}")]
    OctetCount(usize),
    #[error("invalid octet '{0}'")]
    InvalidOctet(String),
}

/// Encodes an IPv4 literal into its canonical unsigned 32-bit key.
pub fn encode_ipv4(raw: &str) -> Result<u32, IpParseError> {
    if raw.is_empty() {
        return Err(IpParseError::Empty);
    }

    let mut key: u32 = 0;
    let mut count = 0usize;
    for part in raw.split('.') {
        count += 1;
        if count > 4 {
            return Err(IpParseError::OctetCount(raw.split('.').count()));
        }
        key = (key << 8) | u32::from(parse_octet(part)?);
    }

    if count != 4 {
        return Err(IpParseError::OctetCount(count));
    }

    Ok(key)
}

fn parse_octet(part: &str) -> Result<u8, IpParseError> {
    if part.is_empty()
        || part.len() > 3
        || !part.bytes().all(|b| b.is_ascii_digit())
        || (part.len() > 1 && part.starts_with('0'))
    {
        return Err(IpParseError::InvalidOctet(part.to_string()));
    }

    let mut value: u16 = 0;
    for b in part.bytes() {
        value = value * 10 + u16::from(b - b'0');
    }
    if value > 255 {
        return Err(IpParseError::InvalidOctet(part.to_string()));
    }
    Ok(value as u8)
}
