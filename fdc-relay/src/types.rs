//! Shared primitive types: 32-byte tags, transaction hashes and encoded requests.

use std::fmt;
use std::str::FromStr;

use ethers::types::{Bytes, H256};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{RelayError, RelayResult};

/// Encode a short ASCII identifier (`"EVMTransaction"`, `"testETH"`) as a right-padded
/// 32-byte tag.
pub fn encode_tag(tag: &str) -> RelayResult<H256> {
    let bytes = tag.as_bytes();
    if bytes.len() > 32 {
        return Err(RelayError::InvalidInput(format!(
            "tag `{}` is {} bytes, longer than 32",
            tag,
            bytes.len()
        )));
    }
    let mut out = [0u8; 32];
    out[..bytes.len()].copy_from_slice(bytes);
    Ok(H256(out))
}

/// Decode a right-padded tag back into text, dropping the zero padding.
pub fn decode_tag(tag: &H256) -> String {
    let end = tag.0.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
    String::from_utf8_lossy(&tag.0[..end]).into_owned()
}

/// Parse a `0x`-prefixed, 64-hex-digit transaction hash.
pub fn parse_tx_hash(input: &str) -> RelayResult<H256> {
    let trimmed = input.trim();
    let digits = trimmed.strip_prefix("0x").ok_or_else(|| {
        RelayError::InvalidInput(format!(
            "transaction hash must start with 0x, got `{}`",
            trimmed
        ))
    })?;
    if digits.len() != 64 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(RelayError::InvalidInput(format!(
            "transaction hash must be 0x followed by 64 hex characters, got `{}`",
            trimmed
        )));
    }
    let mut out = [0u8; 32];
    hex::decode_to_slice(digits, &mut out)
        .map_err(|e| RelayError::InvalidInput(format!("transaction hash: {}", e)))?;
    Ok(H256(out))
}

/// ABI-encoded attestation request as returned by the preparation service.
///
/// The same bytes are paid for on the attestation hub and later quoted to the
/// proof-availability service, which matches on them exactly.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EncodedRequest(Bytes);

impl EncodedRequest {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    pub fn from_hex(input: &str) -> RelayResult<Self> {
        let input = input.trim();
        let digits = input.strip_prefix("0x").unwrap_or(input);
        if digits.is_empty() {
            return Err(RelayError::InvalidInput("encoded request is empty".into()));
        }
        let bytes = hex::decode(digits)
            .map_err(|e| RelayError::InvalidInput(format!("encoded request: {}", e)))?;
        Ok(Self(bytes.into()))
    }

    pub fn bytes(&self) -> &Bytes {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Lower-case `0x` hex form used on the wire.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(&self.0))
    }
}

impl fmt::Display for EncodedRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for EncodedRequest {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

/// Integers the attestation services send either as JSON numbers or as quoted decimals.
pub(crate) mod quoted {
    use super::*;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString<T> {
        Number(T),
        Text(String),
    }

    pub fn serialize<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: fmt::Display,
        S: Serializer,
    {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        T: FromStr + Deserialize<'de>,
        T::Err: fmt::Display,
        D: Deserializer<'de>,
    {
        match NumberOrString::<T>::deserialize(deserializer)? {
            NumberOrString::Number(value) => Ok(value),
            NumberOrString::Text(text) => text.trim().parse().map_err(serde::de::Error::custom),
        }
    }
}

/// Treat an explicit JSON `null` like a missing field.
pub(crate) fn null_as_default<'de, T, D>(deserializer: D) -> Result<T, D::Error>
where
    T: Default + Deserialize<'de>,
    D: Deserializer<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Serialize helper for plain `0x` hex strings.
pub(crate) fn serialize_hex<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
}

impl Serialize for EncodedRequest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_hex(&self.0, serializer)
    }
}
