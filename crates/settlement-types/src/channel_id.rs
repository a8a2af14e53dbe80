//! The 32-byte opaque channel identifier shared by both ledger families.

use std::fmt;

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::SettlementError;

/// A 256-bit channel identifier, always represented as 64 lowercase hex characters.
///
/// Uniqueness is global per ledger, not across ledgers: an EVM channel id and
/// an XRP channel id may collide as byte strings without meaning the same
/// channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId([u8; 32]);

impl ChannelId {
    /// Parses a 64-character lowercase hex string into a [`ChannelId`].
    pub fn parse(s: &str) -> Result<Self, SettlementError> {
        if s.len() != 64 || !s.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase()) {
            return Err(SettlementError::InvalidInput(format!(
                "channel id must be 64 lowercase hex characters, got {s:?}"
            )));
        }
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes)
            .map_err(|e| SettlementError::InvalidInput(format!("invalid channel id hex: {e}")))?;
        Ok(ChannelId(bytes))
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        ChannelId(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for ChannelId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ChannelId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        ChannelId::parse(&s).map_err(DeError::custom)
    }
}
