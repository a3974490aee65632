//! 16-byte node identifier
//!
//! Travels raw on the wire; rendered as a braced UUID when printed.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;
use zerocopy::{AsBytes, FromBytes, FromZeroes};

use super::constants::NODE_ID_SIZE;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid node id '{input}'")]
pub struct NodeIdParseError {
    pub input: String,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, AsBytes, FromBytes, FromZeroes)]
#[repr(transparent)]
pub struct NodeId([u8; NODE_ID_SIZE]);

impl NodeId {
    pub const fn nil() -> Self {
        Self([0; NODE_ID_SIZE])
    }

    pub fn random() -> Self {
        Self(*Uuid::new_v4().as_bytes())
    }

    pub const fn from_bytes(bytes: [u8; NODE_ID_SIZE]) -> Self {
        Self(bytes)
    }

    /// Read from a slice of exactly 16 bytes
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        Self::read_from(bytes)
    }

    pub fn to_bytes(self) -> [u8; NODE_ID_SIZE] {
        self.0
    }

    pub fn is_nil(&self) -> bool {
        self.0 == [0; NODE_ID_SIZE]
    }
}

impl AsRef<[u8]> for NodeId {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", Uuid::from_bytes(self.0).hyphenated())
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", hex::encode(self.0))
    }
}

impl FromStr for NodeId {
    type Err = NodeIdParseError;

    /// Accepts braced, hyphenated or simple UUID text
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_start_matches('{').trim_end_matches('}');
        Uuid::parse_str(trimmed)
            .map(|u| Self(*u.as_bytes()))
            .map_err(|_| NodeIdParseError {
                input: s.to_string(),
            })
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for NodeId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for NodeId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_parse_roundtrip() {
        let id = NodeId::random();
        let text = id.to_string();
        assert!(text.starts_with('{') && text.ends_with('}'));
        assert_eq!(text.parse::<NodeId>().unwrap(), id);
    }

    #[test]
    fn test_nil() {
        assert!(NodeId::nil().is_nil());
        assert!(NodeId::default().is_nil());
        assert!(!NodeId::from_bytes([1; 16]).is_nil());
    }

    #[test]
    fn test_from_slice_length() {
        assert!(NodeId::from_slice(&[7u8; 16]).is_some());
        assert!(NodeId::from_slice(&[7u8; 15]).is_none());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("not-a-node".parse::<NodeId>().is_err());
    }
}
