//! Value serialization for stored results

use crate::{Error, Result};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Encoding used for result and metadata values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Serializer {
    /// JSON (human-readable, larger)
    #[serde(rename = "json")]
    Json,
    /// MessagePack (binary, compact)
    #[default]
    #[serde(rename = "msgpack", alias = "messagepack")]
    MessagePack,
}

impl Serializer {
    /// Serialize a value
    pub fn serialize<T: Serialize>(&self, value: &T) -> Result<Bytes> {
        match self {
            Serializer::Json => Ok(Bytes::from(serde_json::to_vec(value)?)),
            Serializer::MessagePack => Ok(Bytes::from(rmp_serde::to_vec_named(value)?)),
        }
    }

    /// Deserialize a value
    pub fn deserialize<T: for<'de> Deserialize<'de>>(&self, data: &[u8]) -> Result<T> {
        match self {
            Serializer::Json => {
                serde_json::from_slice(data).map_err(|e| Error::Deserialization(e.to_string()))
            }
            Serializer::MessagePack => Ok(rmp_serde::from_slice(data)?),
        }
    }
}

impl std::str::FromStr for Serializer {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "json" => Ok(Serializer::Json),
            "msgpack" | "messagepack" => Ok(Serializer::MessagePack),
            _ => Err(Error::Configuration(format!("unknown serializer: {}", s))),
        }
    }
}
