//! Packet model
//!
//! Outbound requests are [`WebSocketPacket`]s. Inbound text is decoded in two
//! phases: first only the `type` discriminator of each element, then the full
//! element into the matching [`InboundPacket`] variant.
//!
//! ```text
//! {"type":"method", ...}  ──> InboundPacket::Method(MethodPacket)
//! {"type":"reply",  ...}  ──> InboundPacket::Reply(ReplyPacket)
//! {"type":"event",  ...}  ──> InboundPacket::Event(EventPacket)
//! [ {...}, {...} ]        ──> one InboundPacket per element, in order
//! ```

use crate::traits::{LiveSocketError, ReplyError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Packet type discriminator carried in the `type` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PacketType {
    Method,
    Reply,
    Event,
}

/// Outbound packet
///
/// `id == 0` means "unassigned"; the client assigns a correlation id before
/// the packet reaches the wire. Everything except `id` and `type` lives in
/// `fields` and is flattened into the top-level JSON object.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebSocketPacket {
    pub id: u32,
    #[serde(rename = "type")]
    pub packet_type: PacketType,
    #[serde(flatten)]
    fields: Map<String, Value>,
}

impl WebSocketPacket {
    pub fn new(packet_type: PacketType) -> Self {
        Self {
            id: 0,
            packet_type,
            fields: Map::new(),
        }
    }

    /// A `method` request invoking `method` on the server
    pub fn method(method: impl Into<String>) -> Self {
        Self::new(PacketType::Method).with_field("method", Value::String(method.into()))
    }

    /// Pre-assign a correlation id
    pub fn with_id(mut self, id: u32) -> Self {
        self.id = id;
        self
    }

    /// Set a payload field. `id` and `type` are owned by the envelope and are
    /// ignored here.
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        let key = key.into();
        if key == "id" || key == "type" {
            warn!("Ignoring reserved packet field '{}'", key);
            return self;
        }
        self.fields.insert(key, value);
        self
    }

    /// Shorthand for the `arguments` field used by method requests
    pub fn with_arguments(self, arguments: Value) -> Self {
        self.with_field("arguments", arguments)
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Wire text for this packet
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Inbound, unsolicited invocation from the server
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MethodPacket {
    #[serde(default)]
    pub id: u32,
    pub method: String,
    #[serde(default, alias = "params", alias = "arguments")]
    pub parameters: Value,
}

impl MethodPacket {
    /// Decode the parameters into a caller-chosen shape
    pub fn parameters_as<T: DeserializeOwned>(&self) -> Result<T> {
        T::deserialize(&self.parameters).map_err(|e| {
            LiveSocketError::ParseError(format!("method '{}' parameters: {}", self.method, e))
        })
    }
}

/// Inbound answer to a prior request, matched by `id`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReplyPacket {
    pub id: u32,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
}

impl ReplyPacket {
    /// True when the reply carries a non-null error payload
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// True when `data` is present and not an empty string
    pub fn has_data(&self) -> bool {
        match &self.data {
            None => false,
            Some(Value::String(s)) => !s.is_empty(),
            Some(_) => true,
        }
    }

    /// Fail with the structured error payload if the reply carries one
    pub fn check_error(&self) -> Result<()> {
        match &self.error {
            Some(payload) => Err(LiveSocketError::Reply(ReplyError::from_payload(
                payload.clone(),
            ))),
            None => Ok(()),
        }
    }

    /// The successful payload; `result` wins over `data`
    pub fn payload(&self) -> Option<&Value> {
        self.result.as_ref().or(self.data.as_ref())
    }

    /// Decode the successful payload into `T`
    ///
    /// An error reply never becomes a value: the error check runs first.
    /// A reply with neither `result` nor `data` yields `Ok(None)`.
    pub fn into_result<T: DeserializeOwned>(self) -> Result<Option<T>> {
        self.check_error()?;
        match self.result.or(self.data) {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| LiveSocketError::ParseError(format!("reply {}: {}", self.id, e))),
            None => Ok(None),
        }
    }
}

/// Inbound broadcast
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EventPacket {
    #[serde(default)]
    pub id: u32,
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl EventPacket {
    /// Decode the event data into a caller-chosen shape
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<T> {
        T::deserialize(&self.data).map_err(|e| {
            LiveSocketError::ParseError(format!("event '{}' data: {}", self.event, e))
        })
    }
}

/// A decoded inbound packet
#[derive(Debug, Clone, PartialEq)]
pub enum InboundPacket {
    Method(MethodPacket),
    Reply(ReplyPacket),
    Event(EventPacket),
}

impl InboundPacket {
    pub fn packet_type(&self) -> PacketType {
        match self {
            InboundPacket::Method(_) => PacketType::Method,
            InboundPacket::Reply(_) => PacketType::Reply,
            InboundPacket::Event(_) => PacketType::Event,
        }
    }

    /// Decode a single JSON object
    pub fn from_value(value: &Value) -> Result<Self> {
        let envelope = PacketEnvelope::deserialize(value)
            .map_err(|e| LiveSocketError::ParseError(format!("missing packet type: {}", e)))?;

        let packet_type = match envelope.packet_type.as_str() {
            "method" => PacketType::Method,
            "reply" => PacketType::Reply,
            "event" => PacketType::Event,
            other => {
                return Err(LiveSocketError::ParseError(format!(
                    "unknown packet type '{}'",
                    other
                )))
            }
        };

        let packet = match packet_type {
            PacketType::Method => MethodPacket::deserialize(value).map(InboundPacket::Method),
            PacketType::Reply => ReplyPacket::deserialize(value).map(InboundPacket::Reply),
            PacketType::Event => EventPacket::deserialize(value).map(InboundPacket::Event),
        };

        packet.map_err(|e| LiveSocketError::ParseError(format!("{:?} packet: {}", packet_type, e)))
    }
}

/// First decoding phase: only the discriminator
#[derive(Deserialize)]
struct PacketEnvelope {
    #[serde(rename = "type")]
    packet_type: String,
}

/// Decode one complete inbound message
///
/// The message is either a single object or an array of objects. Malformed
/// top-level JSON fails the whole message; a malformed element is logged and
/// skipped so its siblings are still delivered.
pub fn decode_message(text: &str) -> Result<Vec<InboundPacket>> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| LiveSocketError::ParseError(format!("invalid JSON: {}", e)))?;

    match value {
        Value::Array(elements) => {
            let mut packets = Vec::with_capacity(elements.len());
            for (index, element) in elements.iter().enumerate() {
                match InboundPacket::from_value(element) {
                    Ok(packet) => packets.push(packet),
                    Err(e) => warn!("Skipping element {} of inbound batch: {}", index, e),
                }
            }
            debug!("Decoded batch of {} packets", packets.len());
            Ok(packets)
        }
        Value::Object(_) => Ok(vec![InboundPacket::from_value(&value)?]),
        other => Err(LiveSocketError::ParseError(format!(
            "expected object or array, got {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
