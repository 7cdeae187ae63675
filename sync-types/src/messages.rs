//! Protocol frames for easy-sync.
//!
//! Every frame on the live connection is a JSON object discriminated by its
//! `type` field. Decoding never fails: a payload that is not valid JSON, or a
//! known type whose fields do not fit, becomes a [`Message::Text`] carrying
//! the raw payload, and an unrecognised `type` is kept as [`Message::Other`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{MessageId, SyncError};

/// Capabilities advertised in the `hello` handshake.
pub const CAPABILITIES: [&str; 3] = ["upload", "download", "chat"];

/// All protocol frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Message {
    /// Handshake sent once after the connection opens
    Hello(Hello),
    /// Chat line
    Chat(Chat),
    /// Status banner
    System(System),
    /// Device presence notification
    Presence(Presence),
    /// Free text (also produced for unparseable payloads)
    Text(Text),
    /// Frame with an unrecognised `type`, kept for forward compatibility
    #[serde(skip)]
    Other {
        /// The `type` value as received (empty if absent)
        kind: String,
        /// The whole frame
        raw: Value,
    },
}

impl Message {
    /// Build the handshake frame for this device.
    pub fn hello(device_name: &str) -> Self {
        Message::Hello(Hello {
            device: device_name.to_owned(),
            capabilities: CAPABILITIES.iter().map(|c| (*c).to_owned()).collect(),
        })
    }

    /// Build an outbound chat frame with a fresh id.
    pub fn chat(text: &str, from: &str, timestamp: i64) -> Self {
        Message::Chat(Chat {
            id: Some(MessageId::random()),
            from: Some(from.to_owned()),
            text: text.to_owned(),
            timestamp,
        })
    }

    /// Build a client-side status banner with a freshly minted id.
    pub fn system(text: &str) -> Self {
        Message::System(System {
            id: Some(MessageId::random()),
            text: text.to_owned(),
        })
    }

    /// Decode an inbound text frame, falling back to [`Message::Text`].
    pub fn decode(payload: &str) -> Self {
        match Self::parse(payload) {
            Ok(message) => message,
            Err(_) => Message::Text(Text {
                text: payload.to_owned(),
            }),
        }
    }

    /// Strictly parse an inbound frame.
    pub fn parse(payload: &str) -> Result<Self, SyncError> {
        let value: Value = serde_json::from_str(payload).map_err(SyncError::Deserialization)?;
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();

        match kind.as_str() {
            "hello" | "chat" | "system" | "presence" | "text" => {
                serde_json::from_value(value).map_err(SyncError::Deserialization)
            }
            _ => Ok(Message::Other { kind, raw: value }),
        }
    }

    /// Serialize to the JSON text sent on the wire.
    pub fn to_json(&self) -> Result<String, SyncError> {
        match self {
            Message::Other { raw, .. } => Ok(raw.to_string()),
            other => serde_json::to_string(other).map_err(SyncError::Serialization),
        }
    }

    /// The `type` discriminant of this frame.
    pub fn kind(&self) -> &str {
        match self {
            Message::Hello(_) => "hello",
            Message::Chat(_) => "chat",
            Message::System(_) => "system",
            Message::Presence(_) => "presence",
            Message::Text(_) => "text",
            Message::Other { kind, .. } => kind,
        }
    }

    /// The frame id used for deduplication, if it carries one.
    pub fn id(&self) -> Option<&str> {
        match self {
            Message::Chat(chat) => chat.id.as_ref().map(MessageId::as_str),
            Message::System(system) => system.id.as_ref().map(MessageId::as_str),
            Message::Presence(presence) => presence.id.as_ref().map(MessageId::as_str),
            Message::Other { raw, .. } => raw.get("id").and_then(Value::as_str),
            Message::Hello(_) | Message::Text(_) => None,
        }
    }
}

/// Handshake frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hello {
    /// Human-readable device name
    #[serde(default)]
    pub device: String,
    /// Advertised capabilities
    #[serde(default)]
    pub capabilities: Vec<String>,
}

/// Chat line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    /// Message id (deduplication key)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<MessageId>,
    /// Sender device name, stamped by the server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    /// Message body
    #[serde(default)]
    pub text: String,
    /// Unix timestamp (seconds)
    #[serde(default)]
    pub timestamp: i64,
}

/// Status banner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct System {
    /// Banner id (deduplication key)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<MessageId>,
    /// Banner text
    #[serde(default)]
    pub text: String,
}

/// Device presence notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Presence {
    /// Optional id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<MessageId>,
    /// Device that came online
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    /// Unix timestamp (seconds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

/// Free text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Text {
    /// The text
    #[serde(default)]
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn hello_wire_format() {
        let json = Message::hello("Desktop Browser").to_json().unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "hello",
                "device": "Desktop Browser",
                "capabilities": ["upload", "download", "chat"],
            })
        );
    }

    #[test]
    fn chat_wire_format() {
        let msg = Message::chat("hi there", "Mobile Device", 1_700_000_000);
        let value: Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "chat");
        assert_eq!(value["text"], "hi there");
        assert_eq!(value["from"], "Mobile Device");
        assert_eq!(value["timestamp"], 1_700_000_000);
        assert!(value["id"].as_str().is_some_and(|id| !id.is_empty()));
    }

    #[test]
    fn decodes_inbound_chat() {
        let msg = Message::decode(
            r#"{"type":"chat","id":"m1","text":"hello","timestamp":1000,"from":"Laptop"}"#,
        );
        match msg {
            Message::Chat(chat) => {
                assert_eq!(chat.id, Some(MessageId::from("m1")));
                assert_eq!(chat.text, "hello");
                assert_eq!(chat.timestamp, 1000);
                assert_eq!(chat.from.as_deref(), Some("Laptop"));
            }
            other => panic!("Expected Chat, got {:?}", other),
        }
    }

    #[test]
    fn chat_without_from_is_accepted() {
        let msg = Message::decode(r#"{"type":"chat","id":"m1","text":"x","timestamp":1}"#);
        assert!(matches!(msg, Message::Chat(Chat { from: None, .. })));
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let msg = Message::decode(
            r#"{"type":"chat","id":"m2","text":"x","timestamp":1,"offer_id":"o","accepted":true}"#,
        );
        assert_eq!(msg.id(), Some("m2"));
    }

    #[test]
    fn non_json_becomes_text() {
        let msg = Message::decode("plain words");
        assert_eq!(
            msg,
            Message::Text(Text {
                text: "plain words".into()
            })
        );
        assert!(Message::parse("plain words").is_err());
    }

    #[test]
    fn mistyped_known_frame_becomes_text() {
        let raw = r#"{"type":"chat","text":42}"#;
        assert_eq!(
            Message::decode(raw),
            Message::Text(Text { text: raw.into() })
        );
    }

    #[test]
    fn unknown_type_is_kept_as_other() {
        let msg = Message::decode(r#"{"type":"file_offer","id":"o1","name":"a.txt"}"#);
        match &msg {
            Message::Other { kind, raw } => {
                assert_eq!(kind, "file_offer");
                assert_eq!(raw["name"], "a.txt");
            }
            other => panic!("Expected Other, got {:?}", other),
        }
        assert_eq!(msg.kind(), "file_offer");
        assert_eq!(msg.id(), Some("o1"));
    }

    #[test]
    fn other_serializes_raw_frame() {
        let raw = json!({"type": "typing", "from": "x"});
        let msg = Message::Other {
            kind: "typing".into(),
            raw: raw.clone(),
        };
        let back: Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(back, raw);
    }

    #[test]
    fn presence_from_server() {
        let msg = Message::decode(r#"{"type":"presence","device":"Phone","timestamp":5}"#);
        assert!(matches!(
            msg,
            Message::Presence(Presence { ref device, .. }) if device.as_deref() == Some("Phone")
        ));
        assert_eq!(msg.id(), None);
    }

    #[test]
    fn system_banners_get_distinct_ids() {
        let a = Message::system("connected");
        let b = Message::system("connected");
        assert!(a.id().is_some());
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn ids_only_for_identified_kinds() {
        assert_eq!(Message::hello("x").id(), None);
        assert_eq!(Message::decode("not json").id(), None);
    }
}
