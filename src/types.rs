/// file: src/types.rs
/// description: channel table, event records and inbound wire message shapes for the update feed
use crate::error::FeedError;
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{fmt, str::FromStr};
use uuid::Uuid;

/// Named push channels the feed subscribes to. This is a closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Channel {
    #[serde(rename = "disaster-update")]
    DisasterUpdate,
    #[serde(rename = "resource-update")]
    ResourceUpdate,
    #[serde(rename = "report-update")]
    ReportUpdate,
    #[serde(rename = "social_media_updated")]
    SocialMediaUpdated,
}

impl Channel {
    /// Every channel in the table, in subscription order.
    pub const ALL: [Channel; 4] = [
        Channel::DisasterUpdate,
        Channel::ResourceUpdate,
        Channel::ReportUpdate,
        Channel::SocialMediaUpdated,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::DisasterUpdate => "disaster-update",
            Channel::ResourceUpdate => "resource-update",
            Channel::ReportUpdate => "report-update",
            Channel::SocialMediaUpdated => "social_media_updated",
        }
    }

    /// Backend entity whose mutations this channel mirrors.
    pub fn entity(&self) -> Option<Entity> {
        match self {
            Channel::DisasterUpdate => Some(Entity::Disaster),
            Channel::ResourceUpdate => Some(Entity::Resource),
            Channel::ReportUpdate => Some(Entity::Report),
            Channel::SocialMediaUpdated => None,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = FeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Channel::ALL
            .into_iter()
            .find(|channel| channel.as_str() == s)
            .ok_or_else(|| FeedError::UnknownChannel(s.to_string()))
    }
}

/// REST entities of the backend. Only used to label the `*-update` channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Entity {
    Disaster,
    Resource,
    Report,
}

/// Inbound event keyed by its channel. Payloads are kept exactly as received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "channel", content = "payload")]
pub enum ChannelEvent {
    #[serde(rename = "disaster-update")]
    DisasterUpdate(Value),
    #[serde(rename = "resource-update")]
    ResourceUpdate(Value),
    #[serde(rename = "report-update")]
    ReportUpdate(Value),
    #[serde(rename = "social_media_updated")]
    SocialMediaUpdated(Value),
}

impl ChannelEvent {
    pub fn new(channel: Channel, payload: Value) -> Self {
        match channel {
            Channel::DisasterUpdate => ChannelEvent::DisasterUpdate(payload),
            Channel::ResourceUpdate => ChannelEvent::ResourceUpdate(payload),
            Channel::ReportUpdate => ChannelEvent::ReportUpdate(payload),
            Channel::SocialMediaUpdated => ChannelEvent::SocialMediaUpdated(payload),
        }
    }

    pub fn channel(&self) -> Channel {
        match self {
            ChannelEvent::DisasterUpdate(_) => Channel::DisasterUpdate,
            ChannelEvent::ResourceUpdate(_) => Channel::ResourceUpdate,
            ChannelEvent::ReportUpdate(_) => Channel::ReportUpdate,
            ChannelEvent::SocialMediaUpdated(_) => Channel::SocialMediaUpdated,
        }
    }

    pub fn payload(&self) -> &Value {
        match self {
            ChannelEvent::DisasterUpdate(payload)
            | ChannelEvent::ResourceUpdate(payload)
            | ChannelEvent::ReportUpdate(payload)
            | ChannelEvent::SocialMediaUpdated(payload) => payload,
        }
    }
}

/// One received push notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: Uuid,
    #[serde(flatten)]
    pub event: ChannelEvent,
    pub received_at: DateTime<Utc>,
}

impl EventRecord {
    /// Stamps a fresh id and the current time onto an inbound event.
    pub fn receive(channel: Channel, payload: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            event: ChannelEvent::new(channel, payload),
            received_at: Utc::now(),
        }
    }

    pub fn channel(&self) -> Channel {
        self.event.channel()
    }

    pub fn payload(&self) -> &Value {
        self.event.payload()
    }

    pub fn received_local(&self) -> DateTime<Local> {
        self.received_at.with_timezone(&Local)
    }
}

// Object framing: {"channel": "...", "payload": ...}
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(alias = "event")]
    channel: String,
    #[serde(default, alias = "data")]
    payload: Value,
}

/// A text frame decoded far enough to route it. The channel name is not yet
/// checked against the table.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub channel: String,
    pub payload: Value,
}

impl InboundMessage {
    /// Accepts either `{"channel": name, "payload": data}` or `[name, data]`.
    pub fn parse(text: &str) -> Result<Self, FeedError> {
        match serde_json::from_str::<Value>(text)? {
            value @ Value::Object(_) => {
                let envelope: Envelope = serde_json::from_value(value)
                    .map_err(|e| FeedError::InvalidMessage(e.to_string()))?;
                Ok(Self {
                    channel: envelope.channel,
                    payload: envelope.payload,
                })
            }
            Value::Array(items) => {
                let mut items = items.into_iter();
                match items.next() {
                    Some(Value::String(channel)) => Ok(Self {
                        channel,
                        payload: items.next().unwrap_or(Value::Null),
                    }),
                    _ => Err(FeedError::InvalidMessage(
                        "array frame must start with a channel name".to_string(),
                    )),
                }
            }
            other => Err(FeedError::InvalidMessage(format!(
                "unsupported frame shape: {}",
                other.to_string().chars().take(40).collect::<String>()
            ))),
        }
    }

    pub fn channel(&self) -> Result<Channel, FeedError> {
        self.channel.parse()
    }
}

/// Bearer token presented when the transport connects.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Blank tokens count as no credential at all.
    pub fn from_optional(token: Option<String>) -> Option<Self> {
        token
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn channel_names_round_trip_through_from_str() {
        for channel in Channel::ALL {
            assert_eq!(channel.as_str().parse::<Channel>().unwrap(), channel);
        }
        assert!(matches!(
            "weather-update".parse::<Channel>(),
            Err(FeedError::UnknownChannel(name)) if name == "weather-update"
        ));
    }

    #[test]
    fn update_channels_map_to_entities() {
        assert_eq!(Channel::DisasterUpdate.entity(), Some(Entity::Disaster));
        assert_eq!(Channel::ResourceUpdate.entity(), Some(Entity::Resource));
        assert_eq!(Channel::ReportUpdate.entity(), Some(Entity::Report));
        assert_eq!(Channel::SocialMediaUpdated.entity(), None);
    }

    #[test]
    fn parses_envelope_frames() {
        let msg = InboundMessage::parse(r#"{"channel":"disaster-update","payload":{"id":7}}"#)
            .unwrap();
        assert_eq!(msg.channel().unwrap(), Channel::DisasterUpdate);
        assert_eq!(msg.payload, json!({"id": 7}));

        let aliased = InboundMessage::parse(r#"{"event":"report-update","data":[1,2]}"#).unwrap();
        assert_eq!(aliased.channel().unwrap(), Channel::ReportUpdate);
        assert_eq!(aliased.payload, json!([1, 2]));
    }

    #[test]
    fn missing_payload_becomes_null() {
        let msg = InboundMessage::parse(r#"{"channel":"social_media_updated"}"#).unwrap();
        assert_eq!(msg.payload, Value::Null);
    }

    #[test]
    fn parses_tuple_frames() {
        let msg = InboundMessage::parse(r#"["resource-update", {"id": 3}]"#).unwrap();
        assert_eq!(msg.channel, "resource-update");
        assert_eq!(msg.payload, json!({"id": 3}));

        let bare = InboundMessage::parse(r#"["disaster-update"]"#).unwrap();
        assert_eq!(bare.payload, Value::Null);
    }

    #[test]
    fn rejects_unroutable_frames() {
        assert!(matches!(
            InboundMessage::parse("not json"),
            Err(FeedError::SerdeError(_))
        ));
        assert!(matches!(
            InboundMessage::parse("42"),
            Err(FeedError::InvalidMessage(_))
        ));
        assert!(matches!(
            InboundMessage::parse("[1, 2]"),
            Err(FeedError::InvalidMessage(_))
        ));
        assert!(matches!(
            InboundMessage::parse(r#"{"payload": {}}"#),
            Err(FeedError::InvalidMessage(_))
        ));
    }

    #[test]
    fn record_serializes_with_channel_tag() {
        let record = EventRecord::receive(Channel::SocialMediaUpdated, json!({"posts": 2}));
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["channel"], "social_media_updated");
        assert_eq!(value["payload"], json!({"posts": 2}));
        assert_eq!(value["id"], record.id.to_string());
    }

    #[test]
    fn credential_debug_hides_token() {
        let credential = Credential::new("secret-token");
        assert_eq!(format!("{credential:?}"), "Credential(***)");
        assert_eq!(credential.bearer(), "Bearer secret-token");
    }

    #[test]
    fn blank_tokens_are_absent() {
        assert_eq!(Credential::from_optional(None), None);
        assert_eq!(Credential::from_optional(Some("   ".into())), None);
        assert_eq!(
            Credential::from_optional(Some(" abc ".into())),
            Some(Credential::new("abc"))
        );
    }
}
