//! State synchronization wire protocol.
//!
//! Every message is a JSON envelope `{"event": <name>, "data": <object>}`.
//! A newly attached observer receives one `initial_state` followed by
//! single-entity deltas. Decoding also accepts the legacy
//! `{"type": <name>, "payload": <object>}` envelope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::bot::BotStatus;
use crate::domain::log::SystemLog;
use crate::domain::order::Order;
use crate::domain::position::{PositionKey, PositionSnapshot};
use crate::domain::shared::OrderId;

/// Protocol decoding errors.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Envelope names an event this protocol does not define.
    #[error("unknown event: {0}")]
    UnknownEvent(String),

    /// Envelope has no `data` (or `payload`) member.
    #[error("event {0} carries no data")]
    MissingData(String),

    /// Malformed JSON or payload shape.
    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),
}

/// Full state handed to an observer on attach.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
    /// Every known position.
    #[serde(default)]
    pub positions: Vec<PositionSnapshot>,
    /// Working orders.
    #[serde(default)]
    pub orders: Vec<Order>,
    /// Bot statuses keyed by bot name.
    #[serde(default)]
    pub bot_statuses: BTreeMap<String, BotStatus>,
}

/// Liveness marker of a heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeartbeatStatus {
    /// Service is alive.
    #[serde(rename = "OK")]
    Ok,
}

/// Periodic liveness message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heartbeat {
    /// Emitting service.
    pub service: String,
    /// Emission time.
    pub timestamp: DateTime<Utc>,
    /// Always `OK`.
    pub status: HeartbeatStatus,
}

impl Heartbeat {
    /// Heartbeat stamped now.
    #[must_use]
    pub fn now(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            timestamp: Utc::now(),
            status: HeartbeatStatus::Ok,
        }
    }
}

/// One message of the observer stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum SyncMessage {
    /// Full state, first message after attach.
    InitialState(StateSnapshot),
    /// One position changed.
    PositionUpdate(PositionSnapshot),
    /// One order changed.
    OrderUpdate(Order),
    /// One system log line.
    LogMessage(SystemLog),
    /// One bot changed lifecycle state.
    BotStatusUpdate(BotStatus),
    /// Liveness.
    Heartbeat(Heartbeat),
}

/// Identity a delta updates; later deltas of the same key supersede earlier ones.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SyncKey {
    /// Position (symbol, bot).
    Position(PositionKey),
    /// Order id.
    Order(OrderId),
    /// Bot name.
    Bot(String),
    /// The single heartbeat slot.
    Heartbeat,
}

impl SyncMessage {
    /// Wire name of the event.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::InitialState(_) => "initial_state",
            Self::PositionUpdate(_) => "position_update",
            Self::OrderUpdate(_) => "order_update",
            Self::LogMessage(_) => "log_message",
            Self::BotStatusUpdate(_) => "bot_status_update",
            Self::Heartbeat(_) => "heartbeat",
        }
    }

    /// Key for last-value-wins replacement. Snapshots and log lines have none.
    #[must_use]
    pub fn key(&self) -> Option<SyncKey> {
        match self {
            Self::PositionUpdate(p) => Some(SyncKey::Position(p.key())),
            Self::OrderUpdate(o) => Some(SyncKey::Order(o.id().clone())),
            Self::BotStatusUpdate(b) => Some(SyncKey::Bot(b.name.clone())),
            Self::Heartbeat(_) => Some(SyncKey::Heartbeat),
            Self::InitialState(_) | Self::LogMessage(_) => None,
        }
    }

    /// Serialize to the `{event, data}` envelope.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse either envelope form.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let raw: RawEnvelope = serde_json::from_str(text)?;
        let data = raw
            .data
            .ok_or_else(|| ProtocolError::MissingData(raw.event.clone()))?;

        let message = match raw.event.as_str() {
            "initial_state" => Self::InitialState(serde_json::from_value(data)?),
            "position_update" => Self::PositionUpdate(serde_json::from_value(data)?),
            "order_update" => Self::OrderUpdate(serde_json::from_value(data)?),
            "log_message" => Self::LogMessage(serde_json::from_value(data)?),
            "bot_status_update" => Self::BotStatusUpdate(serde_json::from_value(data)?),
            "heartbeat" => Self::Heartbeat(serde_json::from_value(data)?),
            _ => return Err(ProtocolError::UnknownEvent(raw.event)),
        };
        Ok(message)
    }
}

#[derive(Deserialize)]
struct RawEnvelope {
    #[serde(alias = "type")]
    event: String,
    #[serde(default, alias = "payload")]
    data: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::bot::{BotState, StrategyDescriptor};
    use crate::domain::log::LogLevel;

    #[test]
    fn encodes_event_data_envelope() {
        let message = SyncMessage::Heartbeat(Heartbeat::now("bot-engine"));
        let json: serde_json::Value = serde_json::from_str(&message.encode().unwrap()).unwrap();

        assert_eq!(json["event"], "heartbeat");
        assert_eq!(json["data"]["service"], "bot-engine");
        assert_eq!(json["data"]["status"], "OK");
    }

    #[test]
    fn snapshot_uses_camel_case_bot_statuses() {
        let mut snapshot = StateSnapshot::default();
        snapshot.bot_statuses.insert(
            "bot-crypto".into(),
            BotStatus::new(
                "bot-crypto",
                BotState::Running,
                StrategyDescriptor::new("Manual", "BTC/USD"),
            ),
        );
        let json = serde_json::to_value(SyncMessage::InitialState(snapshot)).unwrap();

        assert_eq!(json["event"], "initial_state");
        assert_eq!(json["data"]["botStatuses"]["bot-crypto"]["status"], "Running");
    }

    #[test]
    fn decodes_legacy_type_payload_envelope() {
        let text = r#"{"type":"log_message","payload":{"timestamp":"2024-01-01T00:00:00Z","level":"CMD","service":"bot-crypto","message":"start"}}"#;
        let SyncMessage::LogMessage(log) = SyncMessage::decode(text).unwrap() else {
            panic!("expected log message");
        };
        assert_eq!(log.level, LogLevel::Cmd);
        assert_eq!(log.message, "start");
    }

    #[test]
    fn decode_round_trips_encode() {
        let message = SyncMessage::BotStatusUpdate(BotStatus::new(
            "bot-crypto",
            BotState::Stopped,
            StrategyDescriptor::new("Manual", "BTC/USD"),
        ));
        assert_eq!(SyncMessage::decode(&message.encode().unwrap()).unwrap(), message);
    }

    #[test]
    fn decode_rejects_unknown_event() {
        let err = SyncMessage::decode(r#"{"event":"bogus","data":{}}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownEvent(name) if name == "bogus"));
    }

    #[test]
    fn decode_requires_data() {
        let err = SyncMessage::decode(r#"{"event":"heartbeat"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::MissingData(_)));
    }

    #[test]
    fn keys_identify_entities() {
        let heartbeat = SyncMessage::Heartbeat(Heartbeat::now("x"));
        assert_eq!(heartbeat.key(), Some(SyncKey::Heartbeat));

        let log = SyncMessage::LogMessage(SystemLog::new(LogLevel::Info, "x", "y"));
        assert_eq!(log.key(), None);
        assert_eq!(log.event_name(), "log_message");
    }
}
