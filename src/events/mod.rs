//! Room event payloads exchanged over the broadcast broker.
//!
//! Every payload travels under the fixed `transcribe-event` tag on the
//! room's channel. The `kind` field discriminates live captions from the
//! summary-ready announcement published at meeting close.

use serde::{Deserialize, Serialize};

/// Broker event tag shared by all room payloads.
pub const TRANSCRIBE_EVENT: &str = "transcribe-event";

/// One recognized utterance, immutable once published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEvent {
    pub room: String,
    /// Display label shown next to the caption (the speaker's name).
    pub sender: String,
    #[serde(rename = "senderId")]
    pub sender_id: String,
    pub message: String,
    #[serde(rename = "isFinal")]
    pub is_final: bool,
}

/// Meeting-summary announcement carrying the retrieval link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryNotice {
    pub room: String,
    pub url: String,
}

/// Payload of a `transcribe-event`, discriminated by `kind`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RoomEvent {
    Caption(TranscriptEvent),
    SummaryReady(SummaryNotice),
}

impl RoomEvent {
    /// Channel the event belongs to (the room name).
    pub fn room(&self) -> &str {
        match self {
            Self::Caption(event) => &event.room,
            Self::SummaryReady(notice) => &notice.room,
        }
    }

    /// Interim recognition results are never relayed into the caption
    /// pipeline; announcements are always final.
    pub fn is_final(&self) -> bool {
        match self {
            Self::Caption(event) => event.is_final,
            Self::SummaryReady(_) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caption() -> TranscriptEvent {
        TranscriptEvent {
            room: "team-sync".to_string(),
            sender: "A".to_string(),
            sender_id: "u1".to_string(),
            message: "hello".to_string(),
            is_final: true,
        }
    }

    #[test]
    fn test_caption_wire_field_names() {
        let json = serde_json::to_string(&RoomEvent::Caption(caption())).unwrap();
        assert!(json.contains("\"kind\":\"caption\""));
        assert!(json.contains("\"senderId\":\"u1\""));
        assert!(json.contains("\"isFinal\":true"));
    }

    #[test]
    fn test_summary_ready_round_trip() {
        let event = RoomEvent::SummaryReady(SummaryNotice {
            room: "team-sync".to_string(),
            url: "https://objects.example/summary".to_string(),
        });

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"kind\":\"summary_ready\""));

        let parsed: RoomEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
        assert!(parsed.is_final());
    }

    #[test]
    fn test_room_accessor() {
        assert_eq!(RoomEvent::Caption(caption()).room(), "team-sync");
    }

    #[test]
    fn test_interim_caption_is_not_final() {
        let mut event = caption();
        event.is_final = false;
        assert!(!RoomEvent::Caption(event).is_final());
    }
}
