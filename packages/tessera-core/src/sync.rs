//! Push-channel message types.
//!
//! Inbound events arrive as `{"event": "<kind>", "data": {...}}` in one room
//! per board. Outbound signals are sent as `{"type": "<kind>", ...}`.

use serde::{Deserialize, Serialize};

use crate::types::{Activity, BoardPatch, Card, CardPatch, Comment, List, ListPatch, Member};

/// Messages sent from this client into the board room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OutboundSignal {
    #[serde(rename_all = "camelCase")]
    JoinBoard { board_id: String },
    #[serde(rename_all = "camelCase")]
    LeaveBoard { board_id: String },
    #[serde(rename_all = "camelCase")]
    TypingStart { board_id: String, card_id: String },
    #[serde(rename_all = "camelCase")]
    TypingStop { board_id: String, card_id: String },
}

/// Messages delivered by the push channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum InboundEvent {
    BoardUpdated(BoardChange),
    ListCreated(Created<List>),
    ListUpdated(ListChange),
    ListDeleted(EntityRef),
    CardCreated(Created<Card>),
    CardUpdated(CardChange),
    CardMoved(CardMove),
    CardDeleted(EntityRef),
    CommentCreated(Comment),
    CommentUpdated(Comment),
    CommentDeleted(CommentRef),
    PresenceUpdated(Presence),
    TypingStarted(Typing),
    TypingStopped(Typing),
    ActivityCreated(Activity),
    MemberAdded(Member),
    MemberRemoved(MemberRef),
    BoardDeleted(BoardRef),
    /// Sent to a single user whose membership was revoked.
    RemovedFromBoard(BoardRef),
}

impl InboundEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            InboundEvent::BoardUpdated(_) => "boardUpdated",
            InboundEvent::ListCreated(_) => "listCreated",
            InboundEvent::ListUpdated(_) => "listUpdated",
            InboundEvent::ListDeleted(_) => "listDeleted",
            InboundEvent::CardCreated(_) => "cardCreated",
            InboundEvent::CardUpdated(_) => "cardUpdated",
            InboundEvent::CardMoved(_) => "cardMoved",
            InboundEvent::CardDeleted(_) => "cardDeleted",
            InboundEvent::CommentCreated(_) => "commentCreated",
            InboundEvent::CommentUpdated(_) => "commentUpdated",
            InboundEvent::CommentDeleted(_) => "commentDeleted",
            InboundEvent::PresenceUpdated(_) => "presenceUpdated",
            InboundEvent::TypingStarted(_) => "typingStarted",
            InboundEvent::TypingStopped(_) => "typingStopped",
            InboundEvent::ActivityCreated(_) => "activityCreated",
            InboundEvent::MemberAdded(_) => "memberAdded",
            InboundEvent::MemberRemoved(_) => "memberRemoved",
            InboundEvent::BoardDeleted(_) => "boardDeleted",
            InboundEvent::RemovedFromBoard(_) => "removedFromBoard",
        }
    }
}

/// A newly created entity, optionally echoing the creator's idempotency key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Created<T> {
    #[serde(flatten)]
    pub entity: T,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_ref: Option<String>,
}

impl<T> Created<T> {
    pub fn new(entity: T) -> Self {
        Self {
            entity,
            client_ref: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardChange {
    pub id: String,
    #[serde(flatten)]
    pub patch: BoardPatch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListChange {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub board_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<i64>,
    #[serde(flatten)]
    pub patch: ListPatch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardChange {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub board_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<i64>,
    #[serde(flatten)]
    pub patch: CardPatch,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardMove {
    pub id: String,
    pub list_id: String,
    pub position: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub board_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityRef {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentRef {
    pub id: String,
    pub card_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Presence {
    pub board_id: String,
    #[serde(default)]
    pub user_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Typing {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub board_id: Option<String>,
    pub card_id: String,
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberRef {
    pub board_id: String,
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardRef {
    pub board_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_card_created_with_client_ref() {
        let json = r#"{"event":"cardCreated","data":{"id":"c9","listId":"l1","title":"Write tests","position":4,"clientRef":"tmp-00ff"}}"#;
        let event: InboundEvent = serde_json::from_str(json).unwrap();
        match event {
            InboundEvent::CardCreated(created) => {
                assert_eq!(created.entity.id, "c9");
                assert_eq!(created.entity.position, 4);
                assert_eq!(created.client_ref.as_deref(), Some("tmp-00ff"));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_parse_card_updated_legacy_completion() {
        let json = r#"{"event":"cardUpdated","data":{"id":"c1","completed":true,"listId":"l2"}}"#;
        let event: InboundEvent = serde_json::from_str(json).unwrap();
        let InboundEvent::CardUpdated(change) = event else {
            panic!("expected cardUpdated");
        };
        assert_eq!(change.patch.completion(), Some(true));
        assert_eq!(change.list_id.as_deref(), Some("l2"));
        assert_eq!(change.patch.title, None);
    }

    #[test]
    fn test_parse_presence_and_typing() {
        let presence: InboundEvent = serde_json::from_str(
            r#"{"event":"presenceUpdated","data":{"boardId":"b1","userIds":["u1","u2"]}}"#,
        )
        .unwrap();
        assert_eq!(presence.kind(), "presenceUpdated");

        let typing: InboundEvent = serde_json::from_str(
            r#"{"event":"typingStarted","data":{"cardId":"c1","userId":"u2"}}"#,
        )
        .unwrap();
        assert_eq!(
            typing,
            InboundEvent::TypingStarted(Typing {
                board_id: None,
                card_id: "c1".into(),
                user_id: "u2".into(),
            })
        );
    }

    #[test]
    fn test_unknown_event_is_rejected() {
        let result = serde_json::from_str::<InboundEvent>(r#"{"event":"cardExploded","data":{}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_outbound_signal_wire_format() {
        let signal = OutboundSignal::TypingStart {
            board_id: "b1".into(),
            card_id: "c1".into(),
        };
        assert_eq!(
            serde_json::to_value(&signal).unwrap(),
            serde_json::json!({"type": "typingStart", "boardId": "b1", "cardId": "c1"})
        );
    }
}
