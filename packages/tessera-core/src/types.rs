use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Role of a user on a board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Owner,
    Admin,
    Member,
    Viewer,
}

impl Role {
    /// Lists and cards may be created, edited, moved and deleted.
    pub fn can_write(self) -> bool {
        !matches!(self, Role::Viewer)
    }

    /// Board settings may be edited.
    pub fn can_manage(self) -> bool {
        matches!(self, Role::Owner | Role::Admin)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    #[serde(default)]
    pub board_id: String,
    pub user_id: String,
    pub role: Role,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Board {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<String>,
    #[serde(default)]
    pub is_private: bool,
    #[serde(default)]
    pub owner_id: String,
    #[serde(default)]
    pub members: Vec<Member>,
    #[serde(default)]
    pub is_archived: bool,
}

impl Board {
    pub fn member(&self, user_id: &str) -> Option<&Member> {
        self.members.iter().find(|m| m.user_id == user_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct List {
    pub id: String,
    pub board_id: String,
    pub title: String,
    #[serde(default)]
    pub position: i64,
    #[serde(default)]
    pub is_archived: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "CardWire")]
pub struct Card {
    pub id: String,
    pub list_id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub position: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    pub is_completed: bool,
    pub priority: Priority,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee_id: Option<String>,
    pub comment_count: u32,
    pub attachment_count: u32,
}

/// Card as it arrives on the wire. Completion may come under `isCompleted`,
/// the legacy `completed`, or both; the canonical name wins.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CardWire {
    id: String,
    list_id: String,
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    position: i64,
    #[serde(default)]
    due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    is_completed: Option<bool>,
    #[serde(default)]
    completed: Option<bool>,
    #[serde(default)]
    priority: Priority,
    #[serde(default)]
    color: Option<String>,
    #[serde(default)]
    assignee_id: Option<String>,
    #[serde(default)]
    comment_count: u32,
    #[serde(default)]
    attachment_count: u32,
}

impl From<CardWire> for Card {
    fn from(wire: CardWire) -> Self {
        Self {
            id: wire.id,
            list_id: wire.list_id,
            title: wire.title,
            description: wire.description,
            position: wire.position,
            due_date: wire.due_date,
            is_completed: wire.is_completed.or(wire.completed).unwrap_or(false),
            priority: wire.priority,
            color: wire.color,
            assignee_id: wire.assignee_id,
            comment_count: wire.comment_count,
            attachment_count: wire.attachment_count,
        }
    }
}

/// Canonical board contents as returned by a full fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardSnapshot {
    pub board: Board,
    #[serde(default)]
    pub lists: Vec<List>,
    #[serde(default)]
    pub cards: Vec<Card>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub card_id: String,
    #[serde(default)]
    pub author_id: String,
    #[serde(default)]
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: String,
    pub board_id: String,
    #[serde(default)]
    pub user_id: String,
    pub action: String,
    pub created_at: DateTime<Utc>,
}

// ── Requests ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewList {
    pub title: String,
    /// Temporary id of the placeholder, carried as an idempotency key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_ref: Option<String>,
}

impl NewList {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            client_ref: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCard {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_ref: Option<String>,
}

impl NewCard {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }
}

/// Body of the dedicated move endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveRequest {
    pub parent_id: String,
    pub position: i64,
}

// ── Patches ─────────────────────────────────────────────────────────────────
//
// `None` leaves a field untouched. Nullable fields use `Option<Option<T>>`
// so an explicit JSON `null` clears the value.

fn nullable<'de, D, T>(d: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(d).map(Some)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub color: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub theme: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub background: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_private: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_archived: Option<bool>,
}

impl BoardPatch {
    pub fn apply_to(&self, board: &mut Board) {
        if let Some(title) = &self.title {
            board.title = title.clone();
        }
        if let Some(description) = &self.description {
            board.description = description.clone();
        }
        if let Some(color) = &self.color {
            board.color = color.clone();
        }
        if let Some(theme) = &self.theme {
            board.theme = theme.clone();
        }
        if let Some(background) = &self.background {
            board.background = background.clone();
        }
        if let Some(is_private) = self.is_private {
            board.is_private = is_private;
        }
        if let Some(is_archived) = self.is_archived {
            board.is_archived = is_archived;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_archived: Option<bool>,
}

impl ListPatch {
    pub fn apply_to(&self, list: &mut List) {
        if let Some(title) = &self.title {
            list.title = title.clone();
        }
        if let Some(is_archived) = self.is_archived {
            list.is_archived = is_archived;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub due_date: Option<Option<DateTime<Utc>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_completed: Option<bool>,
    /// Older servers send the completion flag as `completed`.
    #[serde(default, skip_serializing)]
    pub completed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub color: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub assignee_id: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment_count: Option<u32>,
}

impl CardPatch {
    /// Completion flag under its canonical name; `isCompleted` wins over `completed`.
    pub fn completion(&self) -> Option<bool> {
        self.is_completed.or(self.completed)
    }

    /// Fold the legacy completion field into the canonical one.
    pub fn normalized(mut self) -> Self {
        self.is_completed = self.completion();
        self.completed = None;
        self
    }

    pub fn apply_to(&self, card: &mut Card) {
        if let Some(title) = &self.title {
            card.title = title.clone();
        }
        if let Some(description) = &self.description {
            card.description = description.clone();
        }
        if let Some(due_date) = self.due_date {
            card.due_date = due_date;
        }
        if let Some(done) = self.completion() {
            card.is_completed = done;
        }
        if let Some(priority) = self.priority {
            card.priority = priority;
        }
        if let Some(color) = &self.color {
            card.color = color.clone();
        }
        if let Some(assignee_id) = &self.assignee_id {
            card.assignee_id = assignee_id.clone();
        }
        if let Some(count) = self.comment_count {
            card.comment_count = count;
        }
        if let Some(count) = self.attachment_count {
            card.attachment_count = count;
        }
    }
}

impl Card {
    /// Overwrite the content fields with a canonical copy, leaving
    /// `list_id` and `position` to the ordering logic.
    pub fn merge_content(&mut self, canonical: &Card) {
        let (list_id, position) = (std::mem::take(&mut self.list_id), self.position);
        *self = Card {
            list_id,
            position,
            ..canonical.clone()
        };
    }
}

impl List {
    /// Same as [`Card::merge_content`], keeping the local `position`.
    pub fn merge_content(&mut self, canonical: &List) {
        let position = self.position;
        *self = List {
            position,
            ..canonical.clone()
        };
    }
}
