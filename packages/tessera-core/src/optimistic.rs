//! Synchronous halves of every optimistic mutation.
//!
//! Each user action is split into an `apply_*`/`begin_*` step that changes the
//! mirror immediately and returns what must be sent to the server, and a
//! `confirm_*` or `fail_*` step that settles the outcome. The async driver in
//! [`crate::manager`] runs the REST call in between without holding the lock.

use crate::error::MutationError;
use crate::ids::{generate_temp_id, is_temp_id};
use crate::pending::{EntityKind, PendingCreate};
use crate::reindex;
use crate::session::BoardSession;
use crate::store::{RemovedCard, RemovedList};
use crate::types::{Board, BoardPatch, Card, CardPatch, List, ListPatch, MoveRequest, NewCard, NewList};

/// A card create waiting for its REST response.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingCreateCard {
    pub temp_id: String,
    pub list_id: String,
    /// Request body; carries the temp id as its `clientRef`.
    pub request: NewCard,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingCreateList {
    pub temp_id: String,
    pub board_id: String,
    pub request: NewList,
}

/// How a create response was folded into the mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    /// The placeholder was swapped for the canonical entity in place.
    Replaced,
    /// The push event had already inserted the entity; the placeholder was
    /// dropped and the response merged into the existing copy.
    Deduplicated,
    /// The push event had already replaced the placeholder; the response was
    /// merged into it.
    Merged,
    /// Another user's same-titled entity took over the placeholder; the
    /// response was appended to its parent as a separate entity.
    Inserted,
    /// Neither placeholder nor entity exists any more (deleted or hydrated
    /// away); the response was dropped.
    Discarded,
}

impl BoardSession {
    // ── Cards ───────────────────────────────────────────────────────────────

    pub fn begin_create_card(
        &mut self,
        list_id: &str,
        mut draft: NewCard,
    ) -> Result<PendingCreateCard, MutationError> {
        self.ensure_can_write()?;
        if is_temp_id(list_id) {
            return Err(MutationError::Pending(list_id.to_string()));
        }
        if !self.store.contains_list(list_id) {
            return Err(MutationError::UnknownParent(list_id.to_string()));
        }

        let temp_id = generate_temp_id();
        let provisional =
            self.store.max_card_position(list_id).unwrap_or(0) + self.config().placeholder_gap;
        self.store.push_card(Card {
            id: temp_id.clone(),
            list_id: list_id.to_string(),
            title: draft.title.clone(),
            description: draft.description.clone(),
            position: provisional,
            due_date: draft.due_date,
            is_completed: false,
            priority: draft.priority,
            color: draft.color.clone(),
            assignee_id: draft.assignee_id.clone(),
            comment_count: 0,
            attachment_count: 0,
        });
        let mut cards = self.store.list_cards(list_id);
        reindex::sort_by_position(&mut cards);
        self.store.replace_list_cards(list_id, cards);

        self.pending.register(PendingCreate {
            temp_id: temp_id.clone(),
            kind: EntityKind::Card,
            parent_id: list_id.to_string(),
            title: draft.title.clone(),
            resolved_id: None,
        });
        draft.client_ref = Some(temp_id.clone());
        log::debug!(
            "[tessera.optimistic] Placeholder {} for card '{}' in {}",
            temp_id,
            draft.title,
            list_id
        );
        Ok(PendingCreateCard {
            temp_id,
            list_id: list_id.to_string(),
            request: draft,
        })
    }

    pub fn confirm_create_card(&mut self, temp_id: &str, canonical: Card) -> Confirmation {
        let taken_by = self.settle_pending(temp_id, &canonical.id);
        let has_placeholder = self.store.contains_card(temp_id);
        let has_real = self.store.contains_card(&canonical.id);
        match (has_placeholder, has_real) {
            (true, false) => {
                self.store.replace_card(temp_id, canonical);
                Confirmation::Replaced
            }
            (true, true) => {
                self.store.remove_card(temp_id);
                self.confirm_card(&canonical);
                Confirmation::Deduplicated
            }
            (false, true) => {
                self.confirm_card(&canonical);
                Confirmation::Merged
            }
            (false, false) if taken_by.is_some() && self.store.contains_list(&canonical.list_id) => {
                let end = self.store.cards_in_list(&canonical.list_id).len() as i64;
                self.store.insert_card(canonical, end);
                Confirmation::Inserted
            }
            (false, false) => Confirmation::Discarded,
        }
    }

    /// Merge a canonical card returned by an update or move. Ordering stays
    /// with the local mirror; only content fields are taken.
    pub fn confirm_card(&mut self, canonical: &Card) -> bool {
        self.store
            .update_card(&canonical.id, |card| card.merge_content(canonical))
    }

    /// Apply a field patch locally and return the normalized patch to send.
    pub fn apply_update_card(
        &mut self,
        card_id: &str,
        patch: &CardPatch,
    ) -> Result<CardPatch, MutationError> {
        self.ensure_can_write()?;
        self.ensure_settled(card_id)?;
        let patch = patch.clone().normalized();
        if !self.store.update_card(card_id, |card| patch.apply_to(card)) {
            return Err(MutationError::UnknownEntity(card_id.to_string()));
        }
        Ok(patch)
    }

    pub fn apply_move_card(
        &mut self,
        card_id: &str,
        target_list_id: &str,
        index: i64,
    ) -> Result<MoveRequest, MutationError> {
        self.ensure_can_write()?;
        self.ensure_settled(card_id)?;
        self.ensure_settled(target_list_id)?;
        if !self.store.contains_card(card_id) {
            return Err(MutationError::UnknownEntity(card_id.to_string()));
        }
        if !self.store.contains_list(target_list_id) {
            return Err(MutationError::UnknownParent(target_list_id.to_string()));
        }
        let position = self
            .store
            .move_card(card_id, target_list_id, index)
            .ok_or_else(|| MutationError::UnknownEntity(card_id.to_string()))?;
        Ok(MoveRequest {
            parent_id: target_list_id.to_string(),
            position,
        })
    }

    pub fn apply_delete_card(&mut self, card_id: &str) -> Result<RemovedCard, MutationError> {
        self.ensure_can_write()?;
        self.ensure_settled(card_id)?;
        self.store
            .remove_card(card_id)
            .ok_or_else(|| MutationError::UnknownEntity(card_id.to_string()))
    }

    /// Undo a failed delete. A 404 means the card is gone on the server too,
    /// so nothing comes back; nor does it if a push event already restored it
    /// or removed its list.
    pub fn fail_delete_card(&mut self, removed: RemovedCard, error: &MutationError) -> bool {
        if error.is_not_found() {
            return false;
        }
        self.store.restore_card(removed)
    }

    // ── Lists ───────────────────────────────────────────────────────────────

    pub fn begin_create_list(&mut self, mut draft: NewList) -> Result<PendingCreateList, MutationError> {
        self.ensure_can_write()?;
        let board_id = self.board_id().to_string();
        let temp_id = generate_temp_id();
        let provisional = self.store.max_list_position().unwrap_or(0) + self.config().placeholder_gap;
        self.store.push_list(List {
            id: temp_id.clone(),
            board_id: board_id.clone(),
            title: draft.title.clone(),
            position: provisional,
            is_archived: false,
        });
        let mut lists = self.store.lists().to_vec();
        reindex::sort_by_position(&mut lists);
        self.store.replace_lists(lists);

        self.pending.register(PendingCreate {
            temp_id: temp_id.clone(),
            kind: EntityKind::List,
            parent_id: board_id.clone(),
            title: draft.title.clone(),
            resolved_id: None,
        });
        draft.client_ref = Some(temp_id.clone());
        log::debug!(
            "[tessera.optimistic] Placeholder {} for list '{}'",
            temp_id,
            draft.title
        );
        Ok(PendingCreateList {
            temp_id,
            board_id,
            request: draft,
        })
    }

    pub fn confirm_create_list(&mut self, temp_id: &str, canonical: List) -> Confirmation {
        let taken_by = self.settle_pending(temp_id, &canonical.id);
        let has_placeholder = self.store.contains_list(temp_id);
        let has_real = self.store.contains_list(&canonical.id);
        match (has_placeholder, has_real) {
            (true, false) => {
                self.store.replace_list(temp_id, canonical);
                Confirmation::Replaced
            }
            (true, true) => {
                self.store.remove_list(temp_id);
                self.confirm_list(&canonical);
                Confirmation::Deduplicated
            }
            (false, true) => {
                self.confirm_list(&canonical);
                Confirmation::Merged
            }
            (false, false) if taken_by.is_some() => {
                let end = self.store.lists().len() as i64;
                self.store.insert_list(canonical, end);
                Confirmation::Inserted
            }
            (false, false) => Confirmation::Discarded,
        }
    }

    pub fn confirm_list(&mut self, canonical: &List) -> bool {
        self.store
            .update_list(&canonical.id, |list| list.merge_content(canonical))
    }

    pub fn apply_update_list(&mut self, list_id: &str, patch: &ListPatch) -> Result<(), MutationError> {
        self.ensure_can_write()?;
        self.ensure_settled(list_id)?;
        if !self.store.update_list(list_id, |list| patch.apply_to(list)) {
            return Err(MutationError::UnknownEntity(list_id.to_string()));
        }
        Ok(())
    }

    pub fn apply_move_list(&mut self, list_id: &str, index: i64) -> Result<MoveRequest, MutationError> {
        self.ensure_can_write()?;
        self.ensure_settled(list_id)?;
        let position = self
            .store
            .move_list(list_id, index)
            .ok_or_else(|| MutationError::UnknownEntity(list_id.to_string()))?;
        Ok(MoveRequest {
            parent_id: self.board_id().to_string(),
            position,
        })
    }

    pub fn apply_delete_list(&mut self, list_id: &str) -> Result<RemovedList, MutationError> {
        self.ensure_can_write()?;
        self.ensure_settled(list_id)?;
        self.store
            .remove_list(list_id)
            .ok_or_else(|| MutationError::UnknownEntity(list_id.to_string()))
    }

    pub fn fail_delete_list(&mut self, removed: RemovedList, error: &MutationError) -> bool {
        if error.is_not_found() {
            return false;
        }
        self.store.restore_list(removed)
    }

    // ── Shared ──────────────────────────────────────────────────────────────

    /// Drop the placeholder of a failed create. The mirror ends up exactly as
    /// it was before the create began.
    pub fn fail_create(&mut self, temp_id: &str) -> bool {
        let removed = match self.pending.take(temp_id).map(|p| p.kind) {
            Some(EntityKind::List) => self.store.remove_list(temp_id).is_some(),
            Some(EntityKind::Card) => self.store.remove_card(temp_id).is_some(),
            None => {
                self.store.remove_card(temp_id).is_some() || self.store.remove_list(temp_id).is_some()
            }
        };
        if removed {
            log::debug!("[tessera.optimistic] Rolled back placeholder {}", temp_id);
        }
        removed
    }

    pub fn apply_update_board(&mut self, patch: &BoardPatch) -> Result<(), MutationError> {
        self.ensure_can_manage()?;
        self.store.update_board(patch);
        Ok(())
    }

    /// Take the canonical board. Responses that omit the member list keep the
    /// mirrored one.
    pub fn confirm_board(&mut self, mut canonical: Board) -> bool {
        if canonical.id != self.board_id() {
            return false;
        }
        if canonical.members.is_empty() {
            canonical.members = self.store.board().members.clone();
        }
        self.store.set_board(canonical);
        true
    }

    /// Drop the pending entry for `temp_id`. Returns the id of the entity
    /// that took over the placeholder when it is not `real_id`.
    fn settle_pending(&mut self, temp_id: &str, real_id: &str) -> Option<String> {
        let Some(entry) = self.pending.take(temp_id) else {
            log::debug!(
                "[tessera.optimistic] Late confirmation for {} from an earlier epoch",
                temp_id
            );
            return None;
        };
        let other = entry.resolved_id.filter(|id| id != real_id)?;
        log::warn!(
            "[tessera.optimistic] Placeholder {} was taken by {}; keeping {} separately",
            temp_id,
            other,
            real_id
        );
        Some(other)
    }

    /// Placeholders cannot be edited, moved or deleted until confirmed.
    fn ensure_settled(&self, id: &str) -> Result<(), MutationError> {
        if is_temp_id(id) {
            Err(MutationError::Pending(id.to_string()))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::error::ApiError;
    use crate::store::tests::{card, ids, list, snapshot};

    fn session() -> BoardSession {
        BoardSession::from_snapshot(snapshot(), "u1", SessionConfig::default())
    }

    #[test]
    fn test_placeholder_appended_and_contiguous() {
        let mut session = session();
        let pending = session
            .begin_create_card("l1", NewCard::titled("New task"))
            .unwrap();

        assert!(is_temp_id(&pending.temp_id));
        assert_eq!(pending.request.client_ref.as_deref(), Some(pending.temp_id.as_str()));
        assert_eq!(
            ids(session.store(), "l1"),
            vec!["a", "b", "c", pending.temp_id.as_str()]
        );
        assert_eq!(session.store().card(&pending.temp_id).unwrap().position, 3);
        assert!(session.store().ordering_is_contiguous());
        assert_eq!(session.pending().len(), 1);
    }

    #[test]
    fn test_failed_create_restores_exact_state() {
        let mut session = session();
        let before = session.store().clone();

        let card_create = session.begin_create_card("l2", NewCard::titled("Doomed")).unwrap();
        let list_create = session.begin_create_list(NewList::titled("Doomed list")).unwrap();
        assert!(session.fail_create(&card_create.temp_id));
        assert!(session.fail_create(&list_create.temp_id));

        assert_eq!(session.store(), &before);
        assert!(session.pending().is_empty());
    }

    #[test]
    fn test_confirm_replaces_placeholder_in_place() {
        let mut session = session();
        let pending = session.begin_create_card("l1", NewCard::titled("Task")).unwrap();

        let mut canonical = card("c9", "l1", 17);
        canonical.title = "Task".into();
        assert_eq!(
            session.confirm_create_card(&pending.temp_id, canonical),
            Confirmation::Replaced
        );
        assert_eq!(ids(session.store(), "l1"), vec!["a", "b", "c", "c9"]);
        assert_eq!(session.store().card("c9").unwrap().position, 3);
        assert!(session.pending().is_empty());
    }

    #[test]
    fn test_confirm_after_push_insert_deduplicates() {
        let mut session = session();
        let pending = session.begin_create_card("l1", NewCard::titled("Task")).unwrap();
        // A push event carrying no clientRef landed as a separate card.
        session.store.insert_card(card("c9", "l1", 0), 99);

        assert_eq!(
            session.confirm_create_card(&pending.temp_id, card("c9", "l1", 4)),
            Confirmation::Deduplicated
        );
        assert_eq!(ids(session.store(), "l1"), vec!["a", "b", "c", "c9"]);
        assert!(session.store().ordering_is_contiguous());
    }

    #[test]
    fn test_confirm_after_hydrate_is_discarded() {
        let mut session = session();
        let pending = session.begin_create_card("l1", NewCard::titled("Task")).unwrap();
        session.hydrate(snapshot());

        assert_eq!(
            session.confirm_create_card(&pending.temp_id, card("c9", "l1", 3)),
            Confirmation::Discarded
        );
        assert!(session.store().card("c9").is_none());
        assert_eq!(ids(session.store(), "l1"), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_placeholder_cannot_be_edited_or_parent_new_cards() {
        let mut session = session();
        let list_create = session.begin_create_list(NewList::titled("Fresh")).unwrap();
        let card_create = session.begin_create_card("l1", NewCard::titled("Fresh")).unwrap();

        assert_eq!(
            session.begin_create_card(&list_create.temp_id, NewCard::titled("x")),
            Err(MutationError::Pending(list_create.temp_id.clone()))
        );
        assert_eq!(
            session.apply_update_card(&card_create.temp_id, &CardPatch::default()),
            Err(MutationError::Pending(card_create.temp_id.clone()))
        );
        assert!(matches!(
            session.apply_move_card("a", &list_create.temp_id, 0),
            Err(MutationError::Pending(_))
        ));
    }

    #[test]
    fn test_move_returns_server_request() {
        let mut session = session();
        let request = session.apply_move_card("a", "l1", 2).unwrap();
        assert_eq!(
            request,
            MoveRequest {
                parent_id: "l1".into(),
                position: 2
            }
        );
        assert_eq!(ids(session.store(), "l1"), vec!["b", "c", "a"]);

        let request = session.apply_move_list("l2", 0).unwrap();
        assert_eq!(request.parent_id, "b1");
        assert_eq!(request.position, 0);
        assert_eq!(session.store().lists()[0].id, "l2");
    }

    #[test]
    fn test_update_normalizes_legacy_completion() {
        let mut session = session();
        let patch = CardPatch {
            completed: Some(true),
            ..CardPatch::default()
        };
        let sent = session.apply_update_card("b", &patch).unwrap();
        assert_eq!(sent.is_completed, Some(true));
        assert_eq!(sent.completed, None);
        assert!(session.store().card("b").unwrap().is_completed);
    }

    #[test]
    fn test_delete_failure_restores_unless_not_found() {
        let mut session = session();
        let before = session.store().clone();

        let removed = session.apply_delete_card("b").unwrap();
        let denied: MutationError = ApiError::PermissionDenied("card b".into()).into();
        assert!(session.fail_delete_card(removed, &denied));
        assert_eq!(session.store(), &before);

        let removed = session.apply_delete_list("l1").unwrap();
        let missing: MutationError = ApiError::NotFound("list l1".into()).into();
        assert!(!session.fail_delete_list(removed, &missing));
        assert!(session.store().list("l1").is_none());
    }

    #[test]
    fn test_viewer_refused_before_local_change() {
        let mut session = BoardSession::from_snapshot(snapshot(), "u3", SessionConfig::default());
        let before = session.store().clone();

        let err = session.begin_create_card("l1", NewCard::titled("Nope")).unwrap_err();
        assert!(err.is_permission_denied());
        assert!(session.apply_delete_card("a").unwrap_err().is_permission_denied());
        assert!(session.apply_update_board(&BoardPatch::default()).is_err());
        assert_eq!(session.store(), &before);
    }

    #[test]
    fn test_confirm_board_keeps_members_when_omitted() {
        let mut session = session();
        let mut board = session.store().board().clone();
        board.title = "Renamed".into();
        board.members.clear();
        assert!(session.confirm_board(board));
        assert_eq!(session.store().board().title, "Renamed");
        assert_eq!(session.store().board().members.len(), 2);

        let mut other = session.store().board().clone();
        other.id = "b2".into();
        assert!(!session.confirm_board(other));
    }

    #[test]
    fn test_confirm_list_keeps_local_position() {
        let mut session = session();
        session.apply_move_list("l2", 0).unwrap();
        let mut canonical = list("l2", 1);
        canonical.title = "Done".into();
        assert!(session.confirm_list(&canonical));
        let l2 = session.store().list("l2").unwrap();
        assert_eq!(l2.title, "Done");
        assert_eq!(l2.position, 0);
    }
}
