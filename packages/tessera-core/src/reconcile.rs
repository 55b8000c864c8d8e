//! Folding push-channel events into the local mirror.
//!
//! Every handler is idempotent: an event describing state the mirror already
//! has (typically the echo of a local mutation) changes nothing. Creates first
//! try to replace a local placeholder, by `clientRef` when the server echoes
//! one and otherwise by parent and title.

use crate::pending::EntityKind;
use crate::presence;
use crate::session::{BoardSession, ExitReason};
use crate::sync::{
    BoardChange, BoardRef, CardChange, CardMove, CommentRef, Created, EntityRef, InboundEvent,
    ListChange, MemberRef, Presence, Typing,
};
use crate::types::{Activity, Card, Comment, List, Member};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciled {
    /// The mirror changed.
    Applied,
    /// Duplicate, stale, or addressed to another board.
    Ignored,
    /// A push event arrived before the REST response and took over the
    /// placeholder's slot.
    ReplacedPlaceholder { temp_id: String, real_id: String },
    /// The session is over; the caller should stop driving it.
    SessionEnded(ExitReason),
}

impl BoardSession {
    pub fn apply_event(&mut self, event: InboundEvent) -> Reconciled {
        apply_event(self, event)
    }
}

pub fn apply_event(session: &mut BoardSession, event: InboundEvent) -> Reconciled {
    if session.is_closed() {
        return Reconciled::Ignored;
    }
    let kind = event.kind();
    let outcome = match event {
        InboundEvent::BoardUpdated(change) => board_updated(session, change),
        InboundEvent::ListCreated(created) => list_created(session, created),
        InboundEvent::ListUpdated(change) => list_updated(session, change),
        InboundEvent::ListDeleted(EntityRef { id }) => applied(session.store.remove_list(&id).is_some()),
        InboundEvent::CardCreated(created) => card_created(session, created),
        InboundEvent::CardUpdated(change) => card_updated(session, change),
        InboundEvent::CardMoved(mv) => card_moved(session, mv),
        InboundEvent::CardDeleted(EntityRef { id }) => applied(session.store.remove_card(&id).is_some()),
        InboundEvent::CommentCreated(comment) => comment_created(session, comment),
        // Comment bodies are not mirrored.
        InboundEvent::CommentUpdated(_) => Reconciled::Ignored,
        InboundEvent::CommentDeleted(comment) => comment_deleted(session, comment),
        InboundEvent::PresenceUpdated(presence) => presence_updated(session, presence),
        InboundEvent::TypingStarted(typing) => typing_changed(session, typing, true),
        InboundEvent::TypingStopped(typing) => typing_changed(session, typing, false),
        InboundEvent::ActivityCreated(activity) => activity_created(session, activity),
        InboundEvent::MemberAdded(member) => member_added(session, member),
        InboundEvent::MemberRemoved(member) => member_removed(session, member),
        InboundEvent::BoardDeleted(board) => {
            end_session(session, board, ExitReason::BoardDeleted)
        }
        InboundEvent::RemovedFromBoard(board) => {
            end_session(session, board, ExitReason::RemovedFromBoard)
        }
    };
    log::debug!("[tessera.reconcile] {} -> {:?}", kind, outcome);
    outcome
}

fn applied(changed: bool) -> Reconciled {
    if changed {
        Reconciled::Applied
    } else {
        Reconciled::Ignored
    }
}

fn other_board(session: &BoardSession, board_id: Option<&str>) -> bool {
    board_id.is_some_and(|id| !id.is_empty() && id != session.board_id())
}

/// Placeholder an incoming create should replace. An echoed `clientRef` that
/// is not ours means another client created the entity, so the title
/// heuristic only runs when the server sent no reference at all.
fn placeholder_for(
    session: &BoardSession,
    kind: EntityKind,
    client_ref: Option<&str>,
    parent_id: &str,
    title: &str,
) -> Option<String> {
    let entry = match client_ref {
        Some(client_ref) => session.pending.match_client_ref(kind, client_ref),
        None => session.pending.match_title(kind, parent_id, title),
    }?;
    let present = match kind {
        EntityKind::List => session.store.contains_list(&entry.temp_id),
        EntityKind::Card => session.store.contains_card(&entry.temp_id),
    };
    present.then(|| entry.temp_id.clone())
}

// ── Board ───────────────────────────────────────────────────────────────────

fn board_updated(session: &mut BoardSession, change: BoardChange) -> Reconciled {
    if change.id != session.board_id() {
        return Reconciled::Ignored;
    }
    session.store.update_board(&change.patch);
    Reconciled::Applied
}

fn member_added(session: &mut BoardSession, member: Member) -> Reconciled {
    if other_board(session, Some(&member.board_id)) {
        return Reconciled::Ignored;
    }
    applied(session.store.upsert_member(member))
}

fn member_removed(session: &mut BoardSession, member: MemberRef) -> Reconciled {
    if other_board(session, Some(&member.board_id)) {
        return Reconciled::Ignored;
    }
    if member.user_id == session.user_id() {
        session.leave(ExitReason::RemovedFromBoard);
        return Reconciled::SessionEnded(ExitReason::RemovedFromBoard);
    }
    applied(session.store.remove_member(&member.user_id))
}

fn end_session(session: &mut BoardSession, board: BoardRef, reason: ExitReason) -> Reconciled {
    if board.board_id != session.board_id() {
        return Reconciled::Ignored;
    }
    log::warn!(
        "[tessera.reconcile] Board {} is no longer available ({:?})",
        board.board_id,
        reason
    );
    session.leave(reason);
    Reconciled::SessionEnded(reason)
}

// ── Lists ───────────────────────────────────────────────────────────────────

fn list_created(session: &mut BoardSession, created: Created<List>) -> Reconciled {
    let Created {
        entity: list,
        client_ref,
    } = created;
    if list.board_id != session.board_id() || session.store.contains_list(&list.id) {
        return Reconciled::Ignored;
    }
    let board_id = session.board_id().to_string();
    match placeholder_for(
        session,
        EntityKind::List,
        client_ref.as_deref(),
        &board_id,
        &list.title,
    ) {
        Some(temp_id) => {
            let real_id = list.id.clone();
            session.store.replace_list(&temp_id, list);
            session.pending.resolve(&temp_id, &real_id);
            Reconciled::ReplacedPlaceholder { temp_id, real_id }
        }
        None => {
            let end = session.store.lists().len() as i64;
            session.store.insert_list(list, end);
            Reconciled::Applied
        }
    }
}

fn list_updated(session: &mut BoardSession, change: ListChange) -> Reconciled {
    let ListChange {
        id,
        board_id,
        position,
        patch,
    } = change;
    if other_board(session, board_id.as_deref()) {
        return applied(session.store.remove_list(&id).is_some());
    }
    if !session.store.update_list(&id, |list| patch.apply_to(list)) {
        return Reconciled::Ignored;
    }
    if let Some(position) = position {
        let current = session.store.list(&id).map(|l| l.position);
        if current != Some(position) {
            session.store.move_list(&id, position);
        }
    }
    Reconciled::Applied
}

// ── Cards ───────────────────────────────────────────────────────────────────

fn card_created(session: &mut BoardSession, created: Created<Card>) -> Reconciled {
    let Created {
        entity: card,
        client_ref,
    } = created;
    if session.store.contains_card(&card.id) || !session.store.contains_list(&card.list_id) {
        return Reconciled::Ignored;
    }
    match placeholder_for(
        session,
        EntityKind::Card,
        client_ref.as_deref(),
        &card.list_id,
        &card.title,
    ) {
        Some(temp_id) => {
            let real_id = card.id.clone();
            session.store.replace_card(&temp_id, card);
            session.pending.resolve(&temp_id, &real_id);
            Reconciled::ReplacedPlaceholder { temp_id, real_id }
        }
        None => {
            let end = session.store.cards_in_list(&card.list_id).len() as i64;
            session.store.insert_card(card, end);
            Reconciled::Applied
        }
    }
}

fn card_updated(session: &mut BoardSession, change: CardChange) -> Reconciled {
    let CardChange {
        id,
        board_id,
        list_id,
        position,
        patch,
    } = change;
    if other_board(session, board_id.as_deref()) {
        return applied(session.store.remove_card(&id).is_some());
    }
    let Some((current_list, current_position)) = session
        .store
        .card(&id)
        .map(|c| (c.list_id.clone(), c.position))
    else {
        return Reconciled::Ignored;
    };
    let patch = patch.normalized();
    session.store.update_card(&id, |card| patch.apply_to(card));

    let target_list = list_id.unwrap_or_else(|| current_list.clone());
    let relocated = target_list != current_list;
    if relocated || position.is_some_and(|p| p != current_position) {
        if !session.store.contains_list(&target_list) {
            // Moved to a list this board does not have.
            session.store.remove_card(&id);
            return Reconciled::Applied;
        }
        session
            .store
            .move_card(&id, &target_list, position.unwrap_or(i64::MAX));
    }
    Reconciled::Applied
}

fn card_moved(session: &mut BoardSession, mv: CardMove) -> Reconciled {
    if other_board(session, mv.board_id.as_deref()) || !session.store.contains_list(&mv.list_id) {
        return applied(session.store.remove_card(&mv.id).is_some());
    }
    let Some(card) = session.store.card(&mv.id) else {
        return Reconciled::Ignored;
    };
    if card.list_id == mv.list_id && card.position == mv.position {
        return Reconciled::Ignored;
    }
    session.store.move_card(&mv.id, &mv.list_id, mv.position);
    Reconciled::Applied
}

fn comment_created(session: &mut BoardSession, comment: Comment) -> Reconciled {
    applied(session.store.update_card(&comment.card_id, |card| {
        card.comment_count = card.comment_count.saturating_add(1);
    }))
}

fn comment_deleted(session: &mut BoardSession, comment: CommentRef) -> Reconciled {
    applied(session.store.update_card(&comment.card_id, |card| {
        card.comment_count = card.comment_count.saturating_sub(1);
    }))
}

// ── Ephemeral ───────────────────────────────────────────────────────────────

fn presence_updated(session: &mut BoardSession, update: Presence) -> Reconciled {
    if update.board_id != session.board_id() {
        return Reconciled::Ignored;
    }
    presence::apply_presence(&mut session.store, update.user_ids);
    Reconciled::Applied
}

fn typing_changed(session: &mut BoardSession, typing: Typing, started: bool) -> Reconciled {
    if other_board(session, typing.board_id.as_deref()) {
        return Reconciled::Ignored;
    }
    let changed = if started {
        presence::typing_started(&mut session.store, &typing.card_id, &typing.user_id)
    } else {
        presence::typing_stopped(&mut session.store, &typing.card_id, &typing.user_id)
    };
    applied(changed)
}

fn activity_created(session: &mut BoardSession, activity: Activity) -> Reconciled {
    if activity.board_id != session.board_id() {
        return Reconciled::Ignored;
    }
    applied(session.store.push_activity(activity))
}
