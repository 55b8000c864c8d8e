//! Local mirror of one board.
//!
//! Holds the board, its lists and cards, and the ephemeral presence/typing
//! maps. Every mutator is synchronous and does no I/O; ordering changes go
//! through [`crate::reindex`] so lists and the cards of each list always
//! carry contiguous positions in array order.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

use crate::ids::is_temp_id;
use crate::reindex::{self, Positioned};
use crate::types::*;

/// A list removed from the store together with its cards.
#[derive(Debug, Clone, PartialEq)]
pub struct RemovedList {
    pub index: usize,
    pub list: List,
    pub cards: Vec<Card>,
    /// Array slot of the list's first card.
    card_slot: Option<usize>,
}

/// A card removed from the store and the index it held in its list.
#[derive(Debug, Clone, PartialEq)]
pub struct RemovedCard {
    pub index: usize,
    pub card: Card,
    slot: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoardStore {
    board: Board,
    lists: Vec<List>,
    /// Flat card array; the cards of one list appear in position order.
    cards: Vec<Card>,
    present_user_ids: Vec<String>,
    typing_by_card: BTreeMap<String, BTreeSet<String>>,
    recent_activity: VecDeque<Activity>,
    activity_limit: usize,
    /// Incremented by every hydrate.
    epoch: u64,
}

impl BoardStore {
    /// Empty mirror for `board_id`, waiting for its first hydrate.
    pub fn new(board_id: &str, activity_limit: usize) -> Self {
        Self {
            board: Board {
                id: board_id.to_string(),
                ..Default::default()
            },
            lists: Vec::new(),
            cards: Vec::new(),
            present_user_ids: Vec::new(),
            typing_by_card: BTreeMap::new(),
            recent_activity: VecDeque::new(),
            activity_limit,
            epoch: 0,
        }
    }

    pub fn from_snapshot(snapshot: BoardSnapshot, activity_limit: usize) -> Self {
        let mut store = Self::new(&snapshot.board.id, activity_limit);
        store.hydrate(snapshot);
        store
    }

    /// Replace everything with a canonical snapshot.
    ///
    /// Placeholders of the previous epoch are discarded along with the rest
    /// of the old state. Presence and typing belong to the push channel and
    /// survive unless the snapshot is for a different board.
    pub fn hydrate(&mut self, snapshot: BoardSnapshot) -> u64 {
        let BoardSnapshot {
            board,
            mut lists,
            cards,
        } = snapshot;

        lists.retain(|list| list.board_id == board.id);
        reindex::sort_by_position(&mut lists);
        reindex::reindex(&mut lists);

        let mut by_list: HashMap<String, Vec<Card>> = HashMap::new();
        for card in cards {
            by_list.entry(card.list_id.clone()).or_default().push(card);
        }
        let mut ordered = Vec::new();
        for list in &lists {
            if let Some(mut group) = by_list.remove(&list.id) {
                reindex::sort_by_position(&mut group);
                reindex::reindex(&mut group);
                ordered.extend(group);
            }
        }
        let orphaned: usize = by_list.values().map(Vec::len).sum();
        if orphaned > 0 {
            log::warn!(
                "[tessera.store] Dropped {} cards without a list on board {}",
                orphaned,
                board.id
            );
        }

        if board.id != self.board.id {
            self.clear_ephemeral();
            self.recent_activity.clear();
        }
        self.board = board;
        self.lists = lists;
        self.cards = ordered;
        self.epoch += 1;
        log::debug!(
            "[tessera.store] Hydrated board {} (epoch {}, {} lists, {} cards)",
            self.board.id,
            self.epoch,
            self.lists.len(),
            self.cards.len()
        );
        self.epoch
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    // ── Board & members ─────────────────────────────────────────────────────

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn board_id(&self) -> &str {
        &self.board.id
    }

    pub fn set_board(&mut self, board: Board) {
        self.board = board;
    }

    pub fn update_board(&mut self, patch: &BoardPatch) {
        patch.apply_to(&mut self.board);
    }

    pub fn member_role(&self, user_id: &str) -> Option<Role> {
        self.board.member(user_id).map(|m| m.role)
    }

    /// Insert or replace a member. Returns true if the user was new.
    pub fn upsert_member(&mut self, member: Member) -> bool {
        match self
            .board
            .members
            .iter_mut()
            .find(|m| m.user_id == member.user_id)
        {
            Some(existing) => {
                *existing = member;
                false
            }
            None => {
                self.board.members.push(member);
                true
            }
        }
    }

    pub fn remove_member(&mut self, user_id: &str) -> bool {
        let before = self.board.members.len();
        self.board.members.retain(|m| m.user_id != user_id);
        self.board.members.len() != before
    }

    // ── Lists ───────────────────────────────────────────────────────────────

    /// Lists in board order.
    pub fn lists(&self) -> &[List] {
        &self.lists
    }

    pub fn list(&self, list_id: &str) -> Option<&List> {
        self.lists.iter().find(|l| l.id == list_id)
    }

    pub fn contains_list(&self, list_id: &str) -> bool {
        self.list(list_id).is_some()
    }

    pub fn list_index(&self, list_id: &str) -> Option<usize> {
        self.lists.iter().position(|l| l.id == list_id)
    }

    pub fn max_list_position(&self) -> Option<i64> {
        self.lists.iter().map(|l| l.position).max()
    }

    /// Append without reindexing.
    pub fn push_list(&mut self, list: List) {
        self.lists.push(list);
    }

    /// Insert at `index` (clamped) and reindex. Returns the final position.
    pub fn insert_list(&mut self, list: List, index: i64) -> i64 {
        let id = list.id.clone();
        let lists = std::mem::take(&mut self.lists);
        self.lists = reindex::insert_at(lists, list, index);
        self.list(&id).map(|l| l.position).unwrap_or_default()
    }

    /// Write back a reordered list sequence, reindexed in array order.
    pub fn replace_lists(&mut self, mut lists: Vec<List>) {
        reindex::reindex(&mut lists);
        self.lists = lists;
    }

    /// Swap the list `old_id` for `list` in the same slot and position.
    pub fn replace_list(&mut self, old_id: &str, mut list: List) -> bool {
        let Some(index) = self.list_index(old_id) else {
            return false;
        };
        list.position = self.lists[index].position;
        let new_id = list.id.clone();
        self.lists[index] = list;
        if new_id != old_id {
            for card in self.cards.iter_mut().filter(|c| c.list_id == old_id) {
                card.list_id = new_id.clone();
            }
        }
        true
    }

    pub fn update_list(&mut self, list_id: &str, f: impl FnOnce(&mut List)) -> bool {
        match self.lists.iter_mut().find(|l| l.id == list_id) {
            Some(list) => {
                f(list);
                true
            }
            None => false,
        }
    }

    /// Remove a list and all its cards, then reindex the remaining lists.
    pub fn remove_list(&mut self, list_id: &str) -> Option<RemovedList> {
        let index = self.list_index(list_id)?;
        let list = self.lists.remove(index);
        reindex::reindex(&mut self.lists);

        let card_slot = self.cards.iter().position(|c| c.list_id == list_id);
        let cards = self.list_cards(list_id);
        self.cards.retain(|c| c.list_id != list_id);
        for card in &cards {
            self.typing_by_card.remove(&card.id);
        }
        Some(RemovedList {
            index,
            list,
            cards,
            card_slot,
        })
    }

    /// Put a removed list back at its former index with the cards that have
    /// not reappeared elsewhere meanwhile. Returns false if the list exists.
    pub fn restore_list(&mut self, removed: RemovedList) -> bool {
        if self.contains_list(&removed.list.id) {
            return false;
        }
        let list_id = removed.list.id.clone();
        self.insert_list(removed.list, removed.index as i64);
        let mut cards: Vec<Card> = removed
            .cards
            .into_iter()
            .filter(|c| !self.contains_card(&c.id))
            .collect();
        reindex::reindex(&mut cards);
        self.write_group(&list_id, cards, removed.card_slot);
        true
    }

    /// Move a list to `index` (clamped). Returns the final position.
    pub fn move_list(&mut self, list_id: &str, index: i64) -> Option<i64> {
        let moved = reindex::relocate(self.lists.clone(), None, list_id, index)?;
        self.lists = moved.target;
        self.list(list_id).map(|l| l.position)
    }

    // ── Cards ───────────────────────────────────────────────────────────────

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    pub fn card(&self, card_id: &str) -> Option<&Card> {
        self.cards.iter().find(|c| c.id == card_id)
    }

    pub fn contains_card(&self, card_id: &str) -> bool {
        self.card(card_id).is_some()
    }

    pub fn card_index(&self, card_id: &str) -> Option<usize> {
        self.cards.iter().position(|c| c.id == card_id)
    }

    /// Cards of one list in position order.
    pub fn cards_in_list(&self, list_id: &str) -> Vec<&Card> {
        self.cards.iter().filter(|c| c.list_id == list_id).collect()
    }

    /// Owned copy of a list's cards, ready to hand to the reindexer.
    pub fn list_cards(&self, list_id: &str) -> Vec<Card> {
        self.cards
            .iter()
            .filter(|c| c.list_id == list_id)
            .cloned()
            .collect()
    }

    pub fn max_card_position(&self, list_id: &str) -> Option<i64> {
        self.cards
            .iter()
            .filter(|c| c.list_id == list_id)
            .map(|c| c.position)
            .max()
    }

    /// Append without reindexing.
    pub fn push_card(&mut self, card: Card) {
        self.cards.push(card);
    }

    /// Insert into the card's list at `index` (clamped) and reindex that
    /// list. Returns the final position.
    pub fn insert_card(&mut self, card: Card, index: i64) -> i64 {
        let list_id = card.list_id.clone();
        let id = card.id.clone();
        let seq = reindex::insert_at(self.list_cards(&list_id), card, index);
        let position = seq
            .iter()
            .find(|c| c.id == id)
            .map(|c| c.position)
            .unwrap_or_default();
        self.replace_list_cards(&list_id, seq);
        position
    }

    /// Swap the card `old_id` for `card`, keeping the slot, list and position.
    pub fn replace_card(&mut self, old_id: &str, mut card: Card) -> bool {
        let Some(index) = self.card_index(old_id) else {
            return false;
        };
        let old = &self.cards[index];
        card.list_id = old.list_id.clone();
        card.position = old.position;
        if let Some(typing) = self.typing_by_card.remove(old_id) {
            self.typing_by_card.insert(card.id.clone(), typing);
        }
        self.cards[index] = card;
        true
    }

    pub fn update_card(&mut self, card_id: &str, f: impl FnOnce(&mut Card)) -> bool {
        match self.cards.iter_mut().find(|c| c.id == card_id) {
            Some(card) => {
                f(card);
                true
            }
            None => false,
        }
    }

    /// Remove a card and reindex the list it was in.
    pub fn remove_card(&mut self, card_id: &str) -> Option<RemovedCard> {
        let slot = self.card_index(card_id)?;
        let list_id = self.cards[slot].list_id.clone();
        let (remaining, removed) = reindex::remove(self.list_cards(&list_id), card_id);
        let card = removed?;
        let index = card.position.max(0) as usize;
        self.replace_list_cards(&list_id, remaining);
        self.typing_by_card.remove(card_id);
        Some(RemovedCard { index, card, slot })
    }

    /// Put a removed card back at its former index. Returns false if the card
    /// exists again or its list is gone.
    pub fn restore_card(&mut self, removed: RemovedCard) -> bool {
        let RemovedCard { index, card, slot } = removed;
        if self.contains_card(&card.id) || !self.contains_list(&card.list_id) {
            return false;
        }
        let list_id = card.list_id.clone();
        let seq = reindex::insert_at(self.list_cards(&list_id), card, index as i64);
        self.write_group(&list_id, seq, Some(slot));
        true
    }

    /// Move a card to `index` of `target_list_id`, reindexing the source and
    /// target lists. Returns the final position, or `None` if the card or the
    /// target list is unknown.
    pub fn move_card(&mut self, card_id: &str, target_list_id: &str, index: i64) -> Option<i64> {
        let source_list_id = self.card(card_id)?.list_id.clone();
        if !self.contains_list(target_list_id) {
            return None;
        }

        if source_list_id == target_list_id {
            let moved = reindex::relocate(self.list_cards(&source_list_id), None, card_id, index)?;
            let position = position_of(&moved.target, card_id);
            self.replace_list_cards(&source_list_id, moved.target);
            position
        } else {
            let moved = reindex::relocate(
                self.list_cards(&source_list_id),
                Some(self.list_cards(target_list_id)),
                card_id,
                index,
            )?;
            let position = position_of(&moved.target, card_id);
            self.replace_list_cards(&source_list_id, moved.source.unwrap_or_default());
            self.replace_list_cards(target_list_id, moved.target);
            position
        }
    }

    /// Write back the full ordered card sequence of one list.
    ///
    /// Every card in `cards` is re-parented to `list_id`; cards currently in
    /// the list (or carrying one of the incoming ids) are replaced. The group
    /// keeps the array slot of its first existing card.
    pub fn replace_list_cards(&mut self, list_id: &str, cards: Vec<Card>) {
        self.write_group(list_id, cards, None);
    }

    /// Like [`Self::replace_list_cards`]; an empty group lands at `fallback`
    /// instead of the end of the array.
    fn write_group(&mut self, list_id: &str, mut cards: Vec<Card>, fallback: Option<usize>) {
        for card in &mut cards {
            card.list_id = list_id.to_string();
        }
        reindex::reindex(&mut cards);
        let incoming: HashSet<String> = cards.iter().map(|c| c.id.clone()).collect();
        let belongs = |c: &Card| c.list_id == list_id || incoming.contains(&c.id);

        let anchor = self.cards.iter().position(|c| belongs(c));
        self.cards.retain(|c| !belongs(c));
        let at = anchor
            .or(fallback)
            .unwrap_or(self.cards.len())
            .min(self.cards.len());
        let tail = self.cards.split_off(at);
        self.cards.extend(cards);
        self.cards.extend(tail);
    }

    // ── Placeholders ────────────────────────────────────────────────────────

    /// Ids of lists and cards still waiting for confirmation.
    pub fn placeholder_ids(&self) -> Vec<&str> {
        self.lists
            .iter()
            .map(|l| l.id.as_str())
            .chain(self.cards.iter().map(|c| c.id.as_str()))
            .filter(|id| is_temp_id(id))
            .collect()
    }

    // ── Presence & typing ───────────────────────────────────────────────────

    pub fn present_user_ids(&self) -> &[String] {
        &self.present_user_ids
    }

    pub fn set_present_users(&mut self, user_ids: Vec<String>) {
        self.present_user_ids = user_ids;
    }

    pub fn typing_by_card(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.typing_by_card
    }

    pub fn typing_users(&self, card_id: &str) -> Vec<&str> {
        self.typing_by_card
            .get(card_id)
            .map(|users| users.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Returns false if the user was already marked as typing.
    pub fn add_typing(&mut self, card_id: &str, user_id: &str) -> bool {
        self.typing_by_card
            .entry(card_id.to_string())
            .or_default()
            .insert(user_id.to_string())
    }

    /// Returns false if the user was not marked as typing.
    pub fn remove_typing(&mut self, card_id: &str, user_id: &str) -> bool {
        let Some(users) = self.typing_by_card.get_mut(card_id) else {
            return false;
        };
        let removed = users.remove(user_id);
        if users.is_empty() {
            self.typing_by_card.remove(card_id);
        }
        removed
    }

    pub fn clear_ephemeral(&mut self) {
        self.present_user_ids.clear();
        self.typing_by_card.clear();
    }

    // ── Activity ────────────────────────────────────────────────────────────

    /// Most recent first.
    pub fn recent_activity(&self) -> impl Iterator<Item = &Activity> {
        self.recent_activity.iter()
    }

    /// Prepend an activity entry, trimming to the configured limit.
    /// Returns false for a duplicate id.
    pub fn push_activity(&mut self, activity: Activity) -> bool {
        if self.recent_activity.iter().any(|a| a.id == activity.id) {
            return false;
        }
        self.recent_activity.push_front(activity);
        self.recent_activity.truncate(self.activity_limit);
        true
    }

    // ── Checks ──────────────────────────────────────────────────────────────

    /// Whether lists and every list's cards carry positions `0..n-1` in
    /// array order, and every card belongs to a known list.
    pub fn ordering_is_contiguous(&self) -> bool {
        if !reindex::is_contiguous(&self.lists) {
            return false;
        }
        let mut next: HashMap<&str, i64> = HashMap::new();
        for card in &self.cards {
            if !self.contains_list(&card.list_id) {
                return false;
            }
            let expected = next.entry(card.list_id.as_str()).or_insert(0);
            if card.position != *expected {
                return false;
            }
            *expected += 1;
        }
        true
    }
}

fn position_of<T: Positioned>(items: &[T], id: &str) -> Option<i64> {
    items.iter().find(|item| item.id() == id).map(|item| item.position())
}
