//! Presence and typing.
//!
//! Remote state lives in the store and is driven only by explicit signals:
//! presence broadcasts replace the set wholesale, typing start/stop edit the
//! per-card sets, and nothing expires on a timer. Local typing is announced by
//! [`TypingNotifier`], which owns one cancellable auto-stop task per card.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::store::BoardStore;
use crate::sync::OutboundSignal;

/// Replace the presence set with an authoritative broadcast.
pub fn apply_presence(store: &mut BoardStore, user_ids: Vec<String>) {
    let mut seen = HashSet::new();
    let user_ids: Vec<String> = user_ids
        .into_iter()
        .filter(|id| seen.insert(id.clone()))
        .collect();
    log::debug!(
        "[tessera.presence] {} users present on {}",
        user_ids.len(),
        store.board_id()
    );
    store.set_present_users(user_ids);
}

pub fn typing_started(store: &mut BoardStore, card_id: &str, user_id: &str) -> bool {
    store.add_typing(card_id, user_id)
}

pub fn typing_stopped(store: &mut BoardStore, card_id: &str, user_id: &str) -> bool {
    store.remove_typing(card_id, user_id)
}

/// Announces local typing with a debounce-driven auto-stop.
///
/// Must be created and used inside a Tokio runtime. Dropping the notifier
/// aborts every pending timer without sending anything; call
/// [`TypingNotifier::shutdown`] first to flush the stop signals.
pub struct TypingNotifier {
    board_id: String,
    idle: Duration,
    outbound: mpsc::UnboundedSender<OutboundSignal>,
    /// Cards with an unanswered `typingStart`.
    active: Arc<Mutex<HashSet<String>>>,
    timers: HashMap<String, JoinHandle<()>>,
}

impl TypingNotifier {
    pub fn new(
        board_id: &str,
        idle: Duration,
        outbound: mpsc::UnboundedSender<OutboundSignal>,
    ) -> Self {
        Self {
            board_id: board_id.to_string(),
            idle,
            outbound,
            active: Arc::new(Mutex::new(HashSet::new())),
            timers: HashMap::new(),
        }
    }

    /// A keystroke in the editor for `card_id`.
    ///
    /// Sends `typingStart` only if the card is not already announced, then
    /// re-arms the auto-stop timer.
    pub fn keystroke(&mut self, card_id: &str) {
        let newly_active = lock(&self.active).insert(card_id.to_string());
        if newly_active {
            self.send(OutboundSignal::TypingStart {
                board_id: self.board_id.clone(),
                card_id: card_id.to_string(),
            });
        }

        if let Some(timer) = self.timers.remove(card_id) {
            timer.abort();
        }
        let active = self.active.clone();
        let outbound = self.outbound.clone();
        let idle = self.idle;
        let board_id = self.board_id.clone();
        let card = card_id.to_string();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(idle).await;
            if lock(&active).remove(&card) {
                log::debug!("[tessera.presence] Typing idle on card {}", card);
                let _ = outbound.send(OutboundSignal::TypingStop {
                    board_id,
                    card_id: card,
                });
            }
        });
        self.timers.insert(card_id.to_string(), timer);
    }

    /// The editor for `card_id` lost focus; stop immediately.
    pub fn blur(&mut self, card_id: &str) {
        if let Some(timer) = self.timers.remove(card_id) {
            timer.abort();
        }
        if lock(&self.active).remove(card_id) {
            self.send(OutboundSignal::TypingStop {
                board_id: self.board_id.clone(),
                card_id: card_id.to_string(),
            });
        }
    }

    pub fn is_typing(&self, card_id: &str) -> bool {
        lock(&self.active).contains(card_id)
    }

    /// Cancel every timer and send the outstanding stop signals.
    pub fn shutdown(&mut self) {
        for (_, timer) in self.timers.drain() {
            timer.abort();
        }
        let mut cards: Vec<String> = lock(&self.active).drain().collect();
        cards.sort();
        for card_id in cards {
            self.send(OutboundSignal::TypingStop {
                board_id: self.board_id.clone(),
                card_id,
            });
        }
    }

    fn send(&self, signal: OutboundSignal) {
        if self.outbound.send(signal).is_err() {
            log::warn!(
                "[tessera.presence] Push channel closed, dropped typing signal for {}",
                self.board_id
            );
        }
    }
}

impl Drop for TypingNotifier {
    fn drop(&mut self) {
        for (_, timer) in self.timers.drain() {
            timer.abort();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
