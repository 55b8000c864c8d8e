//! One active board session: the owned state every reducer operates on.
//!
//! Bundles the store, the pending-create table, the local identity and the
//! room lifecycle. Joining emits `joinBoard`; every exit path (explicit leave,
//! forced removal, board deletion, drop) emits exactly one `leaveBoard` and
//! clears presence and typing.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;

use crate::config::SessionConfig;
use crate::error::MutationError;
use crate::ids::is_temp_id;
use crate::pending::PendingTable;
use crate::presence::TypingNotifier;
use crate::store::BoardStore;
use crate::sync::OutboundSignal;
use crate::types::{BoardSnapshot, Role};

/// Session shared between the mutation driver and the push-channel task.
pub type SharedSession = Arc<Mutex<BoardSession>>;

/// Lock a shared session. Every mutator leaves the state consistent, so a
/// poisoned lock is recovered rather than propagated.
pub fn lock_session(session: &SharedSession) -> MutexGuard<'_, BoardSession> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    Left,
    RemovedFromBoard,
    BoardDeleted,
    Dropped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomState {
    /// Not subscribed yet; mutations still work against the mirror.
    Detached,
    Joined,
    Closed(ExitReason),
}

pub struct BoardSession {
    pub(crate) store: BoardStore,
    pub(crate) pending: PendingTable,
    user_id: String,
    config: SessionConfig,
    room: RoomState,
    outbound: Option<mpsc::UnboundedSender<OutboundSignal>>,
    typing: Option<TypingNotifier>,
}

impl std::fmt::Debug for BoardSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoardSession")
            .field("board_id", &self.store.board_id())
            .field("user_id", &self.user_id)
            .field("room", &self.room)
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

impl BoardSession {
    pub fn new(board_id: &str, user_id: &str, config: SessionConfig) -> Self {
        Self {
            store: BoardStore::new(board_id, config.recent_activity_limit),
            pending: PendingTable::new(),
            user_id: user_id.to_string(),
            config,
            room: RoomState::Detached,
            outbound: None,
            typing: None,
        }
    }

    pub fn from_snapshot(snapshot: BoardSnapshot, user_id: &str, config: SessionConfig) -> Self {
        let mut session = Self::new(&snapshot.board.id, user_id, config);
        session.hydrate(snapshot);
        session
    }

    pub fn into_shared(self) -> SharedSession {
        Arc::new(Mutex::new(self))
    }

    pub fn store(&self) -> &BoardStore {
        &self.store
    }

    pub fn pending(&self) -> &PendingTable {
        &self.pending
    }

    pub fn board_id(&self) -> &str {
        self.store.board_id()
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn room(&self) -> RoomState {
        self.room
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.room, RoomState::Closed(_))
    }

    /// Reset to ground truth. Pending creates of the previous epoch are
    /// forgotten; their late confirmations become no-ops.
    pub fn hydrate(&mut self, snapshot: BoardSnapshot) -> u64 {
        let dropped = self.pending.clear();
        if dropped > 0 {
            log::info!(
                "[tessera.session] Hydrate discarded {} pending creates on {}",
                dropped,
                self.store.board_id()
            );
        }
        self.store.hydrate(snapshot)
    }

    // ── Room lifecycle ──────────────────────────────────────────────────────

    /// Subscribe to the board room. Must run inside a Tokio runtime, which
    /// owns the typing auto-stop timers.
    pub fn join(&mut self, outbound: mpsc::UnboundedSender<OutboundSignal>) -> Result<(), MutationError> {
        match self.room {
            RoomState::Closed(_) => return Err(MutationError::SessionClosed),
            RoomState::Joined => return Ok(()),
            RoomState::Detached => {}
        }
        let board_id = self.store.board_id().to_string();
        self.typing = Some(TypingNotifier::new(
            &board_id,
            self.config.typing_idle(),
            outbound.clone(),
        ));
        if outbound
            .send(OutboundSignal::JoinBoard {
                board_id: board_id.clone(),
            })
            .is_err()
        {
            log::warn!("[tessera.session] Push channel closed before joining {}", board_id);
        }
        self.outbound = Some(outbound);
        self.room = RoomState::Joined;
        log::info!("[tessera.session] Joined board {} as {}", board_id, self.user_id);
        Ok(())
    }

    /// Leave the room and clear ephemeral state. Only the first call of a
    /// session has any effect.
    pub fn leave(&mut self, reason: ExitReason) {
        if self.is_closed() {
            return;
        }
        if let Some(mut typing) = self.typing.take() {
            typing.shutdown();
        }
        if let Some(outbound) = self.outbound.take() {
            // Best effort: the transport may already be gone.
            let _ = outbound.send(OutboundSignal::LeaveBoard {
                board_id: self.store.board_id().to_string(),
            });
        }
        self.store.clear_ephemeral();
        self.room = RoomState::Closed(reason);
        log::info!(
            "[tessera.session] Left board {} ({:?})",
            self.store.board_id(),
            reason
        );
    }

    // ── Local typing ────────────────────────────────────────────────────────

    pub fn keystroke(&mut self, card_id: &str) {
        if is_temp_id(card_id) {
            return;
        }
        if let Some(typing) = self.typing.as_mut() {
            typing.keystroke(card_id);
        }
    }

    pub fn blur(&mut self, card_id: &str) {
        if let Some(typing) = self.typing.as_mut() {
            typing.blur(card_id);
        }
    }

    // ── Permission checks ───────────────────────────────────────────────────

    /// Role of the local user, if the member list names them.
    pub fn local_role(&self) -> Option<Role> {
        self.store.member_role(&self.user_id)
    }

    pub(crate) fn ensure_open(&self) -> Result<(), MutationError> {
        if self.is_closed() {
            Err(MutationError::SessionClosed)
        } else {
            Ok(())
        }
    }

    /// Refuse list/card writes for a known read-only role. An unknown role
    /// is left for the server to decide.
    pub(crate) fn ensure_can_write(&self) -> Result<(), MutationError> {
        self.ensure_open()?;
        match self.local_role() {
            Some(role) if !role.can_write() => Err(MutationError::ReadOnly {
                user_id: self.user_id.clone(),
                role,
            }),
            _ => Ok(()),
        }
    }

    pub(crate) fn ensure_can_manage(&self) -> Result<(), MutationError> {
        self.ensure_open()?;
        match self.local_role() {
            Some(role) if !role.can_manage() => Err(MutationError::ReadOnly {
                user_id: self.user_id.clone(),
                role,
            }),
            _ => Ok(()),
        }
    }
}

impl Drop for BoardSession {
    fn drop(&mut self) {
        if self.room == RoomState::Joined {
            self.leave(ExitReason::Dropped);
        }
    }
}
