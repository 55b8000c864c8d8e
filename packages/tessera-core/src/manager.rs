//! Async driver for optimistic mutations.
//!
//! Each operation applies locally under the session lock, releases it, awaits
//! the collaborator, then locks again to settle. Push events applied by the
//! transport task in between see the optimistic state and may resolve
//! placeholders before the REST response arrives.

use crate::api::BoardApi;
use crate::error::MutationError;
use crate::optimistic::Confirmation;
use crate::session::{lock_session, BoardSession, SharedSession};
use crate::types::{Board, BoardPatch, Card, CardPatch, List, ListPatch, NewCard, NewList};

pub struct MutationManager<A> {
    session: SharedSession,
    api: A,
}

impl<A: BoardApi> MutationManager<A> {
    pub fn new(session: SharedSession, api: A) -> Self {
        Self { session, api }
    }

    pub fn session(&self) -> &SharedSession {
        &self.session
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// Run `f` under the session lock. The guard never outlives the call, so
    /// it is never held across an `.await`.
    fn with_session<R>(&self, f: impl FnOnce(&mut BoardSession) -> R) -> R {
        let mut session = lock_session(&self.session);
        f(&mut session)
    }

    /// Replace the mirror with the server's snapshot. Returns the new epoch.
    pub async fn hydrate(&self) -> Result<u64, MutationError> {
        let board_id = self.with_session(|s| {
            s.ensure_open()?;
            Ok::<_, MutationError>(s.board_id().to_string())
        })?;
        let snapshot = self.api.fetch_board(&board_id).await?;
        let epoch = self.with_session(|s| s.hydrate(snapshot));
        log::info!("[tessera.manager] Hydrated {} (epoch {})", board_id, epoch);
        Ok(epoch)
    }

    pub async fn update_board(&self, patch: BoardPatch) -> Result<Board, MutationError> {
        let board_id = self.with_session(|s| {
            s.apply_update_board(&patch)?;
            Ok::<_, MutationError>(s.board_id().to_string())
        })?;
        match self.api.update_board(&board_id, &patch).await {
            Ok(board) => {
                self.with_session(|s| s.confirm_board(board.clone()));
                Ok(board)
            }
            Err(err) => {
                log::warn!(
                    "[tessera.manager] Board {} update rejected, hydrate to recover: {}",
                    board_id,
                    err
                );
                Err(err.into())
            }
        }
    }

    // ── Lists ───────────────────────────────────────────────────────────────

    pub async fn create_list(&self, draft: NewList) -> Result<List, MutationError> {
        let pending = self.with_session(|s| s.begin_create_list(draft))?;
        match self.api.create_list(&pending.board_id, &pending.request).await {
            Ok(list) => {
                let outcome =
                    self.with_session(|s| s.confirm_create_list(&pending.temp_id, list.clone()));
                log_confirmation(&pending.temp_id, &list.id, outcome);
                Ok(list)
            }
            Err(err) => {
                self.with_session(|s| s.fail_create(&pending.temp_id));
                log::warn!(
                    "[tessera.manager] Create list '{}' failed, placeholder {} removed: {}",
                    pending.request.title,
                    pending.temp_id,
                    err
                );
                Err(err.into())
            }
        }
    }

    pub async fn update_list(&self, list_id: &str, patch: ListPatch) -> Result<List, MutationError> {
        self.with_session(|s| s.apply_update_list(list_id, &patch))?;
        match self.api.update_list(list_id, &patch).await {
            Ok(list) => {
                self.with_session(|s| s.confirm_list(&list));
                Ok(list)
            }
            Err(err) => Err(self.unsettled("update list", list_id, err.into())),
        }
    }

    pub async fn move_list(&self, list_id: &str, index: i64) -> Result<List, MutationError> {
        let request = self.with_session(|s| s.apply_move_list(list_id, index))?;
        match self.api.move_list(list_id, &request).await {
            Ok(list) => {
                self.with_session(|s| s.confirm_list(&list));
                Ok(list)
            }
            Err(err) => Err(self.unsettled("move list", list_id, err.into())),
        }
    }

    pub async fn delete_list(&self, list_id: &str) -> Result<(), MutationError> {
        let removed = self.with_session(|s| s.apply_delete_list(list_id))?;
        if let Err(err) = self.api.delete_list(list_id).await {
            let err = MutationError::from(err);
            let restored = self.with_session(|s| s.fail_delete_list(removed, &err));
            log::warn!(
                "[tessera.manager] Delete list {} failed (restored: {}): {}",
                list_id,
                restored,
                err
            );
            return Err(err);
        }
        Ok(())
    }

    // ── Cards ───────────────────────────────────────────────────────────────

    pub async fn create_card(&self, list_id: &str, draft: NewCard) -> Result<Card, MutationError> {
        let pending = self.with_session(|s| s.begin_create_card(list_id, draft))?;
        match self.api.create_card(&pending.list_id, &pending.request).await {
            Ok(card) => {
                let outcome =
                    self.with_session(|s| s.confirm_create_card(&pending.temp_id, card.clone()));
                log_confirmation(&pending.temp_id, &card.id, outcome);
                Ok(card)
            }
            Err(err) => {
                self.with_session(|s| s.fail_create(&pending.temp_id));
                log::warn!(
                    "[tessera.manager] Create card '{}' in {} failed, placeholder {} removed: {}",
                    pending.request.title,
                    pending.list_id,
                    pending.temp_id,
                    err
                );
                Err(err.into())
            }
        }
    }

    pub async fn update_card(&self, card_id: &str, patch: CardPatch) -> Result<Card, MutationError> {
        let patch = self.with_session(|s| s.apply_update_card(card_id, &patch))?;
        match self.api.update_card(card_id, &patch).await {
            Ok(card) => {
                self.with_session(|s| s.confirm_card(&card));
                Ok(card)
            }
            Err(err) => Err(self.unsettled("update card", card_id, err.into())),
        }
    }

    pub async fn move_card(
        &self,
        card_id: &str,
        target_list_id: &str,
        index: i64,
    ) -> Result<Card, MutationError> {
        let request = self.with_session(|s| s.apply_move_card(card_id, target_list_id, index))?;
        match self.api.move_card(card_id, &request).await {
            Ok(card) => {
                self.with_session(|s| s.confirm_card(&card));
                Ok(card)
            }
            Err(err) => Err(self.unsettled("move card", card_id, err.into())),
        }
    }

    pub async fn delete_card(&self, card_id: &str) -> Result<(), MutationError> {
        let removed = self.with_session(|s| s.apply_delete_card(card_id))?;
        if let Err(err) = self.api.delete_card(card_id).await {
            let err = MutationError::from(err);
            let restored = self.with_session(|s| s.fail_delete_card(removed, &err));
            log::warn!(
                "[tessera.manager] Delete card {} failed (restored: {}): {}",
                card_id,
                restored,
                err
            );
            return Err(err);
        }
        Ok(())
    }

    /// Update and move failures leave the optimistic change in place.
    fn unsettled(&self, action: &str, id: &str, err: MutationError) -> MutationError {
        log::warn!(
            "[tessera.manager] {} {} rejected, local change kept until hydrate: {}",
            action,
            id,
            err
        );
        err
    }
}

fn log_confirmation(temp_id: &str, real_id: &str, outcome: Confirmation) {
    log::debug!(
        "[tessera.manager] Confirmed {} as {} ({:?})",
        temp_id,
        real_id,
        outcome
    );
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;
    use crate::config::SessionConfig;
    use crate::error::ApiError;
    use crate::ids::is_temp_id;
    use crate::store::tests::{card, ids, snapshot};
    use crate::store::BoardStore;
    use crate::sync::{CardMove, Created, EntityRef, InboundEvent};
    use crate::types::{BoardSnapshot, MoveRequest};

    /// Scripted collaborator. Push events queued with `during_call` are
    /// applied to the session while the request is in flight.
    struct ScriptedApi {
        session: SharedSession,
        in_flight: Mutex<Vec<InboundEvent>>,
        failure: Mutex<Option<ApiError>>,
        calls: Mutex<Vec<String>>,
        next_id: AtomicUsize,
    }

    impl ScriptedApi {
        fn new(session: &SharedSession) -> Self {
            Self {
                session: session.clone(),
                in_flight: Mutex::new(Vec::new()),
                failure: Mutex::new(None),
                calls: Mutex::new(Vec::new()),
                next_id: AtomicUsize::new(1),
            }
        }

        fn during_call(&self, event: InboundEvent) {
            self.in_flight.lock().unwrap().push(event);
        }

        fn fail_next(&self, err: ApiError) {
            *self.failure.lock().unwrap() = Some(err);
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn server_id(&self) -> String {
            format!("srv-{}", self.next_id.fetch_add(1, Ordering::SeqCst))
        }

        async fn respond<T>(
            &self,
            call: String,
            reply: impl FnOnce(&BoardSession) -> Result<T, ApiError>,
        ) -> Result<T, ApiError> {
            self.calls.lock().unwrap().push(call);
            tokio::task::yield_now().await;
            let events: Vec<InboundEvent> = self.in_flight.lock().unwrap().drain(..).collect();
            for event in events {
                lock_session(&self.session).apply_event(event);
            }
            if let Some(err) = self.failure.lock().unwrap().take() {
                return Err(err);
            }
            reply(&lock_session(&self.session))
        }
    }

    fn echo_card(session: &BoardSession, card_id: &str) -> Result<Card, ApiError> {
        session
            .store()
            .card(card_id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(card_id.to_string()))
    }

    fn echo_list(session: &BoardSession, list_id: &str) -> Result<List, ApiError> {
        session
            .store()
            .list(list_id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(list_id.to_string()))
    }

    impl BoardApi for ScriptedApi {
        async fn fetch_board(&self, board_id: &str) -> Result<BoardSnapshot, ApiError> {
            self.respond(format!("fetch_board {}", board_id), |_| Ok(snapshot()))
                .await
        }

        async fn update_board(&self, board_id: &str, _patch: &BoardPatch) -> Result<Board, ApiError> {
            self.respond(format!("update_board {}", board_id), |s| {
                Ok(s.store().board().clone())
            })
            .await
        }

        async fn create_list(&self, board_id: &str, request: &NewList) -> Result<List, ApiError> {
            let id = self.server_id();
            self.respond(format!("create_list {}", board_id), |_| {
                Ok(List {
                    id,
                    board_id: board_id.to_string(),
                    title: request.title.clone(),
                    position: 99,
                    is_archived: false,
                })
            })
            .await
        }

        async fn update_list(&self, list_id: &str, _patch: &ListPatch) -> Result<List, ApiError> {
            self.respond(format!("update_list {}", list_id), |s| echo_list(s, list_id))
                .await
        }

        async fn move_list(&self, list_id: &str, request: &MoveRequest) -> Result<List, ApiError> {
            self.respond(
                format!("move_list {} {} {}", list_id, request.parent_id, request.position),
                |s| echo_list(s, list_id),
            )
            .await
        }

        async fn delete_list(&self, list_id: &str) -> Result<(), ApiError> {
            self.respond(format!("delete_list {}", list_id), |_| Ok(()))
                .await
        }

        async fn create_card(&self, list_id: &str, request: &NewCard) -> Result<Card, ApiError> {
            let id = self.server_id();
            self.respond(format!("create_card {}", list_id), |_| {
                let mut created = card(&id, list_id, 99);
                created.title = request.title.clone();
                Ok(created)
            })
            .await
        }

        async fn update_card(&self, card_id: &str, _patch: &CardPatch) -> Result<Card, ApiError> {
            self.respond(format!("update_card {}", card_id), |s| echo_card(s, card_id))
                .await
        }

        async fn move_card(&self, card_id: &str, request: &MoveRequest) -> Result<Card, ApiError> {
            self.respond(
                format!("move_card {} {} {}", card_id, request.parent_id, request.position),
                |s| echo_card(s, card_id),
            )
            .await
        }

        async fn delete_card(&self, card_id: &str) -> Result<(), ApiError> {
            self.respond(format!("delete_card {}", card_id), |_| Ok(()))
                .await
        }
    }

    fn manager(user_id: &str) -> MutationManager<ScriptedApi> {
        let session =
            BoardSession::from_snapshot(snapshot(), user_id, SessionConfig::default()).into_shared();
        let api = ScriptedApi::new(&session);
        MutationManager::new(session, api)
    }

    fn store_of(manager: &MutationManager<ScriptedApi>) -> BoardStore {
        lock_session(manager.session()).store().clone()
    }

    fn task(id: &str) -> Card {
        let mut task = card(id, "l1", 3);
        task.title = "Task".into();
        task
    }

    #[tokio::test]
    async fn test_create_converges_in_both_arrival_orders() {
        let rest_first = manager("u1");
        let created = rest_first
            .create_card("l1", NewCard::titled("Task"))
            .await
            .unwrap();
        assert_eq!(created.id, "srv-1");

        let push_first = manager("u1");
        push_first
            .api()
            .during_call(InboundEvent::CardCreated(Created::new(task("srv-1"))));
        push_first
            .create_card("l1", NewCard::titled("Task"))
            .await
            .unwrap();

        let a = store_of(&rest_first);
        let b = store_of(&push_first);
        assert_eq!(ids(&a, "l1"), vec!["a", "b", "c", "srv-1"]);
        assert_eq!(a, b);
        assert!(a.placeholder_ids().is_empty());
        assert!(lock_session(push_first.session()).pending().is_empty());
    }

    #[tokio::test]
    async fn test_request_carries_placeholder_as_client_ref() {
        let manager = manager("u1");
        manager
            .create_list(NewList::titled("Backlog"))
            .await
            .unwrap();
        assert_eq!(manager.api().calls(), vec!["create_list b1"]);

        let store = store_of(&manager);
        let order: Vec<&str> = store.lists().iter().map(|l| l.id.as_str()).collect();
        assert_eq!(order, vec!["l1", "l2", "srv-1"]);
        assert_eq!(store.list("srv-1").unwrap().position, 2);
        assert!(!store.lists().iter().any(|l| is_temp_id(&l.id)));
    }

    #[tokio::test]
    async fn test_failed_create_rolls_back_exactly() {
        let manager = manager("u1");
        let before = store_of(&manager);
        manager
            .api()
            .fail_next(ApiError::Validation("title too long".into()));

        let err = manager
            .create_card("l2", NewCard::titled("Too long"))
            .await
            .unwrap_err();
        assert_eq!(err, MutationError::Api(ApiError::Validation("title too long".into())));
        assert!(!err.is_permission_denied());
        assert_eq!(store_of(&manager), before);
    }

    #[tokio::test]
    async fn test_permission_denied_keeps_its_kind() {
        let manager = manager("u1");
        let before = store_of(&manager);
        manager
            .api()
            .fail_next(ApiError::PermissionDenied("board b1".into()));

        let err = manager
            .create_list(NewList::titled("Nope"))
            .await
            .unwrap_err();
        assert!(err.is_permission_denied());
        assert_eq!(store_of(&manager), before);
    }

    #[tokio::test]
    async fn test_read_only_member_never_reaches_server() {
        let manager = manager("u3");
        let err = manager.delete_card("a").await.unwrap_err();
        assert!(err.is_permission_denied());
        assert!(manager.api().calls().is_empty());
        assert_eq!(ids(&store_of(&manager), "l1"), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_failed_delete_restores_card() {
        let manager = manager("u1");
        let before = store_of(&manager);
        manager.api().fail_next(ApiError::Server {
            status: 500,
            message: "boom".into(),
        });

        assert!(manager.delete_card("b").await.is_err());
        assert_eq!(store_of(&manager), before);

        manager.api().fail_next(ApiError::NotFound("card b".into()));
        assert!(manager.delete_card("b").await.is_err());
        assert_eq!(ids(&store_of(&manager), "l1"), vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_failed_delete_not_restored_into_vanished_list() {
        let manager = manager("u1");
        manager
            .api()
            .during_call(InboundEvent::ListDeleted(EntityRef { id: "l1".into() }));
        manager.api().fail_next(ApiError::Network("reset".into()));

        assert!(manager.delete_card("b").await.is_err());
        let store = store_of(&manager);
        assert!(store.list("l1").is_none());
        assert!(store.card("b").is_none());
        assert!(store.ordering_is_contiguous());
    }

    #[tokio::test]
    async fn test_failed_list_delete_restores_cards() {
        let manager = manager("u1");
        let before = store_of(&manager);
        manager
            .api()
            .fail_next(ApiError::Network("connection refused".into()));

        assert!(manager.delete_list("l1").await.is_err());
        assert_eq!(store_of(&manager), before);
    }

    #[tokio::test]
    async fn test_move_then_remote_move() {
        let manager = manager("u1");
        let moved = manager.move_card("a", "l1", 2).await.unwrap();
        assert_eq!(moved.position, 2);
        assert_eq!(manager.api().calls(), vec!["move_card a l1 2"]);
        assert_eq!(ids(&store_of(&manager), "l1"), vec!["b", "c", "a"]);

        lock_session(manager.session()).apply_event(InboundEvent::CardMoved(CardMove {
            id: "c".into(),
            list_id: "l1".into(),
            position: 0,
            board_id: None,
        }));
        let store = store_of(&manager);
        assert_eq!(ids(&store, "l1"), vec!["c", "b", "a"]);
        assert!(store.ordering_is_contiguous());
    }

    #[tokio::test]
    async fn test_update_failure_kept_until_hydrate() {
        let manager = manager("u1");
        manager.api().fail_next(ApiError::Validation("bad".into()));
        let patch = CardPatch {
            title: Some("Renamed".into()),
            ..CardPatch::default()
        };

        let err = manager.update_card("a", patch).await.unwrap_err();
        assert!(err.needs_rehydrate());
        assert_eq!(store_of(&manager).card("a").unwrap().title, "Renamed");

        manager.hydrate().await.unwrap();
        assert_eq!(store_of(&manager).card("a").unwrap().title, "Card a");
    }

    #[tokio::test]
    async fn test_placeholder_operations_are_refused() {
        let manager = manager("u1");
        let temp_id = lock_session(manager.session())
            .begin_create_card("l1", NewCard::titled("Pending"))
            .unwrap()
            .temp_id;

        let err = manager.delete_card(&temp_id).await.unwrap_err();
        assert_eq!(err, MutationError::Pending(temp_id));
        assert!(manager.api().calls().is_empty());
    }
}
