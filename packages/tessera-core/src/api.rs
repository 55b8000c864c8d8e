//! Persistence collaborator.
//!
//! Every canonical entity returned here is folded into the mirror by the same
//! merge logic the reconciler uses for push events.

use crate::error::ApiError;
use crate::types::{
    Board, BoardPatch, BoardSnapshot, Card, CardPatch, List, ListPatch, MoveRequest, NewCard, NewList,
};

#[allow(async_fn_in_trait)]
pub trait BoardApi {
    async fn fetch_board(&self, board_id: &str) -> Result<BoardSnapshot, ApiError>;

    async fn update_board(&self, board_id: &str, patch: &BoardPatch) -> Result<Board, ApiError>;

    async fn create_list(&self, board_id: &str, request: &NewList) -> Result<List, ApiError>;

    async fn update_list(&self, list_id: &str, patch: &ListPatch) -> Result<List, ApiError>;

    /// `request.parent_id` is the board id.
    async fn move_list(&self, list_id: &str, request: &MoveRequest) -> Result<List, ApiError>;

    async fn delete_list(&self, list_id: &str) -> Result<(), ApiError>;

    async fn create_card(&self, list_id: &str, request: &NewCard) -> Result<Card, ApiError>;

    async fn update_card(&self, card_id: &str, patch: &CardPatch) -> Result<Card, ApiError>;

    async fn move_card(&self, card_id: &str, request: &MoveRequest) -> Result<Card, ApiError>;

    async fn delete_card(&self, card_id: &str) -> Result<(), ApiError>;
}
