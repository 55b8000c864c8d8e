//! REST implementation of the board persistence collaborator.

use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tessera_core::api::BoardApi;
use tessera_core::error::ApiError;
use tessera_core::types::{
    Board, BoardPatch, BoardSnapshot, Card, CardPatch, List, ListPatch, MoveRequest, NewCard, NewList,
};

use crate::config::ClientConfig;

pub struct HttpBoardApi {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpBoardApi {
    pub fn new(base_url: &str, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(&config.api_base_url, config.token.clone())
    }

    /// Join path segments onto the base URL, escaping each id.
    fn url(&self, segments: &[&str]) -> String {
        let mut url = self.base_url.clone();
        for segment in segments {
            url.push('/');
            url.extend(utf8_percent_encode(segment, NON_ALPHANUMERIC));
        }
        url
    }

    fn request(&self, method: Method, segments: &[&str]) -> RequestBuilder {
        let builder = self.client.request(method, self.url(segments));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<reqwest::Response, ApiError> {
        let resp = builder
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        let err = map_status(status.as_u16(), &body);
        log::warn!("[tessera.api] {} -> {}", status, err);
        Err(err)
    }

    async fn fetch<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ApiError> {
        self.send(builder)
            .await?
            .json::<T>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn send_json<B, T>(&self, method: Method, segments: &[&str], body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.fetch(self.request(method, segments).json(body)).await
    }
}

/// Classify a non-success status. The body's `message` (or `error`) field is
/// used as the description when present.
pub fn map_status(status: u16, body: &str) -> ApiError {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("message")
                .or_else(|| v.get("error"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string());
    match status {
        401 | 403 => ApiError::PermissionDenied(message),
        400 | 409 | 422 => ApiError::Validation(message),
        404 => ApiError::NotFound(message),
        _ => ApiError::Server { status, message },
    }
}

impl BoardApi for HttpBoardApi {
    async fn fetch_board(&self, board_id: &str) -> Result<BoardSnapshot, ApiError> {
        self.fetch(self.request(Method::GET, &["boards", board_id]))
            .await
    }

    async fn update_board(&self, board_id: &str, patch: &BoardPatch) -> Result<Board, ApiError> {
        self.send_json(Method::PATCH, &["boards", board_id], patch)
            .await
    }

    async fn create_list(&self, board_id: &str, request: &NewList) -> Result<List, ApiError> {
        self.send_json(Method::POST, &["boards", board_id, "lists"], request)
            .await
    }

    async fn update_list(&self, list_id: &str, patch: &ListPatch) -> Result<List, ApiError> {
        self.send_json(Method::PATCH, &["lists", list_id], patch)
            .await
    }

    async fn move_list(&self, list_id: &str, request: &MoveRequest) -> Result<List, ApiError> {
        self.send_json(Method::PUT, &["lists", list_id, "move"], request)
            .await
    }

    async fn delete_list(&self, list_id: &str) -> Result<(), ApiError> {
        self.send(self.request(Method::DELETE, &["lists", list_id]))
            .await
            .map(|_| ())
    }

    async fn create_card(&self, list_id: &str, request: &NewCard) -> Result<Card, ApiError> {
        self.send_json(Method::POST, &["lists", list_id, "cards"], request)
            .await
    }

    async fn update_card(&self, card_id: &str, patch: &CardPatch) -> Result<Card, ApiError> {
        self.send_json(Method::PATCH, &["cards", card_id], patch)
            .await
    }

    async fn move_card(&self, card_id: &str, request: &MoveRequest) -> Result<Card, ApiError> {
        self.send_json(Method::PUT, &["cards", card_id, "move"], request)
            .await
    }

    async fn delete_card(&self, card_id: &str) -> Result<(), ApiError> {
        self.send(self.request(Method::DELETE, &["cards", card_id]))
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            map_status(403, r#"{"message":"Viewers cannot edit"}"#),
            ApiError::PermissionDenied("Viewers cannot edit".into())
        );
        assert!(matches!(map_status(401, ""), ApiError::PermissionDenied(_)));
        assert_eq!(
            map_status(422, r#"{"error":"title required"}"#),
            ApiError::Validation("title required".into())
        );
        assert!(matches!(map_status(409, "conflict"), ApiError::Validation(_)));
        assert_eq!(map_status(404, "gone\n"), ApiError::NotFound("gone".into()));
        assert_eq!(
            map_status(503, "maintenance"),
            ApiError::Server {
                status: 503,
                message: "maintenance".into()
            }
        );
    }

    #[test]
    fn test_url_escapes_segments() {
        let api = HttpBoardApi::new("https://kanban.example/api/", None);
        assert_eq!(
            api.url(&["cards", "c1", "move"]),
            "https://kanban.example/api/cards/c1/move"
        );
        assert_eq!(
            api.url(&["lists", "a/b c"]),
            "https://kanban.example/api/lists/a%2Fb%20c"
        );
    }
}
