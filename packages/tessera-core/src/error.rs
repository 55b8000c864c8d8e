use crate::types::Role;

/// Failure reported by the persistence collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Server error {status}: {message}")]
    Server { status: u16, message: String },

    #[error("Malformed response: {0}")]
    Decode(String),
}

/// Failure of a user-initiated mutation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MutationError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Unknown entity: {0}")]
    UnknownEntity(String),

    #[error("Unknown parent: {0}")]
    UnknownParent(String),

    #[error("Entity {0} is still waiting for server confirmation")]
    Pending(String),

    #[error("User {user_id} has read-only access ({role:?})")]
    ReadOnly { user_id: String, role: Role },

    #[error("Board session is closed")]
    SessionClosed,
}

impl MutationError {
    /// The caller lacks write access, whether the server or the local role
    /// check said so. The UI shows a read-only notice for these.
    pub fn is_permission_denied(&self) -> bool {
        matches!(
            self,
            MutationError::Api(ApiError::PermissionDenied(_)) | MutationError::ReadOnly { .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, MutationError::Api(ApiError::NotFound(_)))
    }

    /// The server rejected a change that was already applied locally; only a
    /// full hydrate restores ground truth.
    pub fn needs_rehydrate(&self) -> bool {
        matches!(self, MutationError::Api(_))
    }
}
