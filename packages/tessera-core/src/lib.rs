pub mod api;
pub mod config;
pub mod error;
pub mod ids;
pub mod manager;
pub mod optimistic;
pub mod pending;
pub mod presence;
pub mod reconcile;
pub mod reindex;
pub mod session;
pub mod store;
pub mod sync;
pub mod types;

pub use api::BoardApi;
pub use error::{ApiError, MutationError};
pub use manager::MutationManager;
pub use reconcile::Reconciled;
pub use session::{lock_session, BoardSession, ExitReason, RoomState, SharedSession};
pub use store::BoardStore;
