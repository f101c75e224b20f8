use async_trait::async_trait;
use shared::{
    domain::{Item, ItemId, ItemPatch},
    protocol::{Credentials, Session},
};
use tokio::sync::broadcast;

pub mod controller;
pub mod error;
pub mod local;
pub mod supabase;
pub mod sync;

pub use controller::{Intent, Screen, ViewController, ViewModel};
pub use error::{AuthError, RemoteError, SyncError};
pub use local::LocalAuth;
pub use supabase::SupabaseClient;
pub use sync::{normalize_item_name, ItemListSynchronizer};

const SESSION_EVENT_CAPACITY: usize = 64;

/// Session transitions published by an [`AuthClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionChange {
    SignedIn(Session),
    SignedOut,
    Expired,
}

#[async_trait]
pub trait AuthClient: Send + Sync {
    async fn sign_in(&self, credentials: &Credentials) -> Result<Session, AuthError>;
    /// `Ok(None)` means the account exists but must be confirmed before a
    /// session is issued.
    async fn sign_up(&self, credentials: &Credentials) -> Result<Option<Session>, AuthError>;
    async fn current_session(&self) -> Option<Session>;
    async fn sign_out(&self);
    fn subscribe_session_changes(&self) -> broadcast::Receiver<SessionChange>;
}

#[async_trait]
pub trait ItemStore: Send + Sync {
    async fn list_items(&self, session: &Session) -> Result<Vec<Item>, RemoteError>;
    async fn create_item(&self, session: &Session, name: &str) -> Result<Item, RemoteError>;
    async fn update_item(
        &self,
        session: &Session,
        item_id: ItemId,
        patch: &ItemPatch,
    ) -> Result<(), RemoteError>;
    async fn delete_item(&self, session: &Session, item_id: ItemId) -> Result<(), RemoteError>;
}

fn session_channel() -> broadcast::Sender<SessionChange> {
    let (events, _) = broadcast::channel(SESSION_EVENT_CAPACITY);
    events
}

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;
