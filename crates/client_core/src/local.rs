//! Self-hosted backend: item rows in the local SQLite [`Storage`] and a
//! profile sign-in that accepts any non-empty credentials.
//!
//! Passwords are neither stored nor checked; a profile is identified by its
//! email alone.

use async_trait::async_trait;
use shared::{
    domain::{Item, ItemId, ItemPatch},
    protocol::{Credentials, Session},
};
use storage::Storage;
use tokio::sync::{broadcast, Mutex};
use tracing::info;
use uuid::Uuid;

use crate::{
    error::{AuthError, RemoteError},
    session_channel, AuthClient, ItemStore, SessionChange,
};

pub struct LocalAuth {
    storage: Storage,
    session: Mutex<Option<Session>>,
    events: broadcast::Sender<SessionChange>,
}

impl LocalAuth {
    pub fn new(storage: Storage) -> Self {
        Self {
            storage,
            session: Mutex::new(None),
            events: session_channel(),
        }
    }

    async fn open_session(&self, credentials: &Credentials) -> Result<Session, AuthError> {
        let email = validate_credentials(credentials)?;
        let user_id = self
            .storage
            .upsert_user(&email)
            .await
            .map_err(|error| AuthError::Unavailable(format!("{error:#}")))?;

        let session = Session {
            access_token: format!("local-{}", Uuid::new_v4()),
            user_id,
            email,
            expires_at: None,
        };
        *self.session.lock().await = Some(session.clone());
        info!(%user_id, "local profile signed in");
        let _ = self.events.send(SessionChange::SignedIn(session.clone()));
        Ok(session)
    }
}

fn validate_credentials(credentials: &Credentials) -> Result<String, AuthError> {
    let email = credentials.email.trim().to_ascii_lowercase();
    if email.is_empty() || credentials.password.trim().is_empty() {
        return Err(AuthError::MissingCredentials);
    }
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(email),
        _ => Err(AuthError::InvalidEmail(format!(
            "Unable to validate email address: invalid format ({email})"
        ))),
    }
}

#[async_trait]
impl AuthClient for LocalAuth {
    async fn sign_in(&self, credentials: &Credentials) -> Result<Session, AuthError> {
        self.open_session(credentials).await
    }

    async fn sign_up(&self, credentials: &Credentials) -> Result<Option<Session>, AuthError> {
        self.open_session(credentials).await.map(Some)
    }

    async fn current_session(&self) -> Option<Session> {
        self.session.lock().await.clone()
    }

    async fn sign_out(&self) {
        if let Some(session) = self.session.lock().await.take() {
            info!(user_id = %session.user_id, "local profile signed out");
            let _ = self.events.send(SessionChange::SignedOut);
        }
    }

    fn subscribe_session_changes(&self) -> broadcast::Receiver<SessionChange> {
        self.events.subscribe()
    }
}

fn unavailable(error: anyhow::Error) -> RemoteError {
    RemoteError::Unavailable(format!("{error:#}"))
}

#[async_trait]
impl ItemStore for Storage {
    async fn list_items(&self, session: &Session) -> Result<Vec<Item>, RemoteError> {
        Storage::list_items(self, session.user_id)
            .await
            .map_err(unavailable)
    }

    async fn create_item(&self, session: &Session, name: &str) -> Result<Item, RemoteError> {
        self.insert_item(session.user_id, name)
            .await
            .map_err(unavailable)
    }

    async fn update_item(
        &self,
        session: &Session,
        item_id: ItemId,
        patch: &ItemPatch,
    ) -> Result<(), RemoteError> {
        if patch.is_empty() {
            return Ok(());
        }
        let updated = Storage::update_item(
            self,
            session.user_id,
            item_id,
            patch.name.as_deref(),
            patch.completed,
        )
        .await
        .map_err(unavailable)?;
        if !updated {
            return Err(RemoteError::NotFound(item_id));
        }
        Ok(())
    }

    async fn delete_item(&self, session: &Session, item_id: ItemId) -> Result<(), RemoteError> {
        let deleted = Storage::delete_item(self, session.user_id, item_id)
            .await
            .map_err(unavailable)?;
        if !deleted {
            return Err(RemoteError::NotFound(item_id));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/local_tests.rs"]
mod tests;
