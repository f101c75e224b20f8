//! Write-through mirror of one user's shopping list.

use std::{collections::HashSet, sync::Arc};

use shared::{
    domain::{Item, ItemId, ItemPatch},
    protocol::Session,
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
    error::{RemoteError, SyncError},
    ItemStore,
};

/// Trims `raw` and rejects names that are empty afterwards.
pub fn normalize_item_name(raw: &str) -> Result<&str, SyncError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(SyncError::InvalidInput(
            "item name must not be empty".to_string(),
        ));
    }
    Ok(name)
}

/// Keeps the in-memory list of a single session consistent with the remote
/// store.
///
/// Every mutation goes to the store first and touches the local snapshot only
/// after the store accepted it, so a failed call leaves the snapshot exactly
/// as it was. Mutations are not queued: the snapshot lock is never held
/// across a remote call, and when two calls race on the same item the
/// response applied last wins.
pub struct ItemListSynchronizer {
    session: Session,
    store: Arc<dyn ItemStore>,
    snapshot: Mutex<Vec<Item>>,
}

impl ItemListSynchronizer {
    pub fn new(session: Session, store: Arc<dyn ItemStore>) -> Self {
        Self {
            session,
            store,
            snapshot: Mutex::new(Vec::new()),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub async fn snapshot(&self) -> Vec<Item> {
        self.snapshot.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.snapshot.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.snapshot.lock().await.is_empty()
    }

    /// Replaces the snapshot with the store's rows, newest first.
    pub async fn load(&self) -> Result<Vec<Item>, SyncError> {
        let user_id = self.session.user_id;
        debug!(%user_id, "loading shopping list");

        let mut items = self.store.list_items(&self.session).await.map_err(|error| {
            warn!(%user_id, %error, "failed to load shopping list");
            SyncError::RemoteUnavailable(error)
        })?;

        let fetched = items.len();
        items.retain(|item| item.owner == user_id);
        if items.len() != fetched {
            warn!(
                %user_id,
                dropped = fetched - items.len(),
                "dropped rows owned by another user"
            );
        }

        // Stable sort: rows with equal timestamps keep the store's order.
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let mut seen = HashSet::with_capacity(items.len());
        items.retain(|item| seen.insert(item.id));

        let mut guard = self.snapshot.lock().await;
        *guard = items;
        info!(%user_id, count = guard.len(), "shopping list loaded");
        Ok(guard.clone())
    }

    pub async fn add(&self, raw_name: &str) -> Result<Vec<Item>, SyncError> {
        let name = normalize_item_name(raw_name)?;
        let user_id = self.session.user_id;

        let item = self
            .store
            .create_item(&self.session, name)
            .await
            .map_err(|error| {
                warn!(%user_id, %error, "failed to create item");
                SyncError::Remote(error)
            })?;
        if item.owner != user_id {
            warn!(%user_id, item_id = %item.id, "store returned an item owned by another user");
            return Err(SyncError::Remote(RemoteError::Decode(format!(
                "created item {} belongs to another user",
                item.id
            ))));
        }

        debug!(%user_id, item_id = %item.id, "item created");
        let mut guard = self.snapshot.lock().await;
        guard.retain(|existing| existing.id != item.id);
        guard.insert(0, item);
        Ok(guard.clone())
    }

    /// Flips the completed flag of a listed item.
    pub async fn toggle(&self, item_id: ItemId) -> Result<Vec<Item>, SyncError> {
        let completed = !self.require_item(item_id).await?.completed;
        self.apply_patch(item_id, ItemPatch::completed(completed))
            .await
    }

    pub async fn rename(&self, item_id: ItemId, raw_name: &str) -> Result<Vec<Item>, SyncError> {
        let name = normalize_item_name(raw_name)?;
        self.require_item(item_id).await?;
        self.apply_patch(item_id, ItemPatch::renamed(name)).await
    }

    pub async fn remove(&self, item_id: ItemId) -> Result<Vec<Item>, SyncError> {
        self.require_item(item_id).await?;
        self.store
            .delete_item(&self.session, item_id)
            .await
            .map_err(|error| {
                warn!(%item_id, %error, "failed to delete item");
                SyncError::Remote(error)
            })?;

        debug!(%item_id, "item deleted");
        let mut guard = self.snapshot.lock().await;
        guard.retain(|item| item.id != item_id);
        Ok(guard.clone())
    }

    async fn require_item(&self, item_id: ItemId) -> Result<Item, SyncError> {
        self.snapshot
            .lock()
            .await
            .iter()
            .find(|item| item.id == item_id)
            .cloned()
            .ok_or(SyncError::UnknownItem(item_id))
    }

    async fn apply_patch(&self, item_id: ItemId, patch: ItemPatch) -> Result<Vec<Item>, SyncError> {
        self.store
            .update_item(&self.session, item_id, &patch)
            .await
            .map_err(|error| {
                warn!(%item_id, %error, "failed to update item");
                SyncError::Remote(error)
            })?;

        debug!(%item_id, ?patch, "item updated");
        let mut guard = self.snapshot.lock().await;
        // The item may have been removed while the update was in flight.
        if let Some(item) = guard.iter_mut().find(|item| item.id == item_id) {
            patch.apply_to(item);
        }
        Ok(guard.clone())
    }
}

#[cfg(test)]
#[path = "tests/sync_tests.rs"]
mod tests;
