use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, TimeZone, Utc};
use shared::domain::UserId;

use super::*;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum FakeOp {
    SignIn,
    SignUp,
    SignOut,
    List,
    Create,
    Update,
    Delete,
}

#[derive(Default)]
struct FakeState {
    rows: Vec<Item>,
    ticks: i64,
    failing: HashSet<FakeOp>,
    calls: Vec<FakeOp>,
    accounts: HashMap<String, (String, UserId)>,
    session: Option<Session>,
    require_confirmation: bool,
    leak_foreign_rows: bool,
}

/// In-memory auth service and item store with failure injection.
pub(crate) struct FakeRemote {
    state: Mutex<FakeState>,
    events: broadcast::Sender<SessionChange>,
}

impl FakeRemote {
    pub(crate) fn new() -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self {
            state: Mutex::new(FakeState::default()),
            events: session_channel(),
        })
    }

    pub(crate) async fn register(&self, email: &str, password: &str) -> UserId {
        let user_id = UserId::new_random();
        self.state
            .lock()
            .await
            .accounts
            .insert(email.to_string(), (password.to_string(), user_id));
        user_id
    }

    pub(crate) fn session_for(user_id: UserId, email: &str) -> Session {
        Session {
            access_token: format!("token-{user_id}"),
            user_id,
            email: email.to_string(),
            expires_at: None,
        }
    }

    pub(crate) async fn set_current_session(&self, session: Option<Session>) {
        self.state.lock().await.session = session;
    }

    pub(crate) async fn fail(&self, op: FakeOp, failing: bool) {
        let mut state = self.state.lock().await;
        if failing {
            state.failing.insert(op);
        } else {
            state.failing.remove(&op);
        }
    }

    pub(crate) async fn require_confirmation(&self) {
        self.state.lock().await.require_confirmation = true;
    }

    pub(crate) async fn leak_foreign_rows(&self) {
        self.state.lock().await.leak_foreign_rows = true;
    }

    pub(crate) async fn calls(&self, op: FakeOp) -> usize {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter(|call| **call == op)
            .count()
    }

    pub(crate) async fn total_calls(&self) -> usize {
        self.state.lock().await.calls.len()
    }

    pub(crate) async fn seed_row(&self, owner: UserId, name: &str) -> Item {
        let mut state = self.state.lock().await;
        let item = Item {
            id: ItemId::new_random(),
            owner,
            name: name.to_string(),
            completed: false,
            created_at: next_timestamp(&mut state),
        };
        state.rows.push(item.clone());
        item
    }

    pub(crate) async fn rows_for(&self, owner: UserId) -> Vec<Item> {
        let state = self.state.lock().await;
        newest_first(state.rows.iter().filter(|row| row.owner == owner))
    }

    pub(crate) fn emit(&self, change: SessionChange) {
        let _ = self.events.send(change);
    }

    async fn enter(&self, op: FakeOp) -> Result<(), String> {
        let mut state = self.state.lock().await;
        state.calls.push(op);
        if state.failing.contains(&op) {
            return Err(format!("injected {op:?} failure"));
        }
        Ok(())
    }
}

fn next_timestamp(state: &mut FakeState) -> DateTime<Utc> {
    state.ticks += 1;
    Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap() + Duration::seconds(state.ticks)
}

fn newest_first<'a>(rows: impl Iterator<Item = &'a Item>) -> Vec<Item> {
    let mut rows: Vec<Item> = rows.cloned().collect();
    rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    rows
}

#[async_trait]
impl AuthClient for FakeRemote {
    async fn sign_in(&self, credentials: &Credentials) -> Result<Session, AuthError> {
        self.enter(FakeOp::SignIn)
            .await
            .map_err(AuthError::Unavailable)?;
        let session = {
            let mut state = self.state.lock().await;
            let (password, user_id) = state
                .accounts
                .get(&credentials.email)
                .cloned()
                .ok_or(AuthError::InvalidCredentials)?;
            if password != credentials.password {
                return Err(AuthError::InvalidCredentials);
            }
            let session = Self::session_for(user_id, &credentials.email);
            state.session = Some(session.clone());
            session
        };
        self.emit(SessionChange::SignedIn(session.clone()));
        Ok(session)
    }

    async fn sign_up(&self, credentials: &Credentials) -> Result<Option<Session>, AuthError> {
        self.enter(FakeOp::SignUp)
            .await
            .map_err(AuthError::Unavailable)?;
        if credentials.password.len() < 6 {
            return Err(AuthError::WeakPassword(
                "Password should be at least 6 characters.".to_string(),
            ));
        }
        let user_id = self.register(&credentials.email, &credentials.password).await;
        if self.state.lock().await.require_confirmation {
            return Ok(None);
        }
        let session = Self::session_for(user_id, &credentials.email);
        self.state.lock().await.session = Some(session.clone());
        self.emit(SessionChange::SignedIn(session.clone()));
        Ok(Some(session))
    }

    async fn current_session(&self) -> Option<Session> {
        self.state.lock().await.session.clone()
    }

    async fn sign_out(&self) {
        let _ = self.enter(FakeOp::SignOut).await;
        self.state.lock().await.session = None;
        self.emit(SessionChange::SignedOut);
    }

    fn subscribe_session_changes(&self) -> broadcast::Receiver<SessionChange> {
        self.events.subscribe()
    }
}

#[async_trait]
impl ItemStore for FakeRemote {
    async fn list_items(&self, session: &Session) -> Result<Vec<Item>, RemoteError> {
        self.enter(FakeOp::List)
            .await
            .map_err(RemoteError::Unavailable)?;
        let state = self.state.lock().await;
        let leak = state.leak_foreign_rows;
        Ok(newest_first(
            state
                .rows
                .iter()
                .filter(|row| leak || row.owner == session.user_id),
        ))
    }

    async fn create_item(&self, session: &Session, name: &str) -> Result<Item, RemoteError> {
        self.enter(FakeOp::Create)
            .await
            .map_err(RemoteError::Unavailable)?;
        let mut state = self.state.lock().await;
        let item = Item {
            id: ItemId::new_random(),
            owner: session.user_id,
            name: name.to_string(),
            completed: false,
            created_at: next_timestamp(&mut state),
        };
        state.rows.push(item.clone());
        Ok(item)
    }

    async fn update_item(
        &self,
        session: &Session,
        item_id: ItemId,
        patch: &ItemPatch,
    ) -> Result<(), RemoteError> {
        self.enter(FakeOp::Update)
            .await
            .map_err(RemoteError::Unavailable)?;
        let mut state = self.state.lock().await;
        let row = state
            .rows
            .iter_mut()
            .find(|row| row.id == item_id && row.owner == session.user_id)
            .ok_or(RemoteError::NotFound(item_id))?;
        patch.apply_to(row);
        Ok(())
    }

    async fn delete_item(&self, session: &Session, item_id: ItemId) -> Result<(), RemoteError> {
        self.enter(FakeOp::Delete)
            .await
            .map_err(RemoteError::Unavailable)?;
        let mut state = self.state.lock().await;
        let before = state.rows.len();
        state
            .rows
            .retain(|row| !(row.id == item_id && row.owner == session.user_id));
        if state.rows.len() == before {
            return Err(RemoteError::NotFound(item_id));
        }
        Ok(())
    }
}
