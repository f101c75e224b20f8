//! Auth-state machine that decides between the sign-in screen and the list
//! screen and forwards user intents to the session's synchronizer.

use std::sync::Arc;

use shared::{
    domain::{Item, ItemId},
    protocol::{Credentials, Session},
};
use tokio::sync::broadcast::{
    self,
    error::{RecvError, TryRecvError},
};
use tracing::{debug, info, warn};

use crate::{
    error::AuthError, sync::normalize_item_name, AuthClient, ItemListSynchronizer, ItemStore,
    SessionChange,
};

const SESSION_EXPIRED_NOTICE: &str = "Your session has expired. Please sign in again.";
const SIGNED_OUT_ERROR: &str = "Sign in to manage your shopping list";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Screen {
    #[default]
    Loading,
    SignIn,
    ItemList,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    SignIn(Credentials),
    SignUp(Credentials),
    Add(String),
    Toggle(ItemId),
    Remove(ItemId),
    Rename { item_id: ItemId, name: String },
    Reload,
    SignOut,
}

/// Everything a front-end needs to draw the current screen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewModel {
    pub screen: Screen,
    pub email: Option<String>,
    pub items: Vec<Item>,
    pub error: Option<String>,
    pub notice: Option<String>,
}

struct SessionContext {
    list: ItemListSynchronizer,
    items: Vec<Item>,
}

enum Phase {
    Loading,
    Unauthenticated,
    Authenticated(SessionContext),
}

pub struct ViewController {
    auth: Arc<dyn AuthClient>,
    store: Arc<dyn ItemStore>,
    phase: Phase,
    changes: Option<broadcast::Receiver<SessionChange>>,
    error: Option<String>,
    notice: Option<String>,
}

impl ViewController {
    pub fn new(auth: Arc<dyn AuthClient>, store: Arc<dyn ItemStore>) -> Self {
        let changes = auth.subscribe_session_changes();
        Self {
            auth,
            store,
            phase: Phase::Loading,
            changes: Some(changes),
            error: None,
            notice: None,
        }
    }

    /// Resumes a stored session if the auth service still has one.
    pub async fn start(&mut self) {
        self.phase = Phase::Loading;
        let session = self.auth.current_session().await;
        self.discard_pending_changes();
        match session {
            Some(session) => self.enter_session(session).await,
            None => {
                debug!("no stored session");
                self.phase = Phase::Unauthenticated;
            }
        }
    }

    pub async fn dispatch(&mut self, intent: Intent) {
        self.error = None;
        self.notice = None;

        match intent {
            Intent::SignIn(credentials) => self.authenticate(credentials, false).await,
            Intent::SignUp(credentials) => self.authenticate(credentials, true).await,
            Intent::SignOut => self.sign_out().await,
            intent => self.apply_to_list(intent).await,
        }
    }

    /// Applies a transition the controller did not initiate itself.
    pub async fn handle_session_change(&mut self, change: SessionChange) {
        match change {
            SessionChange::SignedIn(session) => {
                if self
                    .current_session()
                    .is_some_and(|current| current.user_id == session.user_id)
                {
                    debug!(user_id = %session.user_id, "already signed in");
                    return;
                }
                self.error = None;
                self.notice = None;
                self.enter_session(session).await;
            }
            SessionChange::SignedOut => {
                if self.leave_session() {
                    info!("signed out elsewhere");
                }
            }
            SessionChange::Expired => {
                if self.leave_session() {
                    info!("session expired");
                    self.notice = Some(SESSION_EXPIRED_NOTICE.to_string());
                }
            }
        }
    }

    /// Waits for the next session transition. Returns `None` once the
    /// subscription is gone.
    pub async fn next_session_change(&mut self) -> Option<SessionChange> {
        let changes = self.changes.as_mut()?;
        loop {
            match changes.recv().await {
                Ok(change) => return Some(change),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "session change subscriber lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.changes.is_some()
    }

    pub fn teardown(&mut self) {
        self.changes = None;
        self.phase = Phase::Unauthenticated;
        debug!("view controller torn down");
    }

    pub fn screen(&self) -> Screen {
        match self.phase {
            Phase::Loading => Screen::Loading,
            Phase::Unauthenticated => Screen::SignIn,
            Phase::Authenticated(_) => Screen::ItemList,
        }
    }

    pub fn current_session(&self) -> Option<&Session> {
        match &self.phase {
            Phase::Authenticated(context) => Some(context.list.session()),
            _ => None,
        }
    }

    pub fn view(&self) -> ViewModel {
        let (email, items) = match &self.phase {
            Phase::Authenticated(context) => (
                Some(context.list.session().email.clone()),
                context.items.clone(),
            ),
            _ => (None, Vec::new()),
        };
        ViewModel {
            screen: self.screen(),
            email,
            items,
            error: self.error.clone(),
            notice: self.notice.clone(),
        }
    }

    async fn authenticate(&mut self, credentials: Credentials, register: bool) {
        if let Some(session) = self.current_session() {
            self.error = Some(format!("Already signed in as {}", session.email));
            return;
        }

        let credentials = Credentials::new(credentials.email.trim(), credentials.password);
        if credentials.email.is_empty() || credentials.password.is_empty() {
            self.error = Some(AuthError::MissingCredentials.to_string());
            return;
        }

        let result = if register {
            self.auth.sign_up(&credentials).await
        } else {
            self.auth.sign_in(&credentials).await.map(Some)
        };
        // Our own call already published its transition.
        self.discard_pending_changes();

        match result {
            Ok(Some(session)) => self.enter_session(session).await,
            Ok(None) => {
                info!("sign-up awaiting email confirmation");
                self.phase = Phase::Unauthenticated;
                self.notice = Some(format!(
                    "Check {} for a confirmation link, then sign in.",
                    credentials.email
                ));
            }
            Err(error) => {
                warn!(%error, "authentication failed");
                self.phase = Phase::Unauthenticated;
                self.error = Some(error.to_string());
            }
        }
    }

    async fn sign_out(&mut self) {
        // The list must be gone before the remote call is awaited.
        let was_signed_in = self.leave_session();
        self.auth.sign_out().await;
        self.discard_pending_changes();
        if was_signed_in {
            info!("signed out");
        }
    }

    async fn enter_session(&mut self, session: Session) {
        info!(user_id = %session.user_id, "session active");
        self.phase = Phase::Authenticated(SessionContext {
            list: ItemListSynchronizer::new(session, self.store.clone()),
            items: Vec::new(),
        });
        self.apply_to_list(Intent::Reload).await;
    }

    /// Drops the session context. Returns whether one existed.
    fn leave_session(&mut self) -> bool {
        let was_signed_in = matches!(self.phase, Phase::Authenticated(_));
        self.phase = Phase::Unauthenticated;
        was_signed_in
    }

    async fn apply_to_list(&mut self, intent: Intent) {
        let Phase::Authenticated(context) = &mut self.phase else {
            self.error = Some(SIGNED_OUT_ERROR.to_string());
            return;
        };
        let list = &context.list;

        let result = match intent {
            Intent::Add(raw_name) => match normalize_item_name(&raw_name) {
                Ok(name) => list.add(name).await,
                Err(error) => Err(error),
            },
            Intent::Toggle(item_id) => list.toggle(item_id).await,
            Intent::Remove(item_id) => list.remove(item_id).await,
            Intent::Rename { item_id, name } => list.rename(item_id, &name).await,
            Intent::Reload => list.load().await,
            Intent::SignIn(_) | Intent::SignUp(_) | Intent::SignOut => return,
        };

        match result {
            Ok(items) => context.items = items,
            Err(error) => self.error = Some(error.to_string()),
        }
    }

    fn discard_pending_changes(&mut self) {
        let Some(changes) = self.changes.as_mut() else {
            return;
        };
        loop {
            match changes.try_recv() {
                Ok(change) => debug!(?change, "discarding own session change"),
                Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
