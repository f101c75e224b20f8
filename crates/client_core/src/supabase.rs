//! Hosted backend: GoTrue auth endpoints and the PostgREST `shopping_items`
//! table of a Supabase project.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use shared::{
    domain::{Item, ItemId, ItemPatch, UserId},
    error::ApiError,
    protocol::{Credentials, NewItemRow, Session},
};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    error::{AuthError, RemoteError},
    session_channel, AuthClient, ItemStore, SessionChange,
};

const ITEMS_TABLE: &str = "rest/v1/shopping_items";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: AuthUser,
}

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: UserId,
    #[serde(default)]
    email: Option<String>,
}

/// Error body shapes returned by GoTrue and PostgREST.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_code: Option<String>,
}

impl ErrorBody {
    fn parse(raw: &str) -> Self {
        serde_json::from_str(raw).unwrap_or_default()
    }

    fn message(&self) -> Option<&str> {
        [
            &self.msg,
            &self.error_description,
            &self.message,
            &self.error,
        ]
        .into_iter()
        .flatten()
        .map(String::as_str)
        .find(|message| !message.trim().is_empty())
    }

    fn message_or(&self, status: StatusCode) -> String {
        self.message().map(str::to_string).unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        })
    }
}

pub struct SupabaseClient {
    http: Client,
    base_url: Url,
    anon_key: String,
    session: Mutex<Option<Session>>,
    events: broadcast::Sender<SessionChange>,
}

impl SupabaseClient {
    pub fn new(base_url: &str, anon_key: impl Into<String>) -> Result<Arc<Self>> {
        let mut base_url = base_url.trim().to_string();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        let base_url = Url::parse(&base_url)
            .with_context(|| format!("invalid Supabase url '{base_url}'"))?;

        Ok(Arc::new(Self {
            http: Client::new(),
            base_url,
            anon_key: anon_key.into(),
            session: Mutex::new(None),
            events: session_channel(),
        }))
    }

    fn endpoint(&self, path: &str) -> Result<Url, url::ParseError> {
        self.base_url.join(path)
    }

    fn auth_request(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.anon_key)
            .bearer_auth(&self.anon_key)
    }

    async fn request_session(
        &self,
        path: &str,
        credentials: &Credentials,
    ) -> Result<Option<Session>, AuthError> {
        let email = credentials.email.trim();
        if email.is_empty() || credentials.password.is_empty() {
            return Err(AuthError::MissingCredentials);
        }

        let url = self
            .endpoint(path)
            .map_err(|err| AuthError::Unavailable(err.to_string()))?;
        let response = self
            .auth_request(self.http.post(url))
            .json(&serde_json::json!({
                "email": email,
                "password": credentials.password,
            }))
            .send()
            .await
            .map_err(|err| AuthError::Unavailable(err.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| AuthError::Unavailable(err.to_string()))?;
        if !status.is_success() {
            return Err(auth_error_from(status, &body));
        }

        let value: serde_json::Value = serde_json::from_str(&body)
            .map_err(|err| AuthError::Unavailable(format!("malformed auth response: {err}")))?;
        if value.get("access_token").is_none() {
            return Ok(None);
        }
        let token: TokenResponse = serde_json::from_value(value)
            .map_err(|err| AuthError::Unavailable(format!("malformed auth response: {err}")))?;

        let session = session_from_token(token, email, Utc::now());
        *self.session.lock().await = Some(session.clone());
        info!(user_id = %session.user_id, "signed in to Supabase");
        let _ = self.events.send(SessionChange::SignedIn(session.clone()));
        Ok(Some(session))
    }

    /// Sends a data request on behalf of `session`. A 401 means the token is
    /// no longer accepted, so the stored session is dropped and `Expired` is
    /// published.
    async fn send_authorized(
        &self,
        builder: RequestBuilder,
        session: &Session,
    ) -> Result<Response, RemoteError> {
        let response = builder
            .header("apikey", &self.anon_key)
            .bearer_auth(&session.access_token)
            .send()
            .await
            .map_err(|err| RemoteError::Unavailable(err.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::UNAUTHORIZED {
            self.expire(session).await;
            return Err(RemoteError::Unauthorized);
        }
        let message = ErrorBody::parse(&body).message_or(status);
        if status.is_server_error() {
            return Err(RemoteError::Unavailable(format!("{status}: {message}")));
        }
        Err(RemoteError::Rejected(ApiError::from_http_status(
            status.as_u16(),
            message,
        )))
    }

    async fn expire(&self, session: &Session) {
        let mut guard = self.session.lock().await;
        let is_current = guard
            .as_ref()
            .is_some_and(|current| current.access_token == session.access_token);
        if is_current {
            guard.take();
            drop(guard);
            warn!(user_id = %session.user_id, "Supabase session expired");
            let _ = self.events.send(SessionChange::Expired);
        }
    }

    fn items_url(&self) -> Result<Url, RemoteError> {
        self.endpoint(ITEMS_TABLE)
            .map_err(|err| RemoteError::Unavailable(err.to_string()))
    }
}

fn session_from_token(token: TokenResponse, email: &str, now: DateTime<Utc>) -> Session {
    let expires_at = token
        .expires_at
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .or_else(|| token.expires_in.map(|secs| now + Duration::seconds(secs)));
    Session {
        access_token: token.access_token,
        user_id: token.user.id,
        email: token.user.email.unwrap_or_else(|| email.to_string()),
        expires_at,
    }
}

fn auth_error_from(status: StatusCode, raw_body: &str) -> AuthError {
    let body = ErrorBody::parse(raw_body);
    let message = body.message_or(status);
    let code = body.error_code.as_deref().unwrap_or_default();
    let lower = message.to_ascii_lowercase();

    if status.is_server_error() {
        return AuthError::Unavailable(message);
    }
    if code == "invalid_credentials" || lower.contains("invalid login credentials") {
        AuthError::InvalidCredentials
    } else if code == "email_not_confirmed" || lower.contains("email not confirmed") {
        AuthError::EmailNotConfirmed
    } else if code == "weak_password" || lower.contains("password should be") {
        AuthError::WeakPassword(message)
    } else if code == "email_address_invalid"
        || code == "validation_failed"
        || lower.contains("email address")
    {
        AuthError::InvalidEmail(message)
    } else {
        AuthError::Rejected(message)
    }
}

fn decode_error(err: reqwest::Error) -> RemoteError {
    RemoteError::Decode(err.to_string())
}

#[async_trait]
impl AuthClient for SupabaseClient {
    async fn sign_in(&self, credentials: &Credentials) -> Result<Session, AuthError> {
        self.request_session("auth/v1/token?grant_type=password", credentials)
            .await?
            .ok_or_else(|| AuthError::Unavailable("sign-in returned no session".to_string()))
    }

    async fn sign_up(&self, credentials: &Credentials) -> Result<Option<Session>, AuthError> {
        self.request_session("auth/v1/signup", credentials).await
    }

    async fn current_session(&self) -> Option<Session> {
        let mut guard = self.session.lock().await;
        if guard.as_ref().is_some_and(Session::is_expired) {
            guard.take();
            drop(guard);
            info!("stored Supabase session has expired");
            let _ = self.events.send(SessionChange::Expired);
            return None;
        }
        guard.clone()
    }

    async fn sign_out(&self) {
        let Some(session) = self.session.lock().await.take() else {
            return;
        };

        match self.endpoint("auth/v1/logout") {
            Ok(url) => {
                let result = self
                    .http
                    .post(url)
                    .header("apikey", &self.anon_key)
                    .bearer_auth(&session.access_token)
                    .send()
                    .await
                    .and_then(Response::error_for_status);
                if let Err(error) = result {
                    warn!(%error, "Supabase logout request failed; session dropped locally");
                }
            }
            Err(error) => warn!(%error, "invalid Supabase logout url"),
        }

        info!(user_id = %session.user_id, "signed out of Supabase");
        let _ = self.events.send(SessionChange::SignedOut);
    }

    fn subscribe_session_changes(&self) -> broadcast::Receiver<SessionChange> {
        self.events.subscribe()
    }
}

#[async_trait]
impl ItemStore for SupabaseClient {
    async fn list_items(&self, session: &Session) -> Result<Vec<Item>, RemoteError> {
        let owner_filter = format!("eq.{}", session.user_id);
        debug!(user_id = %session.user_id, "listing shopping_items");
        let request = self.http.get(self.items_url()?).query(&[
            ("select", "*"),
            ("user_id", owner_filter.as_str()),
            ("order", "created_at.desc"),
        ]);
        self.send_authorized(request, session)
            .await?
            .json()
            .await
            .map_err(decode_error)
    }

    async fn create_item(&self, session: &Session, name: &str) -> Result<Item, RemoteError> {
        let row = NewItemRow {
            user_id: session.user_id,
            name: name.to_string(),
            completed: false,
        };
        debug!(user_id = %session.user_id, "inserting shopping_items row");
        let request = self
            .http
            .post(self.items_url()?)
            .header("Prefer", "return=representation")
            .json(&row);
        let mut rows: Vec<Item> = self
            .send_authorized(request, session)
            .await?
            .json()
            .await
            .map_err(decode_error)?;
        if rows.is_empty() {
            return Err(RemoteError::Decode(
                "insert returned no representation".to_string(),
            ));
        }
        Ok(rows.swap_remove(0))
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
        let id_filter = format!("eq.{item_id}");
        debug!(%item_id, "updating shopping_items row");
        let request = self
            .http
            .patch(self.items_url()?)
            .query(&[("id", id_filter.as_str())])
            .json(patch);
        self.send_authorized(request, session).await?;
        Ok(())
    }

    async fn delete_item(&self, session: &Session, item_id: ItemId) -> Result<(), RemoteError> {
        let id_filter = format!("eq.{item_id}");
        debug!(%item_id, "deleting shopping_items row");
        let request = self
            .http
            .delete(self.items_url()?)
            .query(&[("id", id_filter.as_str())]);
        self.send_authorized(request, session).await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/supabase_tests.rs"]
mod tests;
