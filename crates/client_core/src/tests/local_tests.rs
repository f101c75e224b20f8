use std::sync::Arc;

use super::*;
use crate::sync::ItemListSynchronizer;

async fn local_backend() -> (Arc<LocalAuth>, Arc<Storage>) {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    (Arc::new(LocalAuth::new(storage.clone())), Arc::new(storage))
}

#[tokio::test]
async fn sign_in_publishes_session_and_reuses_profile() {
    let (auth, _storage) = local_backend().await;
    let mut changes = auth.subscribe_session_changes();

    let first = auth
        .sign_in(&Credentials::new(" Alice@Example.com ", "anything"))
        .await
        .expect("sign in");
    assert_eq!(first.email, "alice@example.com");
    assert_eq!(auth.current_session().await, Some(first.clone()));
    assert_eq!(
        changes.recv().await.expect("event"),
        SessionChange::SignedIn(first.clone())
    );

    auth.sign_out().await;
    assert_eq!(auth.current_session().await, None);
    assert_eq!(changes.recv().await.expect("event"), SessionChange::SignedOut);

    let second = auth
        .sign_up(&Credentials::new("alice@example.com", "other"))
        .await
        .expect("sign up")
        .expect("session");
    assert_eq!(second.user_id, first.user_id);
    assert_ne!(second.access_token, first.access_token);
}

#[tokio::test]
async fn rejects_missing_credentials_and_malformed_email() {
    let (auth, _storage) = local_backend().await;

    assert_eq!(
        auth.sign_in(&Credentials::new("", "pw")).await,
        Err(AuthError::MissingCredentials)
    );
    assert_eq!(
        auth.sign_in(&Credentials::new("alice@example.com", "  ")).await,
        Err(AuthError::MissingCredentials)
    );
    assert!(matches!(
        auth.sign_in(&Credentials::new("alice", "pw")).await,
        Err(AuthError::InvalidEmail(_))
    ));
    assert_eq!(auth.current_session().await, None);
}

#[tokio::test]
async fn sign_out_without_session_is_silent() {
    let (auth, _storage) = local_backend().await;
    let mut changes = auth.subscribe_session_changes();

    auth.sign_out().await;

    assert!(matches!(
        changes.try_recv(),
        Err(broadcast::error::TryRecvError::Empty)
    ));
}

#[tokio::test]
async fn storage_store_reports_missing_rows() {
    let (auth, storage) = local_backend().await;
    let session = auth
        .sign_in(&Credentials::new("bob@example.com", "pw"))
        .await
        .expect("sign in");
    let missing = ItemId::new_random();

    assert_eq!(
        ItemStore::update_item(
            storage.as_ref(),
            &session,
            missing,
            &ItemPatch::completed(true)
        )
        .await,
        Err(RemoteError::NotFound(missing))
    );
    assert_eq!(
        ItemStore::delete_item(storage.as_ref(), &session, missing).await,
        Err(RemoteError::NotFound(missing))
    );
    assert_eq!(
        ItemStore::update_item(storage.as_ref(), &session, missing, &ItemPatch::default()).await,
        Ok(())
    );
}

#[tokio::test]
async fn list_survives_sign_out_and_sign_in() {
    let (auth, storage) = local_backend().await;
    let credentials = Credentials::new("carol@example.com", "pw");
    let store: Arc<dyn ItemStore> = storage.clone();

    let session = auth.sign_in(&credentials).await.expect("sign in");
    let list = ItemListSynchronizer::new(session, store.clone());
    for name in ["rice", "milk", "corn"] {
        list.add(name).await.expect("add");
    }
    let snapshot = list.snapshot().await;
    list.toggle(snapshot[1].id).await.expect("toggle milk");
    let expected = list.remove(snapshot[0].id).await.expect("remove corn");
    drop(list);
    auth.sign_out().await;

    let session = auth.sign_in(&credentials).await.expect("sign in again");
    let list = ItemListSynchronizer::new(session, store);
    let reloaded = list.load().await.expect("load");

    assert_eq!(reloaded, expected);
    let names: Vec<&str> = reloaded.iter().map(|item| item.name.as_str()).collect();
    assert_eq!(names, ["milk", "rice"]);
    assert!(reloaded[0].completed);
    assert!(!reloaded[1].completed);
}
