//! Shared fixtures for unit tests: an in-process fake backend, a recording
//! navigator, and pre-built sessions.

use std::sync::{Arc, Mutex};

use crate::config::ClientConfig;
use crate::guard::Navigator;
use crate::session::{SessionStore, SignInPayload};
use crate::storage::MemoryStore;

/// Serve `router` on an ephemeral local port and return its base URL.
pub async fn serve(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("fake backend failed");
    });
    format!("http://{addr}")
}

/// A base URL nothing is listening on.
pub async fn dead_base_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    format!("http://{addr}")
}

/// Navigator that records every redirect.
#[derive(Default)]
pub struct RecordingNavigator {
    redirects: Mutex<Vec<Option<String>>>,
}

impl RecordingNavigator {
    pub fn redirects(&self) -> Vec<Option<String>> {
        self.redirects.lock().expect("navigator mutex").clone()
    }
}

impl Navigator for RecordingNavigator {
    fn redirect_to_sign_in(&self, from: Option<&str>) {
        self.redirects
            .lock()
            .expect("navigator mutex")
            .push(from.map(str::to_owned));
    }
}

/// Session store over fresh memory storage, signed in when `access_token` is given.
pub fn session_with(access_token: Option<&str>, refresh_token: &str) -> (Arc<MemoryStore>, SessionStore) {
    let backing = Arc::new(MemoryStore::new());
    let session = SessionStore::load(backing.clone()).expect("load session");
    if let Some(access_token) = access_token {
        session
            .sign_in(SignInPayload {
                user_id: "u1".into(),
                email: "a@b.com".into(),
                access_token: access_token.into(),
                refresh_token: refresh_token.into(),
            })
            .expect("sign in");
    }
    (backing, session)
}

/// API client against `base_url` with a recording navigator.
pub fn client_for(base_url: &str, session: SessionStore) -> (crate::api::ApiClient, Arc<RecordingNavigator>) {
    let navigator = Arc::new(RecordingNavigator::default());
    let config = ClientConfig::with_base_url(base_url);
    let client = crate::api::ApiClient::new(&config, session, navigator.clone()).expect("build client");
    (client, navigator)
}
