use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use teloxide::types::ChatId;
use tokio::sync::Mutex;

use crate::auth::Credential;

/// An authorised connection for one chat.
#[derive(Debug, Clone)]
pub struct Session {
    pub credential: Credential,
    pub connected_at: DateTime<Utc>,
}

#[derive(Default)]
struct Inner {
    sessions: HashMap<ChatId, Session>,
    pending: HashMap<ChatId, String>,
}

/// Per-chat sessions and in-flight authorization handshakes.
///
/// A session is created when a handshake completes and removed on
/// disconnect or when its credential turns out to be unusable. Nothing is
/// written to disk.
#[derive(Clone, Default)]
pub struct SessionStore {
    inner: Arc<Mutex<Inner>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a handshake for `chat` and return its state token.
    pub async fn begin_handshake(&self, chat: ChatId) -> String {
        let state = uuid::Uuid::new_v4().simple().to_string();
        self.inner.lock().await.pending.insert(chat, state.clone());
        state
    }

    /// Consume the pending handshake; `false` if none exists or the state
    /// token does not match.
    pub async fn finish_handshake(&self, chat: ChatId, state: Option<&str>) -> bool {
        let mut inner = self.inner.lock().await;
        let accepted = match (inner.pending.get(&chat), state) {
            (Some(expected), Some(given)) => expected == given,
            (Some(_), None) => {
                log::warn!(
                    "Session: chat {} sent a bare code, state check skipped",
                    chat
                );
                true
            }
            (None, _) => false,
        };
        if accepted {
            inner.pending.remove(&chat);
        }
        accepted
    }

    pub async fn connect(&self, chat: ChatId, credential: Credential) {
        let session = Session {
            credential,
            connected_at: Utc::now(),
        };
        self.inner.lock().await.sessions.insert(chat, session);
        log::info!("Session: chat {} connected", chat);
    }

    pub async fn get(&self, chat: ChatId) -> Option<Session> {
        self.inner.lock().await.sessions.get(&chat).cloned()
    }

    /// Drop the chat's credential; `true` if there was one.
    pub async fn disconnect(&self, chat: ChatId) -> bool {
        let mut inner = self.inner.lock().await;
        inner.pending.remove(&chat);
        let removed = inner.sessions.remove(&chat).is_some();
        if removed {
            log::info!("Session: chat {} disconnected", chat);
        }
        removed
    }
}
