//! Chat session store.
//!
//! Conversations are keyed by id and owned here rather than in a global map:
//! idle sessions are evicted after a TTL so an abandoned conversation cannot
//! hold its history forever. Eviction is piggybacked on access, no sweeper
//! task needed.

use crate::generation::{ChatTurn, Role};
use std::{collections::HashMap, time::Duration};
use tokio::{sync::Mutex, time::Instant};
use uuid::Uuid;

struct ChatSession {
    history: Vec<ChatTurn>,
    last_used: Instant,
}

pub struct ChatSessions {
    ttl: Duration,
    inner: Mutex<HashMap<Uuid, ChatSession>>,
}

impl ChatSessions {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// History for a conversation, refreshing its TTL. Unknown or expired ids
    /// yield an empty history, which starts a fresh conversation under the
    /// same id.
    pub async fn history(&self, id: Uuid) -> Vec<ChatTurn> {
        let mut sessions = self.inner.lock().await;
        let now = Instant::now();
        sessions.retain(|_, s| now.duration_since(s.last_used) < self.ttl);

        match sessions.get_mut(&id) {
            Some(session) => {
                session.last_used = now;
                session.history.clone()
            }
            None => Vec::new(),
        }
    }

    /// Record one completed exchange.
    pub async fn append(&self, id: Uuid, message: &str, reply: &str) {
        let mut sessions = self.inner.lock().await;
        let now = Instant::now();
        sessions.retain(|_, s| now.duration_since(s.last_used) < self.ttl);

        let session = sessions.entry(id).or_insert_with(|| ChatSession {
            history: Vec::new(),
            last_used: now,
        });
        session.history.push(ChatTurn {
            role: Role::User,
            content: message.to_string(),
        });
        session.history.push(ChatTurn {
            role: Role::Model,
            content: reply.to_string(),
        });
        session.last_used = now;
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn history_accumulates_per_conversation() {
        let sessions = ChatSessions::new(Duration::from_secs(60));
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        sessions.append(a, "hi", "hello").await;
        sessions.append(a, "how are you", "fine").await;
        sessions.append(b, "other", "conversation").await;

        let history = sessions.history(a).await;
        assert_eq!(history.len(), 4);
        assert_eq!(history[0].content, "hi");
        assert_eq!(history[3].content, "fine");

        assert_eq!(sessions.history(b).await.len(), 2);
        assert_eq!(sessions.history(Uuid::new_v4()).await.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_sessions_are_evicted_after_ttl() {
        let sessions = ChatSessions::new(Duration::from_secs(60));
        let stale = Uuid::new_v4();
        let fresh = Uuid::new_v4();

        sessions.append(stale, "hi", "hello").await;
        tokio::time::advance(Duration::from_secs(45)).await;
        sessions.append(fresh, "hi", "hello").await;
        tokio::time::advance(Duration::from_secs(30)).await;

        // stale idle for 75s, fresh for 30s
        assert_eq!(sessions.history(stale).await.len(), 0);
        assert_eq!(sessions.history(fresh).await.len(), 2);
        assert_eq!(sessions.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn access_refreshes_the_ttl() {
        let sessions = ChatSessions::new(Duration::from_secs(60));
        let id = Uuid::new_v4();

        sessions.append(id, "hi", "hello").await;
        tokio::time::advance(Duration::from_secs(45)).await;
        assert_eq!(sessions.history(id).await.len(), 2); // refreshes
        tokio::time::advance(Duration::from_secs(45)).await;
        assert_eq!(sessions.history(id).await.len(), 2); // still alive
    }
}
