//! Bounded per-session conversation memory.
//!
//! Each session keeps a FIFO window of recent turns behind its own lock, so
//! appends within a session are ordered while different sessions proceed in
//! parallel. A [`ConversationStore`] backs the window: read-through on first
//! touch, write-through on every append.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::database::Database;
use crate::models::{ConversationTurn, TurnRole};
use crate::Result;

/// Durable backing for conversation history.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Load up to `max_turns` most recent turns, oldest first.
    async fn load_recent(
        &self,
        session_id: &str,
        max_turns: usize,
    ) -> Result<Vec<ConversationTurn>>;

    /// Persist one turn at the end of the session's history.
    async fn append(&self, session_id: &str, turn: &ConversationTurn) -> Result<()>;
}

/// Store that persists nothing; history lives only as long as the process.
#[derive(Debug, Clone, Copy, Default)]
pub struct EphemeralStore;

#[async_trait]
impl ConversationStore for EphemeralStore {
    async fn load_recent(
        &self,
        _session_id: &str,
        _max_turns: usize,
    ) -> Result<Vec<ConversationTurn>> {
        Ok(Vec::new())
    }

    async fn append(&self, _session_id: &str, _turn: &ConversationTurn) -> Result<()> {
        Ok(())
    }
}

/// Store backed by the `conversation_turns` table.
#[derive(Debug, Clone)]
pub struct PostgresConversationStore {
    db: Database,
}

impl PostgresConversationStore {
    #[must_use]
    pub const fn new(db: Database) -> Self {
        Self { db }
    }
}

#[derive(sqlx::FromRow)]
struct TurnRow {
    role: String,
    content: String,
    citations: Option<serde_json::Value>,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl TurnRow {
    fn into_turn(self) -> Result<ConversationTurn> {
        let citations = match self.citations {
            Some(value) => serde_json::from_value(value)?,
            None => Vec::new(),
        };
        Ok(ConversationTurn {
            role: TurnRole::from(self.role.as_str()),
            content: self.content,
            timestamp: self.created_at,
            citations,
        })
    }
}

#[async_trait]
impl ConversationStore for PostgresConversationStore {
    async fn load_recent(
        &self,
        session_id: &str,
        max_turns: usize,
    ) -> Result<Vec<ConversationTurn>> {
        let rows: Vec<TurnRow> = sqlx::query_as(
            r"
            SELECT role, content, citations, created_at
            FROM conversation_turns
            WHERE session_id = $1
            ORDER BY id DESC
            LIMIT $2
            ",
        )
        .bind(session_id)
        .bind(max_turns as i64)
        .fetch_all(self.db.pool())
        .await?;

        let mut turns = rows
            .into_iter()
            .map(TurnRow::into_turn)
            .collect::<Result<Vec<_>>>()?;
        turns.reverse();
        Ok(turns)
    }

    async fn append(&self, session_id: &str, turn: &ConversationTurn) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO conversation_turns (session_id, role, content, citations, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ",
        )
        .bind(session_id)
        .bind(turn.role.as_str())
        .bind(&turn.content)
        .bind(serde_json::to_value(&turn.citations)?)
        .bind(turn.timestamp)
        .execute(self.db.pool())
        .await?;
        Ok(())
    }
}

struct SessionHistory {
    turns: VecDeque<ConversationTurn>,
    loaded: bool,
}

/// Per-session conversation windows with automatic FIFO eviction.
pub struct ConversationMemory {
    sessions: DashMap<String, Arc<Mutex<SessionHistory>>>,
    store: Arc<dyn ConversationStore>,
    window: usize,
}

impl ConversationMemory {
    #[must_use]
    pub fn new(store: Arc<dyn ConversationStore>, window: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            store,
            window,
        }
    }

    /// Memory with no durable backing, for tests and local mode.
    #[must_use]
    pub fn ephemeral(window: usize) -> Self {
        Self::new(Arc::new(EphemeralStore), window)
    }

    fn slot(&self, session_id: &str) -> Arc<Mutex<SessionHistory>> {
        self.sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(SessionHistory {
                    turns: VecDeque::new(),
                    loaded: false,
                }))
            })
            .clone()
    }

    async fn ensure_loaded(&self, session_id: &str, history: &mut SessionHistory) -> Result<()> {
        if history.loaded {
            return Ok(());
        }
        let turns = self.store.load_recent(session_id, self.window).await?;
        history.turns = turns.into_iter().collect();
        history.loaded = true;
        Ok(())
    }

    async fn push(
        &self,
        session_id: &str,
        history: &mut SessionHistory,
        turn: ConversationTurn,
    ) -> Result<()> {
        // Write-through first; the window only advances once the store took it.
        self.store.append(session_id, &turn).await?;
        history.turns.push_back(turn);
        while history.turns.len() > self.window {
            history.turns.pop_front();
        }
        Ok(())
    }

    /// Recent turns for a session, oldest first, capped at `max_turns` and
    /// never more than the configured window.
    pub async fn recent(&self, session_id: &str, max_turns: usize) -> Result<Vec<ConversationTurn>> {
        let slot = self.slot(session_id);
        let mut history = slot.lock().await;
        self.ensure_loaded(session_id, &mut history).await?;
        let cap = max_turns.min(self.window);
        let skip = history.turns.len().saturating_sub(cap);
        Ok(history.turns.iter().skip(skip).cloned().collect())
    }

    pub async fn append(&self, session_id: &str, turn: ConversationTurn) -> Result<()> {
        let slot = self.slot(session_id);
        let mut history = slot.lock().await;
        self.ensure_loaded(session_id, &mut history).await?;
        self.push(session_id, &mut history, turn).await
    }

    /// Append a question/answer pair under one session lock so concurrent
    /// requests cannot interleave between the two turns.
    pub async fn append_exchange(
        &self,
        session_id: &str,
        user_turn: ConversationTurn,
        assistant_turn: ConversationTurn,
    ) -> Result<()> {
        let slot = self.slot(session_id);
        let mut history = slot.lock().await;
        self.ensure_loaded(session_id, &mut history).await?;
        self.push(session_id, &mut history, user_turn).await?;
        self.push(session_id, &mut history, assistant_turn).await
    }

    /// Drop a session's in-process window. The store keeps whatever it holds.
    pub fn forget(&self, session_id: &str) {
        self.sessions.remove(session_id);
    }

    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}
