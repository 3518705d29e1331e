use crate::api::middleware::AppError;
use crate::models::{
    ContextEntry, ConversationContext, Question, RouteDecision, TurnOutcome, TurnRecord,
};
use crate::services::answer::MAX_ANSWER_ROWS;
use crate::services::pipeline::{QueryPipeline, TurnFailure};
use crate::storage::SqliteStorage;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

const DEFAULT_TURN_LIMIT: usize = 20;
const MAX_TURN_LIMIT: usize = 200;

/// One conversation: its context log and the index of the next turn
#[derive(Debug)]
pub struct Session {
    pub id: String,
    pub context: ConversationContext,
    pub next_turn_index: u64,
    pub created_at: DateTime<Utc>,
}

impl Session {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            context: ConversationContext::new(),
            next_turn_index: 1,
            created_at: Utc::now(),
        }
    }

    fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id.clone(),
            turns: self.next_turn_index - 1,
            context_entries: self.context.len(),
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub id: String,
    pub turns: u64,
    pub context_entries: usize,
    pub created_at: DateTime<Utc>,
}

/// Owns every live session and runs turns against them.
///
/// A session's mutex is held for its whole turn, so its context is never
/// read by one turn while another appends to it.
pub struct SessionManager {
    sessions: RwLock<HashMap<String, Arc<Mutex<Session>>>>,
    pipeline: Arc<QueryPipeline>,
    storage: Arc<SqliteStorage>,
}

impl SessionManager {
    pub fn new(pipeline: Arc<QueryPipeline>, storage: Arc<SqliteStorage>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            pipeline,
            storage,
        }
    }

    pub fn pipeline(&self) -> &Arc<QueryPipeline> {
        &self.pipeline
    }

    pub async fn create_session(&self) -> SessionSummary {
        let session = Session::new();
        let summary = session.summary();
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), Arc::new(Mutex::new(session)));
        tracing::info!("Created session {}", summary.id);
        summary
    }

    pub async fn list_sessions(&self) -> Vec<SessionSummary> {
        let handles: Vec<_> = self.sessions.read().await.values().cloned().collect();
        let mut summaries = Vec::with_capacity(handles.len());
        for handle in handles {
            summaries.push(handle.lock().await.summary());
        }
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        summaries
    }

    /// Forget a session and its persisted turns
    pub async fn delete_session(&self, id: &str) -> Result<(), AppError> {
        self.sessions
            .write()
            .await
            .remove(id)
            .ok_or_else(|| AppError::NotFound(format!("Session {} not found", id)))?;
        let removed = self.storage.delete_turns(id).await?;
        tracing::info!("Deleted session {} ({} recorded turns)", id, removed);
        Ok(())
    }

    async fn session(&self, id: &str) -> Result<Arc<Mutex<Session>>, AppError> {
        self.sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Session {} not found", id)))
    }

    /// Run one turn and record it in the session's context and the turn log
    pub async fn handle_turn(&self, id: &str, question: &str) -> Result<TurnOutcome, AppError> {
        let text = question.trim();
        if text.is_empty() {
            return Err(AppError::Validation("Question cannot be empty".to_string()));
        }

        let handle = self.session(id).await?;
        let mut session = handle.lock().await;
        let question = Question::new(text, session.next_turn_index);
        session.next_turn_index += 1;

        let result = self.pipeline.handle_turn(&question, &session.context).await;

        // The attempt is recorded whatever the outcome
        session.context.add_user_message(text);

        match result {
            Ok(outcome) => {
                session.context.add_assistant_message(assistant_echo(&outcome));
                self.record(TurnRecord::succeeded(id, question.turn_index(), text, &outcome))
                    .await;
                Ok(outcome)
            }
            Err(TurnFailure { error, diagnostics }) => {
                if matches!(error, AppError::NoRelevantTables) {
                    session
                        .context
                        .add_assistant_message("No relevant tables were identified for this question.");
                }
                self.record(TurnRecord::failed(
                    id,
                    question.turn_index(),
                    text,
                    &diagnostics,
                    error.to_string(),
                ))
                .await;
                Err(error)
            }
        }
    }

    async fn record(&self, record: TurnRecord) {
        if let Err(e) = self.storage.add_turn(&record).await {
            tracing::warn!("Failed to record turn {} of session {}: {}", record.turn_index, record.session_id, e);
        }
    }

    pub async fn history(&self, id: &str) -> Result<Vec<ContextEntry>, AppError> {
        let handle = self.session(id).await?;
        let session = handle.lock().await;
        Ok(session.context.entries().to_vec())
    }

    pub async fn clear_history(&self, id: &str) -> Result<(), AppError> {
        let handle = self.session(id).await?;
        handle.lock().await.context.clear();
        tracing::info!("Cleared conversation history of session {}", id);
        Ok(())
    }

    /// Persisted turns of a session, newest first
    pub async fn turns(&self, id: &str, limit: Option<usize>) -> Result<Vec<TurnRecord>, AppError> {
        self.session(id).await?;
        let limit = limit.unwrap_or(DEFAULT_TURN_LIMIT).clamp(1, MAX_TURN_LIMIT);
        Ok(self.storage.list_turns(id, limit).await?)
    }
}

/// What the assistant entry of a successful turn replays to later turns
fn assistant_echo(outcome: &TurnOutcome) -> String {
    let mut echo = String::new();

    let vector_rows = match outcome.route {
        RouteDecision::Vector => outcome.results.as_ref(),
        _ => outcome.vector_results.as_ref(),
    };
    if let Some(rows) = vector_rows {
        echo.push_str(&format!(
            "Vector search results:\n{}\n\n",
            rows.format_rows(MAX_ANSWER_ROWS)
        ));
    }

    if outcome.route != RouteDecision::Vector {
        if let Some(sql) = &outcome.diagnostics.generated_sql {
            echo.push_str(&format!("Generated SQL:\n{}\n\n", sql));
        }
        if let Some(rows) = &outcome.results {
            echo.push_str(&format!("SQL results:\n{}\n\n", rows.format_rows(MAX_ANSWER_ROWS)));
        }
    }

    echo.push_str(&format!("Answer: {}", outcome.answer));
    echo
}
