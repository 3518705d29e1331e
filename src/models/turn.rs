use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::catalog::TableSet;
use super::result_set::{IdentifierFilter, ResultSet};

/// Retrieval strategy chosen for one turn. Derived fresh per question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteDecision {
    Vector,
    Sql,
    Hybrid,
}

impl RouteDecision {
    /// Match a classifier reply against the three route tokens.
    ///
    /// Surrounding whitespace, quotes, backticks, asterisks and a trailing
    /// period are ignored; anything else must be exactly one token.
    pub fn from_reply(reply: &str) -> Option<Self> {
        let token = reply
            .trim()
            .trim_matches(|c: char| matches!(c, '"' | '\'' | '`' | '*' | '.') || c.is_whitespace());
        match token.to_ascii_lowercase().as_str() {
            "vector" => Some(RouteDecision::Vector),
            "sql" => Some(RouteDecision::Sql),
            "hybrid" => Some(RouteDecision::Hybrid),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RouteDecision::Vector => "vector",
            RouteDecision::Sql => "sql",
            RouteDecision::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for RouteDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Intermediate artifacts of a turn, exposed for display only.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TurnDiagnostics {
    pub route: Option<RouteDecision>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tables: Option<TableSet>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unresolved_tables: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier_filter: Option<IdentifierFilter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_sql: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector_row_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql_row_count: Option<usize>,
    pub elapsed_ms: u64,
}

/// Result of a completed turn.
#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    pub route: RouteDecision,
    pub answer: String,
    /// Structured rows for sql/hybrid turns, search rows for vector turns
    pub results: Option<ResultSet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector_results: Option<ResultSet>,
    pub diagnostics: TurnDiagnostics,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum TurnStatus {
    Success,
    Failed,
}

/// Persisted audit row for one turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRecord {
    pub id: String,
    pub session_id: String,
    pub turn_index: u64,
    pub question: String,
    pub route: Option<String>,
    pub plan: Option<String>,
    pub generated_sql: Option<String>,
    pub answer: Option<String>,
    pub row_count: usize,
    pub execution_time_ms: u64,
    pub status: TurnStatus,
    pub error_message: Option<String>,
    pub executed_at: DateTime<Utc>,
}

impl TurnRecord {
    pub fn succeeded(session_id: &str, turn_index: u64, question: &str, outcome: &TurnOutcome) -> Self {
        let diagnostics = &outcome.diagnostics;
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            turn_index,
            question: question.to_string(),
            route: Some(outcome.route.to_string()),
            plan: diagnostics.plan.clone(),
            generated_sql: diagnostics.generated_sql.clone(),
            answer: Some(outcome.answer.clone()),
            row_count: outcome.results.as_ref().map(|r| r.row_count()).unwrap_or(0),
            execution_time_ms: diagnostics.elapsed_ms,
            status: TurnStatus::Success,
            error_message: None,
            executed_at: Utc::now(),
        }
    }

    pub fn failed(
        session_id: &str,
        turn_index: u64,
        question: &str,
        diagnostics: &TurnDiagnostics,
        error_message: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            turn_index,
            question: question.to_string(),
            route: diagnostics.route.map(|r| r.to_string()),
            plan: diagnostics.plan.clone(),
            generated_sql: diagnostics.generated_sql.clone(),
            answer: None,
            row_count: 0,
            execution_time_ms: diagnostics.elapsed_ms,
            status: TurnStatus::Failed,
            error_message: Some(error_message),
            executed_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_from_reply() {
        assert_eq!(RouteDecision::from_reply("vector"), Some(RouteDecision::Vector));
        assert_eq!(RouteDecision::from_reply("  SQL\n"), Some(RouteDecision::Sql));
        assert_eq!(RouteDecision::from_reply("Hybrid."), Some(RouteDecision::Hybrid));
        assert_eq!(RouteDecision::from_reply("**hybrid**"), Some(RouteDecision::Hybrid));
    }

    #[test]
    fn test_route_rejects_unrecognized() {
        assert_eq!(RouteDecision::from_reply(""), None);
        assert_eq!(RouteDecision::from_reply("sql or vector"), None);
        assert_eq!(RouteDecision::from_reply("I think hybrid"), None);
        assert_eq!(RouteDecision::from_reply("graph"), None);
    }

    #[test]
    fn test_route_serializes_lowercase() {
        let json = serde_json::to_string(&RouteDecision::Hybrid).unwrap();
        assert_eq!(json, "\"hybrid\"");
    }
}
