use serde::{Deserialize, Serialize};

use crate::validation::strip_code_fences;

/// Raw model output for a structured query. Not yet guaranteed executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateQuery {
    raw: String,
}

impl CandidateQuery {
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Strip delimiting code fences
    pub fn sanitize(&self) -> ExecutableQuery {
        ExecutableQuery {
            sql: strip_code_fences(&self.raw),
        }
    }
}

/// Sanitized query text, ready to be validated and executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutableQuery {
    sql: String,
}

impl ExecutableQuery {
    pub fn new(sql: impl Into<String>) -> Self {
        Self { sql: sql.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.sql
    }

    pub fn into_string(self) -> String {
        self.sql
    }
}

#[derive(Debug, Deserialize)]
pub struct TurnRequest {
    pub question: String,
}

#[derive(Debug, Deserialize)]
pub struct TurnHistoryQuery {
    pub limit: Option<usize>,
}
