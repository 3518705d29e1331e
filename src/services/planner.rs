use crate::api::middleware::AppError;
use crate::models::{ConversationContext, Question, RouteDecision, TableReference, TableSet};
use crate::services::llm_service::{ModelHandles, ModelVariant};
use once_cell::sync::Lazy;
use regex::Regex;

/// Optional bracket, identifier, dot, identifier, optional bracket.
/// Each part may carry its own brackets (`[Sales].[Customer]`).
static TABLE_REFERENCE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[?\b([A-Za-z_][A-Za-z0-9_]*)\]?\.\[?([A-Za-z_][A-Za-z0-9_]*)\b\]?")
        .expect("table reference pattern is valid")
});

/// Natural-language retrieval plan and the tables it names
#[derive(Debug, Clone)]
pub struct Plan {
    pub text: String,
    pub tables: TableSet,
}

/// Produces a retrieval plan before any query is written
pub struct PlanningStage {
    models: ModelHandles,
    identifier_column: String,
}

impl PlanningStage {
    pub fn new(models: ModelHandles, identifier_column: impl Into<String>) -> Self {
        Self {
            models,
            identifier_column: identifier_column.into(),
        }
    }

    /// Ask the primary model for a plan over `catalog_summary`.
    ///
    /// An empty table set is a valid result; the caller decides how to end the turn.
    pub async fn plan(
        &self,
        question: &Question,
        catalog_summary: &str,
        context: &ConversationContext,
        route: RouteDecision,
    ) -> Result<Plan, AppError> {
        let prompt = self.planning_prompt(question.text(), catalog_summary, route);
        let reply = self
            .models
            .invoke(ModelVariant::Primary, &prompt, question.text(), context.entries())
            .await?;

        let text = reply.trim().to_string();
        let tables = extract_tables(&text);
        tracing::info!("Plan for turn {} references [{}]", question.turn_index(), tables);

        Ok(Plan { text, tables })
    }

    fn planning_prompt(&self, question: &str, catalog_summary: &str, route: RouteDecision) -> String {
        let hybrid_note = if route == RouteDecision::Hybrid {
            format!(
                r#"
Note: a separate system will select the most relevant {column} values with semantic search.
Do not try to identify the "best" or "most suitable" item yourself.
Assume the ranked {column} values will be supplied to the query layer and plan to filter on them.
"#,
                column = self.identifier_column
            )
        } else {
            String::new()
        };

        format!(
            r#"You are an AI assistant that helps users query a relational database. The tables, with descriptions, are:

{catalog_summary}

Today is {today}.

Your job:
- List the relevant tables (max 5) as schema.table.
- Explain what to do to answer the question.
- Do NOT write SQL.
- Focus on read-only SELECT logic.
- Be concise, formal and break complex tasks into steps.
{hybrid_note}
User question:
{question}
"#,
            today = chrono::Local::now().format("%Y-%m-%d"),
        )
    }
}

/// Scan plan text for `schema.table` tokens.
///
/// Text that does not match is ignored. Duplicates collapse case-insensitively
/// (first spelling wins). Alias-qualified columns such as `c.CustomerID` match
/// too; they are dropped later when the set is resolved against the catalog.
pub fn extract_tables(plan_text: &str) -> TableSet {
    TableSet::from_references(TABLE_REFERENCE_RE.captures_iter(plan_text).filter_map(|caps| {
        let schema = caps.get(1)?.as_str();
        let table = caps.get(2)?.as_str();
        Some(TableReference::new(schema, table))
    }))
}
