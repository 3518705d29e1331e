use crate::api::middleware::AppError;
use crate::models::{
    CandidateQuery, ConversationContext, ExecutableQuery, IdentifierFilter, Question,
    SchemaDescription, TableSet,
};
use crate::services::database::DatabaseType;
use crate::services::llm_service::{ModelHandles, ModelVariant};

/// Writes one query from a plan and the described schema
pub struct SynthesisStage {
    models: ModelHandles,
    database_type: DatabaseType,
}

impl SynthesisStage {
    pub fn new(models: ModelHandles, database_type: DatabaseType) -> Self {
        Self {
            models,
            database_type,
        }
    }

    /// Ask the primary model for a single read-only query.
    ///
    /// Fails with `SchemaUnavailable` before any model call when `schema`
    /// describes no columns.
    pub async fn synthesize(
        &self,
        schema: &SchemaDescription,
        question: &Question,
        plan_text: &str,
        tables: &TableSet,
        filter: Option<&IdentifierFilter>,
        context: &ConversationContext,
    ) -> Result<CandidateQuery, AppError> {
        if schema.is_empty() {
            return Err(AppError::SchemaUnavailable(format!(
                "No column schema could be read for {}",
                tables
            )));
        }

        let rendered = schema.render(self.database_type.identifier_quote());
        let prompt = self.synthesis_prompt(&rendered, question.text(), plan_text, filter);
        let raw = self
            .models
            .invoke(ModelVariant::Primary, &prompt, question.text(), context.entries())
            .await?;

        Ok(CandidateQuery::new(raw))
    }

    /// [`synthesize`](Self::synthesize) followed by code-fence stripping
    pub async fn generate(
        &self,
        schema: &SchemaDescription,
        question: &Question,
        plan_text: &str,
        tables: &TableSet,
        filter: Option<&IdentifierFilter>,
        context: &ConversationContext,
    ) -> Result<ExecutableQuery, AppError> {
        let candidate = self
            .synthesize(schema, question, plan_text, tables, filter, context)
            .await?;
        let query = candidate.sanitize();
        tracing::info!("Generated query: {}", query.as_str());
        Ok(query)
    }

    fn synthesis_prompt(
        &self,
        schema: &str,
        question: &str,
        plan_text: &str,
        filter: Option<&IdentifierFilter>,
    ) -> String {
        // Filter values must appear exactly once in the prompt
        let filter_clause = match filter {
            Some(filter) => format!(
                r#"
IMPORTANT: the relevant {column} values were selected by semantic search. The query MUST contain this exact predicate in its WHERE clause:
WHERE {column} IN ({values})
Use these literal values as given. No placeholders, no parameters and no other predicate on {column}.
"#,
                column = filter.column,
                values = filter.joined()
            ),
            None => String::new(),
        };

        let (dialect, dialect_hints) = match self.database_type {
            DatabaseType::MySQL => (
                "MySQL",
                "- Use LIMIT syntax.\n- String concatenation uses CONCAT().\n- Quote identifiers with backticks only when needed.",
            ),
            DatabaseType::PostgreSQL => (
                "PostgreSQL",
                "- Use LIMIT syntax.\n- String concatenation uses || or CONCAT().\n- Quote mixed-case identifiers with double quotes.",
            ),
        };

        format!(
            r#"You are a senior {dialect} expert. Write a single valid {dialect} SELECT query using only the provided schema.

Schema:
{schema}
Plan from domain expert:
{plan_text}

User question:
{question}
{filter_clause}
STRICT RULES:
- Exactly one statement, read-only.
- NO comments or placeholders.
- ONLY use table and column names explicitly shown in the schema.
- JOIN only when necessary.
{dialect_hints}
"#
        )
    }
}
