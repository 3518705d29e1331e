use crate::api::middleware::AppError;
use crate::models::{Question, ResultSet};
use crate::services::llm_service::{ModelHandles, ModelVariant};

/// Rows shown to the model per result set, and echoed into the conversation
pub const MAX_ANSWER_ROWS: usize = 5;

/// Marker for a result set that was never obtained this turn
const ABSENT: &str = "None";

pub struct AnswerSynthesizer {
    models: ModelHandles,
}

impl AnswerSynthesizer {
    pub fn new(models: ModelHandles) -> Self {
        Self { models }
    }

    /// Turn whichever result sets exist into a short prose answer
    pub async fn summarize(
        &self,
        question: &Question,
        vector_results: Option<&ResultSet>,
        sql_results: Option<&ResultSet>,
    ) -> Result<String, AppError> {
        let prompt = answer_prompt(question.text(), vector_results, sql_results);
        let answer = self
            .models
            .invoke(ModelVariant::Primary, &prompt, question.text(), &[])
            .await?;
        Ok(answer.trim().to_string())
    }
}

fn format_section(results: Option<&ResultSet>) -> String {
    match results {
        None => ABSENT.to_string(),
        Some(results) if results.is_empty() => "No rows returned.".to_string(),
        Some(results) => results.format_rows(MAX_ANSWER_ROWS),
    }
}

fn answer_prompt(
    question: &str,
    vector_results: Option<&ResultSet>,
    sql_results: Option<&ResultSet>,
) -> String {
    format!(
        r#"You are a helpful assistant. Use the retrieved rows below to answer the user's question clearly and naturally.

User question:
"""{question}"""

Vector Search Results:
{vector}

SQL Results:
{sql}

Rely only on the rows shown. A section marked None was not retrieved; do not claim evidence from it.
Respond with a helpful, concise summary based on these results."#,
        vector = format_section(vector_results),
        sql = format_section(sql_results),
    )
}
