use crate::api::middleware::AppError;
use crate::models::{ConversationContext, Question, RouteDecision};
use crate::services::llm_service::{ModelHandles, ModelVariant};

/// Picks the retrieval strategy for a question
pub struct IntentRouter {
    models: ModelHandles,
}

impl IntentRouter {
    pub fn new(models: ModelHandles) -> Self {
        Self { models }
    }

    /// Classify a question as vector, sql or hybrid.
    ///
    /// A reply that is not one of the three tokens resolves to `sql`; model
    /// transport failures and timeouts are returned to the caller.
    pub async fn classify(
        &self,
        question: &Question,
        context: &ConversationContext,
    ) -> Result<RouteDecision, AppError> {
        let prompt = classification_prompt(question.text());
        let reply = self
            .models
            .invoke(ModelVariant::Secondary, &prompt, question.text(), context.entries())
            .await?;

        let route = match RouteDecision::from_reply(&reply) {
            Some(route) => route,
            None => {
                tracing::warn!(
                    "Unrecognized route classification {:?}, falling back to sql",
                    reply.trim()
                );
                RouteDecision::Sql
            }
        };

        tracing::info!("Turn {} routed to {}", question.turn_index(), route);
        Ok(route)
    }
}

fn classification_prompt(question: &str) -> String {
    format!(
        r#"You are a smart AI assistant that decides how to route user questions.

Choose only one method:
- vector: the question is about product suitability, recommendation, meaning or product descriptions. It is always product centric.
- sql: the question asks for exact facts, numbers, prices, stock or other structured information without needing interpretation.
- hybrid: the question needs both product meaning (semantic search) and structured logic such as sales, price, stock or filters.

Examples:
- "What's the best bike for mountains?" -> vector
- "How many employees are there?" -> sql
- "How many sales does the best bike for mountains have?" -> hybrid
- "Which affordable electric bikes are in stock?" -> hybrid
- "What is the price of product ID 123?" -> sql

Classify this user question:
"""{question}"""

Reply only with one of: vector, sql, hybrid."#
    )
}
