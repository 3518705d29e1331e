use crate::api::middleware::AppError;
use crate::models::{
    ConversationContext, IdentifierFilter, Question, ResultSet, SchemaDescription, TurnDiagnostics,
};
use crate::services::database::{DatabaseAdapter, SearchParams};
use crate::services::planner::Plan;
use crate::services::query_service::{ExecutedQuery, QueryService};
use crate::services::synthesis::SynthesisStage;
use std::sync::Arc;

/// Both result sets of a hybrid turn, kept apart for the answer step
#[derive(Debug, Clone)]
pub struct FusionOutcome {
    pub vector_results: ResultSet,
    pub filter: Option<IdentifierFilter>,
    pub executed: ExecutedQuery,
}

/// Runs a semantic search, then a generated query restricted to its identifiers
pub struct FusionCoordinator {
    adapter: Arc<dyn DatabaseAdapter>,
    synthesis: Arc<SynthesisStage>,
    query_service: Arc<QueryService>,
    search: SearchParams,
    top: u32,
    identifier_column: String,
}

impl FusionCoordinator {
    pub fn new(
        adapter: Arc<dyn DatabaseAdapter>,
        synthesis: Arc<SynthesisStage>,
        query_service: Arc<QueryService>,
        search: SearchParams,
        top: u32,
        identifier_column: impl Into<String>,
    ) -> Self {
        Self {
            adapter,
            synthesis,
            query_service,
            search,
            top,
            identifier_column: identifier_column.into(),
        }
    }

    /// Artifacts are written to `diagnostics` as soon as they exist, so a
    /// failing step still leaves the earlier ones visible.
    pub async fn fuse(
        &self,
        question: &Question,
        plan: &Plan,
        schema: &SchemaDescription,
        context: &ConversationContext,
        diagnostics: &mut TurnDiagnostics,
    ) -> Result<FusionOutcome, AppError> {
        let vector_results = self
            .adapter
            .vector_search(question.text(), self.top, &self.search)
            .await?;
        diagnostics.vector_row_count = Some(vector_results.row_count());

        // Search order is kept as the ranking; nothing is re-sorted here
        let filter = IdentifierFilter::from_result_set(&vector_results, &self.identifier_column);
        match &filter {
            Some(filter) => tracing::info!(
                "Hybrid filter on {}: {}",
                filter.column,
                filter.joined()
            ),
            None => tracing::warn!(
                "Vector search returned no {} values, continuing without an identifier filter",
                self.identifier_column
            ),
        }
        diagnostics.identifier_filter = filter.clone();

        let query = self
            .synthesis
            .generate(schema, question, &plan.text, &plan.tables, filter.as_ref(), context)
            .await?;
        diagnostics.generated_sql = Some(query.as_str().to_string());

        let executed = self
            .query_service
            .execute(&query, schema, filter.as_ref())
            .await?;
        diagnostics.generated_sql = Some(executed.sql.clone());
        diagnostics.sql_row_count = Some(executed.results.row_count());

        Ok(FusionOutcome {
            vector_results,
            filter,
            executed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{TableReference, TableSet};
    use crate::services::catalog_service::{DatabaseCatalog, SchemaCatalog};
    use crate::services::llm_service::ModelHandles;
    use crate::services::database::DatabaseType;
    use crate::testing::{self, FakeDataStore, ScriptedModel};
    use serde_json::json;

    async fn setup(
        store: Arc<FakeDataStore>,
        replies: &[&str],
    ) -> (FusionCoordinator, Arc<ScriptedModel>, SchemaDescription, Plan) {
        let model = Arc::new(ScriptedModel::new(replies));
        let handles = ModelHandles::new(model.clone(), model.clone(), 5);
        let synthesis = Arc::new(SynthesisStage::new(handles, DatabaseType::PostgreSQL));
        let coordinator = FusionCoordinator::new(
            store.clone(),
            synthesis,
            Arc::new(testing::query_service(store.clone())),
            SearchParams::new("find_relevant_products_vector_search", 100, 30),
            10,
            "ProductID",
        );

        let tables = TableSet::from_references(vec![TableReference::new("Production", "Product")]);
        let schema = DatabaseCatalog::new(store, 300)
            .describe_schema(&tables)
            .await
            .unwrap();
        let plan = Plan {
            text: "Use Production.Product for stock.".to_string(),
            tables,
        };
        (coordinator, model, schema, plan)
    }

    #[tokio::test]
    async fn test_filter_follows_search_order() {
        let store = Arc::new(FakeDataStore::adventure_works());
        store.push_vector_result(ResultSet::new(
            vec!["ProductID".into(), "Name".into(), "distance".into()],
            vec![
                vec![json!(999), json!("E-Bike 3"), json!(0.12)],
                vec![json!(771), json!("E-Bike 1"), json!(0.2)],
                vec![json!(42), json!("E-Bike 2"), json!(0.31)],
            ],
        ));
        store.push_query_result(ResultSet::new(
            vec!["Name".into(), "SafetyStockLevel".into()],
            vec![vec![json!("E-Bike 3"), json!(4)]],
        ));

        let (coordinator, model, schema, plan) = setup(
            store.clone(),
            &["SELECT Name, SafetyStockLevel FROM Production.Product WHERE ProductID IN (999,771,42)"],
        )
        .await;
        let mut diagnostics = TurnDiagnostics::default();

        let outcome = coordinator
            .fuse(
                &Question::new("Which affordable electric bikes are in stock?", 1),
                &plan,
                &schema,
                &ConversationContext::new(),
                &mut diagnostics,
            )
            .await
            .unwrap();

        assert_eq!(outcome.filter.unwrap().joined(), "999,771,42");
        assert!(model.calls()[0].system_prompt.contains("WHERE ProductID IN (999,771,42)"));
        assert_eq!(outcome.vector_results.row_count(), 3);
        assert_eq!(outcome.executed.results.row_count(), 1);
        assert_eq!(store.vector_searches(), vec![("Which affordable electric bikes are in stock?".to_string(), 10)]);
        assert_eq!(diagnostics.vector_row_count, Some(3));
        assert_eq!(diagnostics.sql_row_count, Some(1));
    }

    #[tokio::test]
    async fn test_missing_identifier_column_degrades() {
        let store = Arc::new(FakeDataStore::adventure_works());
        store.push_vector_result(ResultSet::new(
            vec!["Name".into()],
            vec![vec![json!("E-Bike 1")]],
        ));
        store.push_query_result(ResultSet::new(vec!["Name".into()], vec![]));

        let (coordinator, model, schema, plan) =
            setup(store, &["SELECT Name FROM Production.Product"]).await;
        let mut diagnostics = TurnDiagnostics::default();

        let outcome = coordinator
            .fuse(&Question::new("q", 1), &plan, &schema, &ConversationContext::new(), &mut diagnostics)
            .await
            .unwrap();

        assert!(outcome.filter.is_none());
        assert!(diagnostics.identifier_filter.is_none());
        assert!(!model.calls()[0].system_prompt.contains("IMPORTANT"));
    }

    #[tokio::test]
    async fn test_query_ignoring_filter_is_rejected() {
        let store = Arc::new(FakeDataStore::adventure_works());
        store.push_vector_result(ResultSet::new(
            vec!["ProductID".into()],
            vec![vec![json!(771)], vec![json!(42)]],
        ));

        let (coordinator, _, schema, plan) =
            setup(store.clone(), &["SELECT Name FROM Production.Product WHERE ProductID IN (42,771)"]).await;
        let mut diagnostics = TurnDiagnostics::default();

        let err = coordinator
            .fuse(&Question::new("q", 1), &plan, &schema, &ConversationContext::new(), &mut diagnostics)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::InvalidSql(_)));
        assert!(diagnostics.generated_sql.unwrap().contains("IN (42,771)"));
        assert!(store.executed_queries().is_empty());
    }
}
