use crate::api::middleware::AppError;
use crate::config::SearchConfig;
use crate::models::{
    ConversationContext, Question, ResultSet, RouteDecision, TurnDiagnostics, TurnOutcome,
    MAX_PLAN_TABLES,
};
use crate::services::answer::AnswerSynthesizer;
use crate::services::catalog_service::SchemaCatalog;
use crate::services::database::{DatabaseAdapter, SearchParams};
use crate::services::fusion::FusionCoordinator;
use crate::services::llm_service::ModelHandles;
use crate::services::planner::{Plan, PlanningStage};
use crate::services::query_service::QueryService;
use crate::services::router::IntentRouter;
use crate::services::synthesis::SynthesisStage;
use std::sync::Arc;
use std::time::Instant;

/// A failed turn together with whatever artifacts it produced before failing
#[derive(Debug)]
pub struct TurnFailure {
    pub error: AppError,
    pub diagnostics: TurnDiagnostics,
}

/// Rows retrieved by one route, before they are wrapped into a [`TurnOutcome`]
struct Retrieved {
    answer: String,
    results: Option<ResultSet>,
    vector_results: Option<ResultSet>,
}

/// Routes a question, retrieves rows and answers it.
///
/// The pipeline never touches the conversation context; the caller passes the
/// context as it stood before the turn and records the turn afterwards.
pub struct QueryPipeline {
    router: IntentRouter,
    planner: PlanningStage,
    synthesis: Arc<SynthesisStage>,
    fusion: FusionCoordinator,
    answer: AnswerSynthesizer,
    catalog: Arc<dyn SchemaCatalog>,
    adapter: Arc<dyn DatabaseAdapter>,
    query_service: Arc<QueryService>,
    search: SearchParams,
    vector_top: u32,
}

impl QueryPipeline {
    pub fn new(
        models: ModelHandles,
        adapter: Arc<dyn DatabaseAdapter>,
        catalog: Arc<dyn SchemaCatalog>,
        query_service: Arc<QueryService>,
        search: &SearchConfig,
        query_timeout_secs: u64,
    ) -> Self {
        let params = SearchParams::new(search.procedure.clone(), search.stock, query_timeout_secs);
        let synthesis = Arc::new(SynthesisStage::new(models.clone(), adapter.database_type()));
        let fusion = FusionCoordinator::new(
            adapter.clone(),
            synthesis.clone(),
            query_service.clone(),
            params.clone(),
            search.hybrid_top,
            search.identifier_column.clone(),
        );

        Self {
            router: IntentRouter::new(models.clone()),
            planner: PlanningStage::new(models.clone(), search.identifier_column.clone()),
            synthesis,
            fusion,
            answer: AnswerSynthesizer::new(models),
            catalog,
            adapter,
            query_service,
            search: params,
            vector_top: search.vector_top,
        }
    }

    pub fn catalog(&self) -> &Arc<dyn SchemaCatalog> {
        &self.catalog
    }

    /// Answer one question against the context of the previous turns
    pub async fn handle_turn(
        &self,
        question: &Question,
        context: &ConversationContext,
    ) -> Result<TurnOutcome, TurnFailure> {
        let started = Instant::now();
        let mut diagnostics = TurnDiagnostics::default();

        let result = self.run(question, context, &mut diagnostics).await;
        diagnostics.elapsed_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(retrieved) => {
                tracing::info!(
                    "Turn {} answered via {} in {}ms",
                    question.turn_index(),
                    diagnostics.route.map(|r| r.as_str()).unwrap_or("-"),
                    diagnostics.elapsed_ms
                );
                Ok(TurnOutcome {
                    route: diagnostics.route.unwrap_or(RouteDecision::Sql),
                    answer: retrieved.answer,
                    results: retrieved.results,
                    vector_results: retrieved.vector_results,
                    diagnostics,
                })
            }
            Err(error) => {
                tracing::error!("Turn {} failed: {}", question.turn_index(), error);
                Err(TurnFailure { error, diagnostics })
            }
        }
    }

    async fn run(
        &self,
        question: &Question,
        context: &ConversationContext,
        diagnostics: &mut TurnDiagnostics,
    ) -> Result<Retrieved, AppError> {
        // The catalog summary does not depend on the route
        let (route, catalog_summary) = tokio::join!(
            self.router.classify(question, context),
            self.catalog.describe_all_tables()
        );
        let route = route?;
        diagnostics.route = Some(route);

        if route == RouteDecision::Vector {
            let results = self
                .adapter
                .vector_search(question.text(), self.vector_top, &self.search)
                .await?;
            diagnostics.vector_row_count = Some(results.row_count());
            let answer = self.answer.summarize(question, Some(&results), None).await?;
            return Ok(Retrieved {
                answer,
                results: Some(results),
                vector_results: None,
            });
        }

        let plan = self
            .planner
            .plan(question, &catalog_summary?, context, route)
            .await?;
        diagnostics.plan = Some(plan.text.clone());
        let plan = self.resolve_plan(plan, diagnostics).await?;
        let schema = self.catalog.describe_schema(&plan.tables).await?;

        if route == RouteDecision::Hybrid {
            let fused = self
                .fusion
                .fuse(question, &plan, &schema, context, diagnostics)
                .await?;
            let answer = self
                .answer
                .summarize(question, Some(&fused.vector_results), Some(&fused.executed.results))
                .await?;
            return Ok(Retrieved {
                answer,
                results: Some(fused.executed.results),
                vector_results: Some(fused.vector_results),
            });
        }

        let query = self
            .synthesis
            .generate(&schema, question, &plan.text, &plan.tables, None, context)
            .await?;
        diagnostics.generated_sql = Some(query.as_str().to_string());

        let executed = self.query_service.execute(&query, &schema, None).await?;
        diagnostics.generated_sql = Some(executed.sql.clone());
        diagnostics.sql_row_count = Some(executed.results.row_count());

        let answer = self
            .answer
            .summarize(question, None, Some(&executed.results))
            .await?;
        Ok(Retrieved {
            answer,
            results: Some(executed.results),
            vector_results: None,
        })
    }

    /// Keep only the planned tables the catalog knows, in catalog casing
    async fn resolve_plan(
        &self,
        plan: Plan,
        diagnostics: &mut TurnDiagnostics,
    ) -> Result<Plan, AppError> {
        if plan.tables.is_empty() {
            return Err(AppError::NoRelevantTables);
        }

        let (resolved, unresolved) = self.catalog.resolve(&plan.tables).await?;
        if !unresolved.is_empty() {
            let names: Vec<String> = unresolved.iter().map(|t| t.to_string()).collect();
            tracing::warn!("Plan references tables outside the catalog: {}", names.join(", "));
            diagnostics.unresolved_tables = names;
        }

        if resolved.is_empty() {
            return Err(AppError::SchemaUnavailable(format!(
                "None of the planned tables are in the catalog: {}",
                plan.tables
            )));
        }

        let resolved = if resolved.len() > MAX_PLAN_TABLES {
            tracing::warn!(
                "Plan resolved to {} tables, keeping {}",
                resolved.len(),
                MAX_PLAN_TABLES
            );
            resolved.capped(MAX_PLAN_TABLES)
        } else {
            resolved
        };

        diagnostics.tables = Some(resolved.clone());
        Ok(Plan {
            text: plan.text,
            tables: resolved,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, FakeDataStore, ScriptedModel};
    use serde_json::json;

    struct Harness {
        pipeline: QueryPipeline,
        store: Arc<FakeDataStore>,
        primary: Arc<ScriptedModel>,
        secondary: Arc<ScriptedModel>,
    }

    fn harness(route: &str, primary: &[&str]) -> Harness {
        let store = Arc::new(FakeDataStore::adventure_works());
        let primary = Arc::new(ScriptedModel::new(primary));
        let secondary = Arc::new(ScriptedModel::new(&[route]));
        let pipeline = testing::pipeline(store.clone(), primary.clone(), secondary.clone());
        Harness {
            pipeline,
            store,
            primary,
            secondary,
        }
    }

    #[tokio::test]
    async fn test_sql_turn_end_to_end() {
        let h = harness(
            "sql",
            &[
                "1. Use HumanResources.Department and HumanResources.Employee.\n2. Count the employees.",
                "```sql\nSELECT COUNT(*) AS EmployeeCount FROM HumanResources.Employee\n```",
                "There are 290 employees.",
            ],
        );
        h.store.push_query_result(ResultSet::new(
            vec!["EmployeeCount".into()],
            vec![vec![json!(290)]],
        ));

        let question = Question::new("How many employees are in HumanResources.Department?", 1);
        let outcome = h
            .pipeline
            .handle_turn(&question, &ConversationContext::new())
            .await
            .unwrap();

        assert_eq!(outcome.route, RouteDecision::Sql);
        assert_eq!(outcome.answer, "There are 290 employees.");
        assert_eq!(outcome.results.unwrap().rows[0][0], json!(290));
        assert!(outcome.vector_results.is_none());
        assert_eq!(
            outcome.diagnostics.tables.unwrap().to_strings(),
            vec!["HumanResources.Department", "HumanResources.Employee"]
        );
        assert_eq!(
            h.store.executed_queries(),
            vec!["SELECT COUNT(*) AS EmployeeCount FROM HumanResources.Employee LIMIT 1000"]
        );
        assert!(h.store.vector_searches().is_empty());

        let calls = h.primary.calls();
        assert_eq!(calls.len(), 3);
        assert!(calls[0].system_prompt.contains("[HumanResources.Department]:"));
        assert!(calls[1].system_prompt.contains("\"HumanResources\".\"Employee\":"));
        assert!(calls[2].system_prompt.contains("Vector Search Results:\nNone"));
        assert!(calls[2].system_prompt.contains("EmployeeCount: 290"));
        assert_eq!(h.secondary.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_hybrid_turn_filters_on_search_order() {
        let h = harness(
            "hybrid",
            &[
                "Use Production.Product and compare SafetyStockLevel.",
                "SELECT Name, ListPrice, SafetyStockLevel FROM Production.Product WHERE ProductID IN (999,771,42)",
                "The E-Bike 3 ranks first and 4 units are in stock.",
            ],
        );
        h.store.push_vector_result(ResultSet::new(
            vec!["ProductID".into(), "Name".into()],
            vec![
                vec![json!(999), json!("E-Bike 3")],
                vec![json!(771), json!("E-Bike 1")],
                vec![json!(42), json!("E-Bike 2")],
            ],
        ));
        h.store.push_query_result(ResultSet::new(
            vec!["Name".into(), "ListPrice".into(), "SafetyStockLevel".into()],
            vec![vec![json!("E-Bike 3"), json!(899.0), json!(4)]],
        ));

        let question = Question::new("Which affordable electric bikes are in stock?", 1);
        let outcome = h
            .pipeline
            .handle_turn(&question, &ConversationContext::new())
            .await
            .unwrap();

        assert_eq!(outcome.route, RouteDecision::Hybrid);
        assert_eq!(
            outcome.diagnostics.identifier_filter.as_ref().unwrap().joined(),
            "999,771,42"
        );
        assert_eq!(h.store.vector_searches()[0].1, 10);
        assert_eq!(outcome.vector_results.unwrap().row_count(), 3);
        assert_eq!(outcome.results.unwrap().row_count(), 1);

        let calls = h.primary.calls();
        assert!(calls[0].system_prompt.contains("semantic search"));
        assert!(calls[1].system_prompt.contains("WHERE ProductID IN (999,771,42)"));
        assert!(calls[2].system_prompt.contains("Name: E-Bike 3"));
        assert!(calls[2].system_prompt.contains("SafetyStockLevel: 4"));
    }

    #[tokio::test]
    async fn test_vector_turn_skips_planning() {
        let h = harness("vector", &["The Mountain-100 suits steep trails."]);
        h.store.push_vector_result(ResultSet::new(
            vec!["ProductID".into(), "Name".into()],
            vec![vec![json!(771), json!("Mountain-100")]],
        ));

        let outcome = h
            .pipeline
            .handle_turn(
                &Question::new("What's the best bike for mountains?", 1),
                &ConversationContext::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.route, RouteDecision::Vector);
        assert_eq!(h.store.vector_searches()[0].1, 1);
        assert!(h.store.executed_queries().is_empty());
        assert_eq!(outcome.diagnostics.vector_row_count, Some(1));

        let calls = h.primary.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].system_prompt.contains("SQL Results:\nNone"));
    }

    #[tokio::test]
    async fn test_plan_without_tables_stops_before_synthesis() {
        let h = harness("sql", &["Count all employees.", "SELECT 1"]);

        let failure = h
            .pipeline
            .handle_turn(&Question::new("How many people work here?", 1), &ConversationContext::new())
            .await
            .unwrap_err();

        assert!(matches!(failure.error, AppError::NoRelevantTables));
        assert_eq!(failure.diagnostics.plan.as_deref(), Some("Count all employees."));
        assert_eq!(h.primary.calls().len(), 1);
        assert!(h.store.executed_queries().is_empty());
    }

    #[tokio::test]
    async fn test_unrecognized_route_falls_back_to_sql() {
        let h = harness("graph", &["Nothing relevant."]);

        let failure = h
            .pipeline
            .handle_turn(&Question::new("q", 1), &ConversationContext::new())
            .await
            .unwrap_err();

        assert_eq!(failure.diagnostics.route, Some(RouteDecision::Sql));
        assert!(h.store.vector_searches().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_planned_tables() {
        let h = harness("sql", &["Use Sales.Customer."]);

        let failure = h
            .pipeline
            .handle_turn(&Question::new("How many customers?", 1), &ConversationContext::new())
            .await
            .unwrap_err();

        assert!(matches!(failure.error, AppError::SchemaUnavailable(_)));
        assert_eq!(failure.diagnostics.unresolved_tables, vec!["Sales.Customer"]);
        assert_eq!(h.primary.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_execution_error_keeps_generated_sql() {
        let h = harness(
            "sql",
            &[
                "Use HumanResources.Department.",
                "SELECT GroupName FROM HumanResources.Department",
            ],
        );
        h.store.push_query_error("permission denied for table department");

        let failure = h
            .pipeline
            .handle_turn(&Question::new("Which groups exist?", 1), &ConversationContext::new())
            .await
            .unwrap_err();

        assert_eq!(
            failure.error.to_string(),
            "Query execution failed: permission denied for table department"
        );
        assert_eq!(
            failure.diagnostics.generated_sql.as_deref(),
            Some("SELECT GroupName FROM HumanResources.Department")
        );
    }

    #[tokio::test]
    async fn test_alias_qualified_columns_do_not_displace_tables() {
        let h = harness(
            "sql",
            &[
                "Join Sales.SalesOrderDetail d with Production.Product p on d.ProductID = p.ProductID \
                 and keep d.OrderQty > 0, e.g. a.Name for the label.",
                "SELECT COUNT(*) AS LineCount FROM Sales.SalesOrderDetail",
                "There are 12 order lines.",
            ],
        );
        h.store.push_query_result(ResultSet::new(
            vec!["LineCount".into()],
            vec![vec![json!(12)]],
        ));

        let outcome = h
            .pipeline
            .handle_turn(
                &Question::new("How many order lines reference a product?", 1),
                &ConversationContext::new(),
            )
            .await
            .unwrap();

        assert_eq!(
            outcome.diagnostics.tables.unwrap().to_strings(),
            vec!["Production.Product", "Sales.SalesOrderDetail"]
        );
        assert!(outcome
            .diagnostics
            .unresolved_tables
            .contains(&"d.ProductID".to_string()));
        let calls = h.primary.calls();
        assert!(calls[1].system_prompt.contains("SalesOrderDetail"));
        assert!(calls[1].system_prompt.contains("ListPrice (numeric)"));
    }
}
