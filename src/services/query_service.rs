use crate::api::middleware::AppError;
use crate::config::{DataStoreConfig, ValidationConfig};
use crate::models::{ExecutableQuery, IdentifierFilter, ResultSet, SchemaDescription};
use crate::services::database::DatabaseAdapter;
use crate::validation::SqlValidator;
use std::sync::Arc;
use std::time::Instant;

/// Result of running a generated query
#[derive(Debug, Clone)]
pub struct ExecutedQuery {
    /// The statement sent to the data store, after LIMIT enforcement
    pub sql: String,
    pub results: ResultSet,
    pub execution_time_ms: u64,
}

/// Validates generated queries and runs them against the data store.
///
/// A rejected or failing query is reported as is; nothing is repaired or
/// sent back to the model.
pub struct QueryService {
    adapter: Arc<dyn DatabaseAdapter>,
    validator: SqlValidator,
    row_limit: u64,
    timeout_secs: u64,
    enforce_schema: bool,
    enforce_identifier_filter: bool,
}

impl QueryService {
    pub fn new(
        adapter: Arc<dyn DatabaseAdapter>,
        datastore: &DataStoreConfig,
        validation: &ValidationConfig,
    ) -> Self {
        let validator = SqlValidator::new(adapter.database_type());
        Self {
            adapter,
            validator,
            row_limit: datastore.row_limit,
            timeout_secs: datastore.query_timeout_secs,
            enforce_schema: validation.enforce_schema,
            enforce_identifier_filter: validation.enforce_identifier_filter,
        }
    }

    /// Check a query without running it; returns the statement that would be sent
    pub fn prepare(
        &self,
        query: &ExecutableQuery,
        schema: &SchemaDescription,
        filter: Option<&IdentifierFilter>,
    ) -> Result<String, AppError> {
        let sql = query.as_str();
        let statement = self.validator.validate_select_only(sql)?;

        if self.enforce_schema {
            self.validator.validate_against_schema(&statement, schema)?;
        }

        if self.enforce_identifier_filter {
            if let Some(filter) = filter {
                self.validator.validate_identifier_filter(&statement, filter)?;
            }
        }

        Ok(SqlValidator::ensure_limit(sql, &statement, self.row_limit))
    }

    pub async fn execute(
        &self,
        query: &ExecutableQuery,
        schema: &SchemaDescription,
        filter: Option<&IdentifierFilter>,
    ) -> Result<ExecutedQuery, AppError> {
        let prepared_sql = self.prepare(query, schema, filter)?;
        let start_time = Instant::now();

        let results = self
            .adapter
            .execute_query(&prepared_sql, self.timeout_secs)
            .await
            .map_err(|e| {
                tracing::error!("Generated query failed: {}", e);
                e
            })?;

        let execution_time_ms = start_time.elapsed().as_millis() as u64;
        tracing::info!(
            "Query returned {} rows in {}ms",
            results.row_count(),
            execution_time_ms
        );

        Ok(ExecutedQuery {
            sql: prepared_sql,
            results,
            execution_time_ms,
        })
    }
}
