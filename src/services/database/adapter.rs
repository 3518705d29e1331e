// Data store adapter trait shared by the PostgreSQL and MySQL backends
use crate::api::middleware::AppError;
use crate::models::{ColumnDescriptor, ResultSet, TableInfo, TableReference};
use crate::services::database::DatabaseType;
use std::future::Future;
use std::time::Duration;

/// Parameters of the stored vector-search procedure
#[derive(Debug, Clone)]
pub struct SearchParams {
    /// Procedure name, validated as an identifier when the config is loaded
    pub procedure: String,
    pub stock: i32,
    pub timeout_secs: u64,
}

impl SearchParams {
    pub fn new(procedure: impl Into<String>, stock: i32, timeout_secs: u64) -> Self {
        Self {
            procedure: procedure.into(),
            stock,
            timeout_secs,
        }
    }
}

/// Run `operation` under a deadline of `timeout_secs`.
///
/// The deadline covers pool checkout as well as the statement itself, so an
/// unreachable store fails the call instead of hanging it.
pub(crate) async fn bounded<T, F>(timeout_secs: u64, what: &str, operation: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, AppError>>,
{
    tokio::time::timeout(Duration::from_secs(timeout_secs), operation)
        .await
        .map_err(|_| AppError::QueryExecution(format!("{} timeout after {} seconds", what, timeout_secs)))?
}

/// Abstraction over the relational store holding the dataset.
///
/// Every method takes a connection from the pool for the duration of the
/// call only; the connection goes back to the pool when it is dropped, on
/// success and on every error path.
#[async_trait::async_trait]
pub trait DatabaseAdapter: Send + Sync {
    /// Run the semantic search procedure with the raw prompt text
    async fn vector_search(
        &self,
        prompt: &str,
        top: u32,
        params: &SearchParams,
    ) -> Result<ResultSet, AppError>;

    /// Execute a read query; database diagnostics are returned verbatim
    /// as `AppError::QueryExecution`
    async fn execute_query(&self, sql: &str, timeout_secs: u64) -> Result<ResultSet, AppError>;

    /// All user tables and views with their stored comments
    async fn list_tables(&self) -> Result<Vec<TableInfo>, AppError>;

    /// Ordered column descriptors; empty when the table does not exist
    async fn table_columns(
        &self,
        table: &TableReference,
    ) -> Result<Vec<ColumnDescriptor>, AppError>;

    async fn test_connection(&self) -> Result<(), AppError>;

    fn database_type(&self) -> DatabaseType;
}
