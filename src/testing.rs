//! In-memory doubles for the model and the data store, shared by the unit tests.

use crate::api::middleware::AppError;
use crate::config::{
    CatalogConfig, Config, DataStoreConfig, LlmConfig, LoggingConfig, SearchConfig, ServerConfig,
    StorageConfig, ValidationConfig,
};
use crate::models::{ColumnDescriptor, ContextEntry, ResultSet, TableInfo, TableReference};
use crate::services::catalog_service::DatabaseCatalog;
use crate::services::database::{DatabaseAdapter, DatabaseType, SearchParams};
use crate::services::llm_service::{ModelHandles, ModelService};
use crate::services::pipeline::QueryPipeline;
use crate::services::query_service::QueryService;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// One recorded model invocation
#[derive(Debug, Clone)]
pub struct ModelCall {
    pub system_prompt: String,
    pub human_input: String,
    pub context: Vec<ContextEntry>,
}

/// Model that replays canned replies in order and records every prompt
pub struct ScriptedModel {
    replies: Mutex<VecDeque<String>>,
    calls: Mutex<Vec<ModelCall>>,
    unavailable: Option<String>,
}

impl ScriptedModel {
    pub fn new(replies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            calls: Mutex::new(Vec::new()),
            unavailable: None,
        }
    }

    /// Every call fails with `ModelUnavailable(message)`
    pub fn unavailable(message: &str) -> Self {
        Self {
            unavailable: Some(message.to_string()),
            ..Self::new(&[])
        }
    }

    pub fn calls(&self) -> Vec<ModelCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ModelService for ScriptedModel {
    async fn invoke(
        &self,
        system_prompt: &str,
        human_input: &str,
        context: &[ContextEntry],
    ) -> Result<String, AppError> {
        self.calls.lock().unwrap().push(ModelCall {
            system_prompt: system_prompt.to_string(),
            human_input: human_input.to_string(),
            context: context.to_vec(),
        });

        if let Some(message) = &self.unavailable {
            return Err(AppError::ModelUnavailable(message.clone()));
        }

        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| AppError::ModelUnavailable("script exhausted".to_string()))
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

struct FakeTable {
    info: TableInfo,
    columns: Vec<ColumnDescriptor>,
}

/// Data store with a fixed catalog and queued results.
///
/// Calls with nothing queued return an empty result set.
pub struct FakeDataStore {
    tables: Vec<FakeTable>,
    vector_results: Mutex<VecDeque<ResultSet>>,
    query_results: Mutex<VecDeque<Result<ResultSet, String>>>,
    vector_searches: Mutex<Vec<(String, u32)>>,
    executed: Mutex<Vec<String>>,
    list_tables_calls: Mutex<usize>,
}

fn column(name: &str, data_type: &str, is_nullable: bool, comment: Option<&str>) -> ColumnDescriptor {
    ColumnDescriptor {
        name: name.to_string(),
        data_type: data_type.to_string(),
        is_nullable,
        comment: comment.map(str::to_string),
    }
}

impl FakeDataStore {
    /// A slice of the AdventureWorks sample schema
    pub fn adventure_works() -> Self {
        let table = |schema: &str, name: &str, description: &str, columns: Vec<ColumnDescriptor>| FakeTable {
            info: TableInfo {
                table: TableReference::new(schema, name),
                description: Some(description.to_string()),
            },
            columns,
        };

        Self {
            tables: vec![
                table(
                    "HumanResources",
                    "Department",
                    "Lookup table containing the departments within the company.",
                    vec![
                        column("DepartmentID", "smallint", false, Some("Primary key")),
                        column("Name", "varchar", false, Some("Name of the department.")),
                        column("GroupName", "varchar", false, None),
                        column("ModifiedDate", "timestamp", false, None),
                    ],
                ),
                table(
                    "HumanResources",
                    "Employee",
                    "Employee information such as salary, department, and title.",
                    vec![
                        column("BusinessEntityID", "integer", false, Some("Primary key")),
                        column("JobTitle", "varchar", false, None),
                        column("DepartmentID", "smallint", true, None),
                        column("HireDate", "date", false, None),
                    ],
                ),
                table(
                    "Production",
                    "Product",
                    "Products sold or used in manufacturing.",
                    vec![
                        column("ProductID", "integer", false, Some("Primary key")),
                        column("Name", "varchar", false, None),
                        column("ListPrice", "numeric", false, Some("Selling price.")),
                        column("SafetyStockLevel", "smallint", false, Some("Minimum inventory quantity.")),
                        column("Color", "varchar", true, None),
                    ],
                ),
                table(
                    "Sales",
                    "SalesOrderDetail",
                    "Individual products associated with a specific sales order.",
                    vec![
                        column("SalesOrderID", "integer", false, None),
                        column("ProductID", "integer", false, None),
                        column("OrderQty", "smallint", false, None),
                        column("LineTotal", "numeric", false, None),
                    ],
                ),
            ],
            vector_results: Mutex::new(VecDeque::new()),
            query_results: Mutex::new(VecDeque::new()),
            vector_searches: Mutex::new(Vec::new()),
            executed: Mutex::new(Vec::new()),
            list_tables_calls: Mutex::new(0),
        }
    }

    pub fn push_vector_result(&self, results: ResultSet) {
        self.vector_results.lock().unwrap().push_back(results);
    }

    pub fn push_query_result(&self, results: ResultSet) {
        self.query_results.lock().unwrap().push_back(Ok(results));
    }

    /// Next query fails with this database diagnostic
    pub fn push_query_error(&self, message: &str) {
        self.query_results
            .lock()
            .unwrap()
            .push_back(Err(message.to_string()));
    }

    pub fn executed_queries(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    pub fn vector_searches(&self) -> Vec<(String, u32)> {
        self.vector_searches.lock().unwrap().clone()
    }

    pub fn list_tables_calls(&self) -> usize {
        *self.list_tables_calls.lock().unwrap()
    }
}

#[async_trait::async_trait]
impl DatabaseAdapter for FakeDataStore {
    async fn vector_search(
        &self,
        prompt: &str,
        top: u32,
        _params: &SearchParams,
    ) -> Result<ResultSet, AppError> {
        self.vector_searches
            .lock()
            .unwrap()
            .push((prompt.to_string(), top));
        Ok(self
            .vector_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default())
    }

    async fn execute_query(&self, sql: &str, _timeout_secs: u64) -> Result<ResultSet, AppError> {
        self.executed.lock().unwrap().push(sql.to_string());
        match self.query_results.lock().unwrap().pop_front() {
            Some(Ok(results)) => Ok(results),
            Some(Err(message)) => Err(AppError::QueryExecution(message)),
            None => Ok(ResultSet::default()),
        }
    }

    async fn list_tables(&self) -> Result<Vec<TableInfo>, AppError> {
        *self.list_tables_calls.lock().unwrap() += 1;
        Ok(self.tables.iter().map(|t| t.info.clone()).collect())
    }

    async fn table_columns(
        &self,
        table: &TableReference,
    ) -> Result<Vec<ColumnDescriptor>, AppError> {
        Ok(self
            .tables
            .iter()
            .find(|t| t.info.table.matches(table))
            .map(|t| t.columns.clone())
            .unwrap_or_default())
    }

    async fn test_connection(&self) -> Result<(), AppError> {
        Ok(())
    }

    fn database_type(&self) -> DatabaseType {
        DatabaseType::PostgreSQL
    }
}

pub fn datastore_config() -> DataStoreConfig {
    DataStoreConfig {
        kind: "postgresql".to_string(),
        url: "postgresql://localhost/adventureworks".to_string(),
        query_timeout_secs: 30,
        row_limit: 1000,
        max_pool_size: 4,
    }
}

/// Query service over `store` with both structural checks on
pub fn query_service(store: Arc<FakeDataStore>) -> QueryService {
    let validation = ValidationConfig {
        enforce_schema: true,
        enforce_identifier_filter: true,
    };
    QueryService::new(store, &datastore_config(), &validation)
}

pub fn search_config() -> SearchConfig {
    SearchConfig {
        procedure: "find_relevant_products_vector_search".to_string(),
        identifier_column: "ProductID".to_string(),
        vector_top: 1,
        hybrid_top: 10,
        stock: 100,
    }
}

/// Full pipeline over `store`; the router talks to `secondary`, every other stage to `primary`
pub fn pipeline(
    store: Arc<FakeDataStore>,
    primary: Arc<ScriptedModel>,
    secondary: Arc<ScriptedModel>,
) -> QueryPipeline {
    let models = ModelHandles::new(primary, secondary, 5);
    let catalog = Arc::new(DatabaseCatalog::new(store.clone(), 300));
    let query_service = Arc::new(query_service(store.clone()));
    QueryPipeline::new(models, store, catalog, query_service, &search_config(), 30)
}

pub fn test_config() -> Config {
    Config {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 3000,
        },
        storage: StorageConfig {
            url: ":memory:".to_string(),
        },
        datastore: datastore_config(),
        llm: LlmConfig {
            gateway_url: "http://127.0.0.1:11434".to_string(),
            api_key: None,
            primary_model: "qwen2.5-coder:7b".to_string(),
            secondary_model: "llama3.2:3b".to_string(),
            timeout_secs: 5,
        },
        search: search_config(),
        catalog: CatalogConfig {
            descriptions_path: None,
            cache_ttl_secs: 300,
        },
        validation: ValidationConfig {
            enforce_schema: true,
            enforce_identifier_filter: true,
        },
        logging: LoggingConfig {
            level: "info".to_string(),
            style: "auto".to_string(),
        },
    }
}
