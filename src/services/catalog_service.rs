use crate::api::middleware::AppError;
use crate::models::{SchemaDescription, TableInfo, TableReference, TableSchema, TableSet};
use crate::services::database::DatabaseAdapter;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

const NO_DESCRIPTION: &str = "(no description)";

/// Table descriptions and column-level schema for the data store
#[async_trait::async_trait]
pub trait SchemaCatalog: Send + Sync {
    async fn list_tables(&self) -> Result<Vec<TableInfo>, AppError>;

    /// Forget any cached table list so the next read goes to the data store
    async fn invalidate(&self) {}

    /// Column descriptors for every member of `tables`.
    /// Fails with `UnknownTable` when a member is not in the catalog.
    async fn describe_schema(&self, tables: &TableSet) -> Result<SchemaDescription, AppError>;

    /// One `[schema.table]: description` line per known table
    async fn describe_all_tables(&self) -> Result<String, AppError> {
        let tables = self.list_tables().await?;
        Ok(tables
            .iter()
            .map(|info| {
                format!(
                    "[{}]: {}",
                    info.table,
                    info.description.as_deref().unwrap_or(NO_DESCRIPTION)
                )
            })
            .collect::<Vec<_>>()
            .join("\n"))
    }

    /// Split `tables` into members the catalog knows (in catalog casing) and the rest
    async fn resolve(&self, tables: &TableSet) -> Result<(TableSet, Vec<TableReference>), AppError> {
        let known = self.list_tables().await?;
        let mut resolved = Vec::new();
        let mut unresolved = Vec::new();

        for reference in tables.iter() {
            match known.iter().find(|info| info.table.matches(reference)) {
                Some(info) => resolved.push(info.table.clone()),
                None => unresolved.push(reference.clone()),
            }
        }

        Ok((TableSet::from_references(resolved), unresolved))
    }
}

struct CachedTables {
    tables: Vec<TableInfo>,
    loaded_at: Instant,
}

/// Catalog backed by the data store's information schema.
///
/// The table list is cached for `ttl`; column schemas are read on every call.
pub struct DatabaseCatalog {
    adapter: Arc<dyn DatabaseAdapter>,
    descriptions: HashMap<String, String>,
    cache: RwLock<Option<CachedTables>>,
    ttl: Duration,
}

impl DatabaseCatalog {
    pub fn new(adapter: Arc<dyn DatabaseAdapter>, ttl_secs: u64) -> Self {
        Self {
            adapter,
            descriptions: HashMap::new(),
            cache: RwLock::new(None),
            ttl: Duration::from_secs(ttl_secs),
        }
    }

    /// Descriptions that take precedence over database comments, keyed by `schema.table`
    pub fn with_descriptions(mut self, descriptions: HashMap<String, String>) -> Self {
        self.descriptions = descriptions
            .into_iter()
            .filter_map(|(name, description)| {
                TableReference::parse(&name).map(|reference| (reference.key(), description))
            })
            .collect();
        self
    }

    /// Read a JSON object of `"schema.table": "description"` pairs
    pub fn load_descriptions(path: &Path) -> Result<HashMap<String, String>, AppError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::Internal(format!(
                "Failed to read catalog descriptions {}: {}",
                path.display(),
                e
            ))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            AppError::Internal(format!(
                "Invalid catalog descriptions {}: {}",
                path.display(),
                e
            ))
        })
    }

    async fn load_tables(&self) -> Result<Vec<TableInfo>, AppError> {
        let mut tables = self.adapter.list_tables().await?;
        for info in &mut tables {
            if let Some(description) = self.descriptions.get(&info.table.key()) {
                info.description = Some(description.clone());
            }
        }
        tracing::info!("Loaded {} catalog tables", tables.len());
        Ok(tables)
    }
}

#[async_trait::async_trait]
impl SchemaCatalog for DatabaseCatalog {
    async fn invalidate(&self) {
        *self.cache.write().await = None;
        tracing::info!("Catalog cache cleared");
    }

    async fn list_tables(&self) -> Result<Vec<TableInfo>, AppError> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.loaded_at.elapsed() < self.ttl {
                    return Ok(cached.tables.clone());
                }
            }
        }

        let mut cache = self.cache.write().await;

        // Another task may have refreshed the cache while we waited for the lock
        if let Some(cached) = cache.as_ref() {
            if cached.loaded_at.elapsed() < self.ttl {
                return Ok(cached.tables.clone());
            }
        }

        let tables = self.load_tables().await?;
        *cache = Some(CachedTables {
            tables: tables.clone(),
            loaded_at: Instant::now(),
        });
        Ok(tables)
    }

    async fn describe_schema(&self, tables: &TableSet) -> Result<SchemaDescription, AppError> {
        let known = self.list_tables().await?;
        let mut schemas = Vec::with_capacity(tables.len());

        for reference in tables.iter() {
            let canonical = known
                .iter()
                .find(|info| info.table.matches(reference))
                .map(|info| info.table.clone())
                .ok_or_else(|| AppError::UnknownTable(reference.to_string()))?;

            let columns = self.adapter.table_columns(&canonical).await?;
            if columns.is_empty() {
                tracing::warn!("Catalog table {} has no readable columns", canonical);
            }
            schemas.push(TableSchema {
                table: canonical,
                columns,
            });
        }

        Ok(SchemaDescription::new(schemas))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeDataStore;
    use std::io::Write;

    fn catalog(store: Arc<FakeDataStore>) -> DatabaseCatalog {
        DatabaseCatalog::new(store, 300)
    }

    #[tokio::test]
    async fn test_describe_all_tables_uses_overrides() {
        let store = Arc::new(FakeDataStore::adventure_works());
        let mut overrides = HashMap::new();
        overrides.insert(
            "humanresources.department".to_string(),
            "Company departments.".to_string(),
        );
        let catalog = catalog(store).with_descriptions(overrides);

        let summary = catalog.describe_all_tables().await.unwrap();
        assert!(summary.contains("[HumanResources.Department]: Company departments."));
        assert!(summary.contains("[Production.Product]: Products sold or used in manufacturing."));
        assert_eq!(summary.lines().count(), 4);
    }

    #[tokio::test]
    async fn test_table_list_is_cached() {
        let store = Arc::new(FakeDataStore::adventure_works());
        let catalog = catalog(store.clone());

        catalog.list_tables().await.unwrap();
        catalog.list_tables().await.unwrap();
        assert_eq!(store.list_tables_calls(), 1);

        catalog.invalidate().await;
        catalog.list_tables().await.unwrap();
        assert_eq!(store.list_tables_calls(), 2);
    }

    #[tokio::test]
    async fn test_describe_schema_uses_catalog_casing() {
        let catalog = catalog(Arc::new(FakeDataStore::adventure_works()));
        let tables = TableSet::from_references(vec![TableReference::new("humanresources", "DEPARTMENT")]);

        let schema = catalog.describe_schema(&tables).await.unwrap();
        assert_eq!(schema.tables.len(), 1);
        assert_eq!(schema.tables[0].table.to_string(), "HumanResources.Department");
        assert!(schema.render('"').starts_with("\"HumanResources\".\"Department\":"));
    }

    #[tokio::test]
    async fn test_describe_schema_unknown_table() {
        let catalog = catalog(Arc::new(FakeDataStore::adventure_works()));
        let tables = TableSet::from_references(vec![TableReference::new("Sales", "Nope")]);

        let err = catalog.describe_schema(&tables).await.unwrap_err();
        assert!(matches!(err, AppError::UnknownTable(ref t) if t == "Sales.Nope"));
    }

    #[tokio::test]
    async fn test_resolve_splits_unknown_references() {
        let catalog = catalog(Arc::new(FakeDataStore::adventure_works()));
        let tables = TableSet::from_references(vec![
            TableReference::new("production", "product"),
            TableReference::new("e", "g"),
        ]);

        let (resolved, unresolved) = catalog.resolve(&tables).await.unwrap();
        assert_eq!(resolved.to_strings(), vec!["Production.Product"]);
        assert_eq!(unresolved, vec![TableReference::new("e", "g")]);
    }

    #[test]
    fn test_load_descriptions_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("descriptions.json");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(file, r#"{{"Sales.Customer": "Customer accounts."}}"#).unwrap();

        let descriptions = DatabaseCatalog::load_descriptions(&path).unwrap();
        assert_eq!(descriptions.get("Sales.Customer").unwrap(), "Customer accounts.");
        assert!(DatabaseCatalog::load_descriptions(&dir.path().join("missing.json")).is_err());
    }
}
