use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub datastore: DataStoreConfig,
    pub llm: LlmConfig,
    pub search: SearchConfig,
    pub catalog: CatalogConfig,
    pub validation: ValidationConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// SQLite file holding the turn log
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataStoreConfig {
    pub kind: String,
    pub url: String,
    pub query_timeout_secs: u64,
    pub row_limit: u64,
    pub max_pool_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    pub gateway_url: String,
    pub api_key: Option<String>,
    pub primary_model: String,
    pub secondary_model: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    pub procedure: String,
    pub identifier_column: String,
    pub vector_top: u32,
    pub hybrid_top: u32,
    pub stock: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    pub descriptions_path: Option<String>,
    pub cache_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValidationConfig {
    pub enforce_schema: bool,
    pub enforce_identifier_filter: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub style: String,
}

/// (environment variable, config key) pairs applied as overrides
const ENV_OVERRIDES: &[(&str, &str)] = &[
    ("HOST", "server.host"),
    ("PORT", "server.port"),
    ("STORAGE_URL", "storage.url"),
    ("DATASTORE_KIND", "datastore.kind"),
    ("DATASTORE_URL", "datastore.url"),
    ("QUERY_TIMEOUT_SECS", "datastore.query_timeout_secs"),
    ("QUERY_ROW_LIMIT", "datastore.row_limit"),
    ("DATASTORE_POOL_SIZE", "datastore.max_pool_size"),
    ("LLM_GATEWAY_URL", "llm.gateway_url"),
    ("LLM_PRIMARY_MODEL", "llm.primary_model"),
    ("LLM_SECONDARY_MODEL", "llm.secondary_model"),
    ("LLM_TIMEOUT_SECS", "llm.timeout_secs"),
    ("VECTOR_SEARCH_PROCEDURE", "search.procedure"),
    ("IDENTIFIER_COLUMN", "search.identifier_column"),
    ("VECTOR_TOP", "search.vector_top"),
    ("HYBRID_TOP", "search.hybrid_top"),
    ("VECTOR_SEARCH_STOCK", "search.stock"),
    ("CATALOG_CACHE_TTL_SECS", "catalog.cache_ttl_secs"),
    ("ENFORCE_SCHEMA", "validation.enforce_schema"),
    ("ENFORCE_IDENTIFIER_FILTER", "validation.enforce_identifier_filter"),
    ("RUST_LOG", "logging.level"),
    ("RUST_LOG_STYLE", "logging.style"),
];

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        // Load .env before reading overrides
        let _ = dotenv::dotenv();

        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each known variable
    pub fn from_lookup<F>(lookup: F) -> Result<Self, config::ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = config::Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            .set_default("storage.url", "./turns.db")?
            .set_default("datastore.kind", "postgresql")?
            .set_default("datastore.url", "postgresql://localhost:5432/adventureworks")?
            .set_default("datastore.query_timeout_secs", 30)?
            .set_default("datastore.row_limit", 1000)?
            .set_default("datastore.max_pool_size", 16)?
            .set_default("llm.gateway_url", "http://127.0.0.1:11434")?
            .set_default("llm.primary_model", "qwen2.5-coder:7b")?
            .set_default("llm.secondary_model", "llama3.2:3b")?
            .set_default("llm.timeout_secs", 120)?
            .set_default("search.procedure", "find_relevant_products_vector_search")?
            .set_default("search.identifier_column", "ProductID")?
            .set_default("search.vector_top", 1)?
            .set_default("search.hybrid_top", 10)?
            .set_default("search.stock", 100)?
            .set_default("catalog.cache_ttl_secs", 300)?
            .set_default("validation.enforce_schema", true)?
            .set_default("validation.enforce_identifier_filter", true)?
            .set_default("logging.level", "info")?
            .set_default("logging.style", "auto")?;

        for (var, key) in ENV_OVERRIDES {
            if let Some(value) = lookup(var) {
                builder = builder.set_override(*key, value)?;
            }
        }

        if let Some(api_key) = lookup("LLM_API_KEY") {
            builder = builder.set_override("llm.api_key", Some(api_key))?;
        }

        if let Some(path) = lookup("CATALOG_DESCRIPTIONS") {
            builder = builder.set_override("catalog.descriptions_path", Some(path))?;
        }

        let config: Config = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would otherwise fail mid-turn
    fn validate(&self) -> Result<(), config::ConfigError> {
        if !is_qualified_identifier(&self.search.procedure) {
            return Err(config::ConfigError::Message(format!(
                "search.procedure must be an identifier, optionally schema-qualified: {}",
                self.search.procedure
            )));
        }
        if self.search.identifier_column.trim().is_empty() {
            return Err(config::ConfigError::Message(
                "search.identifier_column cannot be empty".to_string(),
            ));
        }
        if self.search.vector_top == 0 || self.search.hybrid_top == 0 {
            return Err(config::ConfigError::Message(
                "search.vector_top and search.hybrid_top must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

/// `name` or `schema.name`, each part `[A-Za-z_][A-Za-z0-9_]*`
pub fn is_qualified_identifier(s: &str) -> bool {
    let parts: Vec<&str> = s.split('.').collect();
    if parts.is_empty() || parts.len() > 2 {
        return false;
    }
    parts.iter().all(|part| {
        let mut chars = part.chars();
        match chars.next() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {
                chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
            }
            _ => false,
        }
    })
}
