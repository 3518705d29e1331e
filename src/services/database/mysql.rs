// MySQL adapter using connection pooling for optimal resource management
use crate::api::middleware::AppError;
use crate::models::{ColumnDescriptor, ResultSet, TableInfo, TableReference};
use crate::services::database::adapter::{bounded, DatabaseAdapter, SearchParams};
use crate::services::database::DatabaseType;
use mysql_async::{prelude::*, Conn, Opts, Params, Pool, PoolConstraints, PoolOpts, Row, Value as MySqlValue};
use serde_json::{json, Value};
use url::Url;

const SYSTEM_SCHEMAS: &str = "('information_schema', 'mysql', 'performance_schema', 'sys')";

pub struct MySQLAdapter {
    pool: Pool,
    /// Deadline for catalog reads and connection tests
    timeout_secs: u64,
}

impl MySQLAdapter {
    pub fn new(connection_url: &str, max_pool_size: usize, timeout_secs: u64) -> Result<Self, AppError> {
        // Validate MySQL URL format
        let url = Url::parse(connection_url)
            .map_err(|e| AppError::Validation(format!("Invalid MySQL URL: {}", e)))?;

        if url.scheme() != "mysql" && url.scheme() != "mariadb" {
            return Err(AppError::Validation(
                "URL must use mysql:// or mariadb:// scheme".to_string(),
            ));
        }

        // mysql_async only understands the mysql:// scheme
        let normalized = connection_url.replacen("mariadb://", "mysql://", 1);
        let opts = Opts::from_url(&normalized)
            .map_err(|e| AppError::Validation(format!("Invalid MySQL URL: {}", e)))?;

        let constraints = PoolConstraints::new(1, max_pool_size.max(1))
            .ok_or_else(|| AppError::Validation("Invalid MySQL pool size".to_string()))?;
        let opts = mysql_async::OptsBuilder::from_opts(opts)
            .pool_opts(PoolOpts::default().with_constraints(constraints));

        Ok(Self {
            pool: Pool::new(opts),
            timeout_secs,
        })
    }

    /// Get a connection from the pool
    async fn get_conn(&self) -> Result<Conn, AppError> {
        self.pool.get_conn().await.map_err(|e| {
            AppError::Connection(format!("Failed to get MySQL connection from pool: {}", e))
        })
    }

    /// Run a text or prepared statement and keep its first result set.
    /// Column names are read from the result metadata so empty results keep them.
    async fn run(
        &self,
        sql: &str,
        params: Option<Params>,
        timeout_secs: u64,
    ) -> Result<ResultSet, AppError> {
        let (columns, rows) = bounded(timeout_secs, "Query", async {
            let mut conn = self.get_conn().await?;
            let fetched = async {
                match params {
                    Some(params) => Self::drain(conn.exec_iter(sql, params).await?).await,
                    None => Self::drain(conn.query_iter(sql).await?).await,
                }
            };
            fetched
                .await
                .map_err(|e| AppError::QueryExecution(e.to_string()))
        })
        .await?;

        let rows = rows
            .into_iter()
            .map(|row| {
                row.unwrap()
                    .into_iter()
                    .map(Self::mysql_value_to_json)
                    .collect()
            })
            .collect();

        Ok(ResultSet::new(columns, rows))
    }

    /// Read column names and rows from the first result set of a query result.
    async fn drain<P: Protocol>(
        mut result: mysql_async::QueryResult<'_, '_, P>,
    ) -> Result<(Vec<String>, Vec<Row>), mysql_async::Error> {
        let columns: Vec<String> = result
            .columns_ref()
            .iter()
            .map(|c| c.name_str().to_string())
            .collect();
        let rows: Vec<Row> = result.collect().await?;
        // A CALL yields a trailing status result set
        result.drop_result().await?;
        Ok((columns, rows))
    }

    /// Helper function to convert MySQL Value to JSON Value
    fn mysql_value_to_json(mysql_val: MySqlValue) -> Value {
        match mysql_val {
            MySqlValue::NULL => Value::Null,
            MySqlValue::Bytes(bytes) => match String::from_utf8(bytes) {
                Ok(s) => json!(s),
                Err(_) => Value::Null,
            },
            MySqlValue::Int(i) => json!(i),
            MySqlValue::UInt(u) => json!(u),
            MySqlValue::Float(f) => json!(f),
            MySqlValue::Double(d) => json!(d),
            MySqlValue::Date(y, m, d, h, min, s, _) => {
                json!(format!("{:04}-{:02}-{:02} {:02}:{:02}:{:02}", y, m, d, h, min, s))
            }
            MySqlValue::Time(is_neg, d, h, m, s, _) => {
                let sign = if is_neg { "-" } else { "" };
                let total_hours = d * 24 + h as u32;
                json!(format!("{}{}:{:02}:{:02}", sign, total_hours, m, s))
            }
        }
    }
}

#[async_trait::async_trait]
impl DatabaseAdapter for MySQLAdapter {
    async fn vector_search(
        &self,
        prompt: &str,
        top: u32,
        params: &SearchParams,
    ) -> Result<ResultSet, AppError> {
        let sql = format!("CALL {}(?, ?, ?)", params.procedure);
        tracing::debug!("Vector search via {} (top {})", params.procedure, top);

        let values: Params = (prompt.to_string(), params.stock, top).into();
        self.run(&sql, Some(values), params.timeout_secs).await
    }

    async fn execute_query(&self, sql: &str, timeout_secs: u64) -> Result<ResultSet, AppError> {
        self.run(sql, None, timeout_secs).await
    }

    async fn list_tables(&self) -> Result<Vec<TableInfo>, AppError> {
        let sql = format!(
            r#"
            SELECT TABLE_SCHEMA, TABLE_NAME, TABLE_COMMENT
            FROM information_schema.TABLES
            WHERE TABLE_SCHEMA NOT IN {}
            ORDER BY TABLE_SCHEMA, TABLE_NAME
            "#,
            SYSTEM_SCHEMAS
        );

        let rows: Vec<(String, String, Option<String>)> =
            bounded(self.timeout_secs, "Catalog query", async {
                let mut conn = self.get_conn().await?;
                conn.query(sql.as_str())
                    .await
                    .map_err(|e| AppError::Database(format!("Failed to get tables: {}", e)))
            })
            .await?;

        Ok(rows
            .into_iter()
            .map(|(schema, name, comment)| TableInfo {
                table: TableReference::new(schema, name),
                description: comment.filter(|c| !c.trim().is_empty()),
            })
            .collect())
    }

    async fn table_columns(
        &self,
        table: &TableReference,
    ) -> Result<Vec<ColumnDescriptor>, AppError> {
        let query = r#"
            SELECT COLUMN_NAME, DATA_TYPE, IS_NULLABLE, COLUMN_COMMENT
            FROM information_schema.COLUMNS
            WHERE LOWER(TABLE_SCHEMA) = LOWER(?) AND LOWER(TABLE_NAME) = LOWER(?)
            ORDER BY ORDINAL_POSITION
        "#;

        let rows: Vec<(String, String, String, Option<String>)> =
            bounded(self.timeout_secs, "Catalog query", async {
                let mut conn = self.get_conn().await?;
                conn.exec(query, (table.schema.as_str(), table.table.as_str()))
                    .await
                    .map_err(|e| AppError::Database(format!("Failed to get columns: {}", e)))
            })
            .await?;

        Ok(rows
            .into_iter()
            .map(|(name, data_type, is_nullable, comment)| ColumnDescriptor {
                name,
                data_type,
                is_nullable: is_nullable == "YES",
                comment: comment.filter(|c| !c.trim().is_empty()),
            })
            .collect())
    }

    async fn test_connection(&self) -> Result<(), AppError> {
        bounded(self.timeout_secs, "Connection test", async {
            let mut conn = self.get_conn().await?;
            conn.ping()
                .await
                .map_err(|e| AppError::Connection(format!("Connection test failed: {}", e)))
        })
        .await
    }

    fn database_type(&self) -> DatabaseType {
        DatabaseType::MySQL
    }
}
