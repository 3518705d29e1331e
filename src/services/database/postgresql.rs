// PostgreSQL adapter using connection pooling for optimal resource management
use crate::api::middleware::AppError;
use crate::models::{ColumnDescriptor, ResultSet, TableInfo, TableReference};
use crate::services::database::adapter::{bounded, DatabaseAdapter, SearchParams};
use crate::services::database::DatabaseType;
use deadpool_postgres::Pool;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::error::Error;
use tokio_postgres::types::{FromSql, ToSql, Type};
use tokio_postgres::Row;
use url::Url;

const SYSTEM_SCHEMAS: &str = "('pg_catalog', 'information_schema', 'pg_toast')";

/// MONEY travels as a 64-bit count of cents
struct Money(i64);

impl<'a> FromSql<'a> for Money {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, Box<dyn Error + Sync + Send>> {
        let bytes: [u8; 8] = raw.try_into()?;
        Ok(Money(i64::from_be_bytes(bytes)))
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::MONEY
    }
}

/// Whole decimals become JSON integers, the rest floats
fn decimal_value(value: Decimal) -> Value {
    if value.fract().is_zero() {
        if let Some(whole) = value.to_i64() {
            return json!(whole);
        }
    }
    let text = value.to_string();
    match text.parse::<f64>() {
        Ok(f) if f.is_finite() => json!(f),
        _ => json!(text),
    }
}

pub struct PostgreSQLAdapter {
    pool: Pool,
    /// Deadline for catalog reads and connection tests
    timeout_secs: u64,
}

impl PostgreSQLAdapter {
    pub fn new(pool: Pool, connection_url: &str, timeout_secs: u64) -> Result<Self, AppError> {
        // Validate PostgreSQL URL format
        let url = Url::parse(connection_url)
            .map_err(|e| AppError::Validation(format!("Invalid PostgreSQL URL: {}", e)))?;

        if url.scheme() != "postgresql" && url.scheme() != "postgres" {
            return Err(AppError::Validation(
                "URL must use postgresql:// or postgres:// scheme".to_string(),
            ));
        }

        Ok(Self { pool, timeout_secs })
    }

    async fn client(&self) -> Result<deadpool_postgres::Object, AppError> {
        self.pool
            .get()
            .await
            .map_err(|e| AppError::Connection(format!("Failed to get connection from pool: {}", e)))
    }

    /// Prepare, then run, so column names are known even when no row comes back
    async fn run(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
        timeout_secs: u64,
    ) -> Result<ResultSet, AppError> {
        let (statement, rows) = bounded(timeout_secs, "Query", async {
            let client = self.client().await?;
            let statement = client
                .prepare(sql)
                .await
                .map_err(|e| AppError::QueryExecution(Self::error_message(&e)))?;
            let rows = client
                .query(&statement, params)
                .await
                .map_err(|e| AppError::QueryExecution(Self::error_message(&e)))?;
            Ok((statement, rows))
        })
        .await?;

        let columns = statement
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        let rows = rows.iter().map(Self::row_values).collect();

        Ok(ResultSet::new(columns, rows))
    }

    /// Database diagnostic text, without the driver's wrapping
    fn error_message(e: &tokio_postgres::Error) -> String {
        match e.as_db_error() {
            Some(db_error) => format!("{} (SQLSTATE {})", db_error.message(), db_error.code().code()),
            None => e.to_string(),
        }
    }

    fn row_values(row: &Row) -> Vec<Value> {
        row.columns()
            .iter()
            .enumerate()
            .map(|(idx, column)| Self::cell_value(row, idx, column.type_()))
            .collect()
    }

    fn cell_value(row: &Row, idx: usize, pg_type: &Type) -> Value {
        fn opt<T: serde::Serialize>(value: Result<Option<T>, tokio_postgres::Error>) -> Value {
            match value {
                Ok(Some(v)) => json!(v),
                _ => Value::Null,
            }
        }

        match *pg_type {
            Type::INT2 => opt(row.try_get::<_, Option<i16>>(idx)),
            Type::INT4 => opt(row.try_get::<_, Option<i32>>(idx)),
            Type::INT8 => opt(row.try_get::<_, Option<i64>>(idx)),
            Type::FLOAT4 => opt(row.try_get::<_, Option<f32>>(idx)),
            Type::FLOAT8 => opt(row.try_get::<_, Option<f64>>(idx)),
            Type::BOOL => opt(row.try_get::<_, Option<bool>>(idx)),
            Type::NUMERIC => match row.try_get::<_, Option<Decimal>>(idx) {
                Ok(Some(v)) => decimal_value(v),
                Ok(None) => Value::Null,
                // NaN or more than 28 significant digits
                Err(_) => json!("<numeric>"),
            },
            Type::MONEY => match row.try_get::<_, Option<Money>>(idx) {
                Ok(Some(Money(cents))) => decimal_value(Decimal::new(cents, 2)),
                _ => Value::Null,
            },
            Type::DATE => opt(
                row.try_get::<_, Option<chrono::NaiveDate>>(idx)
                    .map(|v| v.map(|d| d.to_string())),
            ),
            Type::TIMESTAMP => opt(
                row.try_get::<_, Option<chrono::NaiveDateTime>>(idx)
                    .map(|v| v.map(|d| d.to_string())),
            ),
            Type::TIMESTAMPTZ => opt(
                row.try_get::<_, Option<chrono::DateTime<chrono::Utc>>>(idx)
                    .map(|v| v.map(|d| d.to_rfc3339())),
            ),
            _ => match row.try_get::<_, Option<String>>(idx) {
                Ok(Some(v)) => json!(v),
                Ok(None) => Value::Null,
                // Types without a text decoding (uuid, bytea...) show their name
                Err(_) => json!(format!("<{}>", pg_type.name())),
            },
        }
    }
}

#[async_trait::async_trait]
impl DatabaseAdapter for PostgreSQLAdapter {
    async fn vector_search(
        &self,
        prompt: &str,
        top: u32,
        params: &SearchParams,
    ) -> Result<ResultSet, AppError> {
        let sql = format!(
            "SELECT * FROM {}($1::text, $2::int, $3::int)",
            params.procedure
        );
        let top = top as i32;
        tracing::debug!("Vector search via {} (top {})", params.procedure, top);

        self.run(&sql, &[&prompt, &params.stock, &top], params.timeout_secs)
            .await
    }

    async fn execute_query(&self, sql: &str, timeout_secs: u64) -> Result<ResultSet, AppError> {
        self.run(sql, &[], timeout_secs).await
    }

    async fn list_tables(&self) -> Result<Vec<TableInfo>, AppError> {
        let sql = format!(
            r#"
            SELECT
                t.table_schema::text,
                t.table_name::text,
                obj_description(format('%I.%I', t.table_schema, t.table_name)::regclass, 'pg_class')
            FROM information_schema.tables t
            WHERE t.table_schema NOT IN {}
              AND t.table_type IN ('BASE TABLE', 'VIEW')
            ORDER BY t.table_schema, t.table_name
            "#,
            SYSTEM_SCHEMAS
        );

        let rows = bounded(self.timeout_secs, "Catalog query", async {
            let client = self.client().await?;
            client
                .query(sql.as_str(), &[])
                .await
                .map_err(|e| AppError::Database(format!("Failed to get tables: {}", e)))
        })
        .await?;

        Ok(rows
            .iter()
            .map(|row| TableInfo {
                table: TableReference::new(row.get::<_, String>(0), row.get::<_, String>(1)),
                description: row.get::<_, Option<String>>(2),
            })
            .collect())
    }

    async fn table_columns(
        &self,
        table: &TableReference,
    ) -> Result<Vec<ColumnDescriptor>, AppError> {
        let rows = bounded(self.timeout_secs, "Catalog query", async {
            let client = self.client().await?;
            client
                .query(
                    r#"
                    SELECT
                        c.column_name::text,
                        c.data_type::text,
                        c.is_nullable::text,
                        col_description(
                            format('%I.%I', c.table_schema, c.table_name)::regclass,
                            c.ordinal_position::int
                        )
                    FROM information_schema.columns c
                    WHERE lower(c.table_schema) = lower($1) AND lower(c.table_name) = lower($2)
                    ORDER BY c.ordinal_position
                    "#,
                    &[&table.schema, &table.table],
                )
                .await
                .map_err(|e| AppError::Database(format!("Failed to get columns: {}", e)))
        })
        .await?;

        Ok(rows
            .iter()
            .map(|row| ColumnDescriptor {
                name: row.get(0),
                data_type: row.get(1),
                is_nullable: row.get::<_, String>(2) == "YES",
                comment: row.get::<_, Option<String>>(3),
            })
            .collect())
    }

    async fn test_connection(&self) -> Result<(), AppError> {
        bounded(self.timeout_secs, "Connection test", async {
            let client = self
                .pool
                .get()
                .await
                .map_err(|e| AppError::Connection(format!("Connection test failed: {}", e)))?;
            client
                .simple_query("SELECT 1")
                .await
                .map_err(|e| AppError::Connection(format!("Connection test failed: {}", e)))?;
            Ok(())
        })
        .await
    }

    fn database_type(&self) -> DatabaseType {
        DatabaseType::PostgreSQL
    }
}
