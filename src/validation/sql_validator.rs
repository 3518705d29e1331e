use std::collections::HashSet;
use std::ops::ControlFlow;

use sqlparser::ast::{
    visit_expressions, visit_relations, Expr, Query, SelectItem, SetExpr, Statement, TableAlias,
    TableFactor, Visit, Visitor,
};
use sqlparser::dialect::{Dialect, MySqlDialect, PostgreSqlDialect};
use sqlparser::parser::Parser;

use crate::api::middleware::AppError;
use crate::models::{IdentifierFilter, SchemaDescription, TableReference};
use crate::services::database::DatabaseType;

/// Structural checks for generated queries: read-only, single statement,
/// schema-literal and filter-preserving.
pub struct SqlValidator {
    database_type: DatabaseType,
}

impl SqlValidator {
    pub fn new(database_type: DatabaseType) -> Self {
        Self { database_type }
    }

    fn dialect(&self) -> Box<dyn Dialect> {
        match self.database_type {
            DatabaseType::PostgreSQL => Box::new(PostgreSqlDialect {}),
            DatabaseType::MySQL => Box::new(MySqlDialect {}),
        }
    }

    fn parse(&self, sql: &str) -> Result<Vec<Statement>, AppError> {
        let dialect = self.dialect();
        Parser::parse_sql(dialect.as_ref(), sql)
            .map_err(|e| AppError::InvalidSql(format!("SQL parsing error: {}", e)))
    }

    /// Validate that `sql` is exactly one SELECT query and return its AST
    pub fn validate_select_only(&self, sql: &str) -> Result<Statement, AppError> {
        let mut ast = self.parse(sql)?;

        if ast.is_empty() {
            return Err(AppError::InvalidSql("Empty SQL query".to_string()));
        }
        if ast.len() > 1 {
            return Err(AppError::InvalidSql(format!(
                "Exactly one statement is allowed, found {}",
                ast.len()
            )));
        }

        let stmt = ast.remove(0);
        match &stmt {
            Statement::Query(query) => {
                if Self::has_select_into(query) {
                    return Err(AppError::InvalidSql("SELECT ... INTO is not allowed. Only read-only queries are permitted.".to_string()));
                }
            }
            Statement::Insert { .. } => {
                return Err(AppError::InvalidSql("INSERT statements are not allowed. Only SELECT queries are permitted.".to_string()));
            }
            Statement::Update { .. } => {
                return Err(AppError::InvalidSql("UPDATE statements are not allowed. Only SELECT queries are permitted.".to_string()));
            }
            Statement::Delete { .. } => {
                return Err(AppError::InvalidSql("DELETE statements are not allowed. Only SELECT queries are permitted.".to_string()));
            }
            Statement::Drop { .. } => {
                return Err(AppError::InvalidSql("DROP statements are not allowed. Only SELECT queries are permitted.".to_string()));
            }
            Statement::CreateTable { .. } => {
                return Err(AppError::InvalidSql("CREATE TABLE statements are not allowed. Only SELECT queries are permitted.".to_string()));
            }
            Statement::AlterTable { .. } => {
                return Err(AppError::InvalidSql("ALTER TABLE statements are not allowed. Only SELECT queries are permitted.".to_string()));
            }
            other => {
                return Err(AppError::InvalidSql(format!("Only SELECT queries are permitted. Found: {}", other)));
            }
        }

        Ok(stmt)
    }

    fn has_select_into(query: &Query) -> bool {
        match query.body.as_ref() {
            SetExpr::Select(select) => select.into.is_some(),
            _ => false,
        }
    }

    /// Reject relations and columns that do not appear in `schema`.
    ///
    /// Relations must be described tables (schema-qualified, or bare table
    /// names) or CTEs. Column identifiers must be described columns or aliases
    /// the query itself introduces, with or without `AS`.
    pub fn validate_against_schema(
        &self,
        stmt: &Statement,
        schema: &SchemaDescription,
    ) -> Result<(), AppError> {
        let cte_names = Self::cte_names(stmt);

        let mut relations = Vec::new();
        let _ = visit_relations(stmt, |name| {
            relations.push(name.to_string());
            ControlFlow::<()>::Continue(())
        });

        for relation in &relations {
            let parts: Vec<&str> = relation.split('.').map(strip_identifier_quotes).collect();
            let known = match parts.as_slice() {
                [single] => {
                    cte_names.contains(&single.to_lowercase()) || schema.find_table_by_name(single).is_some()
                }
                [.., schema_name, table_name] => schema
                    .find_table(&TableReference::new(*schema_name, *table_name))
                    .is_some(),
                [] => false,
            };
            if !known {
                return Err(AppError::InvalidSql(format!(
                    "Table {} is not part of the described schema",
                    relation
                )));
            }
        }

        let mut aliases = AliasCollector::collect(stmt);
        aliases.extend(cte_names);

        let mut columns = Vec::new();
        let _ = visit_expressions(stmt, |expr| {
            match expr {
                Expr::Identifier(ident) => columns.push(ident.value.clone()),
                Expr::CompoundIdentifier(idents) => {
                    if let Some(last) = idents.last() {
                        columns.push(last.value.clone());
                    }
                }
                _ => {}
            }
            ControlFlow::<()>::Continue(())
        });

        for column in &columns {
            if !schema.has_column(column) && !aliases.contains(&column.to_lowercase()) {
                return Err(AppError::InvalidSql(format!(
                    "Column {} does not appear in the described schema",
                    column
                )));
            }
        }

        Ok(())
    }

    /// Require `<column> IN (...)` carrying exactly the filter's values, in order
    pub fn validate_identifier_filter(
        &self,
        stmt: &Statement,
        filter: &IdentifierFilter,
    ) -> Result<(), AppError> {
        let found = visit_expressions(stmt, |expr| {
            if let Expr::InList { expr, list, negated: false } = expr {
                let column = match expr.as_ref() {
                    Expr::Identifier(ident) => Some(&ident.value),
                    Expr::CompoundIdentifier(idents) => idents.last().map(|i| &i.value),
                    _ => None,
                };
                if column.is_some_and(|c| c.eq_ignore_ascii_case(&filter.column)) {
                    let values: Vec<String> = list
                        .iter()
                        .map(|item| item.to_string().trim_matches(|c| c == '\'' || c == '"').to_string())
                        .collect();
                    if values == filter.values {
                        return ControlFlow::Break(());
                    }
                }
            }
            ControlFlow::Continue(())
        });

        if found.is_break() {
            Ok(())
        } else {
            Err(AppError::InvalidSql(format!(
                "Generated query does not restrict {} to the supplied identifiers ({})",
                filter.column,
                filter.joined()
            )))
        }
    }

    /// Append LIMIT when the query has none
    pub fn ensure_limit(sql: &str, stmt: &Statement, default_limit: u64) -> String {
        if Self::check_limit_in_statement(stmt) {
            sql.to_string()
        } else {
            let trimmed_sql = sql.trim().trim_end_matches(';').trim_end();
            format!("{} LIMIT {}", trimmed_sql, default_limit)
        }
    }

    /// Check if a statement has a LIMIT (or FETCH FIRST) clause using the AST
    fn check_limit_in_statement(stmt: &Statement) -> bool {
        match stmt {
            Statement::Query(query) => query.limit_clause.is_some() || query.fetch.is_some(),
            _ => false,
        }
    }

    fn cte_names(stmt: &Statement) -> HashSet<String> {
        match stmt {
            Statement::Query(query) => query
                .with
                .as_ref()
                .map(|with| {
                    with.cte_tables
                        .iter()
                        .map(|cte| cte.alias.name.value.to_lowercase())
                        .collect()
                })
                .unwrap_or_default(),
            _ => HashSet::new(),
        }
    }
}

/// Every name the query introduces: projection aliases, table aliases and
/// their column lists, at any nesting depth
#[derive(Default)]
struct AliasCollector {
    aliases: HashSet<String>,
}

impl AliasCollector {
    fn collect(stmt: &Statement) -> HashSet<String> {
        let mut collector = Self::default();
        let _ = stmt.visit(&mut collector);
        collector.aliases
    }

    fn add_projection(&mut self, body: &SetExpr) {
        match body {
            SetExpr::Select(select) => {
                for item in &select.projection {
                    if let SelectItem::ExprWithAlias { alias, .. } = item {
                        self.aliases.insert(alias.value.to_lowercase());
                    }
                }
            }
            SetExpr::SetOperation { left, right, .. } => {
                self.add_projection(left);
                self.add_projection(right);
            }
            _ => {}
        }
    }

    fn add_table_alias(&mut self, alias: &TableAlias) {
        self.aliases.insert(alias.name.value.to_lowercase());
        for column in &alias.columns {
            self.aliases.insert(column.name.value.to_lowercase());
        }
    }
}

impl Visitor for AliasCollector {
    type Break = ();

    fn pre_visit_query(&mut self, query: &Query) -> ControlFlow<()> {
        self.add_projection(&query.body);
        if let Some(with) = &query.with {
            for cte in &with.cte_tables {
                self.add_table_alias(&cte.alias);
            }
        }
        ControlFlow::Continue(())
    }

    fn pre_visit_table_factor(&mut self, table_factor: &TableFactor) -> ControlFlow<()> {
        let alias = match table_factor {
            TableFactor::Table { alias, .. }
            | TableFactor::Derived { alias, .. }
            | TableFactor::TableFunction { alias, .. }
            | TableFactor::Function { alias, .. }
            | TableFactor::UNNEST { alias, .. }
            | TableFactor::NestedJoin { alias, .. } => alias.as_ref(),
            _ => None,
        };
        if let Some(alias) = alias {
            self.add_table_alias(alias);
        }
        ControlFlow::Continue(())
    }
}

fn strip_identifier_quotes(part: &str) -> &str {
    part.trim_matches(|c| matches!(c, '"' | '`' | '[' | ']'))
}
