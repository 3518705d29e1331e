use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Column names plus rows, as returned by the data store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl ResultSet {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Case-insensitive column lookup
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(name))
    }

    /// Render at most `max_rows` rows as `column: value` pairs joined by `, `,
    /// one row per line.
    pub fn format_rows(&self, max_rows: usize) -> String {
        self.rows
            .iter()
            .take(max_rows)
            .map(|row| {
                self.columns
                    .iter()
                    .zip(row.iter())
                    .map(|(column, value)| format!("{}: {}", column, display_value(value)))
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Plain-text rendering of a cell: strings unquoted, null as `NULL`.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Ranked identifier values carried from a semantic search into the
/// generated query's WHERE clause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifierFilter {
    pub column: String,
    pub values: Vec<String>,
}

impl IdentifierFilter {
    /// Collect the identifier column of a search result in row order.
    ///
    /// Returns `None` when the column is absent or yields no values.
    pub fn from_result_set(results: &ResultSet, column: &str) -> Option<Self> {
        let idx = results.column_index(column)?;
        let values: Vec<String> = results
            .rows
            .iter()
            .filter_map(|row| row.get(idx))
            .filter(|v| !v.is_null())
            .map(display_value)
            .collect();

        if values.is_empty() {
            return None;
        }

        Some(Self {
            column: results.columns[idx].clone(),
            values,
        })
    }

    /// Comma-joined literal values, in ranking order
    pub fn joined(&self) -> String {
        self.values.join(",")
    }
}
