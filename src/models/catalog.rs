use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum number of tables a plan may select.
pub const MAX_PLAN_TABLES: usize = 5;

/// A `schema.table` identifier. Comparison is case-insensitive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableReference {
    pub schema: String,
    pub table: String,
}

impl TableReference {
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
        }
    }

    /// Parse `schema.table` (each part optionally bracketed or quoted).
    pub fn parse(s: &str) -> Option<Self> {
        let (schema, table) = s.trim().split_once('.')?;
        let schema = strip_quotes(schema);
        let table = strip_quotes(table);
        if schema.is_empty() || table.is_empty() || table.contains('.') {
            return None;
        }
        Some(Self::new(schema, table))
    }

    /// Lowercased `schema.table`, used for matching and ordering
    pub fn key(&self) -> String {
        format!("{}.{}", self.schema.to_lowercase(), self.table.to_lowercase())
    }

    pub fn matches(&self, other: &TableReference) -> bool {
        self.schema.eq_ignore_ascii_case(&other.schema) && self.table.eq_ignore_ascii_case(&other.table)
    }
}

impl PartialEq for TableReference {
    fn eq(&self, other: &Self) -> bool {
        self.matches(other)
    }
}

impl Eq for TableReference {}

impl fmt::Display for TableReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

fn strip_quotes(part: &str) -> &str {
    part.trim()
        .trim_start_matches(['[', '"', '`'])
        .trim_end_matches([']', '"', '`'])
}

/// Deduplicated, order-irrelevant set of table references.
///
/// Members are kept sorted by their lowercased key so two sets built from the
/// same references in a different order compare equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableSet {
    tables: Vec<TableReference>,
}

impl TableSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set keeping the first spelling of each case-insensitive duplicate.
    pub fn from_references<I>(references: I) -> Self
    where
        I: IntoIterator<Item = TableReference>,
    {
        let mut tables: Vec<TableReference> = Vec::new();
        for reference in references {
            if !tables.iter().any(|t| t.matches(&reference)) {
                tables.push(reference);
            }
        }
        tables.sort_by_key(|t| t.key());
        Self { tables }
    }

    /// Keep at most `cap` members, in key order
    pub fn capped(mut self, cap: usize) -> Self {
        self.tables.truncate(cap);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TableReference> {
        self.tables.iter()
    }

    pub fn contains(&self, reference: &TableReference) -> bool {
        self.tables.iter().any(|t| t.matches(reference))
    }

    pub fn to_strings(&self) -> Vec<String> {
        self.tables.iter().map(|t| t.to_string()).collect()
    }
}

impl fmt::Display for TableSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_strings().join(", "))
    }
}

/// A table known to the catalog, with its one-line description
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableInfo {
    pub table: TableReference,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub data_type: String,
    pub is_nullable: bool,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSchema {
    pub table: TableReference,
    pub columns: Vec<ColumnDescriptor>,
}

/// Column-level description of the tables selected for one query.
/// Built per turn, never cached.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaDescription {
    pub tables: Vec<TableSchema>,
}

impl SchemaDescription {
    pub fn new(tables: Vec<TableSchema>) -> Self {
        Self { tables }
    }

    /// True when no described table has any column.
    pub fn is_empty(&self) -> bool {
        self.tables.iter().all(|t| t.columns.is_empty())
    }

    pub fn find_table(&self, reference: &TableReference) -> Option<&TableSchema> {
        self.tables.iter().find(|t| t.table.matches(reference))
    }

    /// Look up a table by bare name (no schema), as used by unqualified FROM clauses
    pub fn find_table_by_name(&self, name: &str) -> Option<&TableSchema> {
        self.tables
            .iter()
            .find(|t| t.table.table.eq_ignore_ascii_case(name))
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.tables
            .iter()
            .flat_map(|t| t.columns.iter())
            .any(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Render as prompt text, quoting table names with `quote`:
    ///
    /// ```text
    /// "Sales"."Customer":
    /// CustomerID (int) -- Primary key NOT NULL
    /// ```
    pub fn render(&self, quote: char) -> String {
        let mut out = String::new();
        for table in self.tables.iter().filter(|t| !t.columns.is_empty()) {
            out.push_str(&format!(
                "{q}{}{q}.{q}{}{q}:\n",
                table.table.schema,
                table.table.table,
                q = quote
            ));
            for column in &table.columns {
                let nullability = if column.is_nullable { "NULL" } else { "NOT NULL" };
                let comment = column.comment.as_deref().unwrap_or("").trim();
                if comment.is_empty() {
                    out.push_str(&format!("{} ({}) {}\n", column.name, column.data_type, nullability));
                } else {
                    out.push_str(&format!(
                        "{} ({}) -- {} {}\n",
                        column.name, column.data_type, comment, nullability
                    ));
                }
            }
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_reference_parse() {
        let r = TableReference::parse("[Sales].[Customer]").unwrap();
        assert_eq!(r.schema, "Sales");
        assert_eq!(r.table, "Customer");
        assert!(TableReference::parse("Customer").is_none());
        assert!(TableReference::parse("a.b.c").is_none());
    }

    #[test]
    fn test_table_set_dedup_case_insensitive() {
        let set = TableSet::from_references(vec![
            TableReference::new("Sales", "Customer"),
            TableReference::new("sales", "customer"),
            TableReference::new("Person", "Person"),
        ]);
        assert_eq!(set.len(), 2);
        // First spelling wins
        assert_eq!(set.to_strings(), vec!["Person.Person", "Sales.Customer"]);
    }

    #[test]
    fn test_table_set_order_insensitive_and_capped() {
        let refs: Vec<TableReference> = (0..8)
            .map(|i| TableReference::new("S", format!("T{}", i)))
            .collect();
        let mut reversed = refs.clone();
        reversed.reverse();

        let a = TableSet::from_references(refs);
        let b = TableSet::from_references(reversed);
        assert_eq!(a, b);
        assert_eq!(a.len(), 8);

        let capped = a.capped(MAX_PLAN_TABLES);
        assert_eq!(capped.len(), MAX_PLAN_TABLES);
        assert_eq!(capped.to_strings()[0], "S.T0");
        assert!(!capped.contains(&TableReference::new("S", "T7")));
    }

    #[test]
    fn test_schema_description_render_and_empty() {
        let empty = SchemaDescription::new(vec![TableSchema {
            table: TableReference::new("Sales", "Customer"),
            columns: vec![],
        }]);
        assert!(empty.is_empty());
        assert_eq!(empty.render('"'), "");

        let schema = SchemaDescription::new(vec![TableSchema {
            table: TableReference::new("Sales", "Customer"),
            columns: vec![
                ColumnDescriptor {
                    name: "CustomerID".to_string(),
                    data_type: "int".to_string(),
                    is_nullable: false,
                    comment: Some("Primary key".to_string()),
                },
                ColumnDescriptor {
                    name: "StoreID".to_string(),
                    data_type: "int".to_string(),
                    is_nullable: true,
                    comment: None,
                },
            ],
        }]);
        assert!(!schema.is_empty());
        assert!(schema.has_column("customerid"));
        let text = schema.render('"');
        assert!(text.starts_with("\"Sales\".\"Customer\":\n"));
        assert!(schema.render('`').starts_with("`Sales`.`Customer`:\n"));
        assert!(text.contains("CustomerID (int) -- Primary key NOT NULL"));
        assert!(text.contains("StoreID (int) NULL"));
    }
}
