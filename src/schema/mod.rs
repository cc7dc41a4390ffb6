//! Schema elements, the presentation tree and the compact schema text.
//!
//! A schema element is a fully-qualified `schema.table.column` (relational
//! sources) or `table.column` (file sources) string. The last segment is
//! always the column.

pub mod discovery;
pub mod size;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

pub use discovery::SchemaDiscoveryService;

pub type SchemaElement = String;

/// Schema name assumed for two-segment elements.
pub const DEFAULT_SCHEMA: &str = "public";

/// A column with its backend data type, as reported by introspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypedColumn {
    pub schema: Option<String>,
    pub table: String,
    pub column: String,
    pub data_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnNode {
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableNode {
    pub table_name: String,
    pub columns: Vec<ColumnNode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaNode {
    pub schema_name: String,
    pub tables: Vec<TableNode>,
}

pub type PresentationTree = Vec<SchemaNode>;

/// Discovered schema snapshot for one data source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaArtifacts {
    pub flat_elements: Vec<SchemaElement>,
    pub presentation_tree: PresentationTree,
    pub is_large: bool,
}

/// Splits an element into `(table, column)` where the table is everything
/// before the last dot.
pub fn split_table_column(element: &str) -> Option<(&str, &str)> {
    let (table, column) = element.rsplit_once('.')?;
    if table.is_empty() || column.is_empty() {
        return None;
    }
    Some((table, column))
}

/// Splits an element into `(schema, table, column)` for the presentation tree.
///
/// Two segments get the default schema. With three or more, the first is the
/// schema and everything between it and the column is the table name, so
/// malformed table names containing dots stay intact.
pub fn split_schema_table_column(element: &str) -> Option<(String, String, String)> {
    let parts: Vec<&str> = element.split('.').collect();
    match parts.as_slice() {
        [] | [_] => None,
        [table, column] => Some((
            DEFAULT_SCHEMA.to_string(),
            table.to_string(),
            column.to_string(),
        )),
        [schema, middle @ .., column] => Some((
            schema.to_string(),
            middle.join("."),
            column.to_string(),
        )),
    }
}

/// Renders elements as one `Table <table> has columns: c1, c2` line per
/// table, tables and columns in first-seen order.
pub fn render_table_columns(elements: &[SchemaElement]) -> String {
    let mut order: Vec<&str> = Vec::new();
    let mut columns: HashMap<&str, Vec<&str>> = HashMap::new();

    for element in elements {
        let Some((table, column)) = split_table_column(element) else {
            continue;
        };
        columns
            .entry(table)
            .or_insert_with(|| {
                order.push(table);
                Vec::new()
            })
            .push(column);
    }

    order
        .iter()
        .map(|table| format!("Table {} has columns: {}", table, columns[table].join(", ")))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Reads rendered schema text back into `(table, column)` pairs.
pub fn parse_table_columns(text: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for line in text.lines() {
        let Some(rest) = line.trim().strip_prefix("Table ") else {
            continue;
        };
        let Some((table, columns)) = rest.split_once(" has columns: ") else {
            continue;
        };
        for column in columns.split(", ").filter(|c| !c.is_empty()) {
            pairs.push((table.to_string(), column.to_string()));
        }
    }
    pairs
}

/// Groups elements into a schema → table → column tree.
///
/// Schemas, tables and columns are sorted by name; duplicate column names
/// within a table keep their first occurrence. Types are attached when
/// `typed` reports one for the same `(schema, table, column)`.
pub fn build_presentation_tree(elements: &[SchemaElement], typed: &[TypedColumn]) -> PresentationTree {
    let types: HashMap<(&str, &str, &str), &str> = typed
        .iter()
        .filter(|c| !c.data_type.is_empty())
        .map(|c| {
            let schema = c.schema.as_deref().unwrap_or(DEFAULT_SCHEMA);
            ((schema, c.table.as_str(), c.column.as_str()), c.data_type.as_str())
        })
        .collect();

    let mut grouped: BTreeMap<String, BTreeMap<String, Vec<ColumnNode>>> = BTreeMap::new();
    for element in elements {
        let Some((schema, table, column)) = split_schema_table_column(element) else {
            continue;
        };
        let data_type = types
            .get(&(schema.as_str(), table.as_str(), column.as_str()))
            .map(|t| t.to_string());
        grouped
            .entry(schema)
            .or_default()
            .entry(table)
            .or_default()
            .push(ColumnNode {
                name: column,
                data_type,
            });
    }

    grouped
        .into_iter()
        .map(|(schema_name, tables)| SchemaNode {
            schema_name,
            tables: tables
                .into_iter()
                .map(|(table_name, columns)| {
                    let mut seen = HashSet::new();
                    let mut columns: Vec<ColumnNode> = columns
                        .into_iter()
                        .filter(|c| seen.insert(c.name.clone()))
                        .collect();
                    columns.sort_by(|a, b| a.name.cmp(&b.name));
                    TableNode { table_name, columns }
                })
                .collect(),
        })
        .collect()
}
