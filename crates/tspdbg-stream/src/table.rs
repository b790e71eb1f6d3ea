//! Reconstruction of table-valued variables into [`VariableNode`] trees.
//!
//! The debugger serialises a table as
//! `{"table":[{"name":K,"value":V},…]}` where `V` is either a scalar or
//! another table object of the same shape.

use serde::Deserialize;
use serde_json::Value;

use crate::error::DecodeError;
use crate::model::{NodeValue, VariableNode};

/// Keys naming internal pseudo-types. They are shown unquoted and can not
/// be assigned.
pub const READ_ONLY_KEYS: [&str; 4] = ["<TABLE>", "<FUNCTION>", "<THREAD>", "<USERDATA>"];

#[derive(Debug, Deserialize)]
struct TablePayload {
    table: Vec<TableEntry>,
}

#[derive(Debug, Deserialize)]
struct TableEntry {
    name: Value,
    #[serde(default)]
    value: EntryValue,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EntryValue {
    Table(TablePayload),
    Scalar(Value),
}

impl Default for EntryValue {
    fn default() -> Self {
        EntryValue::Scalar(Value::Null)
    }
}

/// Build the tree for the table variable `name` from its JSON `payload`.
///
/// The root node's path is `parent_path` followed by `name`; every other
/// node's path is its parent's path followed by its own display name.
pub fn reconstruct(
    name: &str,
    payload: &str,
    parent_path: &[String],
) -> Result<VariableNode, DecodeError> {
    let parsed: TablePayload =
        serde_json::from_str(payload).map_err(|e| DecodeError::Json(e.to_string()))?;

    let mut path = parent_path.to_vec();
    path.push(name.to_string());
    let children = build_children(parsed.table, &path);

    Ok(VariableNode {
        name: name.to_string(),
        path,
        read_only: false,
        value: NodeValue::Table(children),
    })
}

fn build_children(entries: Vec<TableEntry>, parent_path: &[String]) -> Vec<VariableNode> {
    entries
        .into_iter()
        .map(|entry| build_node(entry, parent_path))
        .collect()
}

fn build_node(entry: TableEntry, parent_path: &[String]) -> VariableNode {
    let (name, read_only) = display_key(&entry.name);
    let mut path = parent_path.to_vec();
    path.push(name.clone());

    let value = match entry.value {
        EntryValue::Table(nested) => NodeValue::Table(build_children(nested.table, &path)),
        EntryValue::Scalar(scalar) => NodeValue::Scalar(scalar_text(&scalar)),
    };

    VariableNode {
        name,
        path,
        read_only,
        value,
    }
}

/// Display form of a table key, and whether it is read-only.
pub fn display_key(key: &Value) -> (String, bool) {
    match key {
        Value::String(s) if READ_ONLY_KEYS.contains(&s.as_str()) => (s.clone(), true),
        Value::String(s) => (format!("\"{s}\""), false),
        other => (scalar_text(other), false),
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::Null => "nil".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
