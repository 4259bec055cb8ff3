//! Materialized result rows.
//!
//! A [`Row`] owns its converted values. LOB values and nested cursors keep
//! their own native references, so a row stays usable after its cursor
//! has moved on or closed.

use std::sync::Arc;

use super::column::{Column, ColumnInfo};
use super::value::Value;

/// One fetched row, in select-list order.
#[derive(Debug)]
pub struct Row {
    values: Vec<Value>,
    /// Describe data of the cursor that produced the row.
    column_info: Arc<ColumnInfo>,
}

impl Row {
    pub fn new(values: Vec<Value>, column_info: Arc<ColumnInfo>) -> Self {
        Self {
            values,
            column_info,
        }
    }

    /// Value at 0-based `index`.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Mutable access, needed to read LOB values or nested cursors.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut Value> {
        self.values.get_mut(index)
    }

    /// Move a value out of the row, leaving NULL behind.
    pub fn take(&mut self, index: usize) -> Option<Value> {
        self.values
            .get_mut(index)
            .map(|v| std::mem::replace(v, Value::Null))
    }

    /// Value of the column called `name`, ignoring case.
    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.column_info
            .find_by_name(name)
            .and_then(|idx| self.values.get(idx))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Columns of the producing cursor.
    pub fn columns(&self) -> &[Column] {
        &self.column_info.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.column_info.column_names()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.values.iter()
    }
}

impl IntoIterator for Row {
    type Item = Value;
    type IntoIter = std::vec::IntoIter<Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

impl<'a> IntoIterator for &'a Row {
    type Item = &'a Value;
    type IntoIter = std::slice::Iter<'a, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}
