// Copyright 2019 Fullstop000 <fullstop1005@gmail.com>.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// See the License for the specific language governing permissions and
// limitations under the License.

//! Row materialization (spec §4.5): zip a table's declared columns
//! against one decoded record, substituting defaults for missing
//! trailing values, keeping surplus values as "unknowns", and aliasing a
//! single-column integer primary key onto the cell's own rowid when the
//! record carries no value for it.
//!
//! Grounded on `dissect/sql/sqlite3.py:Row._match_columns_to_values`.

use crate::schema::Column;
use crate::value::Value;

/// One materialized table row: a name-to-value mapping plus whatever
/// trailing record values had no matching column.
#[derive(Debug, Clone)]
pub struct Row {
    values: Vec<(String, Value)>,
    pub unknowns: Vec<Value>,
}

impl Row {
    pub(crate) fn new(columns: &[Column], primary_key: Option<&str>, record_values: Vec<Value>, cell_key: Option<i64>) -> Self {
        let mut values = Vec::with_capacity(columns.len());
        let mut unknowns = Vec::new();
        let mut record_values = record_values.into_iter();

        for column in columns {
            match record_values.next() {
                Some(v) => values.push((column.name.clone(), v)),
                None => values.push((column.name.clone(), column.default_value.clone().unwrap_or(Value::Null))),
            }
        }
        unknowns.extend(record_values);

        if let Some(pk) = primary_key {
            if let Some(key) = cell_key {
                if let Some(entry) = values.iter_mut().find(|(name, _)| name == pk) {
                    if entry.1.is_null() {
                        entry.1 = Value::Integer(key);
                    }
                }
            }
        }

        Row { values, unknowns }
    }

    /// Looks up a column's materialized value by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Iterates `(column_name, value)` pairs in column-declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(n, v)| (n.as_str(), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(name: &str, default: Option<Value>) -> Column {
        Column {
            name: name.to_string(),
            default_value: default,
        }
    }

    #[test]
    fn s4_defaults_fill_missing_trailing_values() {
        let columns = vec![
            col("a", Some(Value::Integer(1))),
            col("b", Some(Value::Integer(2))),
            col("c", Some(Value::Text("hello people".to_string()))),
        ];
        let row = Row::new(&columns, None, vec![Value::Integer(20)], None);
        assert_eq!(row.get("a"), Some(&Value::Integer(20)));
        assert_eq!(row.get("b"), Some(&Value::Integer(2)));
        assert_eq!(row.get("c"), Some(&Value::Text("hello people".to_string())));
        assert!(row.unknowns.is_empty());
    }

    #[test]
    fn s5_surplus_values_become_unknowns() {
        let columns = vec![col("a", None)];
        let row = Row::new(&columns, None, vec![Value::Integer(20), Value::Integer(22), Value::Integer(33)], None);
        assert_eq!(row.get("a"), Some(&Value::Integer(20)));
        assert_eq!(row.unknowns, vec![Value::Integer(22), Value::Integer(33)]);
    }

    #[test]
    fn rowid_aliasing_fills_single_column_primary_key() {
        let columns = vec![col("id", None), col("name", None)];
        let row = Row::new(&columns, Some("id"), vec![Value::Null, Value::Text("testing".to_string())], Some(1));
        assert_eq!(row.get("id"), Some(&Value::Integer(1)));
        assert_eq!(row.get("name"), Some(&Value::Text("testing".to_string())));
    }

    #[test]
    fn explicit_value_is_not_overridden_by_rowid() {
        let columns = vec![col("id", None)];
        let row = Row::new(&columns, Some("id"), vec![Value::Integer(42)], Some(1));
        assert_eq!(row.get("id"), Some(&Value::Integer(42)));
    }
}
