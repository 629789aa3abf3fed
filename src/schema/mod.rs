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

//! Parses `CREATE TABLE` SQL well enough to recover the primary key,
//! column list and table constraints, and to turn a column's `DEFAULT`
//! clause into a typed literal. This is intentionally not a general SQL
//! parser: SQLite's `sqlite_master.sql` text is the only input it ever
//! sees, and that text is already syntactically valid SQL as accepted by
//! SQLite itself.

use crate::util::status::{Error, Result, Status};
use crate::value::Value;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // Matches the outermost parenthesised column/constraint list of a
    // CREATE TABLE statement. `(?s)` makes `.` match newlines, since SQL
    // dumped from sqlite_master is frequently formatted across lines.
    static ref COLUMN_LIST: Regex = Regex::new(r"(?s)\((.+)\)").unwrap();
}

/// A single column definition: its name and its parsed `DEFAULT` value.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub default_value: Option<Value>,
}

impl Column {
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            default_value: parse_default_value(description),
        }
    }
}

/// The parsed shape of a `CREATE TABLE` statement.
#[derive(Debug, Clone, Default)]
pub struct TableDef {
    pub primary_key: Option<String>,
    pub columns: Vec<Column>,
    pub table_constraints: Vec<String>,
}

/// Parses a `CREATE TABLE` statement into its primary key, column
/// definitions and table constraints.
///
/// Grounded on `dissect/sql/utils.py:parse_table_columns_constraints`.
pub fn parse_table_columns_constraints(sql: &str) -> Result<TableDef> {
    let captures = COLUMN_LIST.captures(sql).ok_or_else(|| {
        Error::new(
            Status::InvalidSQL,
            Some(&format!(
                "not a valid CREATE TABLE definition: no column definitions or table constraints found in {sql:?}"
            )),
        )
    })?;
    let inner = captures.get(1).unwrap().as_str();

    let mut primary_key = None;
    let mut columns = Vec::new();
    let mut table_constraints = Vec::new();

    for column_def in split_sql_list(inner)? {
        let (column_name, column_type_constraint) = split_column_def(sql, &column_def)?;

        if column_name.eq_ignore_ascii_case("PRIMARY") {
            primary_key = get_primary_key_from_constraint(&column_type_constraint, &column_def, sql)?;
        } else if column_type_constraint.to_uppercase().contains("PRIMARY KEY") {
            primary_key = Some(column_name.clone());
        }

        let upper = column_name.to_uppercase();
        if ["CONSTRAINT", "UNIQUE", "CHECK", "FOREIGN", "PRIMARY"]
            .iter()
            .any(|kw| upper.starts_with(kw))
        {
            table_constraints.push(column_def);
        } else {
            columns.push(Column::new(&column_name, &column_type_constraint));
        }
    }

    Ok(TableDef {
        primary_key,
        columns,
        table_constraints,
    })
}

/// Splits a string on top-level commas, respecting nested parentheses and
/// single/double/backtick-quoted strings, and skipping `--` line comments.
///
/// Grounded on `dissect/sql/utils.py:split_sql_list`.
pub fn split_sql_list(sql: &str) -> Result<Vec<String>> {
    let mut level: i32 = 0;
    let mut buf = String::new();
    let mut out = Vec::new();

    let mut chars = sql.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' | '`' => {
                let quote = c;
                buf.push(c);
                for qc in chars.by_ref() {
                    buf.push(qc);
                    if qc == quote {
                        break;
                    }
                }
            }
            '-' if chars.peek() == Some(&'-') => {
                // `--` line comment: skip to end of line.
                for cc in chars.by_ref() {
                    if cc == '\n' {
                        break;
                    }
                }
            }
            '(' => {
                level += 1;
                buf.push(c);
            }
            ')' => {
                level -= 1;
                buf.push(c);
            }
            ',' if level == 0 => {
                out.push(buf.trim().to_string());
                buf.clear();
            }
            _ => buf.push(c),
        }
    }

    if level != 0 {
        let bracket_type = if level < 0 { "(" } else { ")" };
        return Err(Error::new(
            Status::InvalidSQL,
            Some(&format!(
                "not a valid SQL list definition: {sql:?} missing {level} {bracket_type}'s"
            )),
        ));
    }

    let trimmed = buf.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }

    Ok(out)
}

fn split_column_def(sql: &str, column_def: &str) -> Result<(String, String)> {
    let mut parts = column_def.splitn(2, char::is_whitespace);
    let name = parts.next().unwrap_or("").to_string();
    if name.is_empty() {
        return Err(Error::new(
            Status::InvalidSQL,
            Some(&format!(
                "not a valid CREATE TABLE definition: empty column definition in {sql:?}"
            )),
        ));
    }
    let constraint = parts.next().unwrap_or("").trim_start().to_string();
    Ok((name, constraint))
}

fn get_primary_key_from_constraint(
    column_type_constraint: &str,
    column_def: &str,
    sql: &str,
) -> Result<Option<String>> {
    let captures = COLUMN_LIST.captures(column_type_constraint).ok_or_else(|| {
        Error::new(
            Status::InvalidSQL,
            Some(&format!(
                "not a valid CREATE TABLE definition: invalid PRIMARY KEY table constraint {column_def:?} in {sql:?}"
            )),
        )
    })?;
    let inner = captures.get(1).unwrap().as_str();
    let defs = split_sql_list(inner)?;

    if defs.len() == 1 {
        let parts: Vec<&str> = defs[0].splitn(2, char::is_whitespace).collect();
        if parts.len() == 1 {
            return Ok(Some(parts[0].to_string()));
        }
    }
    Ok(None)
}

/// Extracts and parses a column's `DEFAULT` expression into a typed
/// literal, or `None` if there is no `DEFAULT` clause or it does not
/// resolve to a literal (e.g. `CURRENT_TIMESTAMP`).
///
/// Grounded on `dissect/sql/sqlite3.py:Column`.
fn parse_default_value(description: &str) -> Option<Value> {
    if !description.to_uppercase().contains("DEFAULT") {
        return None;
    }

    let tokens = tokenize(description);
    let value = get_default_value(&tokens)?;
    parse_literal(value.trim_matches(|c| c == '(' || c == ')'))
}

/// Tokenizes a column description the same way the source does: split on
/// whitespace, parenthesised groups, and single/double-quoted strings,
/// discarding empty tokens and bare spaces.
fn tokenize(description: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut chars = description.chars().peekable();
    let mut word = String::new();

    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => {
                if !word.is_empty() {
                    tokens.push(std::mem::take(&mut word));
                }
            }
            '(' => {
                if !word.is_empty() {
                    tokens.push(std::mem::take(&mut word));
                }
                let mut depth = 1;
                let mut group = String::from("(");
                for gc in chars.by_ref() {
                    group.push(gc);
                    if gc == '(' {
                        depth += 1;
                    } else if gc == ')' {
                        depth -= 1;
                        if depth == 0 {
                            break;
                        }
                    }
                }
                tokens.push(group);
            }
            '\'' | '"' => {
                if !word.is_empty() {
                    tokens.push(std::mem::take(&mut word));
                }
                let quote = c;
                let mut s = String::new();
                s.push(quote);
                for qc in chars.by_ref() {
                    s.push(qc);
                    if qc == quote {
                        break;
                    }
                }
                tokens.push(s);
            }
            _ => word.push(c),
        }
    }
    if !word.is_empty() {
        tokens.push(word);
    }

    tokens
}

fn get_default_value(tokens: &[String]) -> Option<&str> {
    let idx = tokens.iter().position(|t| t.eq_ignore_ascii_case("DEFAULT"))?;
    tokens.get(idx + 1).map(|s| s.as_str())
}

/// Converts a literal expression string into a typed [`Value`], trying
/// integer, float, boolean, then quoted-string interpretations in order.
fn parse_literal(value: &str) -> Option<Value> {
    if let Ok(i) = value.parse::<i64>() {
        return Some(Value::Integer(i));
    }
    if let Ok(f) = value.parse::<f64>() {
        return Some(Value::Float(f));
    }
    if value.eq_ignore_ascii_case("TRUE") {
        return Some(Value::Bool(true));
    }
    if value.eq_ignore_ascii_case("FALSE") {
        return Some(Value::Bool(false));
    }
    if (value.starts_with('\'') && value.ends_with('\'') && value.len() >= 2)
        || (value.starts_with('"') && value.ends_with('"') && value.len() >= 2)
    {
        return Some(Value::Text(value[1..value.len() - 1].to_string()));
    }
    if value.contains('\'') || value.contains('"') {
        return Some(Value::Text(value.trim_matches(|c| c == '\'' || c == '"').to_string()));
    }
    None
}
