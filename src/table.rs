// dmctl - CLI for the dm cluster management API
// Copyright (C) 2024 dmctl contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Projection of JSON records onto text tables.
//!
//! Each column is selected by a path: either a plain key (`name`) or a key
//! followed by one nested key (`containers.id`). When the outer value is an
//! array, the nested key is read from every element and the results are
//! joined with spaces.

use crate::error::CommandError;
use serde_json::{Map, Value};
use std::fmt;

/// Cell text for a key that is not present in the record.
pub const ABSENT: &str = "<none>";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnPath {
    raw: String,
    outer: String,
    inner: Option<String>,
}

impl ColumnPath {
    /// Parses one column selector. Paths nesting deeper than one level are rejected.
    pub fn parse(raw: &str) -> Result<Self, CommandError> {
        let trimmed = raw.trim();
        let mut segments = trimmed.split('.');
        let outer = segments.next().unwrap_or_default().to_string();
        let inner = segments.next().map(str::to_string);
        if segments.next().is_some() {
            return Err(CommandError::Usage(format!(
                "--columns=<column1,column2> with at most one '.' per column (got `{trimmed}`)"
            )));
        }

        Ok(Self {
            raw: raw.to_string(),
            outer,
            inner,
        })
    }

    /// The selector as the user typed it, used for the header.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    fn cell(&self, record: &Value) -> String {
        let outer = Field::lookup(record, &self.outer);
        let Some(inner) = &self.inner else {
            return outer.render();
        };

        match outer {
            Field::Absent => String::new(),
            Field::Array(items) => items
                .iter()
                .map(|item| Field::lookup(item, inner).render())
                .collect::<Vec<_>>()
                .join(" "),
            Field::Object(map) => Field::from(map.get(inner)).render(),
            Field::Scalar(_) => Field::Absent.render(),
        }
    }
}

/// Splits a comma separated `--columns` value.
pub fn parse_columns(columns: &str) -> Result<Vec<ColumnPath>, CommandError> {
    columns.split(',').map(ColumnPath::parse).collect()
}

/// What a key resolved to inside a record.
#[derive(Debug, Clone, Copy)]
enum Field<'a> {
    Absent,
    Scalar(&'a Value),
    Object(&'a Map<String, Value>),
    Array(&'a [Value]),
}

impl<'a> Field<'a> {
    fn lookup(record: &'a Value, key: &str) -> Self {
        Self::from(record.get(key))
    }

    fn render(self) -> String {
        match self {
            Field::Absent => ABSENT.to_string(),
            Field::Scalar(Value::Null) => String::new(),
            Field::Scalar(Value::String(s)) => s.clone(),
            Field::Scalar(other) => other.to_string(),
            Field::Object(map) => serde_json::to_string(map).unwrap_or_default(),
            Field::Array(items) => serde_json::to_string(items).unwrap_or_default(),
        }
    }
}

impl<'a> From<Option<&'a Value>> for Field<'a> {
    fn from(value: Option<&'a Value>) -> Self {
        match value {
            None => Field::Absent,
            Some(Value::Object(map)) => Field::Object(map),
            Some(Value::Array(items)) => Field::Array(items),
            Some(scalar) => Field::Scalar(scalar),
        }
    }
}

/// Rows of text cells; row 0 is the header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    rows: Vec<Vec<String>>,
}

impl Table {
    /// All rows, header first.
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn header(&self) -> &[String] {
        &self.rows[0]
    }

    /// Rows below the header.
    pub fn records(&self) -> &[Vec<String>] {
        &self.rows[1..]
    }

    pub fn render(&self) -> String {
        let mut widths = vec![0; self.header().len()];
        for row in self.rows() {
            for (idx, cell) in row.iter().enumerate() {
                widths[idx] = widths[idx].max(cell.chars().count());
            }
        }

        let mut out = String::new();
        for (line, row) in self.rows().iter().enumerate() {
            push_line(&mut out, row.iter().map(String::as_str), &widths);
            if line == 0 {
                let dashes: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
                push_line(&mut out, dashes.iter().map(String::as_str), &widths);
            }
        }
        out
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

fn push_line<'a>(out: &mut String, cells: impl Iterator<Item = &'a str>, widths: &[usize]) {
    let mut line = String::new();
    for (idx, cell) in cells.enumerate() {
        if idx > 0 {
            line.push_str("  ");
        }
        line.push_str(&format!("{:width$}", cell, width = widths[idx]));
    }
    out.push_str(line.trim_end());
    out.push('\n');
}

/// Projects a record, or an array of records, onto the given columns.
pub fn project(columns: &[ColumnPath], json: &Value) -> Table {
    let records: &[Value] = match json {
        Value::Array(items) => items,
        single => std::slice::from_ref(single),
    };

    let mut rows = Vec::with_capacity(records.len() + 1);
    rows.push(columns.iter().map(|c| c.raw().to_string()).collect());
    for record in records {
        rows.push(columns.iter().map(|c| c.cell(record)).collect());
    }

    Table { rows }
}
