//! In-memory dataset model.
//!
//! A [`Table`] is the raw tabular shape exchanged with storage: a header row plus
//! text cells, every column preserved. A [`Dataset`] wraps a table with the
//! resolved positions of the two name columns and the result column, and exposes
//! rows as [`Task`]s whose result is decoded into a [`ResultState`].

use anyhow::{Result, anyhow};

use crate::core::result_state::ResultState;

/// Raw table exchanged with a [`crate::io::table_store::TableStore`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    /// Position of the first header equal to `name`.
    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|header| header == name)
    }
}

/// Column names the engine reads and writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Columns {
    pub primary: String,
    pub secondary: String,
    pub result: String,
}

/// One row's unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub index: usize,
    pub primary: String,
    pub secondary: String,
    pub result: ResultState,
}

impl Task {
    /// At least one of the two names is present.
    pub fn has_name(&self) -> bool {
        !self.primary.is_empty() || !self.secondary.is_empty()
    }

    /// `primary (secondary)`, or whichever single name exists.
    pub fn display_name(&self) -> String {
        match (self.primary.is_empty(), self.secondary.is_empty()) {
            (false, false) => format!("{} ({})", self.primary, self.secondary),
            (false, true) => self.primary.clone(),
            (true, false) => self.secondary.clone(),
            (true, true) => String::new(),
        }
    }
}

/// Ordered rows sharing one schema.
///
/// Row order is never changed. Missing name columns read as empty names; a
/// missing result column is appended with empty cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataset {
    table: Table,
    primary: Option<usize>,
    secondary: Option<usize>,
    result: usize,
}

impl Dataset {
    pub fn from_table(mut table: Table, columns: &Columns) -> Self {
        let result = match table.column(&columns.result) {
            Some(idx) => idx,
            None => {
                table.headers.push(columns.result.clone());
                table.headers.len() - 1
            }
        };
        let width = table.headers.len();
        for row in &mut table.rows {
            if row.len() < width {
                row.resize(width, String::new());
            }
        }
        let primary = table.column(&columns.primary);
        let secondary = table.column(&columns.secondary);
        Self {
            table,
            primary,
            secondary,
            result,
        }
    }

    pub fn len(&self) -> usize {
        self.table.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.rows.is_empty()
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn task(&self, index: usize) -> Option<Task> {
        let row = self.table.rows.get(index)?;
        Some(Task {
            index,
            primary: name_cell(row, self.primary),
            secondary: name_cell(row, self.secondary),
            result: ResultState::parse(&row[self.result]),
        })
    }

    pub fn result(&self, index: usize) -> Option<ResultState> {
        self.table
            .rows
            .get(index)
            .map(|row| ResultState::parse(&row[self.result]))
    }

    /// Decoded result of every row, in row order.
    pub fn results(&self) -> impl Iterator<Item = ResultState> + '_ {
        self.table
            .rows
            .iter()
            .map(|row| ResultState::parse(&row[self.result]))
    }

    pub fn set_result(&mut self, index: usize, state: &ResultState) -> Result<()> {
        let len = self.table.rows.len();
        let row = self
            .table
            .rows
            .get_mut(index)
            .ok_or_else(|| anyhow!("row index {index} out of range (rows: {len})"))?;
        row[self.result] = state.as_cell().to_string();
        Ok(())
    }
}

fn name_cell(row: &[String], column: Option<usize>) -> String {
    column
        .and_then(|idx| row.get(idx))
        .map(|cell| cell.trim().to_string())
        .unwrap_or_default()
}
