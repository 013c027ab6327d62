//! Table load/save for the dataset file.
//!
//! Stores are bound to one location at construction. `save` always rewrites the
//! whole table (temp file + rename), so a crash mid-write leaves the previous
//! checkpoint intact.

use std::cell::Cell;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use calamine::{Data, Reader, open_workbook_auto};
use rust_xlsxwriter::Workbook;
use tracing::debug;

use crate::dataset::{Columns, Dataset, Table};

/// The dataset file does not exist.
#[derive(Debug, thiserror::Error)]
#[error("dataset {} not found", path.display())]
pub struct DatasetNotFound {
    pub path: PathBuf,
}

pub trait TableStore {
    fn load(&self) -> Result<Table>;

    /// Overwrite the stored table.
    fn save(&self, table: &Table) -> Result<()>;
}

/// Comma-separated file with a header row. Sheet names do not apply.
pub struct CsvStore {
    path: PathBuf,
}

impl CsvStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TableStore for CsvStore {
    fn load(&self) -> Result<Table> {
        ensure_exists(&self.path)?;
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(&self.path)
            .with_context(|| format!("open {}", self.path.display()))?;
        let mut headers: Vec<String> = reader
            .headers()
            .with_context(|| format!("read headers {}", self.path.display()))?
            .iter()
            .map(str::to_string)
            .collect();
        if let Some(first) = headers.first_mut() {
            *first = first.trim_start_matches('\u{feff}').to_string();
        }
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.with_context(|| format!("read row {}", self.path.display()))?;
            rows.push(record.iter().map(str::to_string).collect());
        }
        debug!(path = %self.path.display(), rows = rows.len(), "loaded csv table");
        Ok(Table::new(headers, rows))
    }

    fn save(&self, table: &Table) -> Result<()> {
        let tmp_path = temp_path(&self.path);
        {
            let mut writer = csv::WriterBuilder::new()
                .flexible(true)
                .from_path(&tmp_path)
                .with_context(|| format!("create {}", tmp_path.display()))?;
            writer
                .write_record(&table.headers)
                .context("write csv headers")?;
            for row in &table.rows {
                writer.write_record(row).context("write csv row")?;
            }
            writer
                .flush()
                .with_context(|| format!("flush {}", tmp_path.display()))?;
        }
        replace(&tmp_path, &self.path)
    }
}

/// Excel workbook; reads and writes one named worksheet.
///
/// Cells round-trip as text, written back at the row and column where the
/// table was found. Other worksheets, formulas and styling are not kept.
pub struct XlsxStore {
    path: PathBuf,
    sheet: String,
    /// Zero-based (row, column) of the header cell seen by the last load.
    origin: Cell<(u32, u16)>,
}

impl XlsxStore {
    pub fn new(path: impl Into<PathBuf>, sheet: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            sheet: sheet.into(),
            origin: Cell::new((0, 0)),
        }
    }
}

impl TableStore for XlsxStore {
    fn load(&self) -> Result<Table> {
        ensure_exists(&self.path)?;
        let mut workbook = open_workbook_auto(&self.path)
            .with_context(|| format!("open workbook {}", self.path.display()))?;
        let range = workbook
            .worksheet_range(&self.sheet)
            .with_context(|| format!("read sheet {:?} of {}", self.sheet, self.path.display()))?;

        if let Some((row, col)) = range.start() {
            let col = u16::try_from(col).context("column index exceeds xlsx limits")?;
            self.origin.set((row, col));
        }

        let mut rows = range.rows();
        let headers = rows
            .next()
            .map(|row| row.iter().map(cell_text).collect())
            .unwrap_or_default();
        let rows: Vec<Vec<String>> = rows
            .map(|row| row.iter().map(cell_text).collect())
            .collect();
        debug!(path = %self.path.display(), sheet = %self.sheet, rows = rows.len(), "loaded xlsx table");
        Ok(Table::new(headers, rows))
    }

    fn save(&self, table: &Table) -> Result<()> {
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        worksheet
            .set_name(&self.sheet)
            .with_context(|| format!("invalid sheet name {:?}", self.sheet))?;

        let (first_row, first_col) = self.origin.get();
        let all_rows = std::iter::once(&table.headers).chain(&table.rows);
        for (row_idx, row) in all_rows.enumerate() {
            let row_num = u32::try_from(row_idx)
                .ok()
                .and_then(|r| r.checked_add(first_row))
                .context("row index exceeds xlsx limits")?;
            for (col_idx, cell) in row.iter().enumerate() {
                if cell.is_empty() {
                    continue;
                }
                let col_num = u16::try_from(col_idx)
                    .ok()
                    .and_then(|c| c.checked_add(first_col))
                    .context("column index exceeds xlsx limits")?;
                worksheet
                    .write_string(row_num, col_num, cell)
                    .with_context(|| format!("write cell ({row_num}, {col_num})"))?;
            }
        }

        let tmp_path = temp_path(&self.path);
        workbook
            .save(&tmp_path)
            .with_context(|| format!("write workbook {}", tmp_path.display()))?;
        replace(&tmp_path, &self.path)
    }
}

/// Pick a store from the file extension.
pub fn open_store(path: &Path, sheet: &str) -> Result<Box<dyn TableStore>> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("csv") => Ok(Box::new(CsvStore::new(path))),
        Some("xlsx" | "xlsm") => Ok(Box::new(XlsxStore::new(path, sheet))),
        _ => Err(anyhow!(
            "unsupported dataset format {} (expected .csv or .xlsx)",
            path.display()
        )),
    }
}

pub fn load_dataset(store: &dyn TableStore, columns: &Columns) -> Result<Dataset> {
    let table = store.load()?;
    Ok(Dataset::from_table(table, columns))
}

pub fn save_dataset(store: &dyn TableStore, dataset: &Dataset) -> Result<()> {
    store.save(dataset.table())
}

fn ensure_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(DatasetNotFound {
            path: path.to_path_buf(),
        }
        .into());
    }
    Ok(())
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn replace(tmp_path: &Path, path: &Path) -> Result<()> {
    fs::rename(tmp_path, path).with_context(|| format!("replace {}", path.display()))
}
