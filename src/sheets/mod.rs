//! Spreadsheet gateway: the legacy system of record.
//!
//! The first row of every sheet is the header row. Rows come back keyed by
//! header in sheet order. The gateway gives no idempotency guarantee: two
//! appends of the same row produce two rows.

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{cell, SheetRow};

pub mod google;
pub mod memory;

pub use google::GoogleSheetsGateway;
pub use memory::MemorySheetGateway;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Sheets request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Sheets API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Sheet '{0}' not found")]
    SheetNotFound(String),

    #[error("No row in '{sheet}' with {column} = '{value}'")]
    RowNotFound {
        sheet: String,
        column: String,
        value: String,
    },

    #[error("Sheet '{sheet}' has no '{column}' column")]
    MissingColumn { sheet: String, column: String },

    #[error("Malformed sheet response: {0}")]
    Malformed(String),

    #[error("Spreadsheet gateway unavailable: {0}")]
    Unavailable(String),
}

/// Headers and rows of one sheet as read at the start of a pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SheetSnapshot {
    pub headers: Vec<String>,
    pub rows: Vec<SheetRow>,
}

impl SheetSnapshot {
    /// Index of the first row whose `column` equals `value` (trimmed comparison)
    pub fn position(&self, column: &str, value: &str) -> Option<usize> {
        let wanted = value.trim();
        self.rows.iter().position(|row| cell(row, column) == Some(wanted))
    }
}

#[async_trait]
pub trait SpreadsheetGateway: Send + Sync {
    /// All data rows below the header row, in sheet order
    async fn get_rows(&self, sheet: &str) -> Result<Vec<SheetRow>, GatewayError>;

    /// Header row as written in the sheet (blank header cells omitted)
    async fn get_headers(&self, sheet: &str) -> Result<Vec<String>, GatewayError>;

    /// Append one row; cells for columns the sheet lacks are dropped
    async fn append_row(&self, sheet: &str, row: &SheetRow) -> Result<SheetRow, GatewayError>;

    /// Overwrite the cells given in `row` on the first row whose `column` equals `value`
    async fn update_row(
        &self,
        sheet: &str,
        column: &str,
        value: &str,
        row: &SheetRow,
    ) -> Result<SheetRow, GatewayError>;

    /// First row whose `column` equals `value` (trimmed comparison)
    async fn find_row(&self, sheet: &str, column: &str, value: &str) -> Result<Option<SheetRow>, GatewayError> {
        let wanted = value.trim();
        let rows = self.get_rows(sheet).await?;
        Ok(rows.into_iter().find(|row| cell(row, column) == Some(wanted)))
    }

    async fn snapshot(&self, sheet: &str) -> Result<SheetSnapshot, GatewayError> {
        let headers = self.get_headers(sheet).await?;
        let rows = self.get_rows(sheet).await?;
        Ok(SheetSnapshot { headers, rows })
    }

    /// Append using headers already read in `snapshot`
    async fn append_row_to(
        &self,
        sheet: &str,
        _snapshot: &SheetSnapshot,
        row: &SheetRow,
    ) -> Result<SheetRow, GatewayError> {
        self.append_row(sheet, row).await
    }

    /// Overwrite row `index` of `snapshot`, located by its `column` cell
    async fn update_row_at(
        &self,
        sheet: &str,
        snapshot: &SheetSnapshot,
        index: usize,
        column: &str,
        row: &SheetRow,
    ) -> Result<SheetRow, GatewayError> {
        let value = snapshot
            .rows
            .get(index)
            .and_then(|existing| cell(existing, column))
            .ok_or_else(|| GatewayError::RowNotFound {
                sheet: sheet.to_string(),
                column: column.to_string(),
                value: format!("row {}", index + 2),
            })?;
        self.update_row(sheet, column, value, row).await
    }
}

/// Split a raw value grid into (headers, rows).
/// Blank header cells are skipped, duplicate headers keep the first column,
/// short rows are padded with blanks.
pub fn parse_grid(grid: Vec<Vec<String>>) -> (Vec<String>, Vec<SheetRow>) {
    let mut lines = grid.into_iter();
    let Some(header_line) = lines.next() else {
        return (Vec::new(), Vec::new());
    };

    let mut headers = Vec::new();
    let mut positions = Vec::new();
    for (index, raw) in header_line.iter().enumerate() {
        let header = raw.trim();
        if header.is_empty() || headers.iter().any(|h: &String| h == header) {
            continue;
        }
        headers.push(header.to_string());
        positions.push(index);
    }

    let rows = lines
        .map(|line| {
            headers
                .iter()
                .zip(&positions)
                .map(|(header, &pos)| (header.clone(), line.get(pos).cloned().unwrap_or_default()))
                .collect::<SheetRow>()
        })
        .collect();

    (headers, rows)
}

/// Lay a row out along `headers`; unknown keys are dropped, missing ones blank
pub fn row_to_line(headers: &[String], row: &SheetRow) -> Vec<String> {
    headers
        .iter()
        .map(|h| row.get(h).cloned().unwrap_or_default())
        .collect()
}

/// A1 column letters for a zero-based column index (0 → A, 26 → AA)
pub fn column_letter(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push((b'A' + rem as u8) as char);
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}
