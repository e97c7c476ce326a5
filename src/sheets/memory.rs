use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{row_to_line, GatewayError, SpreadsheetGateway};
use crate::types::{cell, SheetRow};

#[derive(Debug, Clone, Default)]
struct Sheet {
    headers: Vec<String>,
    rows: Vec<SheetRow>,
}

impl Sheet {
    /// Row laid out along the sheet's headers, as a real sheet would store it
    fn shape(&self, row: &SheetRow) -> SheetRow {
        self.headers.iter().cloned().zip(row_to_line(&self.headers, row)).collect()
    }
}

/// Spreadsheet held in process memory, used by the `memory` sheets backend and tests
#[derive(Default)]
pub struct MemorySheetGateway {
    sheets: RwLock<HashMap<String, Sheet>>,
}

impl MemorySheetGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`insert_sheet`](Self::insert_sheet)
    pub fn with_sheet(mut self, name: &str, headers: &[&str], rows: Vec<SheetRow>) -> Self {
        let sheet = Self::make_sheet(headers, rows);
        self.sheets.get_mut().insert(name.to_string(), sheet);
        self
    }

    pub async fn insert_sheet(&self, name: &str, headers: &[&str], rows: Vec<SheetRow>) {
        let sheet = Self::make_sheet(headers, rows);
        self.sheets.write().await.insert(name.to_string(), sheet);
    }

    /// Current data rows of a sheet; empty when the sheet does not exist
    pub async fn rows(&self, name: &str) -> Vec<SheetRow> {
        self.sheets
            .read()
            .await
            .get(name)
            .map(|s| s.rows.clone())
            .unwrap_or_default()
    }

    fn make_sheet(headers: &[&str], rows: Vec<SheetRow>) -> Sheet {
        let mut sheet = Sheet {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: Vec::new(),
        };
        sheet.rows = rows.iter().map(|r| sheet.shape(r)).collect();
        sheet
    }
}

#[async_trait]
impl SpreadsheetGateway for MemorySheetGateway {
    async fn get_rows(&self, sheet: &str) -> Result<Vec<SheetRow>, GatewayError> {
        let sheets = self.sheets.read().await;
        let found = sheets
            .get(sheet)
            .ok_or_else(|| GatewayError::SheetNotFound(sheet.to_string()))?;
        Ok(found.rows.clone())
    }

    async fn get_headers(&self, sheet: &str) -> Result<Vec<String>, GatewayError> {
        let sheets = self.sheets.read().await;
        let found = sheets
            .get(sheet)
            .ok_or_else(|| GatewayError::SheetNotFound(sheet.to_string()))?;
        Ok(found.headers.clone())
    }

    async fn append_row(&self, sheet: &str, row: &SheetRow) -> Result<SheetRow, GatewayError> {
        let mut sheets = self.sheets.write().await;
        let found = sheets
            .get_mut(sheet)
            .ok_or_else(|| GatewayError::SheetNotFound(sheet.to_string()))?;
        if found.headers.is_empty() {
            found.headers = row.keys().cloned().collect();
        }
        let shaped = found.shape(row);
        found.rows.push(shaped.clone());
        Ok(shaped)
    }

    async fn update_row(
        &self,
        sheet: &str,
        column: &str,
        value: &str,
        row: &SheetRow,
    ) -> Result<SheetRow, GatewayError> {
        let mut sheets = self.sheets.write().await;
        let found = sheets
            .get_mut(sheet)
            .ok_or_else(|| GatewayError::SheetNotFound(sheet.to_string()))?;
        if !found.headers.iter().any(|h| h == column) {
            return Err(GatewayError::MissingColumn {
                sheet: sheet.to_string(),
                column: column.to_string(),
            });
        }

        let wanted = value.trim();
        let existing = found
            .rows
            .iter_mut()
            .find(|r| cell(r, column) == Some(wanted))
            .ok_or_else(|| GatewayError::RowNotFound {
                sheet: sheet.to_string(),
                column: column.to_string(),
                value: value.to_string(),
            })?;

        for (key, cell_value) in row {
            if let Some(slot) = existing.get_mut(key) {
                *slot = cell_value.clone();
            }
        }
        Ok(existing.clone())
    }
}
