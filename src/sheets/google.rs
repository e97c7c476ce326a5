use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::{column_letter, parse_grid, row_to_line, GatewayError, SheetSnapshot, SpreadsheetGateway};
use crate::config::SheetsConfig;
use crate::types::{cell, SheetRow};

/// Cells are written as given; the API must not re-parse numbers, dates or formulas
const VALUE_INPUT_OPTION: &str = "RAW";

/// Client for a Google Sheets v4 style `values` API
pub struct GoogleSheetsGateway {
    client: Client,
    base_url: Url,
    spreadsheet_id: String,
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

impl GoogleSheetsGateway {
    pub fn new(config: &SheetsConfig) -> Result<Self, GatewayError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| GatewayError::Unavailable(format!("invalid SHEETS_BASE_URL: {e}")))?;
        let spreadsheet_id = config
            .spreadsheet_id
            .clone()
            .ok_or_else(|| GatewayError::Unavailable("SHEETS_SPREADSHEET_ID is not set".to_string()))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url,
            spreadsheet_id,
            access_token: config.access_token.clone(),
        })
    }

    /// `{base}/v4/spreadsheets/{id}/values/{range}{suffix}`
    fn values_url(&self, range: &str, suffix: &str) -> Result<Url, GatewayError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| GatewayError::Unavailable("SHEETS_BASE_URL cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(["v4", "spreadsheets", self.spreadsheet_id.as_str(), "values"])
            .push(&format!("{range}{suffix}"));
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn check(&self, sheet: &str, response: Response) -> Result<Response, GatewayError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        if status.as_u16() == 400 && body.contains("Unable to parse range") {
            return Err(GatewayError::SheetNotFound(sheet.to_string()));
        }
        Err(GatewayError::Status {
            status: status.as_u16(),
            body,
        })
    }

    async fn fetch_grid(&self, sheet: &str) -> Result<Vec<Vec<String>>, GatewayError> {
        let url = self.values_url(&sheet_range(sheet), "")?;
        debug!("GET sheet grid: {}", sheet);

        let request = self.client.get(url).query(&[("majorDimension", "ROWS")]);
        let response = self.check(sheet, self.authorize(request).send().await?).await?;
        let range: ValueRange = response
            .json()
            .await
            .map_err(|e| GatewayError::Malformed(e.to_string()))?;

        Ok(range
            .values
            .into_iter()
            .map(|line| line.into_iter().map(cell_to_string).collect())
            .collect())
    }

    async fn append_line(&self, sheet: &str, headers: &[String], row: &SheetRow) -> Result<SheetRow, GatewayError> {
        if headers.is_empty() {
            return Err(GatewayError::Malformed(format!("sheet '{sheet}' has no header row")));
        }
        let line = row_to_line(headers, row);

        let url = self.values_url(&sheet_range(sheet), ":append")?;
        let request = self
            .client
            .post(url)
            .query(&[("valueInputOption", VALUE_INPUT_OPTION), ("insertDataOption", "INSERT_ROWS")])
            .json(&json!({ "majorDimension": "ROWS", "values": [line] }));
        self.check(sheet, self.authorize(request).send().await?).await?;

        Ok(headers.iter().cloned().zip(line).collect())
    }

    /// Merge `row` into `existing` and write it back at data row `index`
    async fn write_line(
        &self,
        sheet: &str,
        headers: &[String],
        index: usize,
        existing: &SheetRow,
        row: &SheetRow,
    ) -> Result<SheetRow, GatewayError> {
        let mut merged = existing.clone();
        for (key, cell_value) in row {
            if merged.contains_key(key) {
                merged.insert(key.clone(), cell_value.clone());
            }
        }

        // header is sheet row 1, data starts at row 2
        let sheet_row = index + 2;
        let last_column = column_letter(headers.len().saturating_sub(1));
        let range = format!("{}!A{sheet_row}:{last_column}{sheet_row}", sheet_range(sheet));
        let line = row_to_line(headers, &merged);

        let url = self.values_url(&range, "")?;
        let request = self
            .client
            .put(url)
            .query(&[("valueInputOption", VALUE_INPUT_OPTION)])
            .json(&json!({ "range": range, "majorDimension": "ROWS", "values": [line] }));
        self.check(sheet, self.authorize(request).send().await?).await?;

        Ok(merged)
    }
}

fn missing_column(sheet: &str, column: &str) -> GatewayError {
    GatewayError::MissingColumn {
        sheet: sheet.to_string(),
        column: column.to_string(),
    }
}

/// Quoted sheet name usable as an A1 range
fn sheet_range(sheet: &str) -> String {
    format!("'{}'", sheet.replace('\'', "''"))
}

fn cell_to_string(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[async_trait]
impl SpreadsheetGateway for GoogleSheetsGateway {
    async fn get_rows(&self, sheet: &str) -> Result<Vec<SheetRow>, GatewayError> {
        let (_, rows) = parse_grid(self.fetch_grid(sheet).await?);
        Ok(rows)
    }

    async fn get_headers(&self, sheet: &str) -> Result<Vec<String>, GatewayError> {
        let (headers, _) = parse_grid(self.fetch_grid(sheet).await?);
        Ok(headers)
    }

    async fn append_row(&self, sheet: &str, row: &SheetRow) -> Result<SheetRow, GatewayError> {
        let headers = self.get_headers(sheet).await?;
        self.append_line(sheet, &headers, row).await
    }

    async fn update_row(
        &self,
        sheet: &str,
        column: &str,
        value: &str,
        row: &SheetRow,
    ) -> Result<SheetRow, GatewayError> {
        let (headers, rows) = parse_grid(self.fetch_grid(sheet).await?);
        if !headers.iter().any(|h| h == column) {
            return Err(missing_column(sheet, column));
        }

        let wanted = value.trim();
        let (index, existing) = rows
            .iter()
            .enumerate()
            .find(|(_, r)| cell(r, column) == Some(wanted))
            .ok_or_else(|| GatewayError::RowNotFound {
                sheet: sheet.to_string(),
                column: column.to_string(),
                value: value.to_string(),
            })?;

        self.write_line(sheet, &headers, index, existing, row).await
    }

    async fn snapshot(&self, sheet: &str) -> Result<SheetSnapshot, GatewayError> {
        let (headers, rows) = parse_grid(self.fetch_grid(sheet).await?);
        Ok(SheetSnapshot { headers, rows })
    }

    async fn append_row_to(
        &self,
        sheet: &str,
        snapshot: &SheetSnapshot,
        row: &SheetRow,
    ) -> Result<SheetRow, GatewayError> {
        self.append_line(sheet, &snapshot.headers, row).await
    }

    async fn update_row_at(
        &self,
        sheet: &str,
        snapshot: &SheetSnapshot,
        index: usize,
        column: &str,
        row: &SheetRow,
    ) -> Result<SheetRow, GatewayError> {
        if !snapshot.headers.iter().any(|h| h == column) {
            return Err(missing_column(sheet, column));
        }
        let existing = snapshot.rows.get(index).ok_or_else(|| GatewayError::RowNotFound {
            sheet: sheet.to_string(),
            column: column.to_string(),
            value: format!("row {}", index + 2),
        })?;

        self.write_line(sheet, &snapshot.headers, index, existing, row).await
    }
}
