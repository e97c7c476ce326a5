/// Shared types used across the codebase

use indexmap::IndexMap;

/// One spreadsheet row keyed by header, in sheet column order.
/// Blank cells are empty strings.
pub type SheetRow = IndexMap<String, String>;

/// True when every cell of the row is blank (header artifacts, spacer rows)
pub fn is_blank_row(row: &SheetRow) -> bool {
    row.values().all(|v| v.trim().is_empty())
}

/// Cell value under `column`, trimmed, or None when absent or blank
pub fn cell<'a>(row: &'a SheetRow, column: &str) -> Option<&'a str> {
    row.get(column).map(|v| v.trim()).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_rows_are_detected() {
        let mut row = SheetRow::new();
        row.insert("ID".into(), "  ".into());
        row.insert("Name".into(), String::new());
        assert!(is_blank_row(&row));

        row.insert("Name".into(), "Ana".into());
        assert!(!is_blank_row(&row));
        assert!(is_blank_row(&SheetRow::new()));
    }

    #[test]
    fn cell_trims_and_filters_blanks() {
        let mut row = SheetRow::new();
        row.insert("ID".into(), " X1 ".into());
        row.insert("Notes".into(), "   ".into());
        assert_eq!(cell(&row, "ID"), Some("X1"));
        assert_eq!(cell(&row, "Notes"), None);
        assert_eq!(cell(&row, "Missing"), None);
    }
}
