//! Spreadsheet documents for bulk import and export.
//!
//! [`Workbook`] is a small in-memory model (named sheets of cell rows) that
//! sits between the engine and the xlsx format. Reading goes through
//! `calamine`, writing through `rust_xlsxwriter`; the engine itself only ever
//! sees the model.

use crate::{
    error::{Error, Result},
    import::{Candidate, is_header_word},
};
use calamine::{Data, Reader, Xlsx};
use rust_xlsxwriter::Workbook as XlsxWriter;
use std::io::Cursor;

/// Longest sheet name spreadsheet applications accept.
pub const MAX_SHEET_NAME: usize = 31;

/// One cell value.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Cell {
    #[default]
    Empty,
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl Cell {
    /// The import candidate this cell offers, if any.
    pub fn candidate(&self) -> Option<Candidate> {
        match self {
            Self::Empty => None,
            Self::Text(s) => Some(Candidate::Text(s.clone())),
            Self::Int(n) => Some(Candidate::Integer(*n)),
            Self::Float(f) => Some(Candidate::Float(*f)),
            Self::Bool(b) => Some(Candidate::Text(b.to_string())),
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Cell {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&Data> for Cell {
    fn from(data: &Data) -> Self {
        match data {
            Data::Empty => Self::Empty,
            Data::String(s) => Self::Text(s.clone()),
            Data::Int(n) => Self::Int(*n),
            Data::Float(f) => Self::Float(*f),
            Data::Bool(b) => Self::Bool(*b),
            other => Self::Text(other.to_string()),
        }
    }
}

/// A named grid of cells. Rows may be ragged.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Sheet {
    pub name: String,
    pub rows: Vec<Vec<Cell>>,
}

impl Sheet {
    /// Creates an empty sheet. The name is truncated to [`MAX_SHEET_NAME`]
    /// characters.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.chars().take(MAX_SHEET_NAME).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push_row<I, C>(&mut self, row: I)
    where
        I: IntoIterator<Item = C>,
        C: Into<Cell>,
    {
        self.rows.push(row.into_iter().map(Into::into).collect());
    }

    /// Import candidates from the first column, skipping the title row.
    ///
    /// Cells that normalize to nothing and cells that read as a column title
    /// (see [`crate::HEADER_WORDS`]) are left out.
    pub fn first_column_candidates(&self) -> Vec<Candidate> {
        self.rows
            .iter()
            .skip(1)
            .filter_map(|row| row.first().and_then(Cell::candidate))
            .filter(|c| c.normalize().is_some_and(|v| !is_header_word(&v)))
            .collect()
    }
}

/// An ordered collection of sheets.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Workbook {
    pub sheets: Vec<Sheet>,
}

impl Workbook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sheet: Sheet) {
        self.sheets.push(sheet);
    }

    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.name == name)
    }

    pub fn first_sheet(&self) -> Option<&Sheet> {
        self.sheets.first()
    }

    /// Parses an xlsx document.
    pub fn from_xlsx(bytes: &[u8]) -> Result<Self> {
        let mut reader: Xlsx<_> = Xlsx::new(Cursor::new(bytes))?;
        let mut sheets = Vec::new();
        for name in reader.sheet_names() {
            let range = reader.worksheet_range(&name)?;
            let mut sheet = Sheet {
                name,
                rows: Vec::new(),
            };

            // Ranges start at the first used cell; rebuild absolute positions
            // so "row 2, column A" keeps its meaning.
            if let Some((row0, col0)) = range.start() {
                let (row0, col0) = (row0 as usize, col0 as usize);
                for (r, c, data) in range.cells() {
                    let (r, c) = (row0 + r, col0 + c);
                    if sheet.rows.len() <= r {
                        sheet.rows.resize_with(r + 1, Vec::new);
                    }
                    let row = &mut sheet.rows[r];
                    if row.len() <= c {
                        row.resize(c + 1, Cell::Empty);
                    }
                    row[c] = Cell::from(data);
                }
            }
            sheets.push(sheet);
        }
        Ok(Self { sheets })
    }

    /// Serializes the workbook as an xlsx document.
    ///
    /// A workbook without sheets is written with one blank sheet, since the
    /// format requires at least one.
    pub fn to_xlsx(&self) -> Result<Vec<u8>> {
        let mut book = XlsxWriter::new();
        for sheet in &self.sheets {
            let worksheet = book.add_worksheet();
            worksheet.set_name(&sheet.name)?;
            for (r, row) in sheet.rows.iter().enumerate() {
                let r = u32::try_from(r).map_err(|_| Error::Export {
                    reason: format!("sheet `{}` has too many rows", sheet.name),
                })?;
                for (c, cell) in row.iter().enumerate() {
                    let c = u16::try_from(c).map_err(|_| Error::Export {
                        reason: format!("sheet `{}` has too many columns", sheet.name),
                    })?;
                    match cell {
                        Cell::Empty => {}
                        Cell::Text(s) if s.is_empty() => {}
                        Cell::Text(s) => {
                            worksheet.write_string(r, c, s)?;
                        }
                        Cell::Int(n) => {
                            worksheet.write_string(r, c, n.to_string())?;
                        }
                        Cell::Float(f) => {
                            worksheet.write_number(r, c, *f)?;
                        }
                        Cell::Bool(b) => {
                            worksheet.write_boolean(r, c, *b)?;
                        }
                    }
                }
            }
        }
        if self.sheets.is_empty() {
            book.add_worksheet();
        }
        Ok(book.save_to_buffer()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sheet(name: &str, rows: &[&[&str]]) -> Sheet {
        let mut sheet = Sheet::new(name);
        for row in rows {
            sheet.push_row(row.iter().copied());
        }
        sheet
    }

    #[test]
    fn names_are_truncated() {
        let long = "Нельзяграм (там где Reels) и другие";
        assert_eq!(Sheet::new(long).name.chars().count(), MAX_SHEET_NAME);
        assert_eq!(Sheet::new("VK").name, "VK");
    }

    #[test]
    fn first_column_skips_title_blank_and_header_cells() {
        let sheet = sheet(
            "Telegram",
            &[
                &["@first", "ignored"],
                &["@one", "x"],
                &[],
                &["  "],
                &["Контакт"],
                &["=@two"],
            ],
        );
        let values: Vec<_> = sheet
            .first_column_candidates()
            .iter()
            .filter_map(Candidate::normalize)
            .collect();
        assert_eq!(values, ["@one", "@two"]);
    }

    #[test]
    fn numeric_cells_become_candidates() {
        let mut sheet = Sheet::new("WhatsApp");
        sheet.push_row([Cell::from("Value")]);
        sheet.push_row([Cell::Float(79990001122.0)]);
        sheet.push_row([Cell::Int(42)]);
        assert_eq!(
            sheet.first_column_candidates(),
            [Candidate::Float(79990001122.0), Candidate::Integer(42)]
        );
    }

    #[test]
    fn xlsx_round_trip_keeps_positions() {
        let mut book = Workbook::new();
        book.push(sheet("VK", &[&["Value", "ClaimedBy"], &["id1", "7"]]));
        let mut second = Sheet::new("OK");
        second.rows = vec![Vec::new(), vec![Cell::Empty, Cell::from("b2")]];
        book.push(second);

        let parsed = Workbook::from_xlsx(&book.to_xlsx().unwrap()).unwrap();
        assert_eq!(parsed.sheets.len(), 2);
        assert_eq!(parsed.sheets[0], book.sheets[0]);
        let ok = parsed.sheet("OK").unwrap();
        assert_eq!(ok.rows[1][1], Cell::from("b2"));
    }

    #[test]
    fn garbage_is_malformed_input() {
        assert!(matches!(
            Workbook::from_xlsx(b"definitely not a zip"),
            Err(Error::MalformedInput { .. })
        ));
    }
}
