use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, Range, Reader};

/// One decoded cell. Formula results arrive as their cached values, so the
/// engine only ever sees plain text, numbers, and booleans.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
}

#[derive(Debug, Clone, Default)]
pub struct SheetTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl SheetTable {
    /// Column index for an exact header match (case and spelling preserved).
    pub fn col(&self, header: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == header)
    }
}

#[derive(Debug, Clone)]
pub struct Sheet {
    pub name: String,
    pub table: SheetTable,
}

#[derive(Debug, Clone, Default)]
pub struct Workbook {
    pub sheets: Vec<Sheet>,
}

/// Decode a workbook from raw bytes. Container format (.xlsx or .xls) is
/// detected from the byte stream, not the file name.
pub fn decode(bytes: &[u8]) -> anyhow::Result<Workbook> {
    let mut book = open_workbook_auto_from_rs(Cursor::new(bytes))?;

    let names = book.sheet_names().to_vec();
    let mut sheets: Vec<Sheet> = Vec::new();
    for name in names {
        let range = book.worksheet_range(&name)?;
        sheets.push(Sheet {
            table: range_to_table(&range),
            name,
        });
    }

    Ok(Workbook { sheets })
}

fn range_to_table(range: &Range<Data>) -> SheetTable {
    let mut rows_iter = range.rows();
    let Some(header_row) = rows_iter.next() else {
        return SheetTable::default();
    };

    // Keep only columns with a non-empty header; a blank header cell cannot be
    // a subject key or an identity column.
    let mut headers: Vec<String> = Vec::new();
    let mut keep: Vec<usize> = Vec::new();
    for (i, cell) in header_row.iter().enumerate() {
        let h = data_to_text(cell);
        let h = h.trim();
        if !h.is_empty() {
            headers.push(h.to_string());
            keep.push(i);
        }
    }

    let mut rows: Vec<Vec<Cell>> = Vec::new();
    for raw in rows_iter {
        let mut row: Vec<Cell> = Vec::with_capacity(keep.len());
        for &i in &keep {
            row.push(raw.get(i).map(data_to_cell).unwrap_or(Cell::Empty));
        }
        rows.push(row);
    }

    SheetTable { headers, rows }
}

fn data_to_cell(d: &Data) -> Cell {
    match d {
        Data::Empty => Cell::Empty,
        Data::String(s) => Cell::Text(s.clone()),
        Data::Float(f) => Cell::Number(*f),
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Bool(b) => Cell::Bool(*b),
        // Serial date numbers are kept numeric; ISO date/duration text stays text.
        Data::DateTime(dt) => Cell::Number(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
        Data::Error(e) => Cell::Text(format!("{:?}", e)),
    }
}

fn data_to_text(d: &Data) -> String {
    match d {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) => format_number(*f),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => format_number(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Error(e) => format!("{:?}", e),
    }
}

/// Render a number the way a spreadsheet displays it: integers without a
/// trailing ".0".
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}
