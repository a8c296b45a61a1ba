use std::collections::HashMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::workbook::{format_number, Cell, SheetTable, Workbook};

// Sheet-name preferences, checked case-insensitively against every sheet in
// order of this list; first hit wins, else the workbook's first sheet.
const CURRENT_SHEET_NAMES: &[&str] = &["current", "curr", "this semester", "sem1"];
const PREVIOUS_SHEET_NAMES: &[&str] = &["previous", "prev"];

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("No data found in the workbook. Ensure your file has at least one sheet with rows.")]
    NoData,
    #[error("Could not locate a name column. Please include a 'Name' column (e.g., 'Name', 'Student Name').")]
    NoNameColumn,
}

/// Header vocabularies used to classify columns. Teacher files vary by locale
/// and habit, so the lists are data rather than code; the daemon lets the
/// `setup.ingest` section override them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HeaderLexicon {
    pub name_headers: Vec<String>,
    pub meta_headers: Vec<String>,
}

impl Default for HeaderLexicon {
    fn default() -> Self {
        Self {
            name_headers: ["name", "student name", "student", "full name"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            meta_headers: [
                "roll",
                "roll no",
                "roll number",
                "id",
                "student id",
                "sr no",
                "sr",
                "gender",
                "class",
                "division",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl HeaderLexicon {
    fn is_name_header(&self, header: &str) -> bool {
        let n = normalize_header(header);
        self.name_headers.iter().any(|h| *h == n)
    }

    fn is_meta_header(&self, header: &str) -> bool {
        let n = normalize_header(header);
        self.meta_headers.iter().any(|h| *h == n) || self.is_name_header(header)
    }

    /// Prefer an exact vocabulary match; fall back to the first header whose
    /// normalized form contains "name".
    fn pick_name_column(&self, headers: &[String]) -> Option<usize> {
        if let Some(i) = headers.iter().position(|h| self.is_name_header(h)) {
            return Some(i);
        }
        headers
            .iter()
            .position(|h| normalize_header(h).contains("name"))
    }

    /// Every non-meta header with its column index, in column order, spelling
    /// preserved. The resolved name column is excluded by index so a column
    /// found through the substring fallback never leaks into the subject set.
    fn detect_subjects(&self, headers: &[String], name_col: usize) -> Vec<(usize, String)> {
        headers
            .iter()
            .enumerate()
            .filter(|(i, h)| *i != name_col && !self.is_meta_header(h))
            .map(|(i, h)| (i, h.clone()))
            .collect()
    }
}

fn normalize_header(h: &str) -> String {
    h.trim().to_lowercase()
}

/// Exam metadata supplied alongside the workbook.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamOptions {
    pub teacher: String,
    pub class_name: String,
    pub subject: String,
    pub exam_name: Option<String>,
    pub exam_date: Option<String>,
    pub total_marks: Option<u32>,
    pub passing_marks: Option<u32>,
    pub file_name: Option<String>,
    #[serde(skip)]
    pub file_digest: Option<String>,
}

/// One subject's marks for one student. Both keys are always serialized;
/// `null` means no value could be located.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectScore {
    pub current: Option<f64>,
    pub previous: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRecord {
    pub id: String,
    pub name: String,
    /// Keyed by subject header, insertion order = source column order.
    pub scores: IndexMap<String, SubjectScore>,
    pub total_current: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_previous: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadMeta {
    pub id: String,
    pub teacher: String,
    pub class_name: String,
    pub subject: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exam_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exam_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_marks: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passing_marks: Option<u32>,
    pub created_at: String,
    pub subjects: Vec<String>,
    pub student_count: usize,
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_digest: Option<String>,
}

/// The complete normalized output of one ingestion call. Immutable once
/// constructed; a re-upload produces a new payload under a new id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadPayload {
    pub meta: UploadMeta,
    pub records: Vec<StudentRecord>,
}

enum Coerced {
    Value(f64),
    Blank,
    Invalid(String),
}

fn coerce_number(cell: &Cell) -> Coerced {
    match cell {
        Cell::Empty => Coerced::Blank,
        Cell::Number(n) if n.is_finite() => Coerced::Value(*n),
        Cell::Number(n) => Coerced::Invalid(format!("{}", n)),
        Cell::Bool(b) => Coerced::Value(if *b { 1.0 } else { 0.0 }),
        Cell::Text(t) => {
            let s = t.trim();
            if s.is_empty() {
                return Coerced::Blank;
            }
            match s.parse::<f64>() {
                Ok(v) if v.is_finite() => Coerced::Value(v),
                _ => Coerced::Invalid(t.clone()),
            }
        }
    }
}

fn cell_text(cell: &Cell) -> String {
    match cell {
        Cell::Empty => String::new(),
        Cell::Text(s) => s.clone(),
        Cell::Number(n) => format_number(*n),
        Cell::Bool(b) => b.to_string(),
    }
}

fn pick_sheets(workbook: &Workbook) -> Option<(&SheetTable, Option<&SheetTable>)> {
    let by_name = |names: &[&str]| {
        names.iter().find_map(|n| {
            workbook
                .sheets
                .iter()
                .find(|s| s.name.to_lowercase() == *n)
        })
    };
    let current = by_name(CURRENT_SHEET_NAMES).or_else(|| workbook.sheets.first())?;
    let previous = by_name(PREVIOUS_SHEET_NAMES);
    Some((&current.table, previous.map(|s| &s.table)))
}

fn prev_suffix_headers(subject: &str) -> [String; 4] {
    [
        format!("{} (Prev)", subject),
        format!("{} (Previous)", subject),
        format!("{}_prev", subject),
        format!("{}_previous", subject),
    ]
}

/// First resolver: a same-row "previous" column in the current sheet. Blank or
/// unparseable suffix cells fall through to the next strategy without warning.
fn resolve_prev_from_suffix(table: &SheetTable, row: &[Cell], subject: &str) -> Option<f64> {
    for header in prev_suffix_headers(subject) {
        if let Some(ci) = table.col(&header) {
            if let Coerced::Value(v) = coerce_number(&row[ci]) {
                return Some(v);
            }
        }
    }
    None
}

/// Second resolver: the same-named subject column of the previous sheet's row
/// for this student. Name matching is case-insensitive and exact; there is no
/// fuzzy matching.
fn resolve_prev_from_sheet(
    prev: Option<&(&SheetTable, HashMap<String, usize>)>,
    name_lower: &str,
    subject: &str,
) -> Option<f64> {
    let (table, by_name) = prev?;
    let ri = *by_name.get(name_lower)?;
    let ci = table.col(subject)?;
    match coerce_number(&table.rows[ri][ci]) {
        Coerced::Value(v) => Some(v),
        _ => None,
    }
}

fn slug(name: &str) -> String {
    name.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}

pub fn ingest(
    workbook: &Workbook,
    opts: &ExamOptions,
    lexicon: &HeaderLexicon,
) -> Result<UploadPayload, IngestError> {
    let (current, previous) = pick_sheets(workbook).ok_or(IngestError::NoData)?;
    if current.rows.is_empty() {
        return Err(IngestError::NoData);
    }

    let name_col = lexicon
        .pick_name_column(&current.headers)
        .ok_or(IngestError::NoNameColumn)?;
    let subject_cols = lexicon.detect_subjects(&current.headers, name_col);

    let mut warnings: Vec<String> = Vec::new();

    // Index the previous sheet by lowercased student name. Later duplicates
    // overwrite earlier ones, mirroring the map-build order of the source.
    let prev_lookup: Option<(&SheetTable, HashMap<String, usize>)> = previous.and_then(|table| {
        let nc = lexicon.pick_name_column(&table.headers)?;
        let mut by_name = HashMap::new();
        for (ri, row) in table.rows.iter().enumerate() {
            let n = cell_text(&row[nc]).trim().to_string();
            if !n.is_empty() {
                by_name.insert(n.to_lowercase(), ri);
            }
        }
        Some((table, by_name))
    });

    let mut records: Vec<StudentRecord> = Vec::new();
    let mut seen_names: HashMap<String, usize> = HashMap::new();

    for (i, row) in current.rows.iter().enumerate() {
        // 1-based spreadsheet row, offset past the header row.
        let sheet_row = i + 2;

        let name = cell_text(&row[name_col]).trim().to_string();
        if name.is_empty() {
            warnings.push(format!("Row {}: Missing student name", sheet_row));
            continue;
        }
        let name_lower = name.to_lowercase();

        match seen_names.get(&name_lower) {
            Some(first_row) => warnings.push(format!(
                "Row {}: Duplicate student name \"{}\" also appears at row {}",
                sheet_row, name, first_row
            )),
            None => {
                seen_names.insert(name_lower.clone(), sheet_row);
            }
        }

        let mut scores: IndexMap<String, SubjectScore> = IndexMap::new();
        let mut total_current = 0.0;
        let mut total_previous = 0.0;
        let mut has_prev = false;

        for (ci, subject) in &subject_cols {
            let current_val = match coerce_number(&row[*ci]) {
                Coerced::Value(v) => Some(v),
                Coerced::Blank => None,
                Coerced::Invalid(raw) => {
                    warnings.push(format!(
                        "Row {} [{}] {}: Invalid number \"{}\"",
                        sheet_row, name, subject, raw
                    ));
                    None
                }
            };

            let previous_val = resolve_prev_from_suffix(current, row, subject)
                .or_else(|| resolve_prev_from_sheet(prev_lookup.as_ref(), &name_lower, subject));

            if let Some(v) = current_val {
                if !(0.0..=100.0).contains(&v) {
                    warnings.push(format!(
                        "Row {} [{}] {}: Out of range ({}) expected 0–100",
                        sheet_row,
                        name,
                        subject,
                        format_number(v)
                    ));
                }
            }
            if let Some(v) = previous_val {
                if !(0.0..=100.0).contains(&v) {
                    warnings.push(format!(
                        "Row {} [{}] {}: Previous out of range ({}) expected 0–100",
                        sheet_row,
                        name,
                        subject,
                        format_number(v)
                    ));
                }
            }

            scores.insert(
                subject.clone(),
                SubjectScore {
                    current: current_val,
                    previous: previous_val,
                },
            );

            if let Some(v) = current_val {
                total_current += v;
            }
            if let Some(v) = previous_val {
                has_prev = true;
                total_previous += v;
            }
        }

        records.push(StudentRecord {
            id: format!("{}-{}", i, slug(&name)),
            name,
            scores,
            total_current,
            total_previous: has_prev.then_some(total_previous),
            delta: has_prev.then_some(total_current - total_previous),
        });
    }

    let meta = UploadMeta {
        id: Uuid::new_v4().to_string(),
        teacher: opts.teacher.clone(),
        class_name: opts.class_name.clone(),
        subject: opts.subject.clone(),
        exam_name: opts.exam_name.clone(),
        exam_date: opts.exam_date.clone(),
        total_marks: opts.total_marks,
        passing_marks: opts.passing_marks,
        created_at: chrono::Utc::now().to_rfc3339(),
        subjects: subject_cols.into_iter().map(|(_, s)| s).collect(),
        student_count: records.len(),
        warnings,
        file_name: opts.file_name.clone(),
        file_digest: opts.file_digest.clone(),
    };

    Ok(UploadPayload { meta, records })
}
