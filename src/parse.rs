//! Format-specific readers for department ranking lists.
//!
//! Every format is first flattened into a table of text cells; one shared
//! mapper then locates the header row and turns data rows into records.

use std::collections::HashMap;
use std::io::Cursor;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, LazyLock};

use calamine::Reader;
use regex::Regex;

use crate::models::{DocumentId, MediaType, RankingRecord, SourceDocument};

pub const MAX_GPA: f64 = 4.0;

pub trait DocumentParser: Send + Sync {
    /// Parses the whole payload or explains why it cannot be read.
    fn parse(&self, document: &SourceDocument) -> Result<Vec<RankingRecord>, String>;
}

#[derive(Clone)]
pub struct ParserSet {
    parsers: HashMap<MediaType, Arc<dyn DocumentParser>>,
}

impl ParserSet {
    pub fn empty() -> Self {
        Self {
            parsers: HashMap::new(),
        }
    }

    pub fn standard() -> Self {
        let spreadsheet: Arc<dyn DocumentParser> = Arc::new(SpreadsheetParser);
        Self::empty()
            .with(MediaType::Csv, Arc::new(CsvParser))
            .with(MediaType::Pdf, Arc::new(PdfParser))
            .with(MediaType::LegacySpreadsheet, Arc::clone(&spreadsheet))
            .with(MediaType::ModernSpreadsheet, spreadsheet)
    }

    pub fn with(mut self, media_type: MediaType, parser: Arc<dyn DocumentParser>) -> Self {
        self.parsers.insert(media_type, parser);
        self
    }

    pub fn for_media(&self, media_type: MediaType) -> Option<Arc<dyn DocumentParser>> {
        self.parsers.get(&media_type).cloned()
    }
}

pub struct CsvParser;

impl DocumentParser for CsvParser {
    fn parse(&self, document: &SourceDocument) -> Result<Vec<RankingRecord>, String> {
        let text = std::str::from_utf8(&document.payload)
            .map_err(|e| format!("file is not valid UTF-8: {e}"))?;
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);

        let header_line = text.lines().next().unwrap_or_default();
        let delimiter = sniff_delimiter(header_line);

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter as u8)
            .has_headers(false)
            .flexible(true)
            .from_reader(text.as_bytes());

        let mut rows = Vec::new();
        for result in reader.records() {
            let record = result.map_err(|e| format!("malformed CSV: {e}"))?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        records_from_table(document.id, &rows)
    }
}

/// Picks the separator that occurs most often in the header line. Ties go
/// to the earlier candidate, so a line without separators reads as commas.
pub fn sniff_delimiter(header_line: &str) -> char {
    let mut best = (',', header_line.matches(',').count());
    for candidate in [';', '\t', '|'] {
        let count = header_line.matches(candidate).count();
        if count > best.1 {
            best = (candidate, count);
        }
    }
    best.0
}

pub struct PdfParser;

static PDF_CELL_SPLIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\t|\||;|\s{2,}").expect("static regex"));
static PDF_CELL_SPLIT_WITH_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\t|\||;|,|\s{2,}").expect("static regex"));
// A comma between digits is a decimal separator ("3,55"), not a cell break.
static DECIMAL_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d,\d").expect("static regex"));

impl DocumentParser for PdfParser {
    fn parse(&self, document: &SourceDocument) -> Result<Vec<RankingRecord>, String> {
        // pdf-extract panics on some malformed inputs instead of returning an error.
        let extracted = std::panic::catch_unwind(AssertUnwindSafe(|| {
            pdf_extract::extract_text_from_mem(&document.payload)
        }))
        .map_err(|_| "unreadable PDF: extractor aborted".to_string())?;
        let text = extracted.map_err(|e| format!("unreadable PDF: {e}"))?;
        records_from_table(document.id, &pdf_text_rows(&text))
    }
}

fn pdf_text_rows(text: &str) -> Vec<Vec<String>> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            let splitter = if DECIMAL_COMMA.is_match(line) {
                &*PDF_CELL_SPLIT
            } else {
                &*PDF_CELL_SPLIT_WITH_COMMA
            };
            splitter
                .split(line)
                .map(|cell| cell.trim().to_string())
                .filter(|cell| !cell.is_empty())
                .collect()
        })
        .collect()
}

/// Reads the first worksheet of `.xls` and `.xlsx` workbooks.
pub struct SpreadsheetParser;

impl DocumentParser for SpreadsheetParser {
    fn parse(&self, document: &SourceDocument) -> Result<Vec<RankingRecord>, String> {
        let cursor = Cursor::new(document.payload.to_vec());
        let mut workbook = calamine::open_workbook_auto_from_rs(cursor)
            .map_err(|e| format!("unreadable spreadsheet: {e}"))?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| "workbook has no worksheets".to_string())?
            .map_err(|e| format!("unreadable worksheet: {e}"))?;

        let rows: Vec<Vec<String>> = range
            .rows()
            .map(|row| row.iter().map(|cell| cell.to_string()).collect())
            .collect();
        records_from_table(document.id, &rows)
    }
}

struct Columns {
    student_id: usize,
    name: usize,
    department: usize,
    gpa: usize,
}

const STUDENT_ID: &[&str] = &["studentid", "studentno", "studentnumber", "id"];
const NAME: &[&str] = &["name", "studentname", "fullname"];
const DEPARTMENT: &[&str] = &["department", "dept"];
const GPA: &[&str] = &["gpa", "cgpa", "gano"];

fn normalize_header(cell: &str) -> String {
    cell.trim()
        .chars()
        .filter(|ch| !matches!(ch, ' ' | '_' | '-' | '.'))
        .flat_map(char::to_lowercase)
        .collect()
}

impl Columns {
    fn locate(row: &[String]) -> Result<Self, Vec<&'static str>> {
        let headers: Vec<String> = row.iter().map(|cell| normalize_header(cell)).collect();
        let find = |aliases: &[&str]| {
            headers
                .iter()
                .position(|header| aliases.iter().any(|alias| header == alias))
        };

        let student_id = find(STUDENT_ID);
        let name = find(NAME);
        let department = find(DEPARTMENT);
        let gpa = find(GPA);

        match (student_id, name, department, gpa) {
            (Some(student_id), Some(name), Some(department), Some(gpa)) => Ok(Self {
                student_id,
                name,
                department,
                gpa,
            }),
            _ => {
                let mut missing = Vec::new();
                if student_id.is_none() {
                    missing.push("student_id");
                }
                if name.is_none() {
                    missing.push("name");
                }
                if department.is_none() {
                    missing.push("department");
                }
                if gpa.is_none() {
                    missing.push("gpa");
                }
                Err(missing)
            }
        }
    }
}

fn cell_text(row: &[String], idx: usize) -> String {
    row.get(idx)
        .map(|cell| cell.trim().to_string())
        .unwrap_or_default()
}

fn is_blank(row: &[String]) -> bool {
    row.iter().all(|cell| cell.trim().is_empty())
}

pub fn parse_gpa(raw: &str) -> Result<f64, String> {
    let cleaned = raw.trim().replace(',', ".");
    let gpa: f64 = cleaned
        .parse()
        .map_err(|_| format!("GPA {raw:?} is not a number"))?;
    if !gpa.is_finite() || !(0.0..=MAX_GPA).contains(&gpa) {
        return Err(format!("GPA {raw:?} is outside 0.0-{MAX_GPA:.1}"));
    }
    Ok(gpa)
}

/// Maps a table of cells onto records. Rows before the header are ignored.
pub fn records_from_table(
    source: DocumentId,
    rows: &[Vec<String>],
) -> Result<Vec<RankingRecord>, String> {
    let mut first_missing = None;
    let mut located = None;
    for (idx, row) in rows.iter().enumerate() {
        if is_blank(row) {
            continue;
        }
        match Columns::locate(row) {
            Ok(columns) => {
                located = Some((idx, columns));
                break;
            }
            Err(missing) => {
                first_missing.get_or_insert(missing);
            }
        }
    }

    let (header_idx, columns) = match located {
        Some(found) => found,
        None => {
            return Err(match first_missing {
                Some(missing) => format!("missing columns: {}", missing.join(", ")),
                None => "document is empty".to_string(),
            })
        }
    };

    let mut records = Vec::new();
    for (idx, row) in rows.iter().enumerate().skip(header_idx + 1) {
        if is_blank(row) {
            continue;
        }
        let line = idx + 1;
        let student_id = cell_text(row, columns.student_id);
        if student_id.is_empty() {
            return Err(format!("row {line}: missing student id"));
        }
        let name = cell_text(row, columns.name);
        if name.is_empty() {
            return Err(format!("row {line}: missing name for student {student_id}"));
        }
        let gpa = parse_gpa(&cell_text(row, columns.gpa)).map_err(|e| format!("row {line}: {e}"))?;

        records.push(RankingRecord {
            student_id,
            name,
            department: cell_text(row, columns.department),
            gpa,
            source,
        });
    }

    Ok(records)
}
