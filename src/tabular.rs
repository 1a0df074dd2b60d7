use anyhow::{anyhow, Context};
use calamine::{open_workbook_auto, Data, Reader};
use serde_json::{Map, Value};
use std::io::{Seek, Write};
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::store::write_atomic;

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
}

impl Cell {
    /// Trimmed textual form; numbers render without a trailing `.0`.
    pub fn text(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Text(s) => s.trim().to_string(),
            Cell::Number(n) => format_number(*n),
        }
    }

    pub fn is_blank(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            Cell::Number(n) => !n.is_finite(),
        }
    }

    fn to_json(&self) -> Value {
        match self {
            Cell::Empty => Value::Null,
            Cell::Text(s) => Value::String(s.clone()),
            Cell::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::Text(s.to_string())
    }
}

impl From<String> for Cell {
    fn from(s: String) -> Self {
        Cell::Text(s)
    }
}

impl From<f64> for Cell {
    fn from(n: f64) -> Self {
        Cell::Number(n)
    }
}

impl From<usize> for Cell {
    fn from(n: usize) -> Self {
        Cell::Number(n as f64)
    }
}

impl From<Option<f64>> for Cell {
    fn from(n: Option<f64>) -> Self {
        n.map(Cell::Number).unwrap_or(Cell::Empty)
    }
}

fn format_number(n: f64) -> String {
    if !n.is_finite() {
        return String::new();
    }
    format!("{n}")
}

/// Header row plus data rows. Short rows read as blank in the missing cells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new(headers: &[&str]) -> Table {
        Table {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push(&mut self, row: Vec<Cell>) {
        self.rows.push(row);
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn cell(&self, row: usize, col: usize) -> &Cell {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&Cell::Empty)
    }

    /// Builds a table from JSON objects; headers are the keys in first-seen order.
    pub fn from_json_rows(rows: &[Value]) -> anyhow::Result<Table> {
        let mut headers: Vec<String> = Vec::new();
        for (i, r) in rows.iter().enumerate() {
            let obj = r
                .as_object()
                .ok_or_else(|| anyhow!("row {} is not an object", i + 1))?;
            for k in obj.keys() {
                if !headers.iter().any(|h| h == k) {
                    headers.push(k.clone());
                }
            }
        }
        let mut table = Table {
            headers,
            rows: Vec::with_capacity(rows.len()),
        };
        for r in rows {
            let obj = r.as_object().cloned().unwrap_or_default();
            let row = table
                .headers
                .iter()
                .map(|h| match obj.get(h) {
                    None | Some(Value::Null) => Cell::Empty,
                    Some(Value::Number(n)) => n.as_f64().map(Cell::Number).unwrap_or(Cell::Empty),
                    Some(Value::String(s)) => Cell::Text(s.clone()),
                    Some(Value::Bool(b)) => Cell::Text(b.to_string()),
                    Some(other) => Cell::Text(other.to_string()),
                })
                .collect();
            table.rows.push(row);
        }
        Ok(table)
    }

    /// Rows as JSON objects keyed by header, for previews.
    pub fn rows_as_json(&self, limit: usize) -> Vec<Value> {
        self.rows
            .iter()
            .take(limit)
            .enumerate()
            .map(|(i, _)| {
                let mut obj = Map::new();
                for (c, h) in self.headers.iter().enumerate() {
                    obj.insert(h.clone(), self.cell(i, c).to_json());
                }
                Value::Object(obj)
            })
            .collect()
    }
}

/// Splits CSV text into records. Quoted fields may contain commas, doubled
/// quotes and line breaks.
pub fn parse_csv(text: &str) -> Vec<Vec<String>> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut records: Vec<Vec<String>> = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut buf = String::new();
    let mut in_quotes = false;
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0usize;
    while i < chars.len() {
        let ch = chars[i];
        if ch == '"' {
            if in_quotes && i + 1 < chars.len() && chars[i + 1] == '"' {
                buf.push('"');
                i += 2;
                continue;
            }
            in_quotes = !in_quotes;
            i += 1;
            continue;
        }
        if !in_quotes && ch == ',' {
            record.push(std::mem::take(&mut buf));
            i += 1;
            continue;
        }
        if !in_quotes && (ch == '\n' || ch == '\r') {
            if ch == '\r' && i + 1 < chars.len() && chars[i + 1] == '\n' {
                i += 1;
            }
            record.push(std::mem::take(&mut buf));
            records.push(std::mem::take(&mut record));
            i += 1;
            continue;
        }
        buf.push(ch);
        i += 1;
    }
    if !buf.is_empty() || !record.is_empty() {
        record.push(buf);
        records.push(record);
    }
    records.retain(|r| !(r.len() == 1 && r[0].trim().is_empty()));
    records
}

pub fn table_from_csv(text: &str) -> anyhow::Result<Table> {
    let mut records = parse_csv(text).into_iter();
    let headers: Vec<String> = records
        .next()
        .ok_or_else(|| anyhow!("CSV has no header row"))?
        .into_iter()
        .map(|h| h.trim().to_string())
        .collect();
    let rows = records
        .map(|r| {
            r.into_iter()
                .map(|c| if c.is_empty() { Cell::Empty } else { Cell::Text(c) })
                .collect()
        })
        .collect();
    Ok(Table { headers, rows })
}

pub fn read_csv_file(path: &Path) -> anyhow::Result<Table> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.to_string_lossy()))?;
    table_from_csv(&text).with_context(|| format!("failed to parse {}", path.to_string_lossy()))
}

/// How an import file is read, going by its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Csv,
    Workbook,
}

impl SourceFormat {
    pub fn from_path(path: &Path) -> SourceFormat {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => SourceFormat::Workbook,
            _ => SourceFormat::Csv,
        }
    }
}

fn workbook_cell(d: &Data) -> Cell {
    match d {
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) if !s.trim().is_empty() => {
            Cell::Text(s.clone())
        }
        Data::Float(f) => Cell::Number(*f),
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Bool(b) => Cell::Text(b.to_string()),
        // Date-formatted cells keep their day serial.
        Data::DateTime(dt) => Cell::Number(dt.as_f64()),
        _ => Cell::Empty,
    }
}

/// Sheet names of a workbook, in tab order.
pub fn workbook_sheet_names(path: &Path) -> anyhow::Result<Vec<String>> {
    let workbook = open_workbook_auto(path)
        .with_context(|| format!("failed to open workbook {}", path.to_string_lossy()))?;
    Ok(workbook.sheet_names())
}

/// Reads one sheet; its first row is the header. Blank rows are dropped.
pub fn read_workbook_sheet(path: &Path, sheet: &str) -> anyhow::Result<Table> {
    let mut workbook = open_workbook_auto(path)
        .with_context(|| format!("failed to open workbook {}", path.to_string_lossy()))?;
    let range = workbook
        .worksheet_range(sheet)
        .with_context(|| format!("failed to read sheet {sheet} of {}", path.to_string_lossy()))?;
    let mut rows = range
        .rows()
        .map(|r| r.iter().map(workbook_cell).collect::<Vec<Cell>>())
        .filter(|r| !r.iter().all(Cell::is_blank));
    let headers = rows
        .next()
        .ok_or_else(|| anyhow!("sheet {sheet} has no header row"))?
        .iter()
        .map(Cell::text)
        .collect();
    Ok(Table {
        headers,
        rows: rows.collect(),
    })
}

fn csv_quote(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

pub fn to_csv(table: &Table) -> String {
    let mut out = String::new();
    let header: Vec<String> = table.headers.iter().map(|h| csv_quote(h)).collect();
    out.push_str(&header.join(","));
    out.push('\n');
    for row in &table.rows {
        let line: Vec<String> = (0..table.headers.len())
            .map(|c| {
                let cell = row.get(c).unwrap_or(&Cell::Empty);
                match cell {
                    Cell::Text(s) => csv_quote(s),
                    other => other.text(),
                }
            })
            .collect();
        out.push_str(&line.join(","));
        out.push('\n');
    }
    out
}

fn xml_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c if (c as u32) < 0x20 && c != '\t' && c != '\n' && c != '\r' => {}
            c => out.push(c),
        }
    }
    out
}

/// Spreadsheet column letters: 0 -> A, 25 -> Z, 26 -> AA.
fn column_letters(mut index: usize) -> String {
    let mut letters = Vec::new();
    loop {
        letters.push((b'A' + (index % 26) as u8) as char);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    letters.iter().rev().collect()
}

fn sheet_cell_xml(cell: &Cell, reference: &str) -> String {
    match cell {
        Cell::Empty => String::new(),
        Cell::Number(n) if n.is_finite() => format!(r#"<c r="{reference}"><v>{n}</v></c>"#),
        Cell::Number(_) => String::new(),
        Cell::Text(s) => format!(
            r#"<c r="{reference}" t="inlineStr"><is><t xml:space="preserve">{}</t></is></c>"#,
            xml_escape(s)
        ),
    }
}

fn sheet_xml(table: &Table) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#,
    );
    let header: Vec<Cell> = table.headers.iter().map(|h| Cell::Text(h.clone())).collect();
    for (r, row) in std::iter::once(&header).chain(table.rows.iter()).enumerate() {
        xml.push_str(&format!(r#"<row r="{}">"#, r + 1));
        for (c, cell) in row.iter().enumerate().take(table.headers.len()) {
            let reference = format!("{}{}", column_letters(c), r + 1);
            xml.push_str(&sheet_cell_xml(cell, &reference));
        }
        xml.push_str("</row>");
    }
    xml.push_str("</sheetData></worksheet>");
    xml
}

const CONTENT_TYPES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/></Types>"#;

const ROOT_RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;

const WORKBOOK_RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#;

fn workbook_xml(sheet_name: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="{}" sheetId="1" r:id="rId1"/></sheets></workbook>"#,
        xml_escape(sheet_name)
    )
}

/// Writes a single-sheet workbook into any seekable sink.
pub fn write_xlsx<W: Write + Seek>(sink: W, table: &Table, sheet_name: &str) -> anyhow::Result<W> {
    let mut zip = ZipWriter::new(sink);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);
    let sheet = sheet_xml(table);
    let workbook = workbook_xml(sheet_name);
    let parts: [(&str, &str); 5] = [
        ("[Content_Types].xml", CONTENT_TYPES_XML),
        ("_rels/.rels", ROOT_RELS_XML),
        ("xl/workbook.xml", workbook.as_str()),
        ("xl/_rels/workbook.xml.rels", WORKBOOK_RELS_XML),
        ("xl/worksheets/sheet1.xml", sheet.as_str()),
    ];
    for (name, body) in parts {
        zip.start_file(name, opts)
            .with_context(|| format!("failed to start {name}"))?;
        zip.write_all(body.as_bytes())
            .with_context(|| format!("failed to write {name}"))?;
    }
    zip.finish().context("failed to finalize workbook")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Xlsx,
}

impl ExportFormat {
    pub fn parse(s: &str) -> Option<ExportFormat> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Some(ExportFormat::Csv),
            "xlsx" | "excel" => Some(ExportFormat::Xlsx),
            _ => None,
        }
    }
}

pub fn write_table(path: &Path, table: &Table, format: ExportFormat, sheet_name: &str) -> anyhow::Result<()> {
    let bytes = match format {
        ExportFormat::Csv => to_csv(table).into_bytes(),
        ExportFormat::Xlsx => write_xlsx(std::io::Cursor::new(Vec::new()), table, sheet_name)?.into_inner(),
    };
    write_atomic(path, &bytes)
}
