use chrono::{DateTime, Days, NaiveDate, NaiveDateTime};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::faculty::FacultyResolver;
use crate::ids::IdAllocator;
use crate::model::{clamp_score, now_iso, Actor, Feedback, FeedbackField, Session};
use crate::store::Store;
use crate::tabular::{Cell, Table};

/// Column names chosen for each logical field. Blank names count as unmapped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportMapping {
    pub date: Option<String>,
    pub faculty: Option<String>,
    pub topic: Option<String>,
    pub batch: Option<String>,
    pub duration: Option<String>,
    pub honorarium: Option<String>,
    /// Feedback field key -> column name.
    pub feedback: IndexMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportWarning {
    pub row: usize,
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportOutcome {
    pub imported: usize,
    pub skipped: usize,
    pub total_rows: usize,
    pub created_faculties: Vec<String>,
    pub warnings: Vec<ImportWarning>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportPreview {
    pub headers: Vec<String>,
    pub rows: Vec<Value>,
    pub total_rows: usize,
    pub suggested: ImportMapping,
}

const DATE_ALIASES: [&str; 2] = ["date", "session date"];
const FACULTY_ALIASES: [&str; 4] = ["speaker", "faculty", "faculty name", "speaker name"];
const TOPIC_ALIASES: [&str; 4] = ["topic", "session", "session name", "topic name"];
const BATCH_ALIASES: [&str; 1] = ["batch"];
const DURATION_ALIASES: [&str; 3] = ["duration", "duration (hrs)", "hours"];
const HONORARIUM_ALIASES: [&str; 3] = ["honorarium", "honorarium paid", "amount"];

fn find_alias(headers: &[String], aliases: &[&str]) -> Option<String> {
    headers
        .iter()
        .find(|h| aliases.contains(&h.trim().to_lowercase().as_str()))
        .cloned()
}

fn label_words(field: FeedbackField) -> Vec<String> {
    field
        .import_label()
        .to_lowercase()
        .split(|c: char| c.is_whitespace() || c == '/')
        .filter(|w| w.chars().count() >= 3)
        .map(str::to_string)
        .collect()
}

/// Guesses a mapping from header names.
pub fn suggest_mapping(headers: &[String]) -> ImportMapping {
    let mut feedback = IndexMap::new();
    for field in FeedbackField::ALL {
        let words = label_words(field);
        let hit = headers.iter().find(|h| {
            let lower = h.to_lowercase();
            words.iter().any(|w| lower.contains(w.as_str()))
        });
        if let Some(h) = hit {
            feedback.insert(field.key().to_string(), h.clone());
        }
    }
    ImportMapping {
        date: find_alias(headers, &DATE_ALIASES),
        faculty: find_alias(headers, &FACULTY_ALIASES),
        topic: find_alias(headers, &TOPIC_ALIASES),
        batch: find_alias(headers, &BATCH_ALIASES),
        duration: find_alias(headers, &DURATION_ALIASES),
        honorarium: find_alias(headers, &HONORARIUM_ALIASES),
        feedback,
    }
}

pub fn preview(table: &Table, rows: usize) -> ImportPreview {
    ImportPreview {
        headers: table.headers.clone(),
        rows: table.rows_as_json(rows),
        total_rows: table.rows.len(),
        suggested: suggest_mapping(&table.headers),
    }
}

const DATE_FORMATS: [&str; 12] = [
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%d/%m/%Y",
    "%d-%m-%Y",
    "%d.%m.%Y",
    "%B %d, %Y",
    "%B %d %Y",
    "%d %B %Y",
    "%d %B, %Y",
    "%d-%b-%Y",
    "%Y%m%d",
];

const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Accepts the date spellings that turn up in hand-kept sheets. Ambiguous
/// slash dates read month-first.
pub fn parse_date_best_effort(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Some(d) = DATE_FORMATS
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(s, f).ok())
    {
        return Some(d);
    }
    if let Some(dt) = DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
    {
        return Some(dt.date());
    }
    DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.date_naive())
}

const SERIAL_DATE_MAX: f64 = 2_958_465.0;

/// Spreadsheet day serials count from 1899-12-30.
fn date_from_serial(n: f64) -> Option<NaiveDate> {
    if !n.is_finite() || n < 1.0 || n > SERIAL_DATE_MAX {
        return None;
    }
    NaiveDate::from_ymd_opt(1899, 12, 30)?.checked_add_days(Days::new(n.trunc() as u64))
}

fn cell_date(cell: &Cell) -> Option<NaiveDate> {
    match cell {
        Cell::Number(n) => date_from_serial(*n),
        other => parse_date_best_effort(&other.text()),
    }
}

fn cell_number(cell: &Cell) -> Option<f64> {
    match cell {
        Cell::Empty => None,
        Cell::Number(n) => Some(*n),
        Cell::Text(s) => s.trim().parse::<f64>().ok(),
    }
}

struct Columns {
    date: usize,
    faculty: usize,
    topic: usize,
    batch: Option<usize>,
    duration: Option<usize>,
    honorarium: Option<usize>,
    feedback: Vec<(FeedbackField, usize)>,
}

fn mapped(name: &Option<String>) -> Option<&str> {
    name.as_deref().map(str::trim).filter(|n| !n.is_empty())
}

fn column_of(table: &Table, field: &str, name: &str) -> AppResult<usize> {
    table
        .column(name)
        .or_else(|| table.headers.iter().position(|h| h.trim() == name))
        .ok_or_else(|| {
            AppError::validation(format!("{field} is mapped to unknown column '{name}'"))
        })
}

fn required(table: &Table, field: &str, name: &Option<String>) -> AppResult<usize> {
    let name = mapped(name).ok_or_else(|| {
        AppError::validation("please map at least the date, faculty and topic columns")
    })?;
    column_of(table, field, name)
}

fn optional(table: &Table, field: &str, name: &Option<String>) -> AppResult<Option<usize>> {
    mapped(name).map(|n| column_of(table, field, n)).transpose()
}

fn resolve_columns(table: &Table, mapping: &ImportMapping) -> AppResult<Columns> {
    let mut feedback = Vec::new();
    for (key, column) in &mapping.feedback {
        let field = FeedbackField::from_key(key)
            .ok_or_else(|| AppError::validation(format!("unknown feedback field '{key}'")))?;
        if column.trim().is_empty() {
            continue;
        }
        feedback.push((field, column_of(table, key, column.trim())?));
    }
    Ok(Columns {
        date: required(table, "date", &mapping.date)?,
        faculty: required(table, "faculty", &mapping.faculty)?,
        topic: required(table, "topic", &mapping.topic)?,
        batch: optional(table, "batch", &mapping.batch)?,
        duration: optional(table, "duration", &mapping.duration)?,
        honorarium: optional(table, "honorarium", &mapping.honorarium)?,
        feedback,
    })
}

fn duration_or_default(cell: Option<&Cell>, default: f64) -> f64 {
    cell.and_then(cell_number)
        .filter(|d| d.is_finite() && (0.5..=24.0).contains(d))
        .unwrap_or(default)
}

fn honorarium_or_default(cell: Option<&Cell>, default: f64) -> f64 {
    cell.and_then(cell_number)
        .filter(|h| h.is_finite() && *h >= 0.0)
        .unwrap_or(default)
}

fn read_feedback(table: &Table, row: usize, cols: &[(FeedbackField, usize)]) -> Feedback {
    let mut fb = Feedback::default();
    for &(field, col) in cols {
        let score = cell_number(table.cell(row, col))
            .map(|raw| clamp_score(raw, field))
            .unwrap_or(0.0);
        fb.set(field, score);
    }
    fb
}

/// Turns table rows into sessions. Bad rows are skipped with a warning;
/// everything that parsed is stored in one write at the end.
pub fn import_sessions(
    store: &mut Store,
    cfg: &Config,
    actor: &Actor,
    table: &Table,
    mapping: &ImportMapping,
) -> AppResult<ImportOutcome> {
    let cols = resolve_columns(table, mapping)?;
    let mut resolver = FacultyResolver::load(store)?;
    let mut ids = IdAllocator::load(
        &*store.sessions,
        &*store.counters,
        &cfg.ids.session_prefix,
        cfg.ids.padding,
    )?;
    let mut outcome = ImportOutcome {
        total_rows: table.rows.len(),
        ..ImportOutcome::default()
    };
    let mut sessions: Vec<Session> = Vec::new();

    for idx in 0..table.rows.len() {
        let row_no = idx + 1;
        let skip = |outcome: &mut ImportOutcome, code: &'static str, message: String| {
            warn!(row = row_no, code, "{message}");
            outcome.skipped += 1;
            outcome.warnings.push(ImportWarning {
                row: row_no,
                code,
                message,
            });
        };

        let date_cell = table.cell(idx, cols.date);
        let faculty_cell = table.cell(idx, cols.faculty);
        let topic_cell = table.cell(idx, cols.topic);
        if date_cell.is_blank() || faculty_cell.is_blank() || topic_cell.is_blank() {
            skip(
                &mut outcome,
                "missing_required",
                "date, faculty or topic is blank".to_string(),
            );
            continue;
        }
        let Some(date) = cell_date(date_cell) else {
            skip(
                &mut outcome,
                "bad_date",
                format!("could not read '{}' as a date", date_cell.text()),
            );
            continue;
        };

        let faculty_name = faculty_cell.text();
        if let Err(e) = resolver.resolve(store, &cfg.ids, &faculty_name, &actor.username) {
            skip(&mut outcome, "row_failed", format!("{e:#}"));
            continue;
        }

        let batch = cols
            .batch
            .map(|c| table.cell(idx, c).text())
            .unwrap_or_default();
        let duration = duration_or_default(
            cols.duration.map(|c| table.cell(idx, c)),
            cfg.import.default_duration,
        );
        let honorarium_paid = honorarium_or_default(
            cols.honorarium.map(|c| table.cell(idx, c)),
            cfg.import.default_honorarium,
        );

        sessions.push(Session {
            id: ids.next_id(),
            date,
            duration,
            faculty_name,
            session_name: topic_cell.text(),
            batch,
            honorarium_paid,
            feedback: read_feedback(table, idx, &cols.feedback),
            created_by: actor.username.clone(),
            created_at: now_iso(),
            imported: true,
        });
        outcome.imported += 1;
    }

    store.sessions.put_many(&sessions)?;
    ids.commit(&mut *store.counters)?;
    outcome.created_faculties = resolver.created().to_vec();
    info!(
        imported = outcome.imported,
        skipped = outcome.skipped,
        ids_issued = ids.issued(),
        created_faculties = outcome.created_faculties.len(),
        by = %actor.username,
        "session import finished"
    );
    Ok(outcome)
}
