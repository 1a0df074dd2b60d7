use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::{AppError, AppResult};
use crate::model::{Faculty, FeedbackField, Session, FEEDBACK_TOTAL_MAX};

/// Honorarium ceilings at or above this value mean "no upper bound".
pub const HONORARIUM_CEILING: f64 = 100_000.0;

pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Resolved filter: every `None` criterion passes everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionFilter {
    pub date_range: Option<(NaiveDate, NaiveDate)>,
    pub faculty: Option<String>,
    /// Lowercased substring.
    pub batch: Option<String>,
    pub min_honorarium: Option<f64>,
    pub max_honorarium: Option<f64>,
    pub min_feedback: Option<f64>,
}

impl SessionFilter {
    pub fn matches(&self, s: &Session) -> bool {
        if let Some((from, to)) = self.date_range {
            if s.date < from || s.date > to {
                return false;
            }
        }
        if let Some(name) = &self.faculty {
            if &s.faculty_name != name {
                return false;
            }
        }
        if let Some(batch) = &self.batch {
            if !s.batch.to_lowercase().contains(batch.as_str()) {
                return false;
            }
        }
        if let Some(min) = self.min_honorarium {
            if s.honorarium_paid < min {
                return false;
            }
        }
        if let Some(max) = self.max_honorarium {
            if s.honorarium_paid > max {
                return false;
            }
        }
        if let Some(min) = self.min_feedback {
            match s.feedback.average() {
                Some(avg) if avg >= min => {}
                _ => return false,
            }
        }
        true
    }
}

fn opt_str<'a>(obj: &'a serde_json::Map<String, Value>, key: &str) -> AppResult<Option<&'a str>> {
    match obj.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => v
            .as_str()
            .map(Some)
            .ok_or_else(|| AppError::validation(format!("filters.{key} must be a string or null"))),
    }
}

fn opt_f64(obj: &serde_json::Map<String, Value>, key: &str) -> AppResult<Option<f64>> {
    match obj.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => v
            .as_f64()
            .map(Some)
            .ok_or_else(|| AppError::validation(format!("filters.{key} must be a number or null"))),
    }
}

fn opt_date(obj: &serde_json::Map<String, Value>, key: &str) -> AppResult<Option<NaiveDate>> {
    let Some(s) = opt_str(obj, key)? else {
        return Ok(None);
    };
    let t = s.trim();
    if t.is_empty() {
        return Ok(None);
    }
    NaiveDate::parse_from_str(t, "%Y-%m-%d")
        .map(Some)
        .map_err(|_| AppError::validation(format!("filters.{key} must be YYYY-MM-DD")))
}

fn all_or_value(s: Option<&str>) -> Option<String> {
    let t = s?.trim();
    if t.is_empty() || t.eq_ignore_ascii_case("ALL") {
        None
    } else {
        Some(t.to_string())
    }
}

/// Reads the filter form. Minimums at or below zero, a ceiling at or above
/// `HONORARIUM_CEILING`, `"All"` and a half-open date range all mean
/// "no filter" for their criterion.
pub fn parse_session_filter(raw: Option<&Value>) -> AppResult<SessionFilter> {
    let Some(raw) = raw else {
        return Ok(SessionFilter::default());
    };
    if raw.is_null() {
        return Ok(SessionFilter::default());
    }
    let Some(obj) = raw.as_object() else {
        return Err(AppError::validation("filters must be an object"));
    };

    let date_range = match (opt_date(obj, "startDate")?, opt_date(obj, "endDate")?) {
        (Some(from), Some(to)) => Some((from, to)),
        _ => None,
    };
    let faculty = all_or_value(opt_str(obj, "faculty")?);
    let batch = all_or_value(opt_str(obj, "batch")?).map(|b| b.to_lowercase());
    let min_honorarium = opt_f64(obj, "minHonorarium")?.filter(|v| *v > 0.0);
    let max_honorarium = opt_f64(obj, "maxHonorarium")?.filter(|v| *v < HONORARIUM_CEILING);
    let min_feedback = opt_f64(obj, "minFeedback")?.filter(|v| *v > 0.0);

    Ok(SessionFilter {
        date_range,
        faculty,
        batch,
        min_honorarium,
        max_honorarium,
        min_feedback,
    })
}

/// Matching sessions in input order.
pub fn apply_filters(sessions: &[Session], filter: &SessionFilter) -> Vec<Session> {
    sessions.iter().filter(|s| filter.matches(s)).cloned().collect()
}

/// Mean over every answered score of every session, not a mean of means.
pub fn pooled_feedback_average(sessions: &[Session]) -> Option<f64> {
    let (sum, n) = sessions
        .iter()
        .flat_map(|s| s.feedback.scores())
        .fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

/// Mean of the answered `overall_performance` scores.
pub fn overall_performance_average(sessions: &[&Session]) -> Option<f64> {
    let (sum, n) = sessions
        .iter()
        .filter_map(|s| s.feedback.score(FeedbackField::OverallPerformance))
        .fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterSummary {
    pub session_count: usize,
    pub total_honorarium: f64,
    pub average_honorarium: f64,
    pub total_duration: f64,
    pub average_feedback: Option<f64>,
}

pub fn summarize(sessions: &[Session]) -> FilterSummary {
    let total_honorarium: f64 = sessions.iter().map(|s| s.honorarium_paid).sum();
    let total_duration: f64 = sessions.iter().map(|s| s.duration).sum();
    let average_honorarium = if sessions.is_empty() {
        0.0
    } else {
        total_honorarium / sessions.len() as f64
    };
    FilterSummary {
        session_count: sessions.len(),
        total_honorarium,
        average_honorarium,
        total_duration,
        average_feedback: pooled_feedback_average(sessions),
    }
}

/// Newest first; sessions on the same day keep their stored order.
pub fn sort_by_date_desc(sessions: &mut [Session]) {
    sessions.sort_by(|a, b| b.date.cmp(&a.date));
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub faculty_count: usize,
    pub session_count: usize,
    pub total_honorarium: f64,
    pub average_overall_performance: Option<f64>,
    pub recent_sessions: Vec<Session>,
}

pub fn dashboard(faculties: &[Faculty], sessions: &[Session], recent_limit: usize) -> Dashboard {
    let mut recent = sessions.to_vec();
    sort_by_date_desc(&mut recent);
    recent.truncate(recent_limit);
    let refs: Vec<&Session> = sessions.iter().collect();
    Dashboard {
        faculty_count: faculties.len(),
        session_count: sessions.len(),
        total_honorarium: sessions.iter().map(|s| s.honorarium_paid).sum(),
        average_overall_performance: overall_performance_average(&refs),
        recent_sessions: recent,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FacultyPerformance {
    pub faculty_name: String,
    pub total_sessions: usize,
    pub total_duration: f64,
    pub total_honorarium: f64,
    pub avg_feedback_score: Option<f64>,
    pub email: String,
}

/// One row per faculty name that has at least one session. Faculties
/// sharing a name collapse into the first one.
pub fn faculty_performance(faculties: &[Faculty], sessions: &[Session]) -> Vec<FacultyPerformance> {
    let mut rows: Vec<FacultyPerformance> = Vec::new();
    for f in faculties {
        if rows.iter().any(|r| r.faculty_name == f.name) {
            continue;
        }
        let theirs: Vec<&Session> = sessions.iter().filter(|s| s.faculty_name == f.name).collect();
        if theirs.is_empty() {
            continue;
        }
        rows.push(FacultyPerformance {
            faculty_name: f.name.clone(),
            total_sessions: theirs.len(),
            total_duration: theirs.iter().map(|s| s.duration).sum(),
            total_honorarium: theirs.iter().map(|s| s.honorarium_paid).sum(),
            avg_feedback_score: overall_performance_average(&theirs).map(round2),
            email: f.email.clone(),
        });
    }
    rows
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthCount {
    pub month: String,
    pub sessions: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchCount {
    pub batch: String,
    pub sessions: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionAnalytics {
    pub per_month: Vec<MonthCount>,
    pub by_batch: Vec<BatchCount>,
}

fn month_key(d: NaiveDate) -> String {
    d.format("%Y-%m").to_string()
}

pub fn session_analytics(sessions: &[Session]) -> SessionAnalytics {
    let mut months: BTreeMap<String, usize> = BTreeMap::new();
    let mut batches: Vec<BatchCount> = Vec::new();
    for s in sessions {
        *months.entry(month_key(s.date)).or_default() += 1;
        if s.batch.is_empty() {
            continue;
        }
        match batches.iter_mut().find(|b| b.batch == s.batch) {
            Some(b) => b.sessions += 1,
            None => batches.push(BatchCount {
                batch: s.batch.clone(),
                sessions: 1,
            }),
        }
    }
    SessionAnalytics {
        per_month: months
            .into_iter()
            .map(|(month, sessions)| MonthCount { month, sessions })
            .collect(),
        by_batch: batches,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthAmount {
    pub month: String,
    pub honorarium: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancialSummary {
    pub total_honorarium: f64,
    pub average_per_session: f64,
    pub session_count: usize,
    pub currency_symbol: String,
    pub monthly: Vec<MonthAmount>,
}

pub fn financial_summary(sessions: &[Session], currency_symbol: &str) -> FinancialSummary {
    let mut monthly: BTreeMap<String, f64> = BTreeMap::new();
    for s in sessions {
        *monthly.entry(month_key(s.date)).or_default() += s.honorarium_paid;
    }
    let totals = summarize(sessions);
    FinancialSummary {
        total_honorarium: totals.total_honorarium,
        average_per_session: totals.average_honorarium,
        session_count: totals.session_count,
        currency_symbol: currency_symbol.to_string(),
        monthly: monthly
            .into_iter()
            .map(|(month, honorarium)| MonthAmount { month, honorarium })
            .collect(),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CalendarDay {
    pub day: u32,
    pub sessions: Vec<Session>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarMonth {
    pub year: i32,
    pub month: u32,
    pub title: String,
    /// Monday-first weeks; `0` pads days outside the month.
    pub weeks: Vec<[u32; 7]>,
    pub days: Vec<CalendarDay>,
}

fn days_in_month(first: NaiveDate) -> u32 {
    let (y, m) = if first.month() == 12 {
        (first.year() + 1, 1)
    } else {
        (first.year(), first.month() + 1)
    };
    NaiveDate::from_ymd_opt(y, m, 1)
        .map(|next| (next - first).num_days() as u32)
        .unwrap_or(31)
}

pub fn calendar_month(sessions: &[Session], year: i32, month: u32) -> AppResult<CalendarMonth> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| AppError::validation(format!("{year}-{month} is not a calendar month")))?;
    let len = days_in_month(first);
    let lead = first.weekday().num_days_from_monday() as usize;

    let mut weeks: Vec<[u32; 7]> = Vec::new();
    let mut week = [0u32; 7];
    let mut slot = lead;
    for day in 1..=len {
        week[slot] = day;
        slot += 1;
        if slot == 7 {
            weeks.push(week);
            week = [0u32; 7];
            slot = 0;
        }
    }
    if slot > 0 {
        weeks.push(week);
    }

    let mut by_day: BTreeMap<u32, Vec<Session>> = BTreeMap::new();
    for s in sessions {
        if s.date.year() == year && s.date.month() == month {
            by_day.entry(s.date.day()).or_default().push(s.clone());
        }
    }

    Ok(CalendarMonth {
        year,
        month,
        title: first.format("%B %Y").to_string(),
        weeks,
        days: by_day
            .into_iter()
            .map(|(day, sessions)| CalendarDay { day, sessions })
            .collect(),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionScore {
    pub total_obtained: f64,
    pub total_max: f64,
    pub percentage: f64,
    pub average: Option<f64>,
    pub questions: Vec<QuestionScore>,
}

/// One line of the feedback sheet; `score` is `None` when unanswered.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionScore {
    pub field: &'static str,
    pub question: &'static str,
    pub score: Option<f64>,
    pub max: f64,
}

pub fn session_score(s: &Session) -> SessionScore {
    let total = s.feedback.total_obtained();
    SessionScore {
        total_obtained: round2(total),
        total_max: FEEDBACK_TOTAL_MAX,
        percentage: (total / FEEDBACK_TOTAL_MAX * 1000.0).round() / 10.0,
        average: s.feedback.average().map(round2),
        questions: FeedbackField::ALL
            .iter()
            .map(|f| QuestionScore {
                field: f.key(),
                question: f.question(),
                score: s.feedback.score(*f),
                max: f.max(),
            })
            .collect(),
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FacultySessions {
    pub faculty_name: String,
    pub session_count: usize,
    pub total_honorarium: f64,
    pub sessions: Vec<Session>,
}

pub fn faculty_sessions(sessions: &[Session], faculty_name: &str) -> FacultySessions {
    let mut theirs: Vec<Session> = sessions
        .iter()
        .filter(|s| s.faculty_name == faculty_name)
        .cloned()
        .collect();
    sort_by_date_desc(&mut theirs);
    FacultySessions {
        faculty_name: faculty_name.to_string(),
        session_count: theirs.len(),
        total_honorarium: theirs.iter().map(|s| s.honorarium_paid).sum(),
        sessions: theirs,
    }
}
