use crate::accounts::AccountView;
use crate::calc::{self, FacultyPerformance};
use crate::model::{Faculty, FeedbackField, Session};
use crate::tabular::{Cell, Table};

/// Every exportable table, keyed by the name callers use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    Faculties,
    Sessions,
    FilteredSessions,
    FacultySessions,
    FacultyPerformance,
    Users,
}

impl ExportKind {
    pub fn parse(s: &str) -> Option<ExportKind> {
        match s {
            "faculties" => Some(ExportKind::Faculties),
            "sessions" => Some(ExportKind::Sessions),
            "filteredSessions" => Some(ExportKind::FilteredSessions),
            "facultySessions" => Some(ExportKind::FacultySessions),
            "facultyPerformance" => Some(ExportKind::FacultyPerformance),
            "users" => Some(ExportKind::Users),
            _ => None,
        }
    }

    pub fn sheet_name(self) -> &'static str {
        match self {
            ExportKind::Faculties => "Faculties",
            ExportKind::Sessions => "Sessions",
            ExportKind::FilteredSessions => "Filtered Sessions",
            ExportKind::FacultySessions => "Faculty Sessions",
            ExportKind::FacultyPerformance => "Faculty Performance",
            ExportKind::Users => "Users",
        }
    }
}

fn date_cell(s: &Session) -> Cell {
    Cell::Text(s.date.format("%Y-%m-%d").to_string())
}

pub fn faculties_table(faculties: &[Faculty]) -> Table {
    let mut t = Table::new(&[
        "ID",
        "Name",
        "Gender",
        "Email",
        "Designation",
        "Batch",
        "Biodata",
        "Created By",
        "Created At",
    ]);
    for f in faculties {
        t.push(vec![
            f.id.as_str().into(),
            f.name.as_str().into(),
            f.gender.as_str().into(),
            f.email.as_str().into(),
            f.designation.as_str().into(),
            f.batch.as_str().into(),
            f.biodata.as_str().into(),
            f.created_by.as_str().into(),
            f.created_at.as_str().into(),
        ]);
    }
    t
}

pub fn sessions_table(sessions: &[Session]) -> Table {
    let mut headers: Vec<&str> = vec![
        "ID",
        "Date",
        "Session Name",
        "Faculty",
        "Batch",
        "Duration (hrs)",
        "Honorarium",
    ];
    headers.extend(FeedbackField::ALL.iter().map(|f| f.column()));
    headers.extend(["Recommendation", "Created By", "Created At"]);
    let mut t = Table::new(&headers);
    for s in sessions {
        let mut row: Vec<Cell> = vec![
            s.id.as_str().into(),
            date_cell(s),
            s.session_name.as_str().into(),
            s.faculty_name.as_str().into(),
            s.batch.as_str().into(),
            s.duration.into(),
            s.honorarium_paid.into(),
        ];
        row.extend(FeedbackField::ALL.iter().map(|f| Cell::Number(s.feedback.get(*f))));
        row.push(s.feedback.recommend_again.as_str().into());
        row.push(s.created_by.as_str().into());
        row.push(s.created_at.as_str().into());
        t.push(row);
    }
    t
}

/// Filter results, newest first, with each session's mean answered score.
pub fn filtered_sessions_table(sessions: &[Session]) -> Table {
    let mut ordered = sessions.to_vec();
    calc::sort_by_date_desc(&mut ordered);
    let mut t = Table::new(&[
        "ID",
        "Date",
        "Session Name",
        "Faculty",
        "Batch",
        "Duration (hrs)",
        "Honorarium",
        "Avg Feedback",
    ]);
    for s in &ordered {
        t.push(vec![
            s.id.as_str().into(),
            date_cell(s),
            s.session_name.as_str().into(),
            s.faculty_name.as_str().into(),
            s.batch.as_str().into(),
            s.duration.into(),
            s.honorarium_paid.into(),
            calc::round2(s.feedback.average().unwrap_or(0.0)).into(),
        ]);
    }
    t
}

pub fn faculty_sessions_table(sessions: &[Session], faculty_name: &str) -> Table {
    let model = calc::faculty_sessions(sessions, faculty_name);
    let mut t = Table::new(&[
        "Session ID",
        "Date",
        "Session Name",
        "Batch",
        "Duration (hrs)",
        "Honorarium",
    ]);
    for s in &model.sessions {
        t.push(vec![
            s.id.as_str().into(),
            date_cell(s),
            s.session_name.as_str().into(),
            s.batch.as_str().into(),
            s.duration.into(),
            s.honorarium_paid.into(),
        ]);
    }
    t
}

pub fn faculty_performance_table(rows: &[FacultyPerformance]) -> Table {
    let mut t = Table::new(&[
        "Faculty Name",
        "Total Sessions",
        "Total Duration (hrs)",
        "Total Honorarium",
        "Avg Feedback Score",
        "Email",
    ]);
    for r in rows {
        t.push(vec![
            r.faculty_name.as_str().into(),
            r.total_sessions.into(),
            ((r.total_duration * 10.0).round() / 10.0).into(),
            r.total_honorarium.into(),
            r.avg_feedback_score.unwrap_or(0.0).into(),
            r.email.as_str().into(),
        ]);
    }
    t
}

pub fn users_table(users: &[AccountView]) -> Table {
    let mut t = Table::new(&["Username", "Full Name", "Email", "Role", "Created At"]);
    for u in users {
        let created: String = u.created_at.chars().take(10).collect();
        t.push(vec![
            u.username.as_str().into(),
            u.full_name.as_str().into(),
            u.email.as_str().into(),
            if u.is_admin { "Admin" } else { "User" }.into(),
            created.into(),
        ]);
    }
    t
}
