use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::store::Record;

/// Local timestamp in the `YYYY-MM-DDTHH:MM:SS.ffffff` shape the documents use.
pub fn now_iso() -> String {
    chrono::Local::now()
        .naive_local()
        .format("%Y-%m-%dT%H:%M:%S%.6f")
        .to_string()
}

/// Request-scoped identity handed over by the front end.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub username: String,
    #[serde(default)]
    pub is_admin: bool,
}

impl Actor {
    /// Admins see everything; everyone else only what they created.
    pub fn can_see(&self, created_by: &str) -> bool {
        self.is_admin || created_by == self.username
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Account {
    #[serde(default)]
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub created_by: String,
}

impl Record for Account {
    const COLLECTION: &'static str = "users";

    fn key(&self) -> &str {
        &self.username
    }

    fn adopt_key(&mut self, key: &str) {
        if self.username.is_empty() {
            self.username = key.to_string();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
    #[default]
    Other,
}

impl Gender {
    pub fn parse(s: &str) -> Option<Gender> {
        match s.trim().to_ascii_lowercase().as_str() {
            "male" => Some(Gender::Male),
            "female" => Some(Gender::Female),
            "other" => Some(Gender::Other),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Gender::Male => "Male",
            Gender::Female => "Female",
            Gender::Other => "Other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Faculty {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub gender: Gender,
    #[serde(default)]
    pub email: String,
    #[serde(default = "default_designation")]
    pub designation: String,
    #[serde(default)]
    pub batch: String,
    #[serde(default)]
    pub biodata: String,
    #[serde(default)]
    pub created_by: String,
    #[serde(default)]
    pub created_at: String,
}

fn default_designation() -> String {
    "Faculty".to_string()
}

impl Record for Faculty {
    const COLLECTION: &'static str = "faculties";

    fn key(&self) -> &str {
        &self.id
    }

    fn adopt_key(&mut self, key: &str) {
        if self.id.is_empty() {
            self.id = key.to_string();
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    #[serde(default)]
    pub id: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub faculty_name: String,
    #[serde(default)]
    pub session_name: String,
    #[serde(default)]
    pub batch: String,
    #[serde(default)]
    pub honorarium_paid: f64,
    #[serde(default)]
    pub feedback: Feedback,
    #[serde(default)]
    pub created_by: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub imported: bool,
}

impl Record for Session {
    const COLLECTION: &'static str = "sessions";

    fn key(&self) -> &str {
        &self.id
    }

    fn adopt_key(&mut self, key: &str) {
        if self.id.is_empty() {
            self.id = key.to_string();
        }
    }
}

/// The eleven scored feedback questions, in form order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedbackField {
    Relevance,
    Knowledge,
    PracticalLinking,
    Coverage,
    PresentationStyle,
    Audibility,
    Interaction,
    Response,
    TeachingAids,
    Pace,
    OverallPerformance,
}

impl FeedbackField {
    pub const ALL: [FeedbackField; 11] = [
        FeedbackField::Relevance,
        FeedbackField::Knowledge,
        FeedbackField::PracticalLinking,
        FeedbackField::Coverage,
        FeedbackField::PresentationStyle,
        FeedbackField::Audibility,
        FeedbackField::Interaction,
        FeedbackField::Response,
        FeedbackField::TeachingAids,
        FeedbackField::Pace,
        FeedbackField::OverallPerformance,
    ];

    pub fn key(self) -> &'static str {
        match self {
            FeedbackField::Relevance => "relevance",
            FeedbackField::Knowledge => "knowledge",
            FeedbackField::PracticalLinking => "practical_linking",
            FeedbackField::Coverage => "coverage",
            FeedbackField::PresentationStyle => "presentation_style",
            FeedbackField::Audibility => "audibility",
            FeedbackField::Interaction => "interaction",
            FeedbackField::Response => "response",
            FeedbackField::TeachingAids => "teaching_aids",
            FeedbackField::Pace => "pace",
            FeedbackField::OverallPerformance => "overall_performance",
        }
    }

    pub fn from_key(key: &str) -> Option<FeedbackField> {
        Self::ALL.into_iter().find(|f| f.key() == key)
    }

    pub fn max(self) -> f64 {
        match self {
            FeedbackField::Relevance => 4.0,
            FeedbackField::Pace => 3.0,
            _ => 5.0,
        }
    }

    /// Column title used in exports.
    pub fn column(self) -> &'static str {
        match self {
            FeedbackField::Relevance => "Relevance",
            FeedbackField::Knowledge => "Knowledge",
            FeedbackField::PracticalLinking => "Practical Linking",
            FeedbackField::Coverage => "Coverage",
            FeedbackField::PresentationStyle => "Presentation Style",
            FeedbackField::Audibility => "Audibility",
            FeedbackField::Interaction => "Interaction",
            FeedbackField::Response => "Response",
            FeedbackField::TeachingAids => "Teaching Aids",
            FeedbackField::Pace => "Pace",
            FeedbackField::OverallPerformance => "Overall Performance",
        }
    }

    /// Header words that identify the field in an imported sheet.
    pub fn import_label(self) -> &'static str {
        match self {
            FeedbackField::Relevance => "Relevance",
            FeedbackField::Knowledge => "Clarity/Knowledge",
            FeedbackField::PracticalLinking => "Practical Linking",
            FeedbackField::Coverage => "Coverage",
            FeedbackField::PresentationStyle => "Presentation Style",
            FeedbackField::Audibility => "Audibility",
            FeedbackField::Interaction => "Interaction/Discussion",
            FeedbackField::Response => "Response to Questions",
            FeedbackField::TeachingAids => "Teaching Aids",
            FeedbackField::Pace => "Pace/Speed",
            FeedbackField::OverallPerformance => "Overall Performance",
        }
    }

    pub fn question(self) -> &'static str {
        match self {
            FeedbackField::Relevance => "Relevance of topic to work situation",
            FeedbackField::Knowledge => "Knowledge of speaker (clarity of concepts)",
            FeedbackField::PracticalLinking => "Ability to link classroom with real work",
            FeedbackField::Coverage => "Comprehensive coverage of topics",
            FeedbackField::PresentationStyle => "Structuring and style of presentation",
            FeedbackField::Audibility => "Audibility and expression while speaking",
            FeedbackField::Interaction => "Interaction with audience",
            FeedbackField::Response => "Response to questions and comments",
            FeedbackField::TeachingAids => "Use of examples, teaching aids, case studies",
            FeedbackField::Pace => "Pace (speed) of presentation",
            FeedbackField::OverallPerformance => "Overall Performance",
        }
    }
}

/// Sum of every field maximum.
pub const FEEDBACK_TOTAL_MAX: f64 = 52.0;

/// Stored scores use `0` for "not answered"; `score` turns that into `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Feedback {
    pub relevance: f64,
    pub knowledge: f64,
    pub practical_linking: f64,
    pub coverage: f64,
    pub presentation_style: f64,
    pub audibility: f64,
    pub interaction: f64,
    pub response: f64,
    pub teaching_aids: f64,
    pub pace: f64,
    pub overall_performance: f64,
    pub recommend_again: String,
}

impl Feedback {
    pub fn get(&self, field: FeedbackField) -> f64 {
        match field {
            FeedbackField::Relevance => self.relevance,
            FeedbackField::Knowledge => self.knowledge,
            FeedbackField::PracticalLinking => self.practical_linking,
            FeedbackField::Coverage => self.coverage,
            FeedbackField::PresentationStyle => self.presentation_style,
            FeedbackField::Audibility => self.audibility,
            FeedbackField::Interaction => self.interaction,
            FeedbackField::Response => self.response,
            FeedbackField::TeachingAids => self.teaching_aids,
            FeedbackField::Pace => self.pace,
            FeedbackField::OverallPerformance => self.overall_performance,
        }
    }

    pub fn set(&mut self, field: FeedbackField, value: f64) {
        let slot = match field {
            FeedbackField::Relevance => &mut self.relevance,
            FeedbackField::Knowledge => &mut self.knowledge,
            FeedbackField::PracticalLinking => &mut self.practical_linking,
            FeedbackField::Coverage => &mut self.coverage,
            FeedbackField::PresentationStyle => &mut self.presentation_style,
            FeedbackField::Audibility => &mut self.audibility,
            FeedbackField::Interaction => &mut self.interaction,
            FeedbackField::Response => &mut self.response,
            FeedbackField::TeachingAids => &mut self.teaching_aids,
            FeedbackField::Pace => &mut self.pace,
            FeedbackField::OverallPerformance => &mut self.overall_performance,
        };
        *slot = value;
    }

    pub fn score(&self, field: FeedbackField) -> Option<f64> {
        let v = self.get(field);
        (v.is_finite() && v > 0.0).then_some(v)
    }

    /// All answered scores, in field order.
    pub fn scores(&self) -> impl Iterator<Item = f64> + '_ {
        FeedbackField::ALL.into_iter().filter_map(|f| self.score(f))
    }

    /// Mean of the answered scores; `None` when nothing was answered.
    pub fn average(&self) -> Option<f64> {
        let (sum, n) = self.scores().fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
        (n > 0).then(|| sum / n as f64)
    }

    pub fn total_obtained(&self) -> f64 {
        FeedbackField::ALL
            .into_iter()
            .map(|f| self.get(f))
            .filter(|v| v.is_finite())
            .sum()
    }
}

/// Clamps a raw score into `[0, field max]` at two decimals.
pub fn clamp_score(raw: f64, field: FeedbackField) -> f64 {
    if !raw.is_finite() {
        return 0.0;
    }
    let clamped = raw.clamp(0.0, field.max());
    (clamped * 100.0).round() / 100.0
}
