use chrono::NaiveDate;
use serde::Deserialize;
use tracing::info;

use crate::config::IdConfig;
use crate::error::{AppError, AppResult};
use crate::ids;
use crate::model::{now_iso, Actor, Feedback, FeedbackField, Session};
use crate::store::Store;

const MIN_DURATION: f64 = 0.5;
const MAX_DURATION: f64 = 24.0;
const MAX_SESSION_NAME_LEN: usize = 200;
const MAX_BATCH_LEN: usize = 100;
const MAX_RECOMMENDATION_LEN: usize = 500;

/// Form payload for recording or editing a session.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SessionInput {
    pub date: String,
    pub duration: f64,
    pub faculty_name: String,
    pub session_name: String,
    pub batch: String,
    pub honorarium_paid: f64,
    pub feedback: Feedback,
}

struct ValidSession {
    date: NaiveDate,
    duration: f64,
    faculty_name: String,
    session_name: String,
    batch: String,
    honorarium_paid: f64,
    feedback: Feedback,
}

fn validate_feedback(fb: &Feedback) -> AppResult<()> {
    for field in FeedbackField::ALL {
        let v = fb.get(field);
        if !v.is_finite() || v < 0.0 || v > field.max() {
            return Err(AppError::validation(format!(
                "feedback.{} must be between 0 and {}",
                field.key(),
                field.max()
            )));
        }
    }
    if fb.recommend_again.chars().count() > MAX_RECOMMENDATION_LEN {
        return Err(AppError::validation(format!(
            "feedback.recommend_again must be at most {MAX_RECOMMENDATION_LEN} characters"
        )));
    }
    Ok(())
}

fn validate(input: &SessionInput) -> AppResult<ValidSession> {
    let faculty_name = input.faculty_name.trim();
    let session_name = input.session_name.trim();
    if input.date.trim().is_empty() || faculty_name.is_empty() || session_name.is_empty() {
        return Err(AppError::validation(
            "please fill all mandatory fields (date, duration, faculty name, session name)",
        ));
    }
    let date = NaiveDate::parse_from_str(input.date.trim(), "%Y-%m-%d")
        .map_err(|_| AppError::validation("date must be YYYY-MM-DD"))?;
    if !input.duration.is_finite() || !(MIN_DURATION..=MAX_DURATION).contains(&input.duration) {
        return Err(AppError::validation(format!(
            "duration must be between {MIN_DURATION} and {MAX_DURATION} hours"
        )));
    }
    if !input.honorarium_paid.is_finite() || input.honorarium_paid < 0.0 {
        return Err(AppError::validation("honorarium_paid must not be negative"));
    }
    if session_name.chars().count() > MAX_SESSION_NAME_LEN {
        return Err(AppError::validation(format!(
            "session_name must be at most {MAX_SESSION_NAME_LEN} characters"
        )));
    }
    if input.batch.chars().count() > MAX_BATCH_LEN {
        return Err(AppError::validation(format!(
            "batch must be at most {MAX_BATCH_LEN} characters"
        )));
    }
    validate_feedback(&input.feedback)?;
    Ok(ValidSession {
        date,
        duration: input.duration,
        faculty_name: faculty_name.to_string(),
        session_name: session_name.to_string(),
        batch: input.batch.trim().to_string(),
        honorarium_paid: input.honorarium_paid,
        feedback: input.feedback.clone(),
    })
}

pub fn visible(store: &Store, actor: &Actor) -> anyhow::Result<Vec<Session>> {
    store.sessions.list_where(&|s: &Session| actor.can_see(&s.created_by))
}

pub fn get_visible(store: &Store, actor: &Actor, id: &str) -> AppResult<Session> {
    store
        .sessions
        .get(id)?
        .filter(|s| actor.can_see(&s.created_by))
        .ok_or_else(|| AppError::not_found(format!("session {id} not found")))
}

pub fn create(
    store: &mut Store,
    ids_cfg: &IdConfig,
    actor: &Actor,
    input: &SessionInput,
) -> AppResult<Session> {
    let v = validate(input)?;
    let id = ids::next_id(
        &*store.sessions,
        &mut *store.counters,
        &ids_cfg.session_prefix,
        ids_cfg.padding,
    )?;
    let s = Session {
        id,
        date: v.date,
        duration: v.duration,
        faculty_name: v.faculty_name,
        session_name: v.session_name,
        batch: v.batch,
        honorarium_paid: v.honorarium_paid,
        feedback: v.feedback,
        created_by: actor.username.clone(),
        created_at: now_iso(),
        imported: false,
    };
    store.sessions.put(&s)?;
    info!(id = %s.id, by = %actor.username, "session created");
    Ok(s)
}

/// Replaces the editable fields; id, owner, creation time and the import
/// marker stay as they were.
pub fn update(store: &mut Store, actor: &Actor, id: &str, input: &SessionInput) -> AppResult<Session> {
    let mut s = get_visible(store, actor, id)?;
    let v = validate(input)?;
    s.date = v.date;
    s.duration = v.duration;
    s.faculty_name = v.faculty_name;
    s.session_name = v.session_name;
    s.batch = v.batch;
    s.honorarium_paid = v.honorarium_paid;
    s.feedback = v.feedback;
    store.sessions.put(&s)?;
    info!(id = %s.id, by = %actor.username, "session updated");
    Ok(s)
}

pub fn delete(store: &mut Store, actor: &Actor, id: &str) -> AppResult<()> {
    get_visible(store, actor, id)?;
    store.sessions.delete(id)?;
    info!(id = %id, by = %actor.username, "session deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn actor(name: &str, admin: bool) -> Actor {
        Actor {
            username: name.to_string(),
            is_admin: admin,
        }
    }

    fn input() -> SessionInput {
        SessionInput {
            date: "2024-04-02".to_string(),
            duration: 1.5,
            faculty_name: "Dr. A".to_string(),
            session_name: "Negotiation".to_string(),
            batch: "PGDM".to_string(),
            honorarium_paid: 1200.0,
            feedback: Feedback::default(),
        }
    }

    #[test]
    fn validation_rules() {
        let mut i = input();
        i.duration = 0.25;
        assert!(validate(&i).is_err());
        let mut i = input();
        i.honorarium_paid = -1.0;
        assert!(validate(&i).is_err());
        let mut i = input();
        i.session_name = "   ".into();
        assert!(validate(&i).is_err());
        let mut i = input();
        i.date = "02/04/2024".into();
        assert!(validate(&i).is_err());
        let mut i = input();
        i.feedback.pace = 3.5;
        let e = validate(&i).err().expect("pace over max");
        assert!(e.to_string().contains("feedback.pace"));
        let mut i = input();
        i.feedback.relevance = 4.0;
        i.feedback.pace = 3.0;
        assert!(validate(&i).is_ok());
    }

    #[test]
    fn crud_respects_ownership() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = Config::default();
        let mut store = Store::open(dir.path(), &cfg).expect("store");
        let alice = actor("alice", false);
        let bob = actor("bob", false);
        let admin = actor("root", true);

        let s = create(&mut store, &cfg.ids, &alice, &input()).expect("create");
        assert_eq!(s.id, "SES0001");
        assert!(!s.imported);

        assert_eq!(get_visible(&store, &bob, &s.id).unwrap_err().code(), "not_found");
        assert_eq!(visible(&store, &admin).expect("visible").len(), 1);

        let mut edit = input();
        edit.session_name = "Negotiation II".into();
        let u = update(&mut store, &admin, &s.id, &edit).expect("update");
        assert_eq!(u.session_name, "Negotiation II");
        assert_eq!(u.created_by, "alice");
        assert_eq!(u.created_at, s.created_at);

        assert!(delete(&mut store, &bob, &s.id).is_err());
        delete(&mut store, &alice, &s.id).expect("delete");
        let again = create(&mut store, &cfg.ids, &alice, &input()).expect("create");
        assert_eq!(again.id, "SES0002");
    }
}
