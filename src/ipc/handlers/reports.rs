use crate::calc;
use crate::faculty;
use crate::ipc::helpers::{actor, respond, to_json, workspace, HandlerResult};
use crate::ipc::types::{AppState, Request};
use crate::sessions;

fn handle_dashboard(state: &mut AppState, req: &Request) -> HandlerResult {
    let actor = actor(req)?;
    let ws = workspace(state)?;
    let faculties = faculty::visible(&ws.store, actor)?;
    let visible = sessions::visible(&ws.store, actor)?;
    to_json(&calc::dashboard(
        &faculties,
        &visible,
        ws.config.reports.recent_sessions_limit,
    ))
}

fn handle_faculty_performance(state: &mut AppState, req: &Request) -> HandlerResult {
    let actor = actor(req)?;
    let ws = workspace(state)?;
    let faculties = faculty::visible(&ws.store, actor)?;
    let visible = sessions::visible(&ws.store, actor)?;
    Ok(serde_json::json!({
        "rows": to_json(&calc::faculty_performance(&faculties, &visible))?
    }))
}

fn handle_session_analytics(state: &mut AppState, req: &Request) -> HandlerResult {
    let actor = actor(req)?;
    let ws = workspace(state)?;
    let visible = sessions::visible(&ws.store, actor)?;
    to_json(&calc::session_analytics(&visible))
}

fn handle_financial_summary(state: &mut AppState, req: &Request) -> HandlerResult {
    let actor = actor(req)?;
    let ws = workspace(state)?;
    let visible = sessions::visible(&ws.store, actor)?;
    to_json(&calc::financial_summary(
        &visible,
        &ws.config.reports.currency_symbol,
    ))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "reports.dashboard" => handle_dashboard(state, req),
        "reports.facultyPerformance" => handle_faculty_performance(state, req),
        "reports.sessionAnalytics" => handle_session_analytics(state, req),
        "reports.financialSummary" => handle_financial_summary(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
