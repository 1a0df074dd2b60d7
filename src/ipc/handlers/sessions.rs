use serde_json::json;

use crate::calc;
use crate::ipc::helpers::{
    actor, params_as, required_str, respond, to_json, workspace, HandlerErr, HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::sessions::{self, SessionInput};

fn handle_list(state: &mut AppState, req: &Request) -> HandlerResult {
    let actor = actor(req)?;
    let ws = workspace(state)?;
    let mut list = sessions::visible(&ws.store, actor)?;
    calc::sort_by_date_desc(&mut list);
    Ok(json!({ "sessions": to_json(&list)? }))
}

fn handle_get(state: &mut AppState, req: &Request) -> HandlerResult {
    let actor = actor(req)?;
    let ws = workspace(state)?;
    let id = required_str(req, "id")?;
    let s = sessions::get_visible(&ws.store, actor, &id)?;
    let score = calc::session_score(&s);
    Ok(json!({ "session": to_json(&s)?, "score": to_json(&score)? }))
}

fn handle_create(state: &mut AppState, req: &Request) -> HandlerResult {
    let actor = actor(req)?;
    let ws = workspace(state)?;
    let input: SessionInput = params_as(req)?;
    let s = sessions::create(&mut ws.store, &ws.config.ids, actor, &input)?;
    to_json(&s)
}

fn handle_update(state: &mut AppState, req: &Request) -> HandlerResult {
    let actor = actor(req)?;
    let ws = workspace(state)?;
    let id = required_str(req, "id")?;
    let input: SessionInput = params_as(req)?;
    let s = sessions::update(&mut ws.store, actor, &id, &input)?;
    to_json(&s)
}

fn handle_delete(state: &mut AppState, req: &Request) -> HandlerResult {
    let actor = actor(req)?;
    let ws = workspace(state)?;
    let id = required_str(req, "id")?;
    sessions::delete(&mut ws.store, actor, &id)?;
    Ok(json!({ "ok": true, "id": id }))
}

fn handle_filter(state: &mut AppState, req: &Request) -> HandlerResult {
    let actor = actor(req)?;
    let ws = workspace(state)?;
    let filter = calc::parse_session_filter(req.params.get("filters"))?;
    let visible = sessions::visible(&ws.store, actor)?;
    let matched = calc::apply_filters(&visible, &filter);
    let summary = calc::summarize(&matched);
    Ok(json!({
        "sessions": to_json(&matched)?,
        "summary": to_json(&summary)?,
    }))
}

fn int_param(req: &Request, key: &str) -> Result<i64, HandlerErr> {
    req.params
        .get(key)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {key}")))
}

fn handle_calendar(state: &mut AppState, req: &Request) -> HandlerResult {
    let actor = actor(req)?;
    let ws = workspace(state)?;
    let year = i32::try_from(int_param(req, "year")?)
        .map_err(|_| HandlerErr::bad_params("year out of range"))?;
    let month = u32::try_from(int_param(req, "month")?)
        .map_err(|_| HandlerErr::bad_params("month out of range"))?;
    let visible = sessions::visible(&ws.store, actor)?;
    to_json(&calc::calendar_month(&visible, year, month)?)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "sessions.list" => handle_list(state, req),
        "sessions.get" => handle_get(state, req),
        "sessions.create" => handle_create(state, req),
        "sessions.update" => handle_update(state, req),
        "sessions.delete" => handle_delete(state, req),
        "sessions.filter" => handle_filter(state, req),
        "sessions.calendar" => handle_calendar(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
