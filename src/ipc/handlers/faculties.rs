use serde_json::json;

use crate::calc;
use crate::faculty::{self, FacultyInput};
use crate::ipc::helpers::{
    actor, optional_str, params_as, required_str, respond, to_json, workspace, HandlerErr,
    HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::sessions;

fn handle_list(state: &mut AppState, req: &Request) -> HandlerResult {
    let actor = actor(req)?;
    let ws = workspace(state)?;
    let faculties = faculty::visible(&ws.store, actor)?;
    Ok(json!({ "faculties": to_json(&faculties)? }))
}

fn handle_get(state: &mut AppState, req: &Request) -> HandlerResult {
    let actor = actor(req)?;
    let ws = workspace(state)?;
    let id = required_str(req, "id")?;
    let f = faculty::get_visible(&ws.store, actor, &id)?;
    to_json(&f)
}

fn handle_create(state: &mut AppState, req: &Request) -> HandlerResult {
    let actor = actor(req)?;
    let ws = workspace(state)?;
    let input: FacultyInput = params_as(req)?;
    let f = faculty::create(&mut ws.store, &ws.config.ids, actor, &input)?;
    to_json(&f)
}

fn handle_update(state: &mut AppState, req: &Request) -> HandlerResult {
    let actor = actor(req)?;
    let ws = workspace(state)?;
    let id = required_str(req, "id")?;
    let input: FacultyInput = params_as(req)?;
    let f = faculty::update(&mut ws.store, actor, &id, &input)?;
    to_json(&f)
}

fn handle_delete(state: &mut AppState, req: &Request) -> HandlerResult {
    let actor = actor(req)?;
    let ws = workspace(state)?;
    let id = required_str(req, "id")?;
    faculty::delete(&mut ws.store, actor, &id)?;
    Ok(json!({ "ok": true, "id": id }))
}

fn handle_search(state: &mut AppState, req: &Request) -> HandlerResult {
    let actor = actor(req)?;
    let ws = workspace(state)?;
    let term = optional_str(req, "term").unwrap_or_default();
    let found = faculty::search(faculty::visible(&ws.store, actor)?, &term);
    Ok(json!({ "faculties": to_json(&found)? }))
}

/// Sessions delivered by one faculty, addressed by `id` or by `name`.
fn handle_sessions(state: &mut AppState, req: &Request) -> HandlerResult {
    let actor = actor(req)?;
    let ws = workspace(state)?;
    let name = match (optional_str(req, "id"), optional_str(req, "name")) {
        (Some(id), _) => faculty::get_visible(&ws.store, actor, &id)?.name,
        (None, Some(name)) => name,
        (None, None) => return Err(HandlerErr::bad_params("missing id or name")),
    };
    let visible = sessions::visible(&ws.store, actor)?;
    to_json(&calc::faculty_sessions(&visible, &name))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "faculties.list" => handle_list(state, req),
        "faculties.get" => handle_get(state, req),
        "faculties.create" => handle_create(state, req),
        "faculties.update" => handle_update(state, req),
        "faculties.delete" => handle_delete(state, req),
        "faculties.search" => handle_search(state, req),
        "faculties.sessions" => handle_sessions(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
