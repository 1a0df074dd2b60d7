use serde_json::json;

use crate::accounts::{self, AccountEdit, NewAccount};
use crate::ipc::helpers::{
    actor, optional_str, params_as, required_str, respond, to_json, workspace, HandlerResult,
};
use crate::ipc::types::{AppState, Request};

fn handle_register(state: &mut AppState, req: &Request) -> HandlerResult {
    let ws = workspace(state)?;
    let input: NewAccount = params_as(req)?;
    let view = accounts::register(&mut ws.store, &ws.config.accounts, &input)?;
    to_json(&view)
}

fn handle_authenticate(state: &mut AppState, req: &Request) -> HandlerResult {
    let ws = workspace(state)?;
    let username = required_str(req, "username")?;
    let password = req
        .params
        .get("password")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    let view = accounts::authenticate(&ws.store, &username, password)?;
    to_json(&view)
}

fn handle_get(state: &mut AppState, req: &Request) -> HandlerResult {
    let actor = actor(req)?;
    let ws = workspace(state)?;
    let username = optional_str(req, "username").unwrap_or_else(|| actor.username.clone());
    let view = accounts::get(&ws.store, actor, &username)?;
    to_json(&view)
}

fn handle_update_profile(state: &mut AppState, req: &Request) -> HandlerResult {
    let actor = actor(req)?;
    let ws = workspace(state)?;
    let full_name = optional_str(req, "fullName").unwrap_or_default();
    let email = optional_str(req, "email").unwrap_or_default();
    let view = accounts::update_profile(&mut ws.store, actor, &full_name, &email)?;
    to_json(&view)
}

fn str_param<'a>(req: &'a Request, key: &str) -> &'a str {
    req.params.get(key).and_then(|v| v.as_str()).unwrap_or("")
}

fn handle_change_password(state: &mut AppState, req: &Request) -> HandlerResult {
    let actor = actor(req)?;
    let ws = workspace(state)?;
    accounts::change_password(
        &mut ws.store,
        &ws.config.accounts,
        actor,
        str_param(req, "currentPassword"),
        str_param(req, "newPassword"),
        str_param(req, "confirmPassword"),
    )?;
    Ok(json!({ "ok": true }))
}

fn handle_request_reset(state: &mut AppState, req: &Request) -> HandlerResult {
    let ws = workspace(state)?;
    let username = required_str(req, "username")?;
    let email = required_str(req, "email")?;
    let token = accounts::request_reset(
        &ws.store,
        &mut ws.reset_tokens,
        &ws.config.accounts,
        &username,
        &email,
    )?;
    Ok(json!({
        "token": token,
        "expiresInMinutes": ws.config.accounts.reset_token_minutes,
    }))
}

fn handle_reset_password(state: &mut AppState, req: &Request) -> HandlerResult {
    let ws = workspace(state)?;
    let token = required_str(req, "token")?;
    let username = accounts::reset_password(
        &mut ws.store,
        &mut ws.reset_tokens,
        &ws.config.accounts,
        &token,
        str_param(req, "newPassword"),
        str_param(req, "confirmPassword"),
    )?;
    Ok(json!({ "username": username }))
}

fn handle_list(state: &mut AppState, req: &Request) -> HandlerResult {
    let actor = actor(req)?;
    let ws = workspace(state)?;
    let users = accounts::list(&ws.store, actor)?;
    Ok(json!({ "users": to_json(&users)? }))
}

fn handle_create(state: &mut AppState, req: &Request) -> HandlerResult {
    let actor = actor(req)?;
    let ws = workspace(state)?;
    let input: NewAccount = params_as(req)?;
    let view = accounts::admin_create(&mut ws.store, &ws.config.accounts, actor, &input)?;
    to_json(&view)
}

fn handle_update(state: &mut AppState, req: &Request) -> HandlerResult {
    let actor = actor(req)?;
    let ws = workspace(state)?;
    let username = required_str(req, "username")?;
    let edit: AccountEdit = params_as(req)?;
    let view = accounts::admin_update(&mut ws.store, &ws.config.accounts, actor, &username, &edit)?;
    to_json(&view)
}

fn handle_delete(state: &mut AppState, req: &Request) -> HandlerResult {
    let actor = actor(req)?;
    let ws = workspace(state)?;
    let username = required_str(req, "username")?;
    accounts::admin_delete(&mut ws.store, actor, &username)?;
    Ok(json!({ "ok": true, "username": username }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "accounts.register" => handle_register(state, req),
        "accounts.authenticate" => handle_authenticate(state, req),
        "accounts.get" => handle_get(state, req),
        "accounts.updateProfile" => handle_update_profile(state, req),
        "accounts.changePassword" => handle_change_password(state, req),
        "accounts.requestReset" => handle_request_reset(state, req),
        "accounts.resetPassword" => handle_reset_password(state, req),
        "accounts.list" => handle_list(state, req),
        "accounts.create" => handle_create(state, req),
        "accounts.update" => handle_update(state, req),
        "accounts.delete" => handle_delete(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
