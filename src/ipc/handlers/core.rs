use serde_json::json;
use std::path::PathBuf;
use tracing::info;

use crate::accounts::{self, ResetTokens};
use crate::config::Config;
use crate::ipc::helpers::{required_str, respond, HandlerErr, HandlerResult};
use crate::ipc::types::{AppState, Request, Workspace};
use crate::store::Store;

fn handle_health(state: &mut AppState, _req: &Request) -> HandlerResult {
    Ok(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "workspacePath": state
            .workspace
            .as_ref()
            .map(|w| w.path.to_string_lossy().to_string()),
    }))
}

/// Opens (or reopens) the workspace at `path`. Used by `workspace.select`
/// and again after a backup restore.
pub fn open_workspace(path: PathBuf) -> Result<(Workspace, bool), HandlerErr> {
    std::fs::create_dir_all(&path).map_err(|e| {
        HandlerErr::new("io_failed", format!("failed to create workspace: {e}"))
            .with_details(json!({ "path": path.to_string_lossy() }))
    })?;
    let config = Config::load(&path).map_err(|e| {
        HandlerErr::new("config_invalid", format!("{e:#}"))
            .with_details(json!({ "path": path.to_string_lossy() }))
    })?;
    let mut store = Store::open(&path, &config)?;
    let seeded = accounts::ensure_default_admin(&mut store, &config.accounts)?;
    Ok((
        Workspace {
            path,
            config,
            store,
            reset_tokens: ResetTokens::default(),
        },
        seeded,
    ))
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> HandlerResult {
    let path = PathBuf::from(required_str(req, "path")?);
    // Release the previous workspace before opening the next one.
    state.workspace = None;
    let (ws, seeded) = open_workspace(path)?;
    info!(
        path = %ws.path.to_string_lossy(),
        backend = ws.config.storage.backend.as_str(),
        "workspace selected"
    );
    let result = json!({
        "workspacePath": ws.path.to_string_lossy(),
        "backend": ws.config.storage.backend.as_str(),
        "seededAdmin": seeded,
    });
    state.workspace = Some(ws);
    Ok(result)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "health" => handle_health(state, req),
        "workspace.select" => handle_workspace_select(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
