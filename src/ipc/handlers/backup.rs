use serde_json::json;
use std::path::PathBuf;
use tracing::info;

use crate::backup;
use crate::config::CONFIG_FILENAME;
use crate::ipc::handlers::core::open_workspace;
use crate::ipc::helpers::{required_str, respond, workspace, HandlerErr, HandlerResult};
use crate::ipc::types::{AppState, Request, Workspace};

/// Store documents plus the workspace config file.
fn workspace_documents(ws: &Workspace) -> Vec<PathBuf> {
    let mut documents = ws.store.document_paths().to_vec();
    documents.push(ws.path.join(CONFIG_FILENAME));
    documents
}

fn handle_backup_export(state: &mut AppState, req: &Request) -> HandlerResult {
    let out_path = required_str(req, "outPath")?;
    let ws = workspace(state)?;
    let documents = workspace_documents(ws);

    let export = backup::export_workspace_bundle(&ws.path, &documents, &PathBuf::from(&out_path))
        .map_err(|e| {
            HandlerErr::new("io_failed", format!("{e:#}")).with_details(json!({ "path": out_path }))
        })?;
    info!(path = %out_path, entries = export.entry_count, "workspace backup written");

    Ok(json!({
        "ok": true,
        "path": out_path,
        "bundleFormat": export.bundle_format,
        "entryCount": export.entry_count,
        "documents": export.documents,
    }))
}

fn handle_backup_import(state: &mut AppState, req: &Request) -> HandlerResult {
    let in_path = required_str(req, "inPath")?;
    let ws = workspace(state)?;
    let workspace_path = ws.path.clone();
    let owned = workspace_documents(ws);

    let src = PathBuf::from(&in_path);
    if !src.is_file() {
        return Err(HandlerErr::new("not_found", "bundle file not found")
            .with_details(json!({ "path": in_path })));
    }

    // Drop open handles before replacing files.
    state.workspace = None;

    let restored = backup::import_workspace_bundle(&src, &workspace_path, &owned);
    // Reopen whatever is on disk now, restored or not.
    let reopened = open_workspace(workspace_path.clone());
    let import = match (restored, reopened) {
        (Ok(import), Ok((ws, _))) => {
            state.workspace = Some(ws);
            import
        }
        (Err(e), Ok((ws, _))) => {
            state.workspace = Some(ws);
            return Err(HandlerErr::new("io_failed", format!("{e:#}"))
                .with_details(json!({ "path": in_path })));
        }
        (Ok(_), Err(reopen)) => {
            return Err(HandlerErr::new(
                reopen.code,
                format!("restored workspace could not be reopened: {}", reopen.message),
            )
            .with_details(json!({ "path": in_path, "reopen": reopen.to_details() })));
        }
        (Err(e), Err(reopen)) => {
            return Err(HandlerErr::new("io_failed", format!("{e:#}")).with_details(json!({
                "path": in_path,
                "reopen": reopen.to_details(),
            })));
        }
    };
    info!(path = %in_path, documents = import.restored.len(), "workspace restored from backup");

    Ok(json!({
        "ok": true,
        "workspacePath": workspace_path.to_string_lossy(),
        "bundleFormatDetected": import.bundle_format_detected,
        "restored": import.restored,
        "removed": import.removed,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "backup.export" => handle_backup_export(state, req),
        "backup.import" => handle_backup_import(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
