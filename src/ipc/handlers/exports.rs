use serde_json::json;
use std::path::PathBuf;
use tracing::info;

use crate::accounts;
use crate::calc;
use crate::exports::{self, ExportKind};
use crate::faculty;
use crate::ipc::helpers::{
    actor, optional_str, required_str, respond, workspace, HandlerErr, HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::sessions;
use crate::tabular::{self, ExportFormat, Table};

fn build_table(state: &mut AppState, req: &Request, kind: ExportKind) -> Result<Table, HandlerErr> {
    let actor = actor(req)?;
    let ws = workspace(state)?;
    let table = match kind {
        ExportKind::Faculties => match optional_str(req, "facultyId") {
            // One profile, as downloaded from its detail page.
            Some(id) => exports::faculties_table(&[faculty::get_visible(&ws.store, actor, &id)?]),
            None => exports::faculties_table(&faculty::visible(&ws.store, actor)?),
        },
        ExportKind::Sessions => {
            let mut list = sessions::visible(&ws.store, actor)?;
            calc::sort_by_date_desc(&mut list);
            exports::sessions_table(&list)
        }
        ExportKind::FilteredSessions => {
            let filter = calc::parse_session_filter(req.params.get("filters"))?;
            let visible = sessions::visible(&ws.store, actor)?;
            exports::filtered_sessions_table(&calc::apply_filters(&visible, &filter))
        }
        ExportKind::FacultySessions => {
            let name = match (optional_str(req, "facultyId"), optional_str(req, "facultyName")) {
                (Some(id), _) => faculty::get_visible(&ws.store, actor, &id)?.name,
                (None, Some(name)) => name,
                (None, None) => {
                    return Err(HandlerErr::bad_params("missing facultyId or facultyName"))
                }
            };
            exports::faculty_sessions_table(&sessions::visible(&ws.store, actor)?, &name)
        }
        ExportKind::FacultyPerformance => {
            let faculties = faculty::visible(&ws.store, actor)?;
            let visible = sessions::visible(&ws.store, actor)?;
            exports::faculty_performance_table(&calc::faculty_performance(&faculties, &visible))
        }
        ExportKind::Users => exports::users_table(&accounts::list(&ws.store, actor)?),
    };
    Ok(table)
}

fn handle_export_table(state: &mut AppState, req: &Request) -> HandlerResult {
    let kind_raw = required_str(req, "kind")?;
    let Some(kind) = ExportKind::parse(&kind_raw) else {
        return Err(HandlerErr::bad_params(format!("unknown export kind: {kind_raw}")));
    };
    let format_raw = optional_str(req, "format").unwrap_or_else(|| "csv".to_string());
    let Some(format) = ExportFormat::parse(&format_raw) else {
        return Err(HandlerErr::bad_params(format!("unknown export format: {format_raw}")));
    };
    let out_path = required_str(req, "outPath")?;

    let table = build_table(state, req, kind)?;
    tabular::write_table(&PathBuf::from(&out_path), &table, format, kind.sheet_name()).map_err(
        |e| HandlerErr::new("io_failed", format!("{e:#}")).with_details(json!({ "path": out_path })),
    )?;
    info!(kind = %kind_raw, rows = table.rows.len(), path = %out_path, "table exported");

    Ok(json!({
        "ok": true,
        "path": out_path,
        "kind": kind_raw,
        "format": format_raw.to_ascii_lowercase(),
        "rowsExported": table.rows.len(),
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "export.table" => handle_export_table(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
