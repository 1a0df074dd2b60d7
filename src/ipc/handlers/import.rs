use serde_json::json;
use std::path::PathBuf;

use crate::import::{self, ImportMapping};
use crate::ipc::helpers::{
    actor, optional_str, param_as, respond, to_json, workspace, HandlerErr, HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::tabular::{self, SourceFormat, Table};

/// A loaded import sheet, with the workbook's tabs when it came from one.
struct Source {
    table: Table,
    sheet_names: Vec<String>,
    sheet: Option<String>,
}

fn read_failed(path: &str) -> impl Fn(anyhow::Error) -> HandlerErr + '_ {
    move |e| HandlerErr::new("io_failed", format!("{e:#}")).with_details(json!({ "path": path }))
}

/// The sheet to import: a CSV or workbook file at `path`, or inline `rows`
/// objects. Workbooks read `sheet`, or their first tab when it is absent.
fn source_table(req: &Request) -> Result<Source, HandlerErr> {
    if let Some(path) = optional_str(req, "path") {
        let p = PathBuf::from(&path);
        if !p.is_file() {
            return Err(HandlerErr::new("not_found", "import file not found")
                .with_details(json!({ "path": path })));
        }
        return match SourceFormat::from_path(&p) {
            SourceFormat::Csv => Ok(Source {
                table: tabular::read_csv_file(&p).map_err(read_failed(&path))?,
                sheet_names: Vec::new(),
                sheet: None,
            }),
            SourceFormat::Workbook => {
                let sheet_names = tabular::workbook_sheet_names(&p).map_err(read_failed(&path))?;
                let sheet = match optional_str(req, "sheet") {
                    Some(s) if sheet_names.contains(&s) => s,
                    Some(s) => {
                        return Err(HandlerErr::bad_params(format!("unknown sheet: {s}"))
                            .with_details(json!({ "sheetNames": sheet_names })))
                    }
                    None => sheet_names
                        .first()
                        .cloned()
                        .ok_or_else(|| HandlerErr::bad_params("workbook has no sheets"))?,
                };
                let table = tabular::read_workbook_sheet(&p, &sheet).map_err(read_failed(&path))?;
                Ok(Source {
                    table,
                    sheet_names,
                    sheet: Some(sheet),
                })
            }
        };
    }
    match req.params.get("rows").and_then(|v| v.as_array()) {
        Some(rows) => Ok(Source {
            table: Table::from_json_rows(rows)
                .map_err(|e| HandlerErr::bad_params(format!("invalid rows: {e:#}")))?,
            sheet_names: Vec::new(),
            sheet: None,
        }),
        None => Err(HandlerErr::bad_params("missing path or rows")),
    }
}

fn handle_preview(state: &mut AppState, req: &Request) -> HandlerResult {
    let ws = workspace(state)?;
    let source = source_table(req)?;
    let mut preview = to_json(&import::preview(&source.table, ws.config.import.preview_rows))?;
    if let Some(obj) = preview.as_object_mut() {
        obj.insert("sheetNames".to_string(), json!(source.sheet_names));
        obj.insert("sheet".to_string(), json!(source.sheet));
    }
    Ok(preview)
}

fn handle_sessions(state: &mut AppState, req: &Request) -> HandlerResult {
    let actor = actor(req)?;
    let ws = workspace(state)?;
    let table = source_table(req)?.table;
    // Without an explicit mapping the header-based guess is used as is.
    let mapping = match req.params.get("mapping") {
        Some(v) if !v.is_null() => param_as::<ImportMapping>(req, "mapping")?,
        _ => import::suggest_mapping(&table.headers),
    };
    let outcome = import::import_sessions(&mut ws.store, &ws.config, actor, &table, &mapping)?;
    to_json(&outcome)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "import.preview" => handle_preview(state, req),
        "import.sessions" => handle_sessions(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
