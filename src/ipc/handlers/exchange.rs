use crate::codec::{self, CodecError};
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::sheet;
use serde_json::{json, Value};
use std::path::PathBuf;

struct HandlerErr {
    code: &'static str,
    message: String,
    details: Option<Value>,
}

impl HandlerErr {
    fn response(self, id: &str) -> Value {
        err(id, self.code, self.message, self.details)
    }
}

fn get_path_param(params: &Value, key: &str) -> Result<String, HandlerErr> {
    match params.get(key).and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(HandlerErr {
            code: "bad_params",
            message: format!("missing {key}"),
            details: None,
        }),
    }
}

fn write_text_file(path: &str, contents: &str) -> Result<(), HandlerErr> {
    let out = PathBuf::from(path);
    if let Some(parent) = out.parent() {
        std::fs::create_dir_all(parent).map_err(|e| HandlerErr {
            code: "export_failed",
            message: e.to_string(),
            details: Some(json!({ "path": path })),
        })?;
    }
    std::fs::write(&out, contents).map_err(|e| HandlerErr {
        code: "export_failed",
        message: e.to_string(),
        details: Some(json!({ "path": path })),
    })?;
    Ok(())
}

fn handle_export_json(state: &mut AppState, req: &Request) -> Value {
    let out_path = match get_path_param(&req.params, "outPath") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    if state.roster.is_empty() {
        return err(&req.id, "empty_export", "no records to export", None);
    }

    let snapshot = state.roster.snapshot();
    let text = codec::to_json(&snapshot);
    if let Err(e) = write_text_file(&out_path, &text) {
        return e.response(&req.id);
    }
    log::info!("exported {} records as json to {}", snapshot.len(), out_path);
    ok(
        &req.id,
        json!({ "rowsExported": snapshot.len(), "path": out_path }),
    )
}

fn handle_export_sheet(state: &mut AppState, req: &Request) -> Value {
    let out_path = match get_path_param(&req.params, "outPath") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    if state.roster.is_empty() {
        return err(&req.id, "empty_export", "no records to export", None);
    }

    let snapshot = state.roster.snapshot();
    let rows = codec::to_table(&snapshot);
    if let Err(e) = sheet::write_sheet(&PathBuf::from(&out_path), &rows) {
        return err(
            &req.id,
            "export_failed",
            e.to_string(),
            Some(json!({ "path": out_path })),
        );
    }
    log::info!(
        "exported {} records as spreadsheet to {}",
        snapshot.len(),
        out_path
    );
    ok(
        &req.id,
        json!({ "rowsExported": snapshot.len(), "path": out_path }),
    )
}

fn handle_import_sheet(state: &mut AppState, req: &Request) -> Value {
    let in_path = match get_path_param(&req.params, "inPath") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let src = PathBuf::from(&in_path);
    if !src.is_file() {
        return err(
            &req.id,
            "not_found",
            "spreadsheet file not found",
            Some(json!({ "path": in_path })),
        );
    }

    // Phase 1: the host hands over bytes from disk. Phase 2: decode and
    // replace, synchronously. Any failure leaves the roster untouched.
    let rows = match sheet::read_sheet(&src) {
        Ok(v) => v,
        Err(e) => {
            return err(
                &req.id,
                "import_failed",
                e.to_string(),
                Some(json!({ "path": in_path })),
            )
        }
    };
    let records = match codec::from_table(&rows) {
        Ok(v) => v,
        Err(CodecError::NoData) => {
            return err(&req.id, "no_data", "spreadsheet has no data rows", None)
        }
    };

    let count = records.len();
    state.roster.replace_all(records);
    log::info!("imported {count} records from {in_path}");
    ok(&req.id, json!({ "rowsImported": count }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "exchange.exportJson" => Some(handle_export_json(state, req)),
        "exchange.exportSheet" => Some(handle_export_sheet(state, req)),
        "exchange.importSheet" => Some(handle_import_sheet(state, req)),
        _ => None,
    }
}
