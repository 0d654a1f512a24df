use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::store::{StoreError, StudentRecord};
use serde_json::{json, Value};

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

fn get_required_str(params: &Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr {
            code: "bad_params",
            message: format!("missing {key}"),
            details: None,
        })
}

/// Reads the five form fields and runs them through the validating factory.
/// The view sends values already trimmed, but the factory trims again; a
/// field that is blank after trimming aborts the whole operation.
fn record_from_params(params: &Value) -> Result<StudentRecord, HandlerErr> {
    let name = get_required_str(params, "name")?;
    let id = get_required_str(params, "id")?;
    let department = get_required_str(params, "department")?;
    let email = get_required_str(params, "email")?;
    let cgpa = get_required_str(params, "cgpa")?;

    StudentRecord::validated(&name, &id, &department, &email, &cgpa).map_err(|e| match e {
        StoreError::EmptyField { field } => HandlerErr {
            code: "validation_failed",
            message: "all fields must be filled".to_string(),
            details: Some(json!({ "field": field })),
        },
        other => HandlerErr {
            code: "bad_params",
            message: other.to_string(),
            details: None,
        },
    })
}

fn record_json(record: &StudentRecord) -> Value {
    serde_json::to_value(record).unwrap_or(Value::Null)
}

fn handle_list(state: &mut AppState, req: &Request) -> Value {
    let records: Vec<Value> = state.roster.snapshot().iter().map(record_json).collect();
    ok(
        &req.id,
        json!({
            "records": records,
            "selectedIndex": state.roster.selected_index()
        }),
    )
}

fn handle_add(state: &mut AppState, req: &Request) -> Value {
    let record = match record_from_params(&req.params) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let count = state.roster.add(record);
    log::debug!("added record, roster now holds {count}");
    ok(&req.id, json!({ "count": count }))
}

fn handle_update(state: &mut AppState, req: &Request) -> Value {
    // Selection is checked before field validation, matching the form's
    // order of complaints.
    if state.roster.selected_index().is_none() {
        return err(&req.id, "no_selection", "no record selected", None);
    }
    let record = match record_from_params(&req.params) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    match state.roster.update(record) {
        Ok(index) => ok(&req.id, json!({ "index": index })),
        Err(e) => err(&req.id, "no_selection", e.to_string(), None),
    }
}

fn handle_delete(state: &mut AppState, req: &Request) -> Value {
    match state.roster.delete() {
        Ok(_removed) => ok(&req.id, json!({ "count": state.roster.len() })),
        Err(e) => err(&req.id, "no_selection", e.to_string(), None),
    }
}

fn handle_select(state: &mut AppState, req: &Request) -> Value {
    let Some(index) = req.params.get("index").and_then(|v| v.as_i64()) else {
        return err(&req.id, "bad_params", "missing index", None);
    };
    // Negative and past-the-end indexes both clear the selection; a bad row
    // click is a no-op, not a fault.
    if index < 0 {
        state.roster.clear_selection();
        return ok(&req.id, json!({ "index": Value::Null, "record": Value::Null }));
    }
    match state.roster.select(index as usize) {
        Some(record) => {
            let record = record.clone();
            ok(
                &req.id,
                json!({ "index": index, "record": record_json(&record) }),
            )
        }
        None => ok(&req.id, json!({ "index": Value::Null, "record": Value::Null })),
    }
}

fn handle_clear_selection(state: &mut AppState, req: &Request) -> Value {
    state.roster.clear_selection();
    ok(&req.id, json!({}))
}

fn handle_search(state: &mut AppState, req: &Request) -> Value {
    let id = match req.params.get("id").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing id", None),
    };
    // First match in insertion order wins when ids collide. The hit is also
    // selected, so the view highlights it and the form fills in.
    let found = state
        .roster
        .find_by_id(&id)
        .map(|(index, record)| (index, record.clone()));
    match found {
        Some((index, record)) => {
            state.roster.select(index);
            ok(
                &req.id,
                json!({ "index": index, "record": record_json(&record) }),
            )
        }
        None => err(
            &req.id,
            "not_found",
            "no record matches id",
            Some(json!({ "id": id })),
        ),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "records.list" => Some(handle_list(state, req)),
        "records.add" => Some(handle_add(state, req)),
        "records.update" => Some(handle_update(state, req)),
        "records.delete" => Some(handle_delete(state, req)),
        "records.select" => Some(handle_select(state, req)),
        "records.clearSelection" => Some(handle_clear_selection(state, req)),
        "records.search" => Some(handle_search(state, req)),
        _ => None,
    }
}
