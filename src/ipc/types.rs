use serde::Deserialize;

use crate::store::Roster;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Whole application state: one roster, living and dying with the process.
/// Only an explicit export outlives it.
#[derive(Default)]
pub struct AppState {
    pub roster: Roster,
}
