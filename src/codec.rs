use crate::store::StudentRecord;
use thiserror::Error;

/// Fixed header row for the tabular form. Column order is the contract;
/// header text on import is ignored.
pub const HEADER: [&str; 5] = ["Name", "ID", "Department", "Email", "CGPA"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("sheet has no data rows")]
    NoData,
}

/// Row 0 is the header, then one row per record with the five field values
/// verbatim. CGPA stays text; nothing is coerced.
pub fn to_table(records: &[StudentRecord]) -> Vec<Vec<String>> {
    let mut rows = Vec::with_capacity(records.len() + 1);
    rows.push(HEADER.iter().map(|h| h.to_string()).collect());
    for r in records {
        rows.push(vec![
            r.name.clone(),
            r.id.clone(),
            r.department.clone(),
            r.email.clone(),
            r.cgpa.clone(),
        ]);
    }
    rows
}

/// Inverse of `to_table`. Mapping is positional: the header row is skipped
/// without looking at its content, and each data row's first five cells
/// become name/id/department/email/cgpa. Spreadsheet tooling returns
/// variable-length rows for sparse sheets, so missing trailing cells read as
/// empty strings and extra cells are ignored. No validation happens here;
/// that is the store's entry-boundary job.
pub fn from_table(rows: &[Vec<String>]) -> Result<Vec<StudentRecord>, CodecError> {
    if rows.len() < 2 {
        return Err(CodecError::NoData);
    }

    let cell = |row: &Vec<String>, col: usize| row.get(col).cloned().unwrap_or_default();

    Ok(rows[1..]
        .iter()
        .map(|row| StudentRecord {
            name: cell(row, 0),
            id: cell(row, 1),
            department: cell(row, 2),
            email: cell(row, 3),
            cgpa: cell(row, 4),
        })
        .collect())
}

/// Pretty-printed JSON array for the plain-text export. Serializing the
/// record struct directly keeps the keys in field order
/// (name/id/department/email/cgpa); a `json!` map would sort them.
pub fn to_json(records: &[StudentRecord]) -> String {
    serde_json::to_string_pretty(records).unwrap_or_else(|_| "[]".to_string())
}
