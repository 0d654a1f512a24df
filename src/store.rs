use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("{field} must not be empty")]
    EmptyField { field: &'static str },
    #[error("no record selected")]
    NoSelection,
}

/// One student row. All fields are free-form text; `cgpa` stays textual even
/// when it looks numeric, and `id` is the (non-unique) search key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentRecord {
    pub name: String,
    pub id: String,
    pub department: String,
    pub email: String,
    pub cgpa: String,
}

impl StudentRecord {
    /// Validating factory used at the add/update boundary: trims every field
    /// and rejects the tuple if any field ends up empty. Import bypasses
    /// this on purpose and installs rows verbatim.
    pub fn validated(
        name: &str,
        id: &str,
        department: &str,
        email: &str,
        cgpa: &str,
    ) -> Result<Self, StoreError> {
        fn required(field: &'static str, value: &str) -> Result<String, StoreError> {
            let t = value.trim();
            if t.is_empty() {
                return Err(StoreError::EmptyField { field });
            }
            Ok(t.to_string())
        }

        Ok(Self {
            name: required("name", name)?,
            id: required("id", id)?,
            department: required("department", department)?,
            email: required("email", email)?,
            cgpa: required("cgpa", cgpa)?,
        })
    }
}

/// Single source of truth for the record sequence and which row is selected.
///
/// Invariant: `selected` is either `None` or a valid index into `records`.
/// Structural mutations that could break that (delete, replace-all) clear it.
#[derive(Debug, Default)]
pub struct Roster {
    records: Vec<StudentRecord>,
    selected: Option<usize>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn selected_index(&self) -> Option<usize> {
        self.selected
    }

    /// Appends at the end and returns the new count. Validation already
    /// happened at the factory, so there is no error path.
    pub fn add(&mut self, record: StudentRecord) -> usize {
        self.records.push(record);
        self.records.len()
    }

    /// Replaces the record at the currently selected index in place. Order
    /// and selection are unchanged. The store's own selection is the only
    /// target; callers never pass an index, so a stale view row can't
    /// redirect the write.
    pub fn update(&mut self, record: StudentRecord) -> Result<usize, StoreError> {
        let index = self.selected.ok_or(StoreError::NoSelection)?;
        self.records[index] = record;
        Ok(index)
    }

    /// Removes the selected record, shifting later rows down. Selection is
    /// cleared unconditionally; it never survives a structural change.
    pub fn delete(&mut self) -> Result<StudentRecord, StoreError> {
        let index = self.selected.ok_or(StoreError::NoSelection)?;
        let removed = self.records.remove(index);
        self.selected = None;
        Ok(removed)
    }

    /// In range: selects the row and returns it for form population.
    /// Out of range: clears the selection and returns nothing. Not an error;
    /// a bad row click is a no-op.
    pub fn select(&mut self, index: usize) -> Option<&StudentRecord> {
        if index < self.records.len() {
            self.selected = Some(index);
            self.records.get(index)
        } else {
            self.selected = None;
            None
        }
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    /// Linear scan, case-insensitive, first match in insertion order wins.
    /// Duplicate ids are legal and preserved, so later duplicates are
    /// reachable only by row click. Does not touch the selection; the
    /// search-then-select composite lives at the IPC boundary.
    pub fn find_by_id(&self, id: &str) -> Option<(usize, &StudentRecord)> {
        let needle = id.to_lowercase();
        self.records
            .iter()
            .enumerate()
            .find(|(_, r)| r.id.to_lowercase() == needle)
    }

    /// Wholesale swap used by import. Clears the selection.
    pub fn replace_all(&mut self, records: Vec<StudentRecord>) {
        self.records = records;
        self.selected = None;
    }

    /// Copy-out of the sequence for rendering and export. Callers never see
    /// the store's own buffer.
    pub fn snapshot(&self) -> Vec<StudentRecord> {
        self.records.clone()
    }
}
