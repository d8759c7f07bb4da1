//! Resolve foreign-key ids to display names from an already-loaded list.

use std::collections::HashMap;

use crate::records::Record;

const NO_ID: &str = "—";

/// Id → record index over one collection, e.g. doctors for an appointments
/// table.
#[derive(Debug, Clone)]
pub struct NameLookup<R> {
    by_id: HashMap<String, R>,
}

impl<R: Record> NameLookup<R> {
    pub fn from_records(records: &[R]) -> Self {
        let by_id = records
            .iter()
            .map(|record| (record.id().to_string(), record.clone()))
            .collect();
        Self { by_id }
    }

    pub fn get(&self, id: &str) -> Option<&R> {
        self.by_id.get(id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// `"{label} ({id})"` for a known id, the bare id for an unknown one,
    /// and an em dash when there is no id at all.
    pub fn display(&self, id: Option<&str>) -> String {
        let id = match id {
            Some(id) if !id.is_empty() => id,
            _ => return NO_ID.to_string(),
        };
        match self.by_id.get(id) {
            Some(record) => match record.label() {
                Some(label) => format!("{label} ({id})"),
                None => id.to_string(),
            },
            None => id.to_string(),
        }
    }
}
