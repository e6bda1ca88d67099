use caseboard_core::{Entity, EntityKey, FieldValue};

/// Field names a case file accepts.
pub const CASE_FIELDS: &[&str] = &["status", "assignee", "priority", "note", "due_at"];

/// A typed case entity, the shape the board UI edits row by row.
///
/// Accepted fields always read as `Some` (an unset option reads as `Null`),
/// so inverse capture and reconciliation compare set and unset states the
/// same way. Only unknown field names read as `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseFile {
    pub case_number: EntityKey,
    pub status: String,
    pub assignee: Option<String>,
    pub priority: i64,
    pub note: Option<String>,
    pub due_at: Option<i64>,
}

impl CaseFile {
    pub fn new(case_number: impl Into<EntityKey>, status: impl Into<String>) -> Self {
        Self {
            case_number: case_number.into(),
            status: status.into(),
            assignee: None,
            priority: 0,
            note: None,
            due_at: None,
        }
    }

    pub fn with_assignee(mut self, assignee: impl Into<String>) -> Self {
        self.assignee = Some(assignee.into());
        self
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }
}

fn optional_text(value: &Option<String>) -> FieldValue {
    match value {
        Some(text) => FieldValue::text(text.as_str()),
        None => FieldValue::Null,
    }
}

impl Entity for CaseFile {
    fn key(&self) -> EntityKey {
        self.case_number.clone()
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "status" => Some(FieldValue::text(self.status.as_str())),
            "assignee" => Some(optional_text(&self.assignee)),
            "priority" => Some(FieldValue::Integer(self.priority)),
            "note" => Some(optional_text(&self.note)),
            "due_at" => Some(match self.due_at {
                Some(ts) => FieldValue::Timestamp(ts),
                None => FieldValue::Null,
            }),
            _ => None,
        }
    }

    fn set_field(&mut self, name: &str, value: FieldValue) {
        match (name, value) {
            ("status", FieldValue::Text(text)) => self.status = text,
            ("assignee", FieldValue::Text(text)) => self.assignee = Some(text),
            ("assignee", FieldValue::Null) => self.assignee = None,
            ("priority", FieldValue::Integer(n)) => self.priority = n,
            ("note", FieldValue::Text(text)) => self.note = Some(text),
            ("note", FieldValue::Null) => self.note = None,
            ("due_at", FieldValue::Timestamp(ts)) => self.due_at = Some(ts),
            ("due_at", FieldValue::Null) => self.due_at = None,
            // Unknown name or mismatched scalar: leave the case untouched.
            _ => {}
        }
    }

    fn accepts(name: &str) -> bool {
        CASE_FIELDS.contains(&name)
    }
}
