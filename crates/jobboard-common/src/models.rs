use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Column every record lands in when its stored status is blank.
pub const DEFAULT_STATUS: &str = "applied";

/// The four well-known columns, in the order the board renders them.
pub const CANONICAL_COLUMNS: [(&str, &str); 4] = [
    ("applied", "Applied"),
    ("interview", "Interview"),
    ("offered", "Offered"),
    ("rejected", "Rejected"),
];

/// A job application as persisted by the record store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: i64,
    pub owner: String,
    pub title: String,
    pub company: String,
    pub description: Option<String>,
    pub status: String,
    pub position: i64,
    pub created_at: DateTime<Utc>,
}

/// Card projection of a [`JobRecord`], shared by server responses and the
/// client's local mirror.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    /// Job title.
    pub content: String,
    pub company: String,
    pub added_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl From<&JobRecord> for Task {
    fn from(record: &JobRecord) -> Self {
        Self {
            id: record.id.to_string(),
            content: record.title.clone(),
            company: record.company.clone(),
            added_at: record.created_at,
            description: record.description.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Column key, identical to the status value of every task inside it.
    pub id: String,
    pub name: String,
    pub tasks: Vec<Task>,
}

impl Column {
    pub fn new(key: &str) -> Self {
        Self {
            id: key.to_string(),
            name: display_name(key),
            tasks: Vec::new(),
        }
    }
}

/// Full mapping of column key to [`Column`] for one owner.
///
/// Serializes as a plain JSON object keyed by column key. Canonical columns
/// come first; synthesized columns follow in the order they were first seen.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Dashboard {
    pub columns: IndexMap<String, Column>,
}

/// Display name for a column key: the canonical name when there is one,
/// otherwise the key with its first character upper-cased.
pub fn display_name(key: &str) -> String {
    if let Some((_, name)) = CANONICAL_COLUMNS.iter().find(|(k, _)| *k == key) {
        return (*name).to_string();
    }
    capitalize(key)
}

pub fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capitalize_only_touches_first_char() {
        assert_eq!(capitalize("on_hold"), "On_hold");
        assert_eq!(capitalize("ghosted"), "Ghosted");
        assert_eq!(capitalize(""), "");
    }

    #[test]
    fn canonical_display_names() {
        assert_eq!(display_name("interview"), "Interview");
        assert_eq!(display_name("offered"), "Offered");
        assert_eq!(display_name("waitlist"), "Waitlist");
    }

    #[test]
    fn task_serializes_camel_case_and_omits_missing_description() {
        let task = Task {
            id: "7".into(),
            content: "Backend Engineer".into(),
            company: "Acme".into(),
            added_at: "2024-03-01T10:00:00Z".parse().unwrap(),
            description: None,
        };
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["content"], "Backend Engineer");
        assert_eq!(json["addedAt"], "2024-03-01T10:00:00Z");
        assert!(json.get("description").is_none());
    }

    #[test]
    fn task_id_is_stringified_record_id() {
        let record = JobRecord {
            id: 42,
            owner: "u1".into(),
            title: "SRE".into(),
            company: "Initech".into(),
            description: Some("on-call".into()),
            status: "applied".into(),
            position: 0,
            created_at: Utc::now(),
        };
        let task = Task::from(&record);
        assert_eq!(task.id, "42");
        assert_eq!(task.content, "SRE");
        assert_eq!(task.description.as_deref(), Some("on-call"));
    }
}
