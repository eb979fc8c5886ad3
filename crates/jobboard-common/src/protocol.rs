//! Request and response bodies of the dashboard sync endpoints.
//!
//! Field names follow the JSON the board UI already speaks (`taskId`,
//! `sourceCol`, ...). String fields default to empty so a missing field is
//! reported as a validation error on that field rather than a parse failure.

use serde::{Deserialize, Serialize};

use crate::validate::{self, ValidationError};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AddJobRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveTaskRequest {
    #[serde(default)]
    pub task_id: String,
    #[serde(default)]
    pub source_col: String,
    #[serde(default)]
    pub dest_col: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest_index: Option<i64>,
}

/// Full overwrite of a job's mutable fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EditJobRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Task-shaped edit body posted by the board's edit dialog.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskEditRequest {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub company: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteTaskRequest {
    #[serde(default)]
    pub task_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
    /// Id assigned by the store; only present on add.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl SuccessResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            id: None,
        }
    }

    pub fn created(id: i64) -> Self {
        Self {
            success: true,
            id: Some(id.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Unauthorized,
    NotFound,
    Store,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: ErrorKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

/// Validated fields shared by add and edit.
#[derive(Debug, Clone, PartialEq)]
pub struct JobFields {
    pub title: String,
    pub company: String,
    pub status: String,
    pub description: Option<String>,
}

impl JobFields {
    pub fn parse(
        title: &str,
        company: &str,
        status: &str,
        description: Option<&str>,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            title: validate::required_text("title", title)?,
            company: validate::required_text("company", company)?,
            status: validate::status_or_default("status", status)?,
            description: validate::optional_description(description)?,
        })
    }
}

impl AddJobRequest {
    pub fn validate(&self) -> Result<JobFields, ValidationError> {
        JobFields::parse(
            &self.title,
            &self.company,
            &self.status,
            self.description.as_deref(),
        )
    }
}

impl EditJobRequest {
    pub fn validate(&self) -> Result<JobFields, ValidationError> {
        JobFields::parse(
            &self.title,
            &self.company,
            &self.status,
            self.description.as_deref(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn move_request_uses_camel_case() {
        let req: MoveTaskRequest = serde_json::from_value(serde_json::json!({
            "taskId": "3",
            "sourceCol": "applied",
            "destCol": "interview",
            "destIndex": 0
        }))
        .unwrap();
        assert_eq!(req.task_id, "3");
        assert_eq!(req.dest_col, "interview");
        assert_eq!(req.dest_index, Some(0));
    }

    #[test]
    fn missing_fields_fail_validation_not_parsing() {
        let req: AddJobRequest = serde_json::from_str(r#"{"company": "Acme"}"#).unwrap();
        let err = req.validate().unwrap_err();
        assert_eq!(err.field, "title");
    }

    #[test]
    fn add_defaults_blank_status() {
        let req = AddJobRequest {
            title: "SRE".into(),
            company: "Acme".into(),
            status: String::new(),
            description: Some(String::new()),
        };
        let fields = req.validate().unwrap();
        assert_eq!(fields.status, "applied");
        assert_eq!(fields.description, None);
    }

    #[test]
    fn success_response_shapes() {
        assert_eq!(
            serde_json::to_value(SuccessResponse::ok()).unwrap(),
            serde_json::json!({"success": true})
        );
        assert_eq!(
            serde_json::to_value(SuccessResponse::created(12)).unwrap(),
            serde_json::json!({"success": true, "id": "12"})
        );
    }
}
