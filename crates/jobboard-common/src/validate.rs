use thiserror::Error;

use crate::models::DEFAULT_STATUS;

pub const MAX_TEXT_LEN: usize = 200;
pub const MAX_DESCRIPTION_LEN: usize = 5000;
pub const MAX_COLUMN_KEY_LEN: usize = 32;

/// A request field that failed validation. `field` uses the wire name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Trimmed, length-checked, non-empty text.
pub fn required_text(field: &str, value: &str) -> Result<String, ValidationError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ValidationError::new(field, "must not be empty"));
    }
    if value.chars().count() > MAX_TEXT_LEN {
        return Err(ValidationError::new(
            field,
            format!("must be at most {MAX_TEXT_LEN} characters"),
        ));
    }
    Ok(value.to_string())
}

/// Blank descriptions are stored as absent.
pub fn optional_description(value: Option<&str>) -> Result<Option<String>, ValidationError> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(d) if d.chars().count() > MAX_DESCRIPTION_LEN => Err(ValidationError::new(
            "description",
            format!("must be at most {MAX_DESCRIPTION_LEN} characters"),
        )),
        Some(d) => Ok(Some(d.to_string())),
    }
}

/// A column key the board can hold: one of the canonical keys or any key the
/// board can synthesize a column for.
pub fn column_key(field: &str, value: &str) -> Result<String, ValidationError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ValidationError::new(field, "column key must not be empty"));
    }
    if value.len() > MAX_COLUMN_KEY_LEN {
        return Err(ValidationError::new(
            field,
            format!("column key must be at most {MAX_COLUMN_KEY_LEN} characters"),
        ));
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(ValidationError::new(
            field,
            format!("'{value}' is not a valid column key"),
        ));
    }
    Ok(value.to_string())
}

/// Like [`column_key`], but a blank value means [`DEFAULT_STATUS`].
pub fn status_or_default(field: &str, value: &str) -> Result<String, ValidationError> {
    if value.trim().is_empty() {
        return Ok(DEFAULT_STATUS.to_string());
    }
    column_key(field, value)
}
