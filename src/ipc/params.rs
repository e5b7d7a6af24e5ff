//! Request parameter schemas for the todo RPC methods.
//!
//! Every method input is deserialized into one of these structs before the
//! store is touched; shape or type violations become
//! `TodoError::Validation` and never reach the repository.

use crate::error::TodoError;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Deserialize RPC params into a typed schema.
///
/// serde's message already names the offending field ("missing field
/// `title`", "invalid type: string, expected i64"), so it is carried as the
/// reason verbatim.
pub fn parse<T: serde::de::DeserializeOwned>(params: Value) -> Result<T, TodoError> {
    serde_json::from_value(params)
        .map_err(|e| TodoError::validation("params", e.to_string()))
}

/// Presence-preserving deserializer for nullable optional fields.
///
/// Combined with `#[serde(default)]` this yields a tri-state:
/// field absent → `None`, field null → `Some(None)`, value → `Some(Some(v))`.
fn presence<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

fn non_empty_title(title: &str) -> Result<(), TodoError> {
    if title.trim().is_empty() {
        return Err(TodoError::validation(
            "title",
            "must not be empty or whitespace-only",
        ));
    }
    Ok(())
}

// ─── todo.create ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateTodoParams {
    pub title: String,
    /// Absent and explicit null both mean "no description" at creation.
    #[serde(default)]
    pub description: Option<String>,
}

impl CreateTodoParams {
    pub fn validate(self) -> Result<Self, TodoError> {
        non_empty_title(&self.title)?;
        Ok(self)
    }
}

// ─── todo.update ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct UpdateTodoParams {
    pub id: i64,
    #[serde(default)]
    pub title: Option<String>,
    /// "Field not sent" and "field sent as null" diverge in the store:
    /// the former keeps the prior value, the latter clears it.
    #[serde(default, deserialize_with = "presence")]
    pub description: Option<Option<String>>,
    #[serde(default)]
    pub completed: Option<bool>,
}

impl UpdateTodoParams {
    pub fn validate(self) -> Result<Self, TodoError> {
        if let Some(ref title) = self.title {
            non_empty_title(title)?;
        }
        Ok(self)
    }
}

// ─── todo.delete ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct DeleteTodoParams {
    pub id: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn create_requires_title() {
        let err = parse::<CreateTodoParams>(json!({ "description": "no title" })).unwrap_err();
        assert!(matches!(err, TodoError::Validation { field: "params", .. }));

        let err = parse::<CreateTodoParams>(json!({ "title": "   " }))
            .and_then(CreateTodoParams::validate)
            .unwrap_err();
        assert!(matches!(err, TodoError::Validation { field: "title", .. }));
    }

    #[test]
    fn create_accepts_absent_and_null_description() {
        let absent = parse::<CreateTodoParams>(json!({ "title": "t" })).unwrap();
        assert_eq!(absent.description, None);

        let null = parse::<CreateTodoParams>(json!({ "title": "t", "description": null })).unwrap();
        assert_eq!(null.description, None);
    }

    #[test]
    fn update_distinguishes_absent_null_and_value() {
        let absent = parse::<UpdateTodoParams>(json!({ "id": 1 })).unwrap();
        assert_eq!(absent.description, None);

        let null = parse::<UpdateTodoParams>(json!({ "id": 1, "description": null })).unwrap();
        assert_eq!(null.description, Some(None));

        let value =
            parse::<UpdateTodoParams>(json!({ "id": 1, "description": "milk" })).unwrap();
        assert_eq!(value.description, Some(Some("milk".to_string())));
    }

    #[test]
    fn update_requires_integer_id() {
        assert!(parse::<UpdateTodoParams>(json!({ "id": "seven" })).is_err());
        assert!(parse::<UpdateTodoParams>(json!({})).is_err());
    }

    #[test]
    fn update_rejects_empty_title_when_present() {
        let err = parse::<UpdateTodoParams>(json!({ "id": 1, "title": "" }))
            .and_then(UpdateTodoParams::validate)
            .unwrap_err();
        assert!(matches!(err, TodoError::Validation { field: "title", .. }));

        // Absent title passes validation untouched
        let ok = parse::<UpdateTodoParams>(json!({ "id": 1 }))
            .and_then(UpdateTodoParams::validate)
            .unwrap();
        assert_eq!(ok.title, None);
    }

    #[test]
    fn delete_requires_integer_id() {
        assert!(parse::<DeleteTodoParams>(json!({ "id": 3 })).is_ok());
        assert!(parse::<DeleteTodoParams>(json!({ "id": 3.5 })).is_err());
        assert!(parse::<DeleteTodoParams>(serde_json::Value::Null).is_err());
    }
}
