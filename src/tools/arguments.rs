//! Typed access to tool call arguments.

use crate::error::VaxError;

/// Wrapper around tool call arguments providing typed extraction.
#[derive(Debug, Clone)]
pub struct ToolArguments {
    value: serde_json::Value,
}

impl ToolArguments {
    /// Wrap raw arguments. Models sometimes send the arguments object as a JSON
    /// string; that form is unpacked here.
    pub fn new(value: serde_json::Value) -> Self {
        let value = match value {
            serde_json::Value::String(raw) => {
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    serde_json::json!({})
                } else {
                    serde_json::from_str(trimmed).unwrap_or(serde_json::Value::String(raw))
                }
            }
            serde_json::Value::Null => serde_json::json!({}),
            other => other,
        };
        Self { value }
    }

    /// Get the raw JSON value.
    pub fn raw(&self) -> &serde_json::Value {
        &self.value
    }

    /// Get a string argument by key.
    pub fn get_str(&self, key: &str) -> Result<&str, VaxError> {
        self.value
            .get(key)
            .and_then(|v| v.as_str())
            .ok_or_else(|| VaxError::InvalidArgument(format!("Missing string argument: {key}")))
    }

    /// Get an optional string argument. Empty strings count as absent.
    pub fn get_str_opt(&self, key: &str) -> Option<&str> {
        self.value
            .get(key)
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
    }

    /// Deserialize the entire arguments into a typed struct.
    pub fn deserialize<T: serde::de::DeserializeOwned>(&self) -> Result<T, VaxError> {
        serde_json::from_value(self.value.clone()).map_err(|e| {
            VaxError::InvalidArgument(format!("Failed to deserialize arguments: {e}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn string_encoded_arguments_are_unpacked() {
        let args = ToolArguments::new(json!("{\"slot_id\": \"s-1\"}"));
        assert_eq!(args.get_str("slot_id").unwrap(), "s-1");
    }

    #[test]
    fn empty_string_and_null_mean_no_arguments() {
        assert_eq!(ToolArguments::new(json!("")).raw(), &json!({}));
        assert_eq!(ToolArguments::new(json!(null)).raw(), &json!({}));
    }

    #[test]
    fn blank_optional_is_none() {
        let args = ToolArguments::new(json!({"start_date": "", "end_date": "2025-06-04"}));
        assert_eq!(args.get_str_opt("start_date"), None);
        assert_eq!(args.get_str_opt("end_date"), Some("2025-06-04"));
        assert!(args.get_str("missing").is_err());
    }
}
