//! Parsing of HTML form fields.
//!
//! Forms arrive as strings; fields are parsed here so that malformed values
//! produce the same error envelope as every other validation failure.

use std::str::FromStr;

use axum::extract::rejection::FormRejection;
use axum::Form;

use crate::error::{PanelError, PanelResult};

/// Unwraps an extracted form, turning axum's rejection into `InvalidRequest`.
pub fn accept<T>(form: Result<Form<T>, FormRejection>) -> PanelResult<T> {
    form.map(|Form(inner)| inner)
        .map_err(|e| PanelError::InvalidRequest(e.body_text()))
}

/// Checkbox-style boolean: `true/false`, `on/off`, `1/0`, `yes/no`.
pub fn flag(name: &str, value: Option<&str>, default: bool) -> PanelResult<bool> {
    let Some(raw) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(default);
    };
    match raw.to_ascii_lowercase().as_str() {
        "true" | "on" | "1" | "yes" => Ok(true),
        "false" | "off" | "0" | "no" => Ok(false),
        _ => Err(PanelError::InvalidRequest(format!(
            "{} must be a boolean, got '{}'",
            name, raw
        ))),
    }
}

/// Parses an optional field, falling back to `default` when absent or blank.
pub fn number<T: FromStr>(name: &str, value: Option<&str>, default: T) -> PanelResult<T> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|_| {
            PanelError::InvalidRequest(format!("{} must be a number, got '{}'", name, raw))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_spellings() {
        for raw in ["true", "ON", "1", "yes"] {
            assert!(flag("conversation", Some(raw), false).unwrap());
        }
        for raw in ["false", "off", "0", "No"] {
            assert!(!flag("conversation", Some(raw), true).unwrap());
        }
        assert!(flag("background", None, true).unwrap());
        assert!(flag("background", Some(" "), true).unwrap());
        assert!(flag("background", Some("maybe"), true).is_err());
    }

    #[test]
    fn test_number_parsing() {
        assert_eq!(number("temperature", Some("0.5"), 0.7f32).unwrap(), 0.5);
        assert_eq!(number("n_predict", None, 128i64).unwrap(), 128);
        let err = number::<i64>("n_predict", Some("lots"), 128).unwrap_err();
        assert!(err.to_string().contains("n_predict"));
    }
}
