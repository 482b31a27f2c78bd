//! Completion endpoint response body.

use serde::{Deserialize, Serialize};

/// `{ status, text, error? }`. Only `text` is consumed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseApi {
    pub status: String,
    pub text: String,
    #[serde(default)]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_field_is_optional() {
        let parsed: ResponseApi =
            serde_json::from_str(r#"{"status":"success","text":"Lorem ipsum."}"#).unwrap();
        assert_eq!(parsed.text, "Lorem ipsum.");
        assert!(parsed.error.is_none());
    }

    #[test]
    fn test_text_is_required() {
        let parsed = serde_json::from_str::<ResponseApi>(r#"{"status":"error","error":"x"}"#);
        assert!(parsed.is_err());
    }
}
