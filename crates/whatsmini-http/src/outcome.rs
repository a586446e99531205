//! Response outcome of a delivered HTTP request.

use serde_json::Value;

/// Raw bodies longer than this are truncated when used as a failure detail.
const MAX_DETAIL_CHARS: usize = 200;

/// Response body, parsed as JSON when possible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseBody {
    Json(Value),
    /// Body that was not valid JSON, kept verbatim.
    Raw(String),
}

/// A well-formed HTTP response, successful or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpOutcome {
    pub status: u16,
    /// `true` iff the status is 2xx.
    pub ok: bool,
    pub body: ResponseBody,
}

impl HttpOutcome {
    /// Build an outcome from a status code and the full body text.
    #[must_use]
    pub fn from_text(status: u16, text: String) -> Self {
        let body = match serde_json::from_str(&text) {
            Ok(value) => ResponseBody::Json(value),
            Err(_) => ResponseBody::Raw(text),
        };
        Self {
            status,
            ok: (200..300).contains(&status),
            body,
        }
    }

    /// Parsed JSON body, if the body was JSON.
    #[must_use]
    pub const fn json(&self) -> Option<&Value> {
        match &self.body {
            ResponseBody::Json(value) => Some(value),
            ResponseBody::Raw(_) => None,
        }
    }

    /// String field of a JSON object body.
    #[must_use]
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.json()?.get(key)?.as_str()
    }

    /// User-facing failure detail.
    ///
    /// Priority: the body's `detail` field, then the raw body, then the status code.
    #[must_use]
    pub fn detail(&self) -> String {
        match &self.body {
            ResponseBody::Json(value) => match value.get("detail") {
                Some(Value::String(s)) if !s.trim().is_empty() => return s.clone(),
                Some(Value::String(_) | Value::Null) | None => {}
                Some(structured) => return structured.to_string(),
            },
            ResponseBody::Raw(raw) => {
                let raw = raw.trim();
                if !raw.is_empty() {
                    return raw.chars().take(MAX_DETAIL_CHARS).collect();
                }
            }
        }
        format!("HTTP {}", self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_json_is_kept_raw() {
        let outcome = HttpOutcome::from_text(502, "<html>Bad Gateway</html>".into());
        assert!(!outcome.ok);
        assert_eq!(outcome.body, ResponseBody::Raw("<html>Bad Gateway</html>".into()));
    }

    #[test]
    fn test_empty_body_is_raw() {
        let outcome = HttpOutcome::from_text(204, String::new());
        assert!(outcome.ok);
        assert_eq!(outcome.body, ResponseBody::Raw(String::new()));
    }

    #[test]
    fn test_detail_priority() {
        let structured = HttpOutcome::from_text(400, r#"{"detail":"Username taken"}"#.into());
        assert_eq!(structured.detail(), "Username taken");

        let list = HttpOutcome::from_text(422, r#"{"detail":[{"msg":"field required"}]}"#.into());
        assert_eq!(list.detail(), r#"[{"msg":"field required"}]"#);

        let raw = HttpOutcome::from_text(500, "Internal Server Error".into());
        assert_eq!(raw.detail(), "Internal Server Error");

        let empty_json = HttpOutcome::from_text(403, "{}".into());
        assert_eq!(empty_json.detail(), "HTTP 403");

        let blank = HttpOutcome::from_text(503, "  ".into());
        assert_eq!(blank.detail(), "HTTP 503");
    }

    #[test]
    fn test_raw_detail_is_truncated() {
        let outcome = HttpOutcome::from_text(500, "x".repeat(1_000));
        assert_eq!(outcome.detail().len(), MAX_DETAIL_CHARS);
    }

    #[test]
    fn test_str_field() {
        let outcome = HttpOutcome::from_text(200, r#"{"url":"/files/a.png","n":1}"#.into());
        assert_eq!(outcome.str_field("url"), Some("/files/a.png"));
        assert_eq!(outcome.str_field("n"), None);
        assert_eq!(outcome.str_field("missing"), None);
    }
}
