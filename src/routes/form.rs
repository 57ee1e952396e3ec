//! Request body parsing for form posts.
//!
//! Browsers post `application/x-www-form-urlencoded`, API clients may post
//! JSON objects. Both end up as a flat name/value map.

use std::collections::BTreeMap;

use axum::body::Body;
use axum::http::{HeaderMap, header};

use super::error::RouteError;

pub type FormData = BTreeMap<String, String>;

const MAX_BODY_BYTES: usize = 64 * 1024;

pub async fn read_form(headers: &HeaderMap, body: Body) -> Result<FormData, RouteError> {
    let bytes = axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|_| RouteError::bad_request("Request body is too large"))?;

    if bytes.is_empty() {
        return Ok(FormData::new());
    }

    if is_json(headers) {
        parse_json(&bytes)
    } else {
        Ok(url::form_urlencoded::parse(&bytes).into_owned().collect())
    }
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/json"))
}

fn parse_json(bytes: &[u8]) -> Result<FormData, RouteError> {
    let value: serde_json::Value =
        serde_json::from_slice(bytes).map_err(|_| RouteError::bad_request("Invalid JSON body"))?;
    let serde_json::Value::Object(object) = value else {
        return Err(RouteError::bad_request("Request body must be a JSON object"));
    };

    Ok(object
        .into_iter()
        .filter_map(|(key, value)| match value {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some((key, s)),
            other => Some((key, other.to_string())),
        })
        .collect())
}

/// Non-empty trimmed value of `name`.
pub fn field<'a>(form: &'a FormData, name: &str) -> Option<&'a str> {
    form.get(name).map(|v| v.trim()).filter(|v| !v.is_empty())
}
