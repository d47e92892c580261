//! Worker wire protocol
//!
//! One JSON document per line in each direction. The coordinator sends
//! `{id, method, params}`; the worker answers with `{id, result}` or
//! `{id, error: {message}}`, echoing the id verbatim. Responses may arrive in
//! any order.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

/// Correlation id chosen by the coordinator
pub type RequestId = u64;

/// Request sent from the coordinator to the worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerRequest {
    pub id: RequestId,
    pub method: String,
    #[serde(default)]
    pub params: JsonValue,
}

impl WorkerRequest {
    pub fn new(id: RequestId, method: impl Into<String>, params: JsonValue) -> Self {
        Self {
            id,
            method: method.into(),
            params,
        }
    }
}

/// Response sent from the worker back to the coordinator
///
/// The id is kept as a raw JSON value so that a worker echoing something we
/// never issued (a string, `null`) is still parsed and can be reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerResponse {
    #[serde(default)]
    pub id: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<WorkerError>,
}

impl WorkerResponse {
    /// Build a successful response
    pub fn success(id: RequestId, result: JsonValue) -> Self {
        Self {
            id: Some(JsonValue::from(id)),
            result: Some(result),
            error: None,
        }
    }

    /// Build an error response
    pub fn failure(id: RequestId, error: WorkerError) -> Self {
        Self {
            id: Some(JsonValue::from(id)),
            result: None,
            error: Some(error),
        }
    }

    /// The numeric request id, if the worker echoed one we could have issued
    pub fn request_id(&self) -> Option<RequestId> {
        self.id.as_ref().and_then(JsonValue::as_u64)
    }

    /// Collapse the response into the outcome delivered to the caller.
    /// An `error` member wins over `result`; a response with neither is a
    /// successful `null`.
    pub fn into_outcome(self) -> Result<JsonValue, WorkerError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.result.unwrap_or(JsonValue::Null)),
        }
    }
}

/// Error reported by the worker for a single request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i64>,
    /// Free-form detail such as a traceback
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonValue>,
}

impl WorkerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            data: None,
        }
    }
}

impl fmt::Display for WorkerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} (code {})", self.message, code),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for WorkerError {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_wire_shape() {
        let request = WorkerRequest::new(7, "cas_evaluate", json!({"expr": "2+2"}));
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({"id": 7, "method": "cas_evaluate", "params": {"expr": "2+2"}})
        );
    }

    #[test]
    fn test_response_with_error_and_traceback() {
        let raw = r#"{"id": 3, "error": {"code": -32603, "message": "boom", "data": "Traceback..."}}"#;
        let response: WorkerResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(response.request_id(), Some(3));

        let error = response.into_outcome().unwrap_err();
        assert_eq!(error.message, "boom");
        assert_eq!(error.code, Some(-32603));
        assert_eq!(error.to_string(), "boom (code -32603)");
    }

    #[test]
    fn test_response_without_result_is_null() {
        let response: WorkerResponse = serde_json::from_str(r#"{"id": 1}"#).unwrap();
        assert_eq!(response.into_outcome().unwrap(), JsonValue::Null);
    }

    #[test]
    fn test_non_numeric_id_is_not_a_request_id() {
        let response: WorkerResponse =
            serde_json::from_str(r#"{"id": "abc", "result": 1}"#).unwrap();
        assert_eq!(response.request_id(), None);

        let response: WorkerResponse =
            serde_json::from_str(r#"{"id": null, "result": 1}"#).unwrap();
        assert_eq!(response.request_id(), None);
    }
}
