//! JSON-RPC Types

use serde::{Deserialize, Serialize};

use crate::session::SessionError;

pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;

pub const TOKEN_NOT_FOUND: i32 = -32001;
pub const INVALID_STATE_TRANSITION: i32 = -32002;
pub const SESSION_DYING: i32 = -32003;
pub const WAIT_TIMED_OUT: i32 = -32004;
pub const MAX_SESSIONS_REACHED: i32 = -32005;
pub const ENGINE_ERROR: i32 = -32010;

/// JSON-RPC request structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
    #[serde(default)]
    pub id: serde_json::Value,
}

impl JsonRpcRequest {
    pub fn new(method: &str, params: Option<serde_json::Value>, id: impl Into<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
            id: id.into(),
        }
    }
}

/// JSON-RPC response structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: serde_json::Value,
}

impl JsonRpcResponse {
    pub fn success(id: serde_json::Value, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn failure(id: serde_json::Value, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(error),
            id,
        }
    }
}

/// JSON-RPC error structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl JsonRpcError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(INVALID_REQUEST, message)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(METHOD_NOT_FOUND, format!("Method not found: {}", method))
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(INVALID_PARAMS, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(INTERNAL_ERROR, message)
    }
}

impl From<SessionError> for JsonRpcError {
    fn from(err: SessionError) -> Self {
        let (code, kind) = match &err {
            SessionError::TokenNotFound(_) => (TOKEN_NOT_FOUND, "token_not_found"),
            SessionError::MalformedToken(_) => (INVALID_PARAMS, "malformed_token"),
            SessionError::TokenCollision(_) => (INTERNAL_ERROR, "token_collision"),
            SessionError::InvalidStateTransition { .. } => {
                (INVALID_STATE_TRANSITION, "invalid_state_transition")
            }
            SessionError::SessionDying(_) => (SESSION_DYING, "session_dying"),
            SessionError::WaitTimedOut { .. } => (WAIT_TIMED_OUT, "wait_timed_out"),
            SessionError::MaxSessionsReached(_) => (MAX_SESSIONS_REACHED, "max_sessions_reached"),
            SessionError::Engine(_) => (ENGINE_ERROR, "engine_error"),
        };

        Self {
            code,
            message: err.to_string(),
            data: Some(serde_json::json!({ "kind": kind })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{SessionStatus, Token};

    #[test]
    fn test_request_without_params() {
        let request: JsonRpcRequest =
            serde_json::from_str(r#"{"jsonrpc":"2.0","method":"list","id":7}"#).unwrap();
        assert_eq!(request.method, "list");
        assert!(request.params.is_none());
        assert_eq!(request.id, serde_json::json!(7));
    }

    #[test]
    fn test_failure_omits_result() {
        let response = JsonRpcResponse::failure(serde_json::json!(1), JsonRpcError::method_not_found("bogus"));
        let value = serde_json::to_value(&response).unwrap();

        assert!(value.get("result").is_none());
        assert_eq!(value["error"]["code"], METHOD_NOT_FOUND);
        assert_eq!(value["error"]["message"], "Method not found: bogus");
    }

    #[test]
    fn test_session_error_codes() {
        let err = JsonRpcError::from(SessionError::SessionDying(Token::generate()));
        assert_eq!(err.code, SESSION_DYING);
        assert_eq!(err.data.unwrap()["kind"], "session_dying");

        let err = JsonRpcError::from(SessionError::InvalidStateTransition {
            from: SessionStatus::Waiting,
            to: SessionStatus::Running,
        });
        assert_eq!(err.code, INVALID_STATE_TRANSITION);
        assert!(err.message.contains("waiting"));
    }
}
