//! RPC Router
//!
//! A plain table from method name to handler. Each handler parses its
//! parameters into a typed struct and calls the session manager; handlers for
//! `run` block for as long as the program stays paused.

use log::debug;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

use super::types::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
use crate::engine::BasisStateEngine;
use crate::session::{AllocationMethod, MemoryWrites, SessionManager};

/// Largest machine a caller may allocate
pub const MAX_QUBITS: usize = 4096;

type Handler = fn(&SessionManager, Option<Value>) -> Result<Value, JsonRpcError>;

/// Routes JSON-RPC requests to session operations
pub struct RpcRouter {
    manager: Arc<SessionManager>,
    routes: HashMap<&'static str, Handler>,
}

impl RpcRouter {
    pub fn new(manager: Arc<SessionManager>) -> Self {
        let mut routes: HashMap<&'static str, Handler> = HashMap::new();
        routes.insert("allocate", handle_allocate);
        routes.insert("delete", handle_delete);
        routes.insert("describe", handle_describe);
        routes.insert("run", handle_run);
        routes.insert("write-memory", handle_write_memory);
        routes.insert("read-memory", handle_read_memory);
        routes.insert("resume", handle_resume);
        routes.insert("list", handle_list);

        Self { manager, routes }
    }

    pub fn manager(&self) -> &Arc<SessionManager> {
        &self.manager
    }

    /// Registered method names, sorted
    pub fn methods(&self) -> Vec<&'static str> {
        let mut methods: Vec<&'static str> = self.routes.keys().copied().collect();
        methods.sort_unstable();
        methods
    }

    /// Handle one request; may block
    pub fn dispatch(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        if request.jsonrpc != "2.0" {
            return JsonRpcResponse::failure(
                request.id,
                JsonRpcError::invalid_request(format!("Unsupported jsonrpc version {:?}", request.jsonrpc)),
            );
        }
        let Some(handler) = self.routes.get(request.method.as_str()) else {
            return JsonRpcResponse::failure(request.id, JsonRpcError::method_not_found(&request.method));
        };

        debug!("Dispatching {}", request.method);
        match handler(&*self.manager, request.params) {
            Ok(result) => JsonRpcResponse::success(request.id, result),
            Err(error) => {
                debug!("{} failed: {}", request.method, error.message);
                JsonRpcResponse::failure(request.id, error)
            }
        }
    }
}

/// Deserialize request params, treating missing params as `{}`
fn parse_params<T: DeserializeOwned>(params: Option<Value>) -> Result<T, JsonRpcError> {
    let params = params.unwrap_or_else(|| Value::Object(Default::default()));
    serde_json::from_value(params)
        .map_err(|e| JsonRpcError::invalid_params(format!("Invalid params: {}", e)))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AllocateParams {
    num_qubits: usize,
    #[serde(default)]
    allocation_method: AllocationMethod,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TokenParams {
    token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RunParams {
    token: String,
    program: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct WriteMemoryParams {
    token: String,
    memory: MemoryWrites,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ReadMemoryParams {
    token: String,
    region: String,
    indices: Vec<usize>,
}

fn handle_allocate(manager: &SessionManager, params: Option<Value>) -> Result<Value, JsonRpcError> {
    let params: AllocateParams = parse_params(params)?;
    if params.num_qubits > MAX_QUBITS {
        return Err(JsonRpcError::invalid_params(format!(
            "num_qubits must be at most {}",
            MAX_QUBITS
        )));
    }

    let engine = BasisStateEngine::new(params.num_qubits);
    let token = manager.allocate(Box::new(engine), params.allocation_method)?;
    Ok(json!({ "token": token }))
}

fn handle_delete(manager: &SessionManager, params: Option<Value>) -> Result<Value, JsonRpcError> {
    let params: TokenParams = parse_params(params)?;
    manager.delete(&params.token)?;
    Ok(json!({ "token": params.token }))
}

fn handle_describe(manager: &SessionManager, params: Option<Value>) -> Result<Value, JsonRpcError> {
    let params: TokenParams = parse_params(params)?;
    let info = manager.describe(&params.token)?;
    serde_json::to_value(info).map_err(|e| JsonRpcError::internal(e.to_string()))
}

fn handle_run(manager: &SessionManager, params: Option<Value>) -> Result<Value, JsonRpcError> {
    let params: RunParams = parse_params(params)?;
    manager.run(&params.token, &params.program)?;
    Ok(json!({ "token": params.token }))
}

fn handle_write_memory(manager: &SessionManager, params: Option<Value>) -> Result<Value, JsonRpcError> {
    let params: WriteMemoryParams = parse_params(params)?;
    manager.write_memory(&params.token, &params.memory)?;
    Ok(json!({ "token": params.token }))
}

fn handle_read_memory(manager: &SessionManager, params: Option<Value>) -> Result<Value, JsonRpcError> {
    let params: ReadMemoryParams = parse_params(params)?;
    let values = manager.read_memory(&params.token, &params.region, &params.indices)?;
    Ok(json!({ "region": params.region, "values": values }))
}

fn handle_resume(manager: &SessionManager, params: Option<Value>) -> Result<Value, JsonRpcError> {
    let params: TokenParams = parse_params(params)?;
    manager.resume(&params.token)?;
    Ok(json!({ "token": params.token }))
}

fn handle_list(manager: &SessionManager, params: Option<Value>) -> Result<Value, JsonRpcError> {
    if params.as_ref().is_some_and(|p| !p.is_null() && p != &json!({})) {
        return Err(JsonRpcError::invalid_params("list takes no params"));
    }
    Ok(json!({ "sessions": manager.list_sessions() }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::types::{
        INVALID_PARAMS, INVALID_REQUEST, INVALID_STATE_TRANSITION, METHOD_NOT_FOUND, TOKEN_NOT_FOUND,
    };
    use std::thread;
    use std::time::{Duration, Instant};

    fn router() -> RpcRouter {
        RpcRouter::new(Arc::new(SessionManager::new()))
    }

    fn call(router: &RpcRouter, method: &str, params: Value) -> JsonRpcResponse {
        router.dispatch(JsonRpcRequest::new(method, Some(params), 1))
    }

    fn ok(router: &RpcRouter, method: &str, params: Value) -> Value {
        let response = call(router, method, params);
        assert!(response.error.is_none(), "{} failed: {:?}", method, response.error);
        response.result.unwrap()
    }

    fn allocate(router: &RpcRouter, num_qubits: usize) -> String {
        let result = ok(router, "allocate", json!({ "num_qubits": num_qubits }));
        result["token"].as_str().unwrap().to_string()
    }

    #[test]
    fn test_methods() {
        assert_eq!(
            router().methods(),
            vec![
                "allocate",
                "delete",
                "describe",
                "list",
                "read-memory",
                "resume",
                "run",
                "write-memory"
            ]
        );
    }

    #[test]
    fn test_allocate_write_run_read() {
        let router = router();
        let token = allocate(&router, 2);

        ok(&router, "write-memory", json!({ "token": token, "memory": { "ro": [[0, 1]] } }));
        ok(&router, "run", json!({ "token": token, "program": "DECLARE seen BIT\nMOVE seen ro[0]" }));

        let info = ok(&router, "describe", json!({ "token": token }));
        assert_eq!(info["state"], "ready");
        assert_eq!(info["num_qubits"], 2);
        assert_eq!(info["engine_type"], "basis-state");
        assert_eq!(info["metadata"]["allocation_method"], "native");

        let read = ok(&router, "read-memory", json!({ "token": token, "region": "seen", "indices": [0] }));
        assert_eq!(read["values"], json!([1]));
    }

    #[test]
    fn test_wait_and_resume_over_rpc() {
        let router = Arc::new(router());
        let token = allocate(&router, 1);

        let runner = {
            let router = Arc::clone(&router);
            let token = token.clone();
            thread::spawn(move || call(&router, "run", json!({ "token": token, "program": "WAIT\nX 0" })))
        };

        let deadline = Instant::now() + Duration::from_secs(5);
        while ok(&router, "describe", json!({ "token": token }))["state"] != "waiting" {
            assert!(Instant::now() < deadline, "session never paused");
            thread::sleep(Duration::from_millis(5));
        }

        ok(&router, "resume", json!({ "token": token }));
        let response = runner.join().unwrap();
        assert!(response.error.is_none());
    }

    #[test]
    fn test_error_mapping() {
        let router = router();
        let token = allocate(&router, 1);

        let response = call(&router, "resume", json!({ "token": token }));
        assert_eq!(response.error.unwrap().code, INVALID_STATE_TRANSITION);

        ok(&router, "delete", json!({ "token": token }));
        let response = call(&router, "delete", json!({ "token": token }));
        assert_eq!(response.error.unwrap().code, TOKEN_NOT_FOUND);

        let response = call(&router, "describe", json!({ "token": "garbage" }));
        assert_eq!(response.error.unwrap().code, INVALID_PARAMS);
    }

    #[test]
    fn test_bad_requests() {
        let router = router();

        let response = call(&router, "teleport", json!({}));
        assert_eq!(response.error.unwrap().code, METHOD_NOT_FOUND);

        let response = call(&router, "allocate", json!({ "qubits": 2 }));
        assert_eq!(response.error.unwrap().code, INVALID_PARAMS);

        let response = call(&router, "allocate", json!({ "num_qubits": MAX_QUBITS + 1 }));
        assert_eq!(response.error.unwrap().code, INVALID_PARAMS);

        let response = call(&router, "list", json!({ "verbose": true }));
        assert_eq!(response.error.unwrap().code, INVALID_PARAMS);

        let mut request = JsonRpcRequest::new("list", None, 1);
        request.jsonrpc = "1.0".to_string();
        assert_eq!(router.dispatch(request).error.unwrap().code, INVALID_REQUEST);
    }

    #[test]
    fn test_list() {
        let router = router();
        allocate(&router, 1);
        allocate(&router, 1);

        let response = router.dispatch(JsonRpcRequest::new("list", None, "abc"));
        assert_eq!(response.id, json!("abc"));
        assert_eq!(response.result.unwrap()["sessions"].as_array().unwrap().len(), 2);
    }
}
