//! HTTP Server
//!
//! `POST /` takes a JSON-RPC request and answers with a JSON-RPC response.
//! `GET /health` reports liveness plus the session count and method names.

use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use log::{error, info};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::config::ServerConfig;
use crate::rpc::types::PARSE_ERROR;
use crate::rpc::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, RpcRouter};
use crate::session::SessionManager;

/// Build the axum application
pub fn app(router: Arc<RpcRouter>) -> Router {
    Router::new()
        .route("/", post(handle_rpc))
        .route("/health", get(health))
        .with_state(router)
}

async fn handle_rpc(State(router): State<Arc<RpcRouter>>, body: Bytes) -> Json<JsonRpcResponse> {
    let request: JsonRpcRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            return Json(JsonRpcResponse::failure(
                Value::Null,
                JsonRpcError::new(PARSE_ERROR, format!("Parse error: {}", e)),
            ))
        }
    };

    let id = request.id.clone();
    let method = request.method.clone();

    // Handlers take session locks and `run` blocks while a program is paused
    match tokio::task::spawn_blocking(move || router.dispatch(request)).await {
        Ok(response) => Json(response),
        Err(e) => {
            error!("Handler for {} panicked: {}", method, e);
            Json(JsonRpcResponse::failure(id, JsonRpcError::internal("Internal error")))
        }
    }
}

async fn health(State(router): State<Arc<RpcRouter>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "sessions": router.manager().session_count(),
        "methods": router.methods(),
    }))
}

/// Serve until Ctrl-C, then delete every session so paused runs unwind
pub async fn serve(config: &ServerConfig, router: Arc<RpcRouter>) -> Result<()> {
    let address = config.address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;
    info!("Listening on http://{}", listener.local_addr()?);

    let manager = Arc::clone(router.manager());
    axum::serve(listener, app(router))
        .with_graceful_shutdown(shutdown_signal(manager))
        .await
        .context("HTTP server failed")
}

async fn shutdown_signal(manager: Arc<SessionManager>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }

    info!("Shutdown requested");
    if let Err(e) = tokio::task::spawn_blocking(move || manager.shutdown_all()).await {
        error!("Session shutdown failed: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn test_app() -> (Router, Arc<SessionManager>) {
        let manager = Arc::new(SessionManager::new());
        let router = Arc::new(RpcRouter::new(Arc::clone(&manager)));
        (app(router), manager)
    }

    async fn post_json(app: Router, body: &str) -> Value {
        let request = Request::builder()
            .method("POST")
            .uri("/")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_allocate_over_http() {
        let (app, manager) = test_app();

        let response = post_json(
            app,
            r#"{"jsonrpc":"2.0","method":"allocate","params":{"num_qubits":2},"id":1}"#,
        )
        .await;

        assert_eq!(response["id"], 1);
        let token = response["result"]["token"].as_str().unwrap();
        assert!(manager.session_exists(token));
    }

    #[tokio::test]
    async fn test_parse_error() {
        let (app, _) = test_app();
        let response = post_json(app, "{not json").await;

        assert_eq!(response["error"]["code"], PARSE_ERROR);
        assert_eq!(response["id"], Value::Null);
    }

    #[tokio::test]
    async fn test_health() {
        let (app, manager) = test_app();
        manager
            .allocate(
                Box::new(crate::engine::BasisStateEngine::new(1)),
                crate::session::AllocationMethod::Native,
            )
            .unwrap();

        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["sessions"], 1);
        let methods: Vec<&str> = body["methods"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m.as_str().unwrap())
            .collect();
        assert!(methods.contains(&"run"));
        assert!(methods.contains(&"resume"));
    }
}
