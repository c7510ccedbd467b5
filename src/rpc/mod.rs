//! RPC Module
//!
//! JSON-RPC 2.0 front door to the session manager.

pub mod router;
pub mod types;

pub use router::RpcRouter;
pub use types::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
