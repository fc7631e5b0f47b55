//! JSON-RPC 2.0 request handling: envelopes, dispatch and resource reads.

pub mod dispatcher;
pub mod protocol;
pub mod resources;

pub use dispatcher::Dispatcher;
pub use protocol::{Reply, RpcError, RpcId, RpcRequest, RpcResponse, JSONRPC_VERSION};
pub use resources::{read_resource, ResourceTemplate, ResourceUri};
