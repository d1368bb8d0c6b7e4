//! The MCP protocol layer: JSON-RPC envelope types, the protocol-session
//! registry, and the method dispatcher.
//!
//! Transport concerns (content negotiation, SSE framing, headers) live in
//! the gateway crate; this crate turns one parsed envelope into at most
//! one response.

pub mod dispatcher;
pub mod protocol;
pub mod registry;

pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use protocol::{Envelope, JsonRpcError, JsonRpcResponse};
pub use registry::{ProtocolSession, SessionRegistry};

/// The protocol revision this server implements.
pub const PROTOCOL_VERSION: &str = "2024-11-05";
