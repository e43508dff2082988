//! Extgate Gateway — sessions, trust guardrail, and the RPC surface

pub mod auth;
pub mod builtin;
pub mod gateway;
pub mod guardrail;
pub mod rpc;
pub mod session;

pub use auth::{Authenticator, Credentials, Identity, TokenAuthenticator};
pub use gateway::{Gateway, GatewayBuilder};
pub use guardrail::{SignalProvider, TrustGuardrail, VeracitySignals, TRUST_THRESHOLD, WARNING_MARKER};
pub use rpc::{route_rpc, to_response, ConnectionContext, RpcFailure, RpcResult};
pub use session::{ScratchpadHandle, Session, SessionInfo, SessionManager};
