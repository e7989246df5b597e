//! Lookup orchestration and its HTTP surface.

pub mod fallback;
pub mod lookup;
pub mod server;

pub use lookup::{GatewayStats, LookupOutcome, LookupReply, LookupRequest, PickupLookupGateway};
pub use server::{build_router, GatewayServer, ServerState};
