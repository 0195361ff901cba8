//! Voice webhook gateway.
//!
//! Hosts the HTTP endpoints a Twilio number points at, runs each speech turn
//! through the configured chat-completion provider, and answers with TwiML.

pub mod metrics;
pub mod relay;
pub mod server;
pub mod state;
pub mod sweeper;
pub mod twiml;

pub use relay::{ConversationRelay, RelaySettings};
pub use server::{router, start_gateway};
pub use state::GatewayState;
