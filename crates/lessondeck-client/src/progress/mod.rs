//! Progress subscriptions over socket or polling.

mod client;
mod export;
mod messages;

pub use client::{ProgressSubscriptionClient, SocketError};
pub use export::ExportProgressClient;
pub use messages::{ClientMessage, ServerMessage};
