//! Real-time appointment hub: one long-lived duplex connection per process,
//! shared by every view that wants push events.

pub mod client;
pub mod errors;
#[cfg(test)]
pub(crate) mod memory;
pub mod protocol;
pub mod transport;

pub use client::{ConnectionState, EventHandler, HandlerId, HubClient, Subscription};
pub use errors::HubError;
pub use transport::{HubConnector, HubTransport, WebSocketConnector};

pub const APPOINTMENT_CREATED: &str = "AppointmentCreated";
pub const APPOINTMENT_CANCELLED: &str = "AppointmentCancelled";
