pub mod client;
pub mod errors;
#[cfg(test)]
pub mod mock_portal;
pub mod service;

pub use client::PortalClient;
pub use errors::ApiError;
pub use service::PortalApi;
