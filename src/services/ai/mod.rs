pub mod client;
pub mod errors;

pub use client::{AiClient, Diagnosis, ScanImage};
pub use errors::AiError;
