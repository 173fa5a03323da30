pub mod config;
pub mod models;
pub mod pages;
pub mod responses;
pub mod services;
pub mod session;
pub mod state;
pub mod sync;
pub mod utils;

pub use state::AppState;
