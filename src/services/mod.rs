pub mod ai;
pub mod hub;
pub mod portal;
