//! Keeps fetched collections in step with the server by re-fetching them
//! wholesale after mutations and push events.

pub mod live;
pub mod slot;

pub use live::LiveResource;
pub use slot::{LatestSlot, Loadable, SlotUpdates, Ticket};
