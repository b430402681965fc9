//! Listener fan-out

pub mod hub;
pub mod replay;

pub use hub::{BroadcastHub, HubStats, SubscriberId, Subscription};
pub use replay::ReplayBuffer;
