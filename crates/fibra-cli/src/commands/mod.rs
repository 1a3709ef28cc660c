pub mod block;
pub mod limit;
pub mod ping;
pub mod timers;
