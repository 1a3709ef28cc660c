//! Task synchronization built on the scheduler's suspend/resume operations

mod limiter;
mod notification;

pub use limiter::TaskLimiter;
pub use notification::Notification;
