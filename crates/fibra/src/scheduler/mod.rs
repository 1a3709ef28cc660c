//! Task Scheduler
//!
//! Cooperative, single-threaded reactor. Tasks run on the thread that calls
//! [`Scheduler::run`] and give up control only at the suspension points the
//! scheduler provides: I/O readiness, timers, external wakes and yields.

mod builder;
mod reactor;
mod task;
mod timer;
mod unblock;
mod wait;

pub use builder::{SchedulerBuilder, SchedulerOptions};
pub use reactor::{Scheduler, SchedulerHandle, SchedulerStats};
pub use task::{TaskHandle, TaskId, TaskState};
pub use unblock::{Payload, Unblocker, Wake};
pub use wait::WaitKey;
