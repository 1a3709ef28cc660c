//! Fibra: cooperative single-threaded task scheduling
//!
//! This crate provides:
//! - **Scheduler**: reactor loop multiplexing I/O readiness, timers and
//!   cross-thread wakes onto one thread (`scheduler` module)
//! - **Indexed heap**: min-heap with O(log n) removal by handle, used for
//!   timer deadlines (`heap` module)
//! - **Sync**: a single-waiter `Notification` and a bounded-concurrency
//!   `TaskLimiter` built on the scheduler (`sync` module)
//!
//! # Example
//!
//! ```rust,ignore
//! use fibra::Scheduler;
//! use std::time::Duration;
//!
//! let scheduler = Scheduler::new()?;
//! for i in 0..3 {
//!     let s = scheduler.handle();
//!     scheduler.spawn(async move {
//!         s.sleep(Duration::from_millis(100 * i)).await.unwrap();
//!         println!("task {i} woke up");
//!     });
//! }
//! scheduler.run()?;
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

#[cfg(not(unix))]
compile_error!("fibra waits on unix file descriptors and only builds on unix targets");

// ============================================================================
// Core Modules
// ============================================================================

/// Time source used for deadline arithmetic
pub mod clock;

/// Scheduler errors
pub mod error;

/// Indexed binary min-heap
pub mod heap;

/// Task scheduler and reactor loop
pub mod scheduler;

/// Readiness polling backends
pub mod selector;

/// Task synchronization primitives
pub mod sync;

mod util;

// ============================================================================
// Re-exports
// ============================================================================

pub use clock::{Clock, MonotonicClock};
pub use error::{Result, SchedulerError};
pub use heap::{HeapElement, IndexedMinHeap};
pub use scheduler::{
    Payload, Scheduler, SchedulerBuilder, SchedulerHandle, SchedulerOptions, SchedulerStats,
    TaskHandle, TaskId, TaskState, Unblocker, WaitKey, Wake,
};
pub use selector::{Events, PollSelector, Selector, SelectorWaker};
pub use sync::{Notification, TaskLimiter};
