//! `fibra block`: an OS thread watches a shared counter and wakes a
//! blocked task once every simulated request has finished.

use anyhow::Context;
use fibra::{Payload, Scheduler, TaskState};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const MONITOR_INTERVAL: Duration = Duration::from_millis(50);

pub fn execute(requests: usize, work: Duration) -> anyhow::Result<()> {
    let scheduler = Scheduler::new().context("failed to create scheduler")?;
    let completed = Arc::new(Mutex::new(0usize));

    let s = scheduler.handle();
    let unblocker = scheduler.unblocker();
    let counter = Arc::clone(&completed);
    let watcher = scheduler.spawn(async move {
        let Some(me) = s.current_task() else {
            return;
        };

        let monitor = thread::spawn(move || loop {
            let done = *counter.lock();
            println!("completed: {}", done);
            if done >= requests {
                let payload: Payload = Box::new(done);
                if let Err(e) = unblocker.unblock_with("all requests finished", me, Some(payload)) {
                    tracing::error!(error = %e, "failed to wake watcher");
                }
                break;
            }
            thread::sleep(MONITOR_INTERVAL);
        });

        match s.block("waiting for monitor", None).await {
            Ok(wake) => {
                let total = wake
                    .into_payload()
                    .and_then(|payload| payload.downcast::<usize>().ok())
                    .map(|total| *total);
                println!("watcher woke: {:?} requests reported", total);
            }
            Err(e) => tracing::error!(error = %e, "watcher failed to block"),
        }

        if monitor.join().is_err() {
            tracing::error!("monitor thread panicked");
        }
    });

    for i in 0..requests {
        let s = scheduler.handle();
        let completed = Arc::clone(&completed);
        // Spread completions out a little
        let latency = work + Duration::from_millis((i % 5) as u64 * 10);
        scheduler.spawn(async move {
            if let Err(e) = s.sleep(latency).await {
                tracing::error!(request = i, error = %e, "request failed");
                return;
            }
            *completed.lock() += 1;
        });
    }

    scheduler.run().context("scheduler loop failed")?;
    anyhow::ensure!(
        watcher.state() == TaskState::Completed,
        "watcher ended in state {:?}",
        watcher.state()
    );
    Ok(())
}
