//! `fibra limit`: bounded admission through a TaskLimiter.

use anyhow::Context;
use fibra::{Scheduler, TaskLimiter};
use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

#[derive(Default)]
struct Concurrency {
    running: Cell<usize>,
    peak: Cell<usize>,
    finished: Cell<usize>,
}

pub fn execute(limit: usize, tasks: usize, work: Duration) -> anyhow::Result<()> {
    let scheduler = Scheduler::new().context("failed to create scheduler")?;
    let gauge = Rc::new(Concurrency::default());
    let effective_limit = Rc::new(Cell::new(limit));

    let s = scheduler.handle();
    let g = Rc::clone(&gauge);
    let effective = Rc::clone(&effective_limit);
    scheduler.spawn(async move {
        let limiter = match TaskLimiter::new(&s, limit) {
            Ok(limiter) => limiter,
            Err(e) => {
                tracing::error!(error = %e, "failed to create limiter");
                return;
            }
        };
        effective.set(limiter.limit());

        for i in 0..tasks {
            let s2 = s.clone();
            let g2 = Rc::clone(&g);
            let admitted = limiter
                .schedule(async move {
                    g2.running.set(g2.running.get() + 1);
                    g2.peak.set(g2.peak.get().max(g2.running.get()));
                    println!("task {} started (running: {})", i, g2.running.get());

                    if let Err(e) = s2.sleep(work).await {
                        tracing::error!(task = i, error = %e, "body failed");
                    }

                    g2.running.set(g2.running.get() - 1);
                    g2.finished.set(g2.finished.get() + 1);
                })
                .await;

            if let Err(e) = admitted {
                tracing::error!(task = i, error = %e, "admission failed");
                return;
            }
        }
    });

    scheduler.run().context("scheduler loop failed")?;

    println!(
        "{} tasks finished, peak concurrency {} (limit {})",
        gauge.finished.get(),
        gauge.peak.get(),
        effective_limit.get()
    );
    anyhow::ensure!(
        gauge.peak.get() <= effective_limit.get(),
        "limit exceeded: peak {}",
        gauge.peak.get()
    );
    anyhow::ensure!(gauge.finished.get() == tasks, "not every task finished");
    Ok(())
}
