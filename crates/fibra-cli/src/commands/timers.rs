//! `fibra timers`: timer fan-out.

use anyhow::Context;
use fibra::Scheduler;
use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

pub fn execute(tasks: usize, delay: Duration, quiet: bool) -> anyhow::Result<()> {
    let scheduler = Scheduler::new().context("failed to create scheduler")?;
    let woken = Rc::new(Cell::new(0usize));

    for i in 0..tasks {
        let s = scheduler.handle();
        let woken = Rc::clone(&woken);
        scheduler.spawn(async move {
            if let Err(e) = s.sleep(delay).await {
                tracing::error!(task = i, error = %e, "sleep failed");
                return;
            }
            woken.set(woken.get() + 1);
            if !quiet {
                println!("{}", i);
            }
        });
    }

    let start = Instant::now();
    scheduler.run().context("scheduler loop failed")?;

    println!(
        "{} of {} tasks woke after {:?} (delay {:?})",
        woken.get(),
        tasks,
        start.elapsed(),
        delay
    );
    anyhow::ensure!(woken.get() == tasks, "{} tasks never woke", tasks - woken.get());
    Ok(())
}
