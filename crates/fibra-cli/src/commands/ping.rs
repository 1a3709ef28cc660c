//! `fibra ping`: two tasks exchange messages over a socket pair, parking on
//! readiness between reads.

use anyhow::{bail, Context};
use fibra::{Events, Scheduler, SchedulerHandle};
use std::cell::Cell;
use std::io::{self, Read, Write};
use std::os::unix::net::UnixStream;
use std::rc::Rc;
use std::time::Duration;

async fn recv(
    scheduler: &SchedulerHandle,
    stream: &mut UnixStream,
    timeout: Duration,
) -> anyhow::Result<String> {
    let mut buf = [0u8; 64];
    loop {
        match stream.read(&mut buf) {
            Ok(0) => bail!("peer closed the connection"),
            Ok(n) => return Ok(String::from_utf8_lossy(&buf[..n]).into_owned()),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                let events = scheduler
                    .wait_for_io(&*stream, Events::READABLE, Some(timeout))
                    .await?;
                if events.is_empty() {
                    bail!("timed out after {:?} waiting for the peer", timeout);
                }
            }
            Err(e) => return Err(e).context("read failed"),
        }
    }
}

async fn ping(
    scheduler: SchedulerHandle,
    mut stream: UnixStream,
    rounds: usize,
    timeout: Duration,
    done: Rc<Cell<usize>>,
) -> anyhow::Result<()> {
    for round in 0..rounds {
        stream.write_all(format!("ping {}", round).as_bytes())?;
        let reply = recv(&scheduler, &mut stream, timeout).await?;
        println!("pinger got: {}", reply);
        done.set(done.get() + 1);
    }
    Ok(())
}

async fn pong(
    scheduler: SchedulerHandle,
    mut stream: UnixStream,
    rounds: usize,
    timeout: Duration,
) -> anyhow::Result<()> {
    for _ in 0..rounds {
        let message = recv(&scheduler, &mut stream, timeout).await?;
        println!("ponger got: {}", message);
        stream.write_all(message.replacen("ping", "pong", 1).as_bytes())?;
    }
    Ok(())
}

pub fn execute(rounds: usize, timeout: Duration) -> anyhow::Result<()> {
    let scheduler = Scheduler::new().context("failed to create scheduler")?;
    let (left, right) = UnixStream::pair().context("failed to create socket pair")?;
    left.set_nonblocking(true)?;
    right.set_nonblocking(true)?;

    let done = Rc::new(Cell::new(0usize));

    let s = scheduler.handle();
    scheduler.spawn(async move {
        if let Err(e) = pong(s, right, rounds, timeout).await {
            tracing::error!(error = %e, "ponger failed");
        }
    });

    let s = scheduler.handle();
    let d = Rc::clone(&done);
    scheduler.spawn(async move {
        if let Err(e) = ping(s, left, rounds, timeout, d).await {
            tracing::error!(error = %e, "pinger failed");
        }
    });

    scheduler.run().context("scheduler loop failed")?;
    anyhow::ensure!(
        done.get() == rounds,
        "only {} of {} round trips completed",
        done.get(),
        rounds
    );
    println!("{} round trips completed", rounds);
    Ok(())
}
