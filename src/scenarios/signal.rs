//! Signal channels: closing as a broadcast, and closing misused.

use crate::runtime::{Channel, TaskBuilder, TaskContext, TaskResult};

use super::Transcript;

/// A quiesce signal that is handed out but never closed.
fn should_quiesce() -> Channel<()> {
    Channel::unbuffered()
}

pub(super) fn never_closed_signal(
    cx: &TaskContext,
    out: &Transcript,
) -> TaskResult {
    should_quiesce().recv(cx)?;
    out.print("done");
    Ok(())
}

pub(super) fn closed_signal_broadcast(
    cx: &TaskContext,
    out: &Transcript,
) -> TaskResult {
    let quiesce = should_quiesce();
    let stopped = Channel::<usize>::unbuffered();

    for worker in 0..3 {
        let (quiesce, stopped) = (quiesce.clone(), stopped.clone());
        cx.spawn_with(
            TaskBuilder::new().name(format!("worker-{}", worker)),
            move |cx| {
                // Receiving `None` means the signal was closed.
                while quiesce.recv(cx)?.is_some() {}
                stopped.send(cx, worker)
            },
        )?;
    }

    quiesce.close(cx)?;
    for _ in 0..3 {
        if let Some(worker) = stopped.recv(cx)? {
            out.print(format!("worker-{} quiesced", worker));
        }
    }
    out.print("done");
    Ok(())
}

pub(super) fn send_after_close(
    cx: &TaskContext,
    out: &Transcript,
) -> TaskResult {
    let c = Channel::<i64>::bounded(1);
    c.close(cx)?;
    out.print("closed");
    c.send(cx, 1)?;
    out.print("sent");
    Ok(())
}

pub(super) fn double_close(
    cx: &TaskContext,
    out: &Transcript,
) -> TaskResult {
    let c = Channel::<()>::unbuffered();
    c.close(cx)?;
    out.print("closed once");
    c.close(cx)?;
    out.print("closed twice");
    Ok(())
}
