//! Two workers summing halves of a slice into one channel.

use crate::runtime::{Channel, Halt, TaskContext, TaskResult};

use super::Transcript;

const NUMBERS: [i64; 6] = [7, 2, 8, -9, 4, 0];

/// Spawn one summing worker per half of [`NUMBERS`], both sending on `out`.
fn spawn_halves(
    cx: &TaskContext,
    out: &Channel<i64>,
) -> TaskResult {
    let (left, right) = NUMBERS.split_at(NUMBERS.len() / 2);
    for half in [left, right] {
        let part = half.to_vec();
        let out = out.clone();
        cx.spawn(move |cx| out.send(cx, part.iter().sum()))?;
    }
    Ok(())
}

/// Receive from `c`; a closed channel reads as zero.
fn receive(
    cx: &TaskContext,
    c: &Channel<i64>,
) -> Result<i64, Halt> {
    Ok(c.recv(cx)?.unwrap_or_default())
}

pub(super) fn fan_in_sum(
    cx: &TaskContext,
    out: &Transcript,
) -> TaskResult {
    let c = Channel::unbuffered();
    spawn_halves(cx, &c)?;

    let x = receive(cx, &c)?;
    let y = receive(cx, &c)?;
    out.print(format!("{} {} {}", x, y, x + y));
    Ok(())
}

pub(super) fn fan_in_extra_receive(
    cx: &TaskContext,
    out: &Transcript,
) -> TaskResult {
    let c = Channel::unbuffered();
    spawn_halves(cx, &c)?;

    let x = receive(cx, &c)?;
    let y = receive(cx, &c)?;
    out.print(format!("{} {} {}", x, y, x + y));
    // Both workers are done; nobody is left to send.
    let z = receive(cx, &c)?;
    out.print(format!("{}", z));
    Ok(())
}

fn report(
    cx: &TaskContext,
    c: &Channel<i64>,
    out: &Transcript,
) -> TaskResult {
    for _ in 0..2 {
        let x = receive(cx, c)?;
        out.print(format!("received {} from channel", x));
    }
    Ok(())
}

pub(super) fn fan_in_report_twice(
    cx: &TaskContext,
    out: &Transcript,
) -> TaskResult {
    let c = Channel::unbuffered();
    spawn_halves(cx, &c)?;

    report(cx, &c, out)?;
    report(cx, &c, out)
}

pub(super) fn inline_closures(
    cx: &TaskContext,
    out: &Transcript,
) -> TaskResult {
    let c = Channel::<i64>::unbuffered();
    for n in [3, 4] {
        let c = c.clone();
        cx.spawn(move |cx| c.send(cx, n * n))?;
    }

    let x = receive(cx, &c)?;
    let y = receive(cx, &c)?;
    out.print(format!("{} {} {}", x, y, x + y));
    Ok(())
}

/// Workers send their sum and then wait on `done`, which nobody ever
/// writes. Only the main-exit policy lets this program finish.
pub(super) fn main_exit(
    cx: &TaskContext,
    out: &Transcript,
) -> TaskResult {
    let c = Channel::<i64>::unbuffered();
    let done = Channel::<bool>::unbuffered();

    let (left, right) = NUMBERS.split_at(NUMBERS.len() / 2);
    for half in [left, right] {
        let part = half.to_vec();
        let c = c.clone();
        let done = done.clone();
        cx.spawn(move |cx| {
            c.send(cx, part.iter().sum())?;
            done.recv(cx)?;
            Ok(())
        })?;
    }

    let x = receive(cx, &c)?;
    let y = receive(cx, &c)?;
    out.print(format!("{} {} {}", x, y, x + y));
    Ok(())
}
