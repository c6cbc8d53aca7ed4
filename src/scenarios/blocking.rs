//! Programs whose outcome hinges on which side of a channel blocks first.

use std::time::Duration;

use crate::runtime::{Channel, TaskContext, TaskResult};

use super::Transcript;

/// Stand-in for the seconds-long sleeps of the classic programs.
const NAP: Duration = Duration::from_millis(20);

/// The worker receives the int first, main sends the string first.
pub(super) fn out_of_order(
    cx: &TaskContext,
    out: &Transcript,
) -> TaskResult {
    let c_int = Channel::<i64>::unbuffered();
    let c_str = Channel::<String>::unbuffered();

    let (ints, strs, printer) = (c_int.clone(), c_str.clone(), out.clone());
    cx.spawn(move |cx| {
        if let Some(n) = ints.recv(cx)? {
            printer.print(n.to_string());
        }
        if let Some(s) = strs.recv(cx)? {
            printer.print(s);
        }
        Ok(())
    })?;

    c_str.send(cx, "hello".to_string())?;
    c_int.send(cx, 1)?;
    cx.sleep(NAP)
}

pub(super) fn no_live_goroutines(
    cx: &TaskContext,
    out: &Transcript,
) -> TaskResult {
    let messages = Channel::<String>::unbuffered();

    let (rx, printer) = (messages.clone(), out.clone());
    cx.spawn(move |cx| {
        printer.print("Try to receive message");
        rx.recv(cx)?;
        printer.print("Receive message");
        Ok(())
    })?;

    out.print("Try to receive message");
    messages.recv(cx)?;
    out.print("Receive message");
    Ok(())
}

pub(super) fn sleeping_sender(
    cx: &TaskContext,
    out: &Transcript,
) -> TaskResult {
    let messages = Channel::<String>::unbuffered();

    let tx = messages.clone();
    cx.spawn(move |cx| {
        cx.sleep(NAP)?;
        tx.send(cx, "Hello".to_string())
    })?;

    if let Some(msg) = messages.recv(cx)? {
        out.print(msg);
    }
    Ok(())
}

pub(super) fn sleeping_receiver(
    cx: &TaskContext,
    out: &Transcript,
) -> TaskResult {
    let messages = Channel::<String>::unbuffered();

    let (rx, printer) = (messages.clone(), out.clone());
    cx.spawn(move |cx| {
        printer.print("Receiver : I am waiting for your message.");
        let msg = rx.recv(cx)?;
        printer.print("Receiver : I got a mail.");
        if let Some(msg) = msg {
            printer.print(msg);
        }
        Ok(())
    })?;

    cx.sleep(NAP)?;
    messages.send(cx, "Message : Do you like go langage?".to_string())?;
    cx.sleep(NAP)
}

/// The first send lands in the buffer, the second waits for the worker.
pub(super) fn buffered_handoff(
    cx: &TaskContext,
    out: &Transcript,
) -> TaskResult {
    let c = Channel::<i64>::bounded(1);
    c.send(cx, 1)?;

    let (rx, printer) = (c.clone(), out.clone());
    cx.spawn(move |cx| {
        while let Some(n) = rx.recv(cx)? {
            printer.print(format!("got {}", n));
            if n == 2 {
                break;
            }
        }
        Ok(())
    })?;

    c.send(cx, 2)?;
    Ok(())
}
