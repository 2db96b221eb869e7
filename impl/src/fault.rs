//! Process-wide handler for panics that nothing else caught.
use std::{any::Any, backtrace::Backtrace, panic, sync::Arc};

use log::Level;

use super::{host::ProcessHost, sink::LogSink};

/// Marker prefixed to uncaught panic reports.
pub(crate) const UNCAUGHT: &str = "UNCAUGHT PANIC";

/// Log an uncaught fault and, when restart on fault is enabled,
/// terminate the process so the primary can replace it.
pub(crate) fn report<H: ProcessHost + ?Sized>(
    sink: &dyn LogSink,
    host: &H,
    restart_on_fault: bool,
    message: &str,
    detail: &str,
) {
    sink.log(
        Level::Error,
        &format!("{}: {}", UNCAUGHT, message),
        Some(detail),
    );
    if restart_on_fault {
        host.exit(1);
    }
}

/// Install the panic hook for this process.
///
/// The previously installed hook only runs when the process is
/// not terminated by the new hook. Every panic is reported, including
/// ones that are later caught by `catch_unwind` or a task join handle.
pub(crate) fn install<H: ProcessHost>(
    sink: Arc<dyn LogSink>,
    host: Arc<H>,
    restart_on_fault: bool,
) {
    let previous = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        let message = payload_message(info.payload());
        let detail = match info.location() {
            Some(location) => {
                format!("at {}\n{}", location, Backtrace::force_capture())
            }
            None => Backtrace::force_capture().to_string(),
        };
        report(&*sink, &*host, restart_on_fault, &message, &detail);
        if !restart_on_fault {
            previous(info);
        }
    }));
}

fn payload_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "Box<dyn Any>".to_string()
    }
}
