//! Pluggable sink for camera log events.
//!
//! A [`Camera`](crate::Camera) reports every state change, optional-feature
//! failure and driver error through a [`DiagnosticsSink`], whether or not the
//! error is also returned to the caller. The default [`LogSink`] forwards to
//! the `log` facade; closures can be used to capture events with their own
//! context.

use std::io;

/// One diagnostic event.
#[derive(Debug, Clone, Copy)]
pub enum LogEvent<'a> {
    /// Informational message.
    Info(&'a str),
    /// Something optional did not work (e.g. cropping), or a precondition failed.
    Failure(&'a str),
    /// A driver request failed with an OS error.
    Error {
        /// Request that failed.
        context: &'a str,
        /// OS error reported for it.
        error: &'a io::Error,
    },
}

/// Receives camera log events.
pub trait DiagnosticsSink {
    /// Handle one event.
    fn log(&self, event: &LogEvent<'_>);
}

impl<F> DiagnosticsSink for F
where
    F: Fn(&LogEvent<'_>),
{
    fn log(&self, event: &LogEvent<'_>) {
        self(event);
    }
}

/// Forwards events to the `log` crate under the `v4l2_camera` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl DiagnosticsSink for LogSink {
    fn log(&self, event: &LogEvent<'_>) {
        match event {
            LogEvent::Info(msg) => log::info!("CAMERA INFO [{msg}]"),
            LogEvent::Failure(msg) => log::warn!("CAMERA FAIL [{msg}]"),
            LogEvent::Error { context, error } => match error.raw_os_error() {
                Some(code) => log::error!("CAMERA ERROR [{context}] {code}: {error}"),
                None => log::error!("CAMERA ERROR [{context}] {error}"),
            },
        }
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl DiagnosticsSink for NullSink {
    fn log(&self, _event: &LogEvent<'_>) {}
}
