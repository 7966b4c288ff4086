//! Consumer side of an operation's event stream.

use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};

use crate::error::{ExecutionError, VantageError, VantageResult};

use super::events::{Event, OperationId};

/// The event stream of one operation.
///
/// Finite and single-consumer: it closes once the operation reaches a
/// terminal status. Dropping it detaches the consumer; the operation keeps
/// running to completion.
#[derive(Debug)]
pub struct OperationStream {
    operation_id: OperationId,
    rx: Receiver<Event>,
}

impl OperationStream {
    pub(crate) const fn new(operation_id: OperationId, rx: Receiver<Event>) -> Self {
        Self { operation_id, rx }
    }

    /// The operation backing this stream.
    #[must_use]
    pub const fn operation_id(&self) -> OperationId {
        self.operation_id
    }

    /// Receive the next event (blocking).
    ///
    /// # Errors
    /// `Disconnected` once the stream has closed.
    pub fn recv(&self) -> VantageResult<Event> {
        self.rx.recv().map_err(|_| disconnected())
    }

    /// Receive the next event with a timeout.
    ///
    /// # Errors
    /// `Timeout` if nothing arrived in time, `Disconnected` once closed.
    pub fn recv_timeout(&self, timeout: Duration) -> VantageResult<Event> {
        self.rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => VantageError::Execution(ExecutionError::Timeout {
                duration_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
            RecvTimeoutError::Disconnected => disconnected(),
        })
    }

    /// Receive an event if one is ready. `Ok(None)` means nothing yet.
    ///
    /// # Errors
    /// `Disconnected` once the stream has closed.
    pub fn try_recv(&self) -> VantageResult<Option<Event>> {
        match self.rx.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(disconnected()),
        }
    }
}

impl Iterator for OperationStream {
    type Item = Event;

    fn next(&mut self) -> Option<Event> {
        self.rx.recv().ok()
    }
}

fn disconnected() -> VantageError {
    VantageError::Execution(ExecutionError::Disconnected {
        path: "operation_stream".to_string(),
    })
}
