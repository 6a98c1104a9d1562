//! guarded_io.rs
//! Runs blocking device calls on a dedicated worker thread and bounds how long a task waits.
//!
//! - One worker per task instance; it owns the device handle for that instance.
//! - Requests are numbered; a reply that arrives after its caller gave up is discarded.
//! - While a call is still stuck inside the device, new calls fail fast with a timeout
//!   instead of queueing behind it, so a hung driver costs one worker, not one per tick.

use std::{
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam::channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, bounded};
use log::{debug, warn};

use crate::utils::error::{EngineError, Result};

pub struct GuardedIo<Req, Resp> {
    operation: &'static str,
    timeout: Duration,
    req_tx: Option<Sender<(u64, Req)>>,
    resp_rx: Receiver<(u64, Resp)>,
    next_seq: u64,
    in_flight: Option<u64>,
    _worker: JoinHandle<()>,
}

impl<Req, Resp> GuardedIo<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    /// Spawns the worker; `call` is invoked on the worker thread for every request.
    pub fn spawn<F>(operation: &'static str, timeout: Duration, mut call: F) -> Result<Self>
    where
        F: FnMut(Req) -> Resp + Send + 'static,
    {
        let (req_tx, req_rx) = bounded::<(u64, Req)>(1);
        let (resp_tx, resp_rx) = bounded::<(u64, Resp)>(1);

        let worker = thread::Builder::new()
            .name(format!("{operation}-io"))
            .spawn(move || {
                while let Ok((seq, req)) = req_rx.recv() {
                    let resp = call(req);
                    if resp_tx.send((seq, resp)).is_err() {
                        break;
                    }
                }
                debug!("[GuardedIo] {} worker exiting", operation);
            })?;

        Ok(Self {
            operation,
            timeout,
            req_tx: Some(req_tx),
            resp_rx,
            next_seq: 1,
            in_flight: None,
            _worker: worker,
        })
    }

    /// Sends `req` to the worker and waits at most the configured timeout for its reply.
    pub fn call(&mut self, req: Req) -> Result<Resp> {
        if let Some(pending) = self.in_flight {
            match self.resp_rx.try_recv() {
                Ok((seq, _stale)) if seq == pending => {
                    debug!("[GuardedIo] {} discarded late reply #{}", self.operation, seq);
                    self.in_flight = None;
                }
                Ok(_) | Err(TryRecvError::Empty) => return Err(self.timeout_error()),
                Err(TryRecvError::Disconnected) => return Err(self.worker_gone()),
            }
        }

        let seq = self.next_seq;
        self.next_seq += 1;

        let Some(req_tx) = &self.req_tx else {
            return Err(self.worker_gone());
        };
        if req_tx.try_send((seq, req)).is_err() {
            return Err(self.worker_gone());
        }
        self.in_flight = Some(seq);

        match self.resp_rx.recv_timeout(self.timeout) {
            Ok((got, resp)) if got == seq => {
                self.in_flight = None;
                Ok(resp)
            }
            Ok((got, _)) => {
                // Replies are strictly ordered and older ones were drained above.
                warn!("[GuardedIo] {} reply #{} arrived for request #{}", self.operation, got, seq);
                Err(self.timeout_error())
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    "[GuardedIo] {} still blocked after {} ms",
                    self.operation,
                    self.timeout.as_millis()
                );
                Err(self.timeout_error())
            }
            Err(RecvTimeoutError::Disconnected) => Err(self.worker_gone()),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Collects the reply of a call that timed out earlier, if it has arrived by now.
    /// Returns true when nothing is outstanding on the worker.
    pub fn settle(&mut self) -> bool {
        if let Some(pending) = self.in_flight {
            if let Ok((seq, _late)) = self.resp_rx.try_recv() {
                if seq == pending {
                    debug!("[GuardedIo] {} late reply #{} collected", self.operation, seq);
                    self.in_flight = None;
                }
            }
        }
        self.in_flight.is_none()
    }

    fn timeout_error(&self) -> EngineError {
        EngineError::IoTimeout {
            operation: self.operation,
            timeout_ms: self.timeout.as_millis() as u64,
        }
    }

    fn worker_gone(&self) -> EngineError {
        EngineError::Invariant(format!("{} worker thread is gone", self.operation))
    }
}

impl<Req, Resp> Drop for GuardedIo<Req, Resp> {
    fn drop(&mut self) {
        // Closing the request channel lets an idle worker exit. A worker stuck in the
        // device is left detached; it exits once the call returns.
        self.req_tx.take();
    }
}
