//! The channel between the request source and the dispatcher workers.
//!
//! [`Transport`] is all the dispatcher needs: blocking receive with a
//! timeout and send. [`ChannelTransport`] is an in-process implementation
//! over crossbeam channels, paired with a [`TransportClient`] that submits
//! requests and correlates responses by id.

use crate::error::{FsError, Result};
use crate::request::{Operation, Request, RequestId, Response};
use crossbeam_channel::{select, unbounded, Receiver, RecvTimeoutError, Sender};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::trace;

pub trait Transport: Send + Sync {
    /// Next request, or `Ok(None)` if none arrived within `timeout` or the
    /// caller was woken. An `Err` is fatal for the calling worker.
    fn receive(&self, timeout: Duration) -> Result<Option<Request>>;

    fn send(&self, response: Response) -> Result<()>;

    /// Unblock up to `waiters` threads parked in [`Transport::receive`].
    fn wake(&self, _waiters: usize) {}
}

/// Dispatcher side of an in-process transport.
///
/// The request channel disconnects once the client is dropped; wake-ups
/// travel on a separate channel owned by the transport.
pub struct ChannelTransport {
    requests: Receiver<Request>,
    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,
    responses: Sender<Response>,
}

impl ChannelTransport {
    pub fn pair() -> (ChannelTransport, TransportClient) {
        let (req_tx, req_rx) = unbounded();
        let (resp_tx, resp_rx) = unbounded();
        let (wake_tx, wake_rx) = unbounded();
        let transport = ChannelTransport {
            requests: req_rx,
            wake_tx,
            wake_rx,
            responses: resp_tx,
        };
        let client = TransportClient {
            requests: req_tx,
            responses: resp_rx,
            parked: DashMap::new(),
            next_id: AtomicU64::new(1),
        };
        (transport, client)
    }

    /// Requests waiting to be received.
    pub fn pending(&self) -> usize {
        self.requests.len()
    }
}

impl Transport for ChannelTransport {
    fn receive(&self, timeout: Duration) -> Result<Option<Request>> {
        select! {
            recv(self.requests) -> request => match request {
                Ok(request) => Ok(Some(request)),
                Err(_) => Err(FsError::Transport {
                    msg: "request channel closed".to_string(),
                }),
            },
            recv(self.wake_rx) -> _ => Ok(None),
            default(timeout) => Ok(None),
        }
    }

    fn send(&self, response: Response) -> Result<()> {
        self.responses.send(response).map_err(|_| FsError::Transport {
            msg: "response channel closed".to_string(),
        })
    }

    fn wake(&self, waiters: usize) {
        for _ in 0..waiters {
            let _ = self.wake_tx.send(());
        }
    }
}

/// Request side of an in-process transport.
///
/// Responses may arrive in any order; ones for other ids are parked until
/// their waiter asks for them.
pub struct TransportClient {
    requests: Sender<Request>,
    responses: Receiver<Response>,
    parked: DashMap<RequestId, Response>,
    next_id: AtomicU64,
}

const WAIT_SLICE: Duration = Duration::from_millis(10);

impl TransportClient {
    pub fn submit(&self, op: Operation) -> Result<RequestId> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = Request::new(id, op);
        self.submit_request(request)?;
        Ok(RequestId(id))
    }

    pub fn submit_request(&self, request: Request) -> Result<()> {
        trace!(id = %request.id, op = %request.kind(), "Submitting request");
        self.requests
            .send(request)
            .map_err(|_| FsError::Transport {
                msg: "request channel closed".to_string(),
            })
    }

    pub fn wait(&self, id: RequestId, timeout: Duration) -> Result<Response> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some((_, response)) = self.parked.remove(&id) {
                return Ok(response);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(FsError::Transport {
                    msg: format!("timed out waiting for {}", id),
                });
            }
            match self.responses.recv_timeout(WAIT_SLICE.min(deadline - now)) {
                Ok(response) if response.id == id => return Ok(response),
                Ok(response) => {
                    self.parked.insert(response.id, response);
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(FsError::Transport {
                        msg: "response channel closed".to_string(),
                    })
                }
            }
        }
    }

    pub fn call(&self, op: Operation, timeout: Duration) -> Result<Response> {
        let id = self.submit(op)?;
        self.wait(id, timeout)
    }
}
