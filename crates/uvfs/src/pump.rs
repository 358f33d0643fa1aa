//! Worker threads pumping requests from the transport into the dispatcher.

use crate::dispatcher::OperationDispatcher;
use crate::error::Result;
use crate::request::Response;
use crate::status::NtStatus;
use crate::transport::Transport;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, info_span, warn};

pub const MIN_DEFAULT_THREADS: usize = 2;
pub const MAX_DEFAULT_THREADS: usize = 16;

/// Worker count used when zero is requested.
pub fn default_thread_count() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(MIN_DEFAULT_THREADS)
        .clamp(MIN_DEFAULT_THREADS, MAX_DEFAULT_THREADS)
}

/// A fixed set of symmetric workers sharing one transport.
pub struct DispatcherPool {
    workers: Vec<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
    alive: Arc<AtomicUsize>,
    transport: Arc<dyn Transport>,
}

impl DispatcherPool {
    /// Spawn `threads` workers (0 picks [`default_thread_count`]). Each
    /// worker waits at most `poll` per receive before re-checking the stop
    /// flag.
    pub fn start(
        dispatcher: Arc<OperationDispatcher>,
        transport: Arc<dyn Transport>,
        threads: usize,
        poll: Duration,
    ) -> Result<Self> {
        let count = if threads == 0 {
            default_thread_count()
        } else {
            threads
        };
        let stop = Arc::new(AtomicBool::new(false));
        let alive = Arc::new(AtomicUsize::new(0));
        let mut pool = Self {
            workers: Vec::with_capacity(count),
            stop: Arc::clone(&stop),
            alive: Arc::clone(&alive),
            transport: Arc::clone(&transport),
        };

        for id in 0..count {
            let dispatcher = Arc::clone(&dispatcher);
            let transport = Arc::clone(&transport);
            let stop = Arc::clone(&stop);
            let alive = Arc::clone(&alive);
            alive.fetch_add(1, Ordering::AcqRel);
            let spawned = thread::Builder::new()
                .name(format!("uvfs-dispatch-{}", id))
                .spawn(move || {
                    run_worker(id, &dispatcher, transport.as_ref(), &stop, poll);
                    alive.fetch_sub(1, Ordering::AcqRel);
                });
            match spawned {
                Ok(handle) => pool.workers.push(handle),
                Err(e) => {
                    pool.alive.fetch_sub(1, Ordering::AcqRel);
                    pool.stop();
                    return Err(e.into());
                }
            }
        }
        info!(threads = count, "Dispatcher started");
        Ok(pool)
    }

    pub fn thread_count(&self) -> usize {
        self.workers.len()
    }

    /// Workers that have not exited yet.
    pub fn alive(&self) -> usize {
        self.alive.load(Ordering::Acquire)
    }

    pub fn is_stopping(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Signal stop and wait for every worker to finish its current
    /// dispatch. Requests still queued in the transport are left there.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        self.transport.wake(self.workers.len());
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                warn!("Dispatcher worker panicked");
            }
        }
        debug!("Dispatcher drained");
    }
}

impl Drop for DispatcherPool {
    fn drop(&mut self) {
        if !self.workers.is_empty() {
            self.stop();
        }
    }
}

fn run_worker(
    id: usize,
    dispatcher: &OperationDispatcher,
    transport: &dyn Transport,
    stop: &AtomicBool,
    poll: Duration,
) {
    let _span = info_span!("worker", id).entered();
    debug!("Worker starting");

    while !stop.load(Ordering::Acquire) {
        let request = match transport.receive(poll) {
            Ok(Some(request)) => request,
            Ok(None) => continue,
            Err(e) => {
                error!(error = %e, "Transport receive failed, worker exiting");
                break;
            }
        };

        let response = if stop.load(Ordering::Acquire) {
            Response::error(&request, NtStatus::Cancelled)
        } else {
            dispatcher.dispatch(&request)
        };

        if let Err(e) = transport.send(response) {
            error!(error = %e, "Transport send failed, worker exiting");
            break;
        }
    }
    debug!("Worker exiting");
}
