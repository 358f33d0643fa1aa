//! Locking disciplines wrapped around handler execution.
//!
//! The dispatcher brackets each handler call with [`OperationGuard::enter`]
//! and [`OperationGuard::leave`] through a [`GuardScope`], which releases on
//! every exit path including a handler panic.

use crate::request::{Request, Response};
use crate::status::NtStatus;
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::Arc;

/// Enter/leave hooks run around every dispatched handler.
pub trait OperationGuard: Send + Sync {
    fn enter(&self, request: &Request);
    fn leave(&self, request: &Request, response: &Response);
}

/// Locking discipline chosen when the file system is created.
#[derive(Clone)]
pub enum GuardStrategy {
    /// One exclusive lock around every operation.
    Coarse,
    /// Caller-supplied per-request hooks.
    Fine(Arc<dyn OperationGuard>),
}

impl GuardStrategy {
    /// Fine strategy backed by the stock [`ReadWriteGuard`].
    pub fn fine() -> Self {
        GuardStrategy::Fine(Arc::new(ReadWriteGuard::new()))
    }

    pub fn is_coarse(&self) -> bool {
        matches!(self, GuardStrategy::Coarse)
    }

    pub(crate) fn into_guard(self) -> Arc<dyn OperationGuard> {
        match self {
            GuardStrategy::Coarse => Arc::new(CoarseGuard::new()),
            GuardStrategy::Fine(guard) => guard,
        }
    }
}

impl Default for GuardStrategy {
    fn default() -> Self {
        GuardStrategy::Coarse
    }
}

impl fmt::Debug for GuardStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuardStrategy::Coarse => f.write_str("Coarse"),
            GuardStrategy::Fine(_) => f.write_str("Fine"),
        }
    }
}

#[derive(Debug, Default)]
struct LockState {
    readers: usize,
    writer: bool,
    waiting_writers: usize,
}

/// Serializes every operation.
#[derive(Debug, Default)]
pub struct CoarseGuard {
    busy: Mutex<bool>,
    released: Condvar,
}

impl CoarseGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_held(&self) -> bool {
        *self.busy.lock()
    }
}

impl OperationGuard for CoarseGuard {
    fn enter(&self, _request: &Request) {
        let mut busy = self.busy.lock();
        while *busy {
            self.released.wait(&mut busy);
        }
        *busy = true;
    }

    fn leave(&self, _request: &Request, _response: &Response) {
        let mut busy = self.busy.lock();
        *busy = false;
        self.released.notify_one();
    }
}

/// Shared access for queries and data I/O, exclusive access for operations
/// that change the namespace or the volume (see
/// [`crate::request::Operation::is_structural`]).
///
/// Waiting writers block new readers so structural operations are not
/// starved by a steady stream of reads.
#[derive(Debug, Default)]
pub struct ReadWriteGuard {
    state: Mutex<LockState>,
    changed: Condvar,
}

impl ReadWriteGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_readers(&self) -> usize {
        self.state.lock().readers
    }

    pub fn writer_active(&self) -> bool {
        self.state.lock().writer
    }
}

impl OperationGuard for ReadWriteGuard {
    fn enter(&self, request: &Request) {
        let mut state = self.state.lock();
        if request.op.is_structural() {
            state.waiting_writers += 1;
            while state.writer || state.readers > 0 {
                self.changed.wait(&mut state);
            }
            state.waiting_writers -= 1;
            state.writer = true;
        } else {
            while state.writer || state.waiting_writers > 0 {
                self.changed.wait(&mut state);
            }
            state.readers += 1;
        }
    }

    fn leave(&self, request: &Request, _response: &Response) {
        let mut state = self.state.lock();
        if request.op.is_structural() {
            state.writer = false;
        } else {
            state.readers = state.readers.saturating_sub(1);
        }
        self.changed.notify_all();
    }
}

/// Scoped enter/leave bracket for one request.
///
/// [`GuardScope::finish`] leaves with the real response; dropping an
/// unfinished scope leaves with an `InternalError` response.
pub struct GuardScope<'a> {
    guard: &'a dyn OperationGuard,
    request: &'a Request,
    finished: bool,
}

impl<'a> GuardScope<'a> {
    pub fn enter(guard: &'a dyn OperationGuard, request: &'a Request) -> Self {
        guard.enter(request);
        Self {
            guard,
            request,
            finished: false,
        }
    }

    pub fn finish(mut self, response: &Response) {
        self.finished = true;
        self.guard.leave(self.request, response);
    }
}

impl Drop for GuardScope<'_> {
    fn drop(&mut self) {
        if !self.finished {
            let response = Response::error(self.request, NtStatus::InternalError);
            self.guard.leave(self.request, &response);
        }
    }
}
