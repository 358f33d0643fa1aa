//! Mounted-volume lifecycle.
//!
//! A [`FileSystemHandle`] binds volume parameters, an operation table and a
//! transport. The mount point and guard strategy may only change while the
//! dispatcher is stopped; deletion is only allowed once it has drained.

use crate::debug_log::DebugLog;
use crate::dispatcher::{DispatcherStats, OperationDispatcher};
use crate::error::{FsError, Result};
use crate::filetime::filetime_now;
use crate::guard::GuardStrategy;
use crate::ops::OperationTable;
use crate::pump::DispatcherPool;
use crate::transport::Transport;
use crate::volume::VolumeParams;
use parking_lot::Mutex;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Where the volume is exposed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountPoint {
    /// A drive letter such as `X:`.
    Drive(char),
    /// A directory path.
    Directory(PathBuf),
}

impl FromStr for MountPoint {
    type Err = FsError;

    fn from_str(s: &str) -> Result<Self> {
        let mut chars = s.chars();
        match (chars.next(), chars.next(), chars.next()) {
            (None, _, _) => Err(FsError::invalid("mount point is empty")),
            (Some(letter), Some(':'), None) if letter.is_ascii_alphabetic() => {
                Ok(MountPoint::Drive(letter.to_ascii_uppercase()))
            }
            _ => Ok(MountPoint::Directory(PathBuf::from(s))),
        }
    }
}

impl fmt::Display for MountPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MountPoint::Drive(letter) => write!(f, "{}:", letter),
            MountPoint::Directory(path) => write!(f, "{}", path.display()),
        }
    }
}

/// File system lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileSystemState {
    /// Created, dispatcher never started.
    #[default]
    Created,
    /// Dispatcher workers are running.
    Running,
    /// Stop was signaled and workers are draining.
    Stopping,
    /// Dispatcher stopped and drained.
    Stopped,
    /// Handle deleted; every further call fails.
    Deleted,
}

impl FileSystemState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => FileSystemState::Running,
            2 => FileSystemState::Stopping,
            3 => FileSystemState::Stopped,
            4 => FileSystemState::Deleted,
            _ => FileSystemState::Created,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            FileSystemState::Created => 0,
            FileSystemState::Running => 1,
            FileSystemState::Stopping => 2,
            FileSystemState::Stopped => 3,
            FileSystemState::Deleted => 4,
        }
    }
}

struct Lifecycle {
    mount_point: Option<MountPoint>,
    /// Set once the mount point was (re)bound in the current stopped period.
    rebound: bool,
    strategy: GuardStrategy,
    dispatcher: Option<Arc<OperationDispatcher>>,
    pool: Option<DispatcherPool>,
}

/// A volume bound to a backing store and a transport.
pub struct FileSystemHandle {
    params: Arc<VolumeParams>,
    table: OperationTable,
    transport: Arc<dyn Transport>,
    log: DebugLog,
    state: AtomicU8,
    lifecycle: Mutex<Lifecycle>,
}

impl FileSystemHandle {
    /// Validate `params` and bind them to `table` and `transport`. A zero
    /// volume creation time is replaced by the current time.
    pub fn create(
        mut params: VolumeParams,
        table: OperationTable,
        transport: Arc<dyn Transport>,
        log: DebugLog,
    ) -> Result<Self> {
        params.validate()?;
        if params.volume_creation_time == 0 {
            params.volume_creation_time = filetime_now();
        }
        debug!(
            file_system_name = %params.file_system_name,
            capabilities = ?table.capabilities(),
            "File system created"
        );
        Ok(Self {
            params: Arc::new(params),
            table,
            transport,
            log,
            state: AtomicU8::new(FileSystemState::Created.as_u8()),
            lifecycle: Mutex::new(Lifecycle {
                mount_point: None,
                rebound: false,
                strategy: GuardStrategy::default(),
                dispatcher: None,
                pool: None,
            }),
        })
    }

    pub fn params(&self) -> &VolumeParams {
        &self.params
    }

    pub fn state(&self) -> FileSystemState {
        FileSystemState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn is_running(&self) -> bool {
        self.state() == FileSystemState::Running
    }

    fn set_state(&self, state: FileSystemState) {
        self.state.store(state.as_u8(), Ordering::SeqCst);
    }

    fn ensure_stopped(&self, op: &str) -> Result<()> {
        match self.state() {
            FileSystemState::Created | FileSystemState::Stopped => Ok(()),
            FileSystemState::Deleted => Err(FsError::lifecycle(op, "file system was deleted")),
            _ => Err(FsError::lifecycle(op, "dispatcher is running")),
        }
    }

    pub fn mount_point(&self) -> Option<MountPoint> {
        self.lifecycle.lock().mount_point.clone()
    }

    /// Bind the mount point. Allowed once per stopped period.
    pub fn set_mount_point(&self, mount_point: MountPoint) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock();
        self.ensure_stopped("set_mount_point")?;
        if lifecycle.rebound {
            return Err(FsError::lifecycle(
                "set_mount_point",
                "mount point already bound since the dispatcher stopped",
            ));
        }
        if let MountPoint::Directory(path) = &mount_point {
            if path.as_os_str().is_empty() {
                return Err(FsError::invalid("mount point is empty"));
            }
        }
        info!(mount_point = %mount_point, "Mount point set");
        lifecycle.mount_point = Some(mount_point);
        lifecycle.rebound = true;
        Ok(())
    }

    /// Unbind the mount point, allowing a new binding.
    pub fn remove_mount_point(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock();
        self.ensure_stopped("remove_mount_point")?;
        lifecycle.mount_point = None;
        lifecycle.rebound = false;
        Ok(())
    }

    pub fn set_guard_strategy(&self, strategy: GuardStrategy) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock();
        self.ensure_stopped("set_guard_strategy")?;
        lifecycle.strategy = strategy;
        Ok(())
    }

    /// Start `threads` dispatcher workers (0 picks a default).
    pub fn start_dispatcher(&self, threads: usize) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock();
        self.ensure_stopped("start_dispatcher")?;
        if lifecycle.mount_point.is_none() {
            return Err(FsError::lifecycle("start_dispatcher", "no mount point set"));
        }

        let dispatcher = Arc::new(OperationDispatcher::new(
            Arc::clone(&self.params),
            self.table.clone(),
            lifecycle.strategy.clone(),
            self.log.clone(),
        ));
        let pool = DispatcherPool::start(
            Arc::clone(&dispatcher),
            Arc::clone(&self.transport),
            threads,
            self.params.transact_timeout(),
        )?;
        lifecycle.dispatcher = Some(dispatcher);
        lifecycle.pool = Some(pool);
        self.set_state(FileSystemState::Running);
        Ok(())
    }

    /// Stop accepting requests and wait for in-flight dispatches to drain.
    pub fn stop_dispatcher(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock();
        if self.state() != FileSystemState::Running {
            return Err(FsError::lifecycle("stop_dispatcher", "dispatcher is not running"));
        }
        self.set_state(FileSystemState::Stopping);
        if let Some(mut pool) = lifecycle.pool.take() {
            pool.stop();
        }
        lifecycle.rebound = false;
        self.set_state(FileSystemState::Stopped);
        info!("Dispatcher stopped");
        Ok(())
    }

    /// Release the volume. Rejected while the dispatcher runs.
    pub fn delete(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock();
        self.ensure_stopped("delete")?;
        lifecycle.mount_point = None;
        lifecycle.dispatcher = None;
        self.set_state(FileSystemState::Deleted);
        info!("File system deleted");
        Ok(())
    }

    /// Counters of the current or most recent dispatcher run.
    pub fn stats(&self) -> DispatcherStats {
        self.lifecycle
            .lock()
            .dispatcher
            .as_ref()
            .map(|d| d.stats())
            .unwrap_or_default()
    }

    /// Dispatcher of the current or most recent run.
    pub fn dispatcher(&self) -> Option<Arc<OperationDispatcher>> {
        self.lifecycle.lock().dispatcher.clone()
    }
}

impl Drop for FileSystemHandle {
    fn drop(&mut self) {
        if self.is_running() {
            let _ = self.stop_dispatcher();
        }
    }
}
