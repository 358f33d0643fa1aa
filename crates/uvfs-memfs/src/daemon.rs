//! Service hooks mounting a [`MemFs`] volume.

use crate::memfs::MemFs;
use std::sync::Arc;
use tracing::info;
use uvfs::error::Result;
use uvfs::service::ServiceHooks;
use uvfs::{
    ChannelTransport, DebugLog, FileSystemHandle, GuardStrategy, MountPoint, OperationTable,
    TransportClient, VolumeParams,
};

/// Owns the mounted volume; the service starts and stops its dispatcher.
pub struct MemFsDaemon {
    store: Arc<MemFs>,
    fs: FileSystemHandle,
    mount_point: MountPoint,
    strategy: GuardStrategy,
    threads: usize,
}

impl MemFsDaemon {
    /// Bind `store` to a fresh in-process transport. Returns the daemon and
    /// the client side used to submit requests.
    pub fn new(
        store: Arc<MemFs>,
        params: VolumeParams,
        mount_point: MountPoint,
        strategy: GuardStrategy,
        threads: usize,
        log: DebugLog,
    ) -> Result<(Self, TransportClient)> {
        let (transport, client) = ChannelTransport::pair();
        let table = OperationTable::new(store.clone());
        let fs = FileSystemHandle::create(params, table, Arc::new(transport), log)?;
        Ok((
            Self {
                store,
                fs,
                mount_point,
                strategy,
                threads,
            },
            client,
        ))
    }

    /// The backing store.
    pub fn store(&self) -> &MemFs {
        &self.store
    }

    /// The mounted file system.
    pub fn file_system(&self) -> &FileSystemHandle {
        &self.fs
    }
}

impl ServiceHooks for MemFsDaemon {
    fn on_start(&self, _args: &[String]) -> Result<()> {
        self.store.set_read_only(self.fs.params().read_only_volume);
        self.fs.set_guard_strategy(self.strategy.clone())?;
        if self.fs.mount_point().as_ref() != Some(&self.mount_point) {
            self.fs.remove_mount_point()?;
            self.fs.set_mount_point(self.mount_point.clone())?;
        }
        self.fs.start_dispatcher(self.threads)?;
        info!(mount_point = %self.mount_point, "Volume mounted");
        Ok(())
    }

    fn on_stop(&self) -> Result<()> {
        self.fs.stop_dispatcher()?;
        let stats = self.fs.stats();
        info!(
            processed = stats.processed,
            failed = stats.failed,
            rejected = stats.rejected,
            "Volume unmounted"
        );
        Ok(())
    }
}
