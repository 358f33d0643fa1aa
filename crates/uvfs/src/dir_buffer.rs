//! Per-handle directory listing buffer with marker-based paging.
//!
//! One thread fills the buffer while holding it; readers page through the
//! committed, name-ordered listing. A marker is an entry name, so it stays
//! valid when entries sorting after it are added on a later refill.

use crate::error::{FsError, Result};
use crate::types::DirEntry;
use crate::volume::{DirBufferAcquire, DEFAULT_DIR_BUFFER_CAPACITY};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct DirBufferConfig {
    /// Upper bound on the summed record length of buffered entries.
    pub capacity_bytes: usize,
    pub acquire: DirBufferAcquire,
}

impl Default for DirBufferConfig {
    fn default() -> Self {
        Self {
            capacity_bytes: DEFAULT_DIR_BUFFER_CAPACITY,
            acquire: DirBufferAcquire::Block,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DirBufferStats {
    pub fills: u64,
    pub reads: u64,
    pub dropped_entries: u64,
}

#[derive(Debug, Default)]
struct BufferState {
    held: bool,
    filled: bool,
    entries: Vec<DirEntry>,
    stats: DirBufferStats,
}

/// One page returned by [`DirectoryBuffer::read`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DirPage {
    pub entries: Vec<DirEntry>,
    pub bytes_transferred: usize,
    /// Name of the last entry returned; `None` on the terminating empty page.
    pub next_marker: Option<String>,
}

impl DirPage {
    pub fn is_end(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct DirectoryBuffer {
    state: Mutex<BufferState>,
    released: Condvar,
    config: DirBufferConfig,
}

impl DirectoryBuffer {
    pub fn new(config: DirBufferConfig) -> Self {
        Self {
            state: Mutex::new(BufferState::default()),
            released: Condvar::new(),
            config,
        }
    }

    /// Take exclusive ownership for filling.
    ///
    /// Returns `Ok(None)` when the buffer already holds a listing and no
    /// reset was asked for. With [`DirBufferAcquire::FailFast`] a buffer
    /// held by another caller yields `InsufficientResources` instead of
    /// waiting.
    pub fn acquire(&self, reset: bool) -> Result<Option<DirBufferFill<'_>>> {
        let mut state = self.state.lock();
        while state.held {
            match self.config.acquire {
                DirBufferAcquire::Block => self.released.wait(&mut state),
                DirBufferAcquire::FailFast => {
                    return Err(FsError::InsufficientResources {
                        resource: "directory buffer is being filled".to_string(),
                    })
                }
            }
        }
        if reset {
            state.entries.clear();
            state.filled = false;
        }
        if state.filled {
            return Ok(None);
        }
        state.held = true;
        Ok(Some(DirBufferFill {
            buffer: self,
            entries: Vec::new(),
            bytes: 0,
            dropped: 0,
            done: false,
        }))
    }

    /// Entries strictly after `marker`, stopping before the next entry would
    /// exceed `capacity` bytes. Waits for an in-progress fill to finish.
    pub fn read(&self, marker: Option<&str>, capacity: usize) -> Result<DirPage> {
        let mut state = self.state.lock();
        while state.held {
            self.released.wait(&mut state);
        }
        state.stats.reads += 1;

        let start = match marker {
            None => 0,
            Some(m) => state.entries.partition_point(|e| e.name.as_str() <= m),
        };
        let mut page = DirPage::default();
        for entry in &state.entries[start..] {
            let len = entry.record_len();
            if page.bytes_transferred + len > capacity {
                break;
            }
            page.bytes_transferred += len;
            page.entries.push(entry.clone());
        }

        if page.entries.is_empty() {
            if let Some(next) = state.entries.get(start) {
                return Err(FsError::BufferOverflow {
                    needed: next.record_len(),
                    available: capacity,
                });
            }
        }
        page.next_marker = page.entries.last().map(|e| e.name.clone());
        Ok(page)
    }

    pub fn is_filled(&self) -> bool {
        self.state.lock().filled
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> DirBufferStats {
        self.state.lock().stats.clone()
    }

    fn commit(&self, mut entries: Vec<DirEntry>, dropped: usize) {
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries.dedup_by(|a, b| a.name == b.name);
        let mut state = self.state.lock();
        debug!(entries = entries.len(), dropped, "Directory buffer filled");
        state.entries = entries;
        state.filled = true;
        state.held = false;
        state.stats.fills += 1;
        state.stats.dropped_entries += dropped as u64;
        drop(state);
        self.released.notify_all();
    }

    fn abandon(&self) {
        let mut state = self.state.lock();
        state.held = false;
        drop(state);
        self.released.notify_all();
    }
}

/// Exclusive fill token returned by [`DirectoryBuffer::acquire`].
///
/// Dropping the token commits what was filled, like [`release`].
///
/// [`release`]: DirBufferFill::release
#[derive(Debug)]
pub struct DirBufferFill<'a> {
    buffer: &'a DirectoryBuffer,
    entries: Vec<DirEntry>,
    bytes: usize,
    dropped: usize,
    done: bool,
}

impl DirBufferFill<'_> {
    /// Append one entry. Returns `false`, dropping the entry, once the
    /// buffer capacity would be exceeded.
    pub fn fill(&mut self, entry: DirEntry) -> bool {
        let len = entry.record_len();
        if self.bytes + len > self.buffer.config.capacity_bytes {
            if self.dropped == 0 {
                warn!(
                    capacity = self.buffer.config.capacity_bytes,
                    "Directory buffer full, listing will be partial"
                );
            }
            self.dropped += 1;
            return false;
        }
        self.bytes += len;
        self.entries.push(entry);
        true
    }

    pub fn extend(&mut self, entries: impl IntoIterator<Item = DirEntry>) {
        for entry in entries {
            self.fill(entry);
        }
    }

    /// Sort, deduplicate and publish the filled entries.
    pub fn release(mut self) {
        self.finish();
    }

    /// Release without publishing; the next acquire refills.
    pub fn abandon(mut self) {
        self.done = true;
        self.buffer.abandon();
    }

    fn finish(&mut self) {
        if !self.done {
            self.done = true;
            let entries = std::mem::take(&mut self.entries);
            self.buffer.commit(entries, self.dropped);
        }
    }
}

impl Drop for DirBufferFill<'_> {
    fn drop(&mut self) {
        self.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FileInfo;
    use std::sync::Arc;
    use std::thread;

    fn entry(name: &str) -> DirEntry {
        DirEntry::new(name, FileInfo::default())
    }

    fn filled(names: &[&str]) -> DirectoryBuffer {
        let buffer = DirectoryBuffer::new(DirBufferConfig::default());
        let mut fill = buffer.acquire(false).unwrap().unwrap();
        fill.extend(names.iter().map(|n| entry(n)));
        fill.release();
        buffer
    }

    #[test]
    fn test_fill_sorts_and_dedups() {
        let buffer = filled(&["c", "a", "b", "a"]);
        let page = buffer.read(None, usize::MAX).unwrap();
        let names: Vec<_> = page.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["a", "b", "c"]);
    }

    #[test]
    fn test_second_acquire_without_reset_skips_fill() {
        let buffer = filled(&["a"]);
        assert!(buffer.acquire(false).unwrap().is_none());
        assert!(buffer.acquire(true).unwrap().is_some());
    }

    #[test]
    fn test_reset_discards_contents() {
        let buffer = filled(&["a", "b"]);
        let mut fill = buffer.acquire(true).unwrap().unwrap();
        fill.fill(entry("z"));
        fill.release();
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_paging_by_marker() {
        let buffer = filled(&["a", "b", "c"]);
        let two = entry("a").record_len() * 2;
        let first = buffer.read(None, two).unwrap();
        assert_eq!(first.entries.len(), 2);
        assert_eq!(first.next_marker.as_deref(), Some("b"));
        let second = buffer.read(first.next_marker.as_deref(), two).unwrap();
        assert_eq!(second.entries.len(), 1);
        assert_eq!(second.entries[0].name, "c");
        let third = buffer.read(second.next_marker.as_deref(), two).unwrap();
        assert!(third.is_end());
        assert_eq!(third.next_marker, None);
    }

    #[test]
    fn test_marker_not_in_listing() {
        let buffer = filled(&["apple", "cherry"]);
        let page = buffer.read(Some("banana"), usize::MAX).unwrap();
        assert_eq!(page.entries.len(), 1);
        assert_eq!(page.entries[0].name, "cherry");
    }

    #[test]
    fn test_capacity_too_small_for_one_entry() {
        let buffer = filled(&["a"]);
        let err = buffer.read(None, 8).unwrap_err();
        assert!(matches!(err, FsError::BufferOverflow { needed: 112, .. }));
    }

    #[test]
    fn test_fill_degrades_to_partial() {
        let buffer = DirectoryBuffer::new(DirBufferConfig {
            capacity_bytes: 112 * 2,
            acquire: DirBufferAcquire::Block,
        });
        let mut fill = buffer.acquire(false).unwrap().unwrap();
        assert!(fill.fill(entry("a")));
        assert!(fill.fill(entry("b")));
        assert!(!fill.fill(entry("c")));
        drop(fill);
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.stats().dropped_entries, 1);
    }

    #[test]
    fn test_fail_fast_acquire() {
        let buffer = DirectoryBuffer::new(DirBufferConfig {
            capacity_bytes: 4096,
            acquire: DirBufferAcquire::FailFast,
        });
        let fill = buffer.acquire(false).unwrap().unwrap();
        let err = buffer.acquire(false).unwrap_err();
        assert!(matches!(err, FsError::InsufficientResources { .. }));
        fill.release();
        assert!(buffer.is_filled());
    }

    #[test]
    fn test_abandon_leaves_unfilled() {
        let buffer = DirectoryBuffer::new(DirBufferConfig::default());
        let mut fill = buffer.acquire(false).unwrap().unwrap();
        fill.fill(entry("a"));
        fill.abandon();
        assert!(!buffer.is_filled());
        assert!(buffer.acquire(false).unwrap().is_some());
    }

    #[test]
    fn test_blocking_acquire_waits_for_release() {
        let buffer = Arc::new(DirectoryBuffer::new(DirBufferConfig::default()));
        let mut fill = buffer.acquire(false).unwrap().unwrap();
        fill.fill(entry("a"));

        let b = Arc::clone(&buffer);
        let waiter = thread::spawn(move || b.acquire(false).unwrap().is_none());
        thread::sleep(std::time::Duration::from_millis(20));
        fill.release();
        assert!(waiter.join().unwrap());
    }
}
