//! Turns one [`Request`] into one [`Response`].
//!
//! Dispatch order: IRP capacity, read-only volume, capability, live file
//! context, then the handler inside the guard bracket. Handler errors become
//! the response status; a handler panic becomes `InternalError`. Nothing a
//! handler does can unwind past [`OperationDispatcher::dispatch`].

use crate::debug_log::DebugLog;
use crate::dir_buffer::{DirBufferConfig, DirectoryBuffer};
use crate::error::{FsError, Result};
use crate::guard::{GuardScope, GuardStrategy, OperationGuard};
use crate::ops::OperationTable;
use crate::reparse::{ReparsePointResolver, ResolveStatus};
use crate::request::{Operation, Reply, Request, Response};
use crate::security::SecurityDescriptor;
use crate::status::NtStatus;
use crate::types::{
    is_separator, DirEntry, FileAttributes, FileContext, OpenedFile, MAX_VOLUME_LABEL_LEN,
};
use crate::volume::VolumeParams;
use dashmap::DashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, debug_span, error, Span};

/// Point-in-time dispatch counters.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DispatcherStats {
    pub processed: u64,
    pub failed: u64,
    pub not_implemented: u64,
    pub rejected: u64,
    pub panics: u64,
}

#[derive(Debug, Default)]
struct StatsCounters {
    processed: AtomicU64,
    failed: AtomicU64,
    not_implemented: AtomicU64,
    rejected: AtomicU64,
    panics: AtomicU64,
}

/// What the dispatcher remembers about a live file context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenContext {
    pub file_name: String,
    pub is_directory: bool,
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

pub struct OperationDispatcher {
    params: Arc<VolumeParams>,
    table: OperationTable,
    guard: Arc<dyn OperationGuard>,
    resolver: ReparsePointResolver,
    contexts: DashMap<FileContext, OpenContext>,
    dir_buffers: DashMap<FileContext, Arc<DirectoryBuffer>>,
    in_flight: AtomicUsize,
    counters: StatsCounters,
    log: DebugLog,
}

impl OperationDispatcher {
    pub fn new(
        params: Arc<VolumeParams>,
        table: OperationTable,
        strategy: GuardStrategy,
        log: DebugLog,
    ) -> Self {
        let resolver = ReparsePointResolver::new(params.max_reparse_depth);
        Self {
            params,
            table,
            guard: strategy.into_guard(),
            resolver,
            contexts: DashMap::new(),
            dir_buffers: DashMap::new(),
            in_flight: AtomicUsize::new(0),
            counters: StatsCounters::default(),
            log,
        }
    }

    pub fn params(&self) -> &VolumeParams {
        &self.params
    }

    pub fn stats(&self) -> DispatcherStats {
        DispatcherStats {
            processed: self.counters.processed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            not_implemented: self.counters.not_implemented.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
            panics: self.counters.panics.load(Ordering::Relaxed),
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn open_contexts(&self) -> usize {
        self.contexts.len()
    }

    pub fn context(&self, context: FileContext) -> Option<OpenContext> {
        self.contexts.get(&context).map(|entry| entry.value().clone())
    }

    pub fn dispatch(&self, request: &Request) -> Response {
        let kind = request.kind();
        let previous = self.in_flight.fetch_add(1, Ordering::AcqRel);
        let _slot = InFlight(&self.in_flight);

        if previous >= self.params.irp_capacity() {
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            debug!(id = %request.id, op = %kind, in_flight = previous, "IRP capacity exceeded");
            return Response::error(request, NtStatus::InsufficientResources);
        }
        if self.params.read_only_volume && kind.is_mutating() {
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            return Response::error(request, NtStatus::MediaWriteProtected);
        }
        if !self.table.supports(kind) {
            self.counters.not_implemented.fetch_add(1, Ordering::Relaxed);
            return Response::error(request, NtStatus::NotImplemented);
        }
        if let Some(context) = request.op.context() {
            if !self.contexts.contains_key(&context) {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                return Response::error(request, NtStatus::InvalidHandle);
            }
        }

        let traced = self.log.enabled(kind);
        let span = if traced {
            debug_span!(parent: self.log.span(), "dispatch", id = %request.id, op = %kind)
        } else {
            Span::none()
        };
        let _entered = span.enter();
        if traced {
            debug!(file_name = request.op.file_name(), context = ?request.op.context(), "Dispatching");
        }

        let scope = GuardScope::enter(self.guard.as_ref(), request);
        let response = match catch_unwind(AssertUnwindSafe(|| self.handle(request))) {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => {
                if traced {
                    debug!(error = %err, "Handler failed");
                }
                Response::error(request, err.status())
            }
            Err(_) => {
                self.counters.panics.fetch_add(1, Ordering::Relaxed);
                error!(id = %request.id, op = %kind, "Handler panicked");
                Response::error(request, NtStatus::InternalError)
            }
        };
        scope.finish(&response);

        self.counters.processed.fetch_add(1, Ordering::Relaxed);
        if response.status == NtStatus::NotImplemented {
            self.counters.not_implemented.fetch_add(1, Ordering::Relaxed);
        } else if response.status.is_error() {
            self.counters.failed.fetch_add(1, Ordering::Relaxed);
        }
        if traced {
            debug!(status = %response.status, "Completed");
        }
        response
    }

    fn handle(&self, request: &Request) -> Result<Response> {
        let store = self.table.store();
        let reply = match &request.op {
            Operation::GetVolumeInfo => Reply::VolumeInfo(store.get_volume_info()?),
            Operation::SetVolumeLabel { label } => {
                if label.encode_utf16().count() > MAX_VOLUME_LABEL_LEN {
                    return Err(FsError::invalid(format!(
                        "volume label longer than {} characters",
                        MAX_VOLUME_LABEL_LEN
                    )));
                }
                Reply::VolumeInfo(store.set_volume_label(label)?)
            }
            Operation::GetSecurityByName { file_name } => {
                return self.get_security_by_name(request, file_name);
            }
            Operation::Create {
                file_name,
                create_options,
                granted_access,
                file_attributes,
                security_descriptor,
                allocation_size,
            } => {
                self.validate_name(file_name)?;
                if let Some(sd) = security_descriptor {
                    SecurityDescriptor::from_bytes(sd)?;
                }
                let opened = store.create(
                    file_name,
                    *create_options,
                    *granted_access,
                    *file_attributes,
                    security_descriptor.as_deref(),
                    *allocation_size,
                )?;
                self.register(file_name, &opened);
                Reply::Opened(opened)
            }
            Operation::Open {
                file_name,
                create_options,
                granted_access,
            } => {
                self.validate_name(file_name)?;
                let opened = store.open(file_name, *create_options, *granted_access)?;
                self.register(file_name, &opened);
                Reply::Opened(opened)
            }
            Operation::Overwrite {
                context,
                file_attributes,
                replace_file_attributes,
                allocation_size,
            } => Reply::FileInfo(store.overwrite(
                *context,
                *file_attributes,
                *replace_file_attributes,
                *allocation_size,
            )?),
            Operation::Cleanup {
                context,
                file_name,
                flags,
            } => {
                store.cleanup(*context, file_name.as_deref(), *flags)?;
                Reply::None
            }
            Operation::Close { context } => {
                let result = store.close(*context);
                self.retire(*context);
                result?;
                Reply::None
            }
            Operation::Read {
                context,
                offset,
                length,
            } => Reply::Data(store.read(*context, *offset, *length)?),
            Operation::Write {
                context,
                offset,
                data,
                write_to_end_of_file,
                constrained_io,
            } => {
                let (bytes_transferred, info) = store.write(
                    *context,
                    *offset,
                    data,
                    *write_to_end_of_file,
                    *constrained_io,
                )?;
                Reply::Written {
                    bytes_transferred,
                    info,
                }
            }
            Operation::Flush { context } => match store.flush(*context)? {
                Some(info) => Reply::FileInfo(info),
                None => Reply::None,
            },
            Operation::GetFileInfo { context } => Reply::FileInfo(store.get_file_info(*context)?),
            Operation::SetBasicInfo { context, info } => {
                Reply::FileInfo(store.set_basic_info(*context, info)?)
            }
            Operation::SetFileSize {
                context,
                new_size,
                set_allocation_size,
            } => Reply::FileInfo(store.set_file_size(*context, *new_size, *set_allocation_size)?),
            Operation::CanDelete { context, file_name } => {
                store.can_delete(*context, file_name)?;
                Reply::None
            }
            Operation::Rename {
                context,
                file_name,
                new_file_name,
                replace_if_exists,
            } => {
                self.validate_name(new_file_name)?;
                store.rename(*context, file_name, new_file_name, *replace_if_exists)?;
                self.renamed(file_name, new_file_name);
                Reply::None
            }
            Operation::GetSecurity { context } => Reply::Security(store.get_security(*context)?),
            Operation::SetSecurity {
                context,
                security_information,
                modification,
            } => {
                SecurityDescriptor::from_bytes(modification)?;
                store.set_security(*context, *security_information, modification)?;
                Reply::None
            }
            Operation::QueryDirectory {
                context,
                pattern,
                marker,
                buffer_len,
            } => self.query_directory(*context, pattern.as_deref(), marker.as_deref(), *buffer_len)?,
            Operation::ResolveReparsePoints {
                file_name,
                reparse_point_index,
                resolve_last_component,
            } => {
                self.require(self.params.reparse_points)?;
                let resolution = self.resolver.resolve(
                    file_name,
                    *reparse_point_index,
                    *resolve_last_component,
                    |name, is_dir| store.get_reparse_point_by_name(name, is_dir),
                );
                let reparse_tag = match resolution.status {
                    ResolveStatus::Foreign { tag } => tag,
                    _ => 0,
                };
                return Ok(Response::with_status(
                    request,
                    resolution.status.to_status(),
                    Reply::Resolved {
                        path: resolution.path,
                        reparse_tag,
                        substitutions: resolution.substitutions,
                    },
                ));
            }
            Operation::GetReparsePoint { context, file_name } => {
                self.require(self.params.reparse_points)?;
                Reply::Reparse(store.get_reparse_point(*context, file_name)?)
            }
            Operation::SetReparsePoint {
                context,
                file_name,
                data,
            } => {
                self.require(self.params.reparse_points)?;
                store.set_reparse_point(*context, file_name, data)?;
                Reply::None
            }
            Operation::DeleteReparsePoint {
                context,
                file_name,
                data,
            } => {
                self.require(self.params.reparse_points)?;
                store.delete_reparse_point(*context, file_name, data)?;
                Reply::None
            }
            Operation::GetStreamInfo { context } => {
                self.require(self.params.named_streams)?;
                Reply::Streams(store.get_stream_info(*context)?)
            }
            Operation::GetDirInfoByName { context, file_name } => {
                Reply::DirEntry(store.get_dir_info_by_name(*context, file_name)?)
            }
            Operation::Control {
                context,
                code,
                input,
            } => {
                self.require(self.params.device_control)?;
                Reply::Control(store.control(*context, *code, input)?)
            }
            Operation::SetDelete {
                context,
                file_name,
                delete_file,
            } => {
                store.set_delete(*context, file_name, *delete_file)?;
                Reply::None
            }
        };
        Ok(Response::ok(request, reply))
    }

    fn get_security_by_name(&self, request: &Request, file_name: &str) -> Result<Response> {
        let store = self.table.store();
        if self.params.reparse_points {
            let hit = self
                .resolver
                .find_reparse_point(file_name, |name, is_dir| {
                    store.get_reparse_point_by_name(name, is_dir)
                });
            if let Some(index) = hit {
                return Ok(Response::with_status(
                    request,
                    NtStatus::Reparse,
                    Reply::SecurityByName {
                        file_attributes: FileAttributes::REPARSE_POINT,
                        security_descriptor: Vec::new(),
                        reparse_index: Some(index),
                    },
                ));
            }
        }
        let (file_attributes, security_descriptor) = store.get_security_by_name(file_name)?;
        Ok(Response::ok(
            request,
            Reply::SecurityByName {
                file_attributes,
                security_descriptor,
                reparse_index: None,
            },
        ))
    }

    fn query_directory(
        &self,
        context: FileContext,
        pattern: Option<&str>,
        marker: Option<&str>,
        buffer_len: usize,
    ) -> Result<Reply> {
        let buffer = self
            .dir_buffers
            .entry(context)
            .or_insert_with(|| {
                Arc::new(DirectoryBuffer::new(DirBufferConfig {
                    capacity_bytes: self.params.dir_buffer_capacity,
                    acquire: self.params.dir_buffer_acquire,
                }))
            })
            .value()
            .clone();
        // A Close may have retired the context after the registry check.
        if !self.contexts.contains_key(&context) {
            self.dir_buffers.remove(&context);
            return Err(FsError::InvalidHandle { context: context.0 });
        }

        if let Some(mut fill) = buffer.acquire(marker.is_none())? {
            let store_pattern = pattern.filter(|_| self.params.pass_query_directory_pattern);
            match self.table.store().read_directory(context, store_pattern, None) {
                Ok(entries) => {
                    let case_sensitive = self.params.case_sensitive_search;
                    fill.extend(entries.into_iter().filter(|entry: &DirEntry| {
                        store_pattern.is_some()
                            || pattern.map_or(true, |p| {
                                wildcard_match(p, &entry.name, case_sensitive)
                            })
                    }));
                    fill.release();
                }
                Err(err) => {
                    fill.abandon();
                    return Err(err);
                }
            }
        }

        let page = buffer.read(marker, buffer_len)?;
        Ok(Reply::Directory {
            entries: page.entries,
            bytes_transferred: page.bytes_transferred,
            next_marker: page.next_marker,
        })
    }

    fn require(&self, enabled: bool) -> Result<()> {
        if enabled {
            Ok(())
        } else {
            Err(FsError::Status(NtStatus::InvalidDeviceRequest))
        }
    }

    fn validate_name(&self, file_name: &str) -> Result<()> {
        let limit = usize::from(self.params.max_component_length);
        let too_long = file_name
            .split(is_separator)
            .any(|component| component.encode_utf16().count() > limit);
        if too_long {
            return Err(FsError::InvalidName {
                name: file_name.to_string(),
            });
        }
        Ok(())
    }

    fn register(&self, file_name: &str, opened: &OpenedFile) {
        self.contexts.insert(
            opened.context,
            OpenContext {
                file_name: file_name.to_string(),
                is_directory: opened.info.is_directory(),
            },
        );
    }

    fn retire(&self, context: FileContext) {
        self.contexts.remove(&context);
        self.dir_buffers.remove(&context);
    }

    fn renamed(&self, from: &str, to: &str) {
        for mut entry in self.contexts.iter_mut() {
            let current = &entry.value().file_name;
            let next = if current == from {
                Some(to.to_string())
            } else {
                current
                    .strip_prefix(from)
                    .filter(|rest| rest.starts_with(is_separator))
                    .map(|rest| format!("{}{}", to, rest))
            };
            if let Some(next) = next {
                entry.value_mut().file_name = next;
            }
        }
    }
}

/// `*` and `?` matching used when the store does not filter by pattern.
pub fn wildcard_match(pattern: &str, name: &str, case_sensitive: bool) -> bool {
    let fold = |s: &str| -> Vec<char> {
        if case_sensitive {
            s.chars().collect()
        } else {
            s.chars().flat_map(char::to_lowercase).collect()
        }
    };
    let pattern = fold(pattern);
    let name = fold(name);

    let (mut p, mut n) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;
    while n < name.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == name[n]) {
            p += 1;
            n += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            backtrack = Some((p, n));
            p += 1;
        } else if let Some((star, matched)) = backtrack {
            p = star + 1;
            n = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|c| *c == '*')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FsError;
    use crate::ops::{CapabilitySet, FileSystemOperations};
    use crate::request::OpKind;
    use crate::types::{CreateOptions, FileInfo, VolumeInfo};
    use std::sync::atomic::AtomicU64;

    struct Stub {
        next: AtomicU64,
    }

    impl Stub {
        fn new() -> Self {
            Self {
                next: AtomicU64::new(1),
            }
        }
    }

    impl FileSystemOperations for Stub {
        fn get_volume_info(&self) -> Result<VolumeInfo> {
            Ok(VolumeInfo::default())
        }

        fn open(&self, file_name: &str, _: CreateOptions, _: u32) -> Result<OpenedFile> {
            if file_name == "\\missing" {
                return Err(FsError::NotFound {
                    name: file_name.to_string(),
                });
            }
            let id = self.next.fetch_add(1, Ordering::Relaxed);
            Ok(OpenedFile::new(FileContext(id), FileInfo::default()))
        }

        fn close(&self, _context: FileContext) -> Result<()> {
            Ok(())
        }

        fn read(&self, _context: FileContext, _offset: u64, _length: u32) -> Result<Vec<u8>> {
            panic!("read handler exploded");
        }

        fn read_directory(
            &self,
            _context: FileContext,
            _pattern: Option<&str>,
            _marker: Option<&str>,
        ) -> Result<Vec<DirEntry>> {
            Ok(["b.txt", "a.txt", "c.log"]
                .iter()
                .map(|n| DirEntry::new(*n, FileInfo::default()))
                .collect())
        }
    }

    fn dispatcher_with(params: VolumeParams) -> OperationDispatcher {
        OperationDispatcher::new(
            Arc::new(params),
            OperationTable::from_store(Stub::new()),
            GuardStrategy::Coarse,
            DebugLog::disabled(),
        )
    }

    fn dispatcher() -> OperationDispatcher {
        dispatcher_with(VolumeParams::default())
    }

    fn open(d: &OperationDispatcher, name: &str) -> Response {
        d.dispatch(&Request::new(
            1,
            Operation::Open {
                file_name: name.to_string(),
                create_options: CreateOptions::default(),
                granted_access: 0,
            },
        ))
    }

    fn opened_context(resp: &Response) -> FileContext {
        match &resp.reply {
            Reply::Opened(opened) => opened.context,
            other => panic!("unexpected reply {:?}", other),
        }
    }

    /// Holds every entering request until opened.
    #[derive(Default)]
    struct Gate {
        state: parking_lot::Mutex<(usize, bool)>,
        changed: parking_lot::Condvar,
    }

    impl Gate {
        fn wait_for_entered(&self, n: usize) {
            let mut state = self.state.lock();
            while state.0 < n {
                self.changed.wait(&mut state);
            }
        }

        fn open(&self) {
            self.state.lock().1 = true;
            self.changed.notify_all();
        }
    }

    impl OperationGuard for Gate {
        fn enter(&self, _request: &Request) {
            let mut state = self.state.lock();
            state.0 += 1;
            self.changed.notify_all();
            while !state.1 {
                self.changed.wait(&mut state);
            }
        }

        fn leave(&self, _request: &Request, _response: &Response) {}
    }

    #[test]
    fn test_irp_capacity_rejects_excess_requests() {
        let gate = Arc::new(Gate::default());
        let d = OperationDispatcher::new(
            Arc::new(VolumeParams {
                irp_capacity: 100,
                ..Default::default()
            }),
            OperationTable::from_store(Stub::new()),
            GuardStrategy::Fine(gate.clone()),
            DebugLog::disabled(),
        );
        std::thread::scope(|scope| {
            let held: Vec<_> = (0..100u64)
                .map(|id| {
                    let d = &d;
                    scope.spawn(move || d.dispatch(&Request::new(id, Operation::GetVolumeInfo)))
                })
                .collect();
            gate.wait_for_entered(100);
            assert_eq!(d.in_flight(), 100);

            let resp = d.dispatch(&Request::new(100, Operation::GetVolumeInfo));
            assert_eq!(resp.status, NtStatus::InsufficientResources);
            assert_eq!(d.stats().rejected, 1);

            gate.open();
            for handle in held {
                assert!(handle.join().unwrap().is_success());
            }
        });
        assert_eq!(d.in_flight(), 0);
        assert_eq!(d.stats().processed, 100);
        assert!(d
            .dispatch(&Request::new(101, Operation::GetVolumeInfo))
            .is_success());
    }

    #[test]
    fn test_unimplemented_operation() {
        let d = dispatcher();
        let resp = d.dispatch(&Request::new(
            1,
            Operation::SetVolumeLabel {
                label: "x".to_string(),
            },
        ));
        assert_eq!(resp.status, NtStatus::NotImplemented);
    }

    #[test]
    fn test_capability_filtered_operation() {
        let d = OperationDispatcher::new(
            Arc::new(VolumeParams::default()),
            OperationTable::from_store(Stub::new())
                .restrict(CapabilitySet::all().without(OpKind::GetVolumeInfo)),
            GuardStrategy::Coarse,
            DebugLog::disabled(),
        );
        let resp = d.dispatch(&Request::new(1, Operation::GetVolumeInfo));
        assert_eq!(resp.status, NtStatus::NotImplemented);
        assert_eq!(d.stats().not_implemented, 1);
    }

    #[test]
    fn test_unknown_context_is_invalid_handle() {
        let d = dispatcher();
        let resp = d.dispatch(&Request::new(
            1,
            Operation::GetFileInfo {
                context: FileContext(77),
            },
        ));
        assert_eq!(resp.status, NtStatus::InvalidHandle);
    }

    #[test]
    fn test_open_registers_and_close_retires() {
        let d = dispatcher();
        let ctx = opened_context(&open(&d, "\\a.txt"));
        assert_eq!(d.open_contexts(), 1);
        assert_eq!(d.context(ctx).unwrap().file_name, "\\a.txt");
        let resp = d.dispatch(&Request::new(2, Operation::Close { context: ctx }));
        assert!(resp.is_success());
        assert_eq!(d.open_contexts(), 0);
        let resp = d.dispatch(&Request::new(3, Operation::Close { context: ctx }));
        assert_eq!(resp.status, NtStatus::InvalidHandle);
    }

    #[test]
    fn test_store_error_forwarded_verbatim() {
        let d = dispatcher();
        let resp = open(&d, "\\missing");
        assert_eq!(resp.status, NtStatus::ObjectNameNotFound);
        assert_eq!(d.stats().failed, 1);
    }

    #[test]
    fn test_panic_becomes_internal_error() {
        let d = dispatcher();
        let ctx = opened_context(&open(&d, "\\a.txt"));
        let resp = d.dispatch(&Request::new(
            2,
            Operation::Read {
                context: ctx,
                offset: 0,
                length: 1,
            },
        ));
        assert_eq!(resp.status, NtStatus::InternalError);
        assert_eq!(d.stats().panics, 1);
        // The coarse guard was released, so later requests still run.
        let resp = d.dispatch(&Request::new(3, Operation::GetVolumeInfo));
        assert!(resp.is_success());
    }

    #[test]
    fn test_read_only_volume_rejects_mutation() {
        let d = dispatcher_with(VolumeParams {
            read_only_volume: true,
            ..Default::default()
        });
        let resp = d.dispatch(&Request::new(
            1,
            Operation::SetVolumeLabel {
                label: "x".to_string(),
            },
        ));
        assert_eq!(resp.status, NtStatus::MediaWriteProtected);
    }

    #[test]
    fn test_name_too_long() {
        let d = dispatcher_with(VolumeParams {
            max_component_length: 4,
            ..Default::default()
        });
        let resp = open(&d, "\\toolong");
        assert_eq!(resp.status, NtStatus::ObjectNameInvalid);
    }

    #[test]
    fn test_query_directory_pattern_filtered() {
        let d = dispatcher();
        let ctx = opened_context(&open(&d, "\\"));
        let resp = d.dispatch(&Request::new(
            2,
            Operation::QueryDirectory {
                context: ctx,
                pattern: Some("*.txt".to_string()),
                marker: None,
                buffer_len: 4096,
            },
        ));
        match resp.reply {
            Reply::Directory { entries, .. } => {
                let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
                assert_eq!(names, ["a.txt", "b.txt"]);
            }
            other => panic!("unexpected reply {:?}", other),
        }
    }

    #[test]
    fn test_query_directory_after_close_keeps_no_buffer() {
        let d = dispatcher();
        let ctx = opened_context(&open(&d, "\\"));
        let resp = d.dispatch(&Request::new(2, Operation::Close { context: ctx }));
        assert!(resp.is_success());
        // Same as a query that passed the registry check just before Close.
        let err = d.query_directory(ctx, None, None, 4096).unwrap_err();
        assert!(matches!(err, FsError::InvalidHandle { .. }));
        assert!(d.dir_buffers.is_empty());
    }

    #[test]
    fn test_stream_info_disabled() {
        let d = dispatcher();
        let ctx = opened_context(&open(&d, "\\a"));
        let resp = d.dispatch(&Request::new(2, Operation::GetStreamInfo { context: ctx }));
        assert_eq!(resp.status, NtStatus::InvalidDeviceRequest);
    }

    #[test]
    fn test_wildcard_match() {
        assert!(wildcard_match("*", "anything", true));
        assert!(wildcard_match("*.txt", "a.txt", true));
        assert!(!wildcard_match("*.txt", "a.log", true));
        assert!(wildcard_match("a?c", "abc", true));
        assert!(wildcard_match("A*", "abc", false));
        assert!(!wildcard_match("A*", "abc", true));
        assert!(wildcard_match("*b*", "abc", true));
    }
}
