//! End-to-end scenarios: requests travel over the in-process transport,
//! through the dispatcher pool, into the in-memory store.

use std::sync::Arc;
use std::time::Duration;
use uvfs::request::{Operation, Reply, Response};
use uvfs::service::{control, Service, ServiceState};
use uvfs::types::{CreateOptions, FileAttributes, FileContext, ReparseData};
use uvfs::{DebugLog, GuardStrategy, MountPoint, NtStatus, TransportClient, VolumeParams};
use uvfs_memfs::{session, MemFs, MemFsDaemon};

const WAIT: Duration = Duration::from_secs(5);

fn mount(params: VolumeParams) -> (Service<MemFsDaemon>, TransportClient) {
    let read_only = params.read_only_volume;
    let store = Arc::new(MemFs::new("e2e", read_only).unwrap());
    let (daemon, client) = MemFsDaemon::new(
        store,
        params,
        MountPoint::Drive('M'),
        GuardStrategy::fine(),
        4,
        DebugLog::disabled(),
    )
    .unwrap();
    let service = Service::new("e2e", daemon);
    service.start(&[]).unwrap();
    (service, client)
}

fn call(client: &TransportClient, op: Operation) -> Response {
    client.call(op, WAIT).unwrap()
}

fn create(client: &TransportClient, name: &str, directory: bool) -> FileContext {
    let options = if directory {
        CreateOptions::directory()
    } else {
        CreateOptions::default()
    };
    let resp = call(
        client,
        Operation::Create {
            file_name: name.to_string(),
            create_options: options,
            granted_access: 0,
            file_attributes: FileAttributes::NORMAL,
            security_descriptor: None,
            allocation_size: 0,
        },
    );
    assert_eq!(resp.status, NtStatus::Success, "create {}", name);
    match resp.reply {
        Reply::Opened(opened) => opened.context,
        other => panic!("unexpected reply {:?}", other),
    }
}

fn open(client: &TransportClient, name: &str) -> FileContext {
    let resp = call(
        client,
        Operation::Open {
            file_name: name.to_string(),
            create_options: CreateOptions::default(),
            granted_access: 0,
        },
    );
    match resp.reply {
        Reply::Opened(opened) => opened.context,
        other => panic!("open {} failed: {:?} {:?}", name, resp.status, other),
    }
}

fn close(client: &TransportClient, context: FileContext) {
    assert!(call(client, Operation::Close { context }).is_success());
}

#[test]
fn test_write_close_reopen_read() {
    let (service, client) = mount(VolumeParams::default());
    let ctx = create(&client, "\\hello.txt", false);
    let resp = call(
        &client,
        Operation::Write {
            context: ctx,
            offset: 0,
            data: b"hello".to_vec(),
            write_to_end_of_file: false,
            constrained_io: false,
        },
    );
    match resp.reply {
        Reply::Written {
            bytes_transferred,
            info,
        } => {
            assert_eq!(bytes_transferred, 5);
            assert_eq!(info.file_size, 5);
        }
        other => panic!("unexpected reply {:?}", other),
    }
    close(&client, ctx);

    let ctx = open(&client, "\\hello.txt");
    let resp = call(
        &client,
        Operation::Read {
            context: ctx,
            offset: 0,
            length: 100,
        },
    );
    assert_eq!(resp.reply, Reply::Data(b"hello".to_vec()));
    close(&client, ctx);

    // The context is gone once closed.
    let resp = call(&client, Operation::GetFileInfo { context: ctx });
    assert_eq!(resp.status, NtStatus::InvalidHandle);

    service.control(control::STOP).unwrap();
    assert_eq!(service.state(), ServiceState::Stopped);
}

#[test]
fn test_directory_pages_resume_from_marker() {
    let (service, client) = mount(VolumeParams::default());
    for name in ["\\c", "\\a", "\\b"] {
        let ctx = create(&client, name, false);
        close(&client, ctx);
    }
    let root = open(&client, "\\");
    // Single-character names take 112 bytes each.
    let two_entries = 224;

    let mut marker = None;
    let mut pages = Vec::new();
    loop {
        let resp = call(
            &client,
            Operation::QueryDirectory {
                context: root,
                pattern: None,
                marker: marker.clone(),
                buffer_len: two_entries,
            },
        );
        assert_eq!(resp.status, NtStatus::Success);
        let Reply::Directory {
            entries,
            next_marker,
            ..
        } = resp.reply
        else {
            panic!("expected a directory reply");
        };
        let names: Vec<String> = entries.into_iter().map(|e| e.name).collect();
        let done = names.is_empty();
        pages.push(names);
        if done {
            assert_eq!(next_marker, None);
            break;
        }
        marker = next_marker;
    }
    assert_eq!(
        pages,
        vec![
            vec!["a".to_string(), "b".to_string()],
            vec!["c".to_string()],
            vec![],
        ]
    );
    close(&client, root);
    service.stop().unwrap();
}

#[test]
fn test_read_only_volume_rejects_create() {
    let params = VolumeParams {
        read_only_volume: true,
        ..Default::default()
    };
    let (service, client) = mount(params);
    let resp = call(
        &client,
        Operation::Create {
            file_name: "\\nope".to_string(),
            create_options: CreateOptions::default(),
            granted_access: 0,
            file_attributes: FileAttributes::NORMAL,
            security_descriptor: None,
            allocation_size: 0,
        },
    );
    assert_eq!(resp.status, NtStatus::MediaWriteProtected);
    assert!(call(&client, Operation::GetVolumeInfo).is_success());
    service.stop().unwrap();
}

#[test]
fn test_symlink_resolution() {
    let params = VolumeParams {
        reparse_points: true,
        ..Default::default()
    };
    let (service, client) = mount(params);
    let target = create(&client, "\\target", true);
    let inner = create(&client, "\\target\\x", false);
    let link = create(&client, "\\link", false);
    let resp = call(
        &client,
        Operation::SetReparsePoint {
            context: link,
            file_name: "\\link".to_string(),
            data: ReparseData::symlink("\\target"),
        },
    );
    assert!(resp.is_success());

    let resp = call(
        &client,
        Operation::GetSecurityByName {
            file_name: "\\link\\x".to_string(),
        },
    );
    assert_eq!(resp.status, NtStatus::Reparse);
    assert!(matches!(
        resp.reply,
        Reply::SecurityByName {
            reparse_index: Some(0),
            ..
        }
    ));

    let resp = call(
        &client,
        Operation::ResolveReparsePoints {
            file_name: "\\link\\x".to_string(),
            reparse_point_index: 0,
            resolve_last_component: true,
        },
    );
    assert_eq!(resp.status, NtStatus::Reparse);
    assert_eq!(
        resp.reply,
        Reply::Resolved {
            path: "\\target\\x".to_string(),
            reparse_tag: 0,
            substitutions: 1,
        }
    );

    let resp = call(
        &client,
        Operation::ResolveReparsePoints {
            file_name: "\\link\\missing".to_string(),
            reparse_point_index: 0,
            resolve_last_component: true,
        },
    );
    assert_eq!(resp.status, NtStatus::ObjectPathNotFound);

    for ctx in [target, inner, link] {
        close(&client, ctx);
    }
    service.stop().unwrap();
}

#[test]
fn test_volume_label_bounds() {
    let (service, client) = mount(VolumeParams::default());
    let resp = call(
        &client,
        Operation::SetVolumeLabel {
            label: "x".repeat(33),
        },
    );
    assert_eq!(resp.status, NtStatus::InvalidParameter);
    let resp = call(
        &client,
        Operation::SetVolumeLabel {
            label: "backup".to_string(),
        },
    );
    match resp.reply {
        Reply::VolumeInfo(info) => assert_eq!(info.volume_label, "backup"),
        other => panic!("unexpected reply {:?}", other),
    }
    service.stop().unwrap();
}

#[test]
fn test_rename_keeps_open_handle_usable() {
    let (service, client) = mount(VolumeParams::default());
    let ctx = create(&client, "\\old", false);
    call(
        &client,
        Operation::Write {
            context: ctx,
            offset: 0,
            data: b"data".to_vec(),
            write_to_end_of_file: false,
            constrained_io: false,
        },
    );
    let resp = call(
        &client,
        Operation::Rename {
            context: ctx,
            file_name: "\\old".to_string(),
            new_file_name: "\\new".to_string(),
            replace_if_exists: false,
        },
    );
    assert!(resp.is_success());
    let resp = call(
        &client,
        Operation::Read {
            context: ctx,
            offset: 0,
            length: 4,
        },
    );
    assert_eq!(resp.reply, Reply::Data(b"data".to_vec()));
    let resp = call(
        &client,
        Operation::GetSecurityByName {
            file_name: "\\old".to_string(),
        },
    );
    assert_eq!(resp.status, NtStatus::ObjectNameNotFound);
    close(&client, ctx);
    service.stop().unwrap();
}

#[test]
fn test_smoke_session_and_restart() {
    let (service, client) = mount(VolumeParams::default());
    let names = session::smoke(&client).unwrap();
    assert_eq!(names, vec!["hello.txt".to_string()]);
    service.stop().unwrap();

    service.start(&[]).unwrap();
    assert!(service.hooks().file_system().is_running());
    let resp = call(&client, Operation::GetVolumeInfo);
    assert!(resp.is_success());
    service.stop().unwrap();
    assert_eq!(service.hooks().store().open_handles(), 0);
}

#[test]
fn test_write_past_size_limit_reports_disk_full() {
    let (service, client) = mount(VolumeParams::default());
    let ctx = create(&client, "\\a", false);
    let resp = call(
        &client,
        Operation::Write {
            context: ctx,
            offset: u64::MAX - 1,
            data: b"hello".to_vec(),
            write_to_end_of_file: false,
            constrained_io: false,
        },
    );
    assert_eq!(resp.status, NtStatus::DiskFull);
    let resp = call(
        &client,
        Operation::SetFileSize {
            context: ctx,
            new_size: 1 << 40,
            set_allocation_size: false,
        },
    );
    assert_eq!(resp.status, NtStatus::DiskFull);
    close(&client, ctx);
    assert_eq!(service.hooks().file_system().stats().panics, 0);
    service.stop().unwrap();
}
