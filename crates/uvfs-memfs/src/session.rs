//! A scripted client session used by the demo binary.

use std::time::Duration;
use tracing::info;
use uvfs::error::{FsError, Result};
use uvfs::request::{Operation, Reply, Response};
use uvfs::types::{CleanupFlags, CreateOptions, FileAttributes, FileContext};
use uvfs::TransportClient;

const TIMEOUT: Duration = Duration::from_secs(5);

fn call(client: &TransportClient, op: Operation) -> Result<Response> {
    let response = client.call(op, TIMEOUT)?;
    if !response.is_success() {
        return Err(FsError::Status(response.status));
    }
    Ok(response)
}

fn opened(response: Response) -> Result<FileContext> {
    match response.reply {
        Reply::Opened(opened) => Ok(opened.context),
        other => Err(FsError::invalid(format!("expected an open reply, got {:?}", other))),
    }
}

/// Create, write, reopen and read back a file, then list the root.
pub fn smoke(client: &TransportClient) -> Result<Vec<String>> {
    let volume = call(client, Operation::GetVolumeInfo)?;
    if let Reply::VolumeInfo(info) = &volume.reply {
        info!(label = %info.volume_label, free = info.free_size, "Volume");
    }

    let context = opened(call(
        client,
        Operation::Create {
            file_name: "\\hello.txt".to_string(),
            create_options: CreateOptions::default(),
            granted_access: 0,
            file_attributes: FileAttributes::NORMAL,
            security_descriptor: None,
            allocation_size: 0,
        },
    )?)?;
    call(
        client,
        Operation::Write {
            context,
            offset: 0,
            data: b"hello".to_vec(),
            write_to_end_of_file: false,
            constrained_io: false,
        },
    )?;
    call(
        client,
        Operation::Cleanup {
            context,
            file_name: None,
            flags: CleanupFlags(CleanupFlags::SET_LAST_WRITE_TIME),
        },
    )?;
    call(client, Operation::Close { context })?;

    let context = opened(call(
        client,
        Operation::Open {
            file_name: "\\hello.txt".to_string(),
            create_options: CreateOptions::default(),
            granted_access: 0,
        },
    )?)?;
    let data = call(
        client,
        Operation::Read {
            context,
            offset: 0,
            length: 64,
        },
    )?;
    if let Reply::Data(bytes) = &data.reply {
        info!(content = %String::from_utf8_lossy(bytes), "Read back");
    }
    call(client, Operation::Close { context })?;

    let root = opened(call(
        client,
        Operation::Open {
            file_name: "\\".to_string(),
            create_options: CreateOptions::directory(),
            granted_access: 0,
        },
    )?)?;
    let listing = call(
        client,
        Operation::QueryDirectory {
            context: root,
            pattern: None,
            marker: None,
            buffer_len: 64 * 1024,
        },
    )?;
    call(client, Operation::Close { context: root })?;

    let names = match listing.reply {
        Reply::Directory { entries, .. } => entries.into_iter().map(|e| e.name).collect(),
        _ => Vec::new(),
    };
    info!(entries = ?names, "Root listing");
    Ok(names)
}
