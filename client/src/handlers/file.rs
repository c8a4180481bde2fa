//! File transfer legs: sending a file to a peer through the relay, and
//! receiving one announced by a `/FILE_RESPONSE`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use common::net::{self, FrameReader, StreamWriter};
use common::proto::{Command, TransferOffer, TransferRequest};
use common::utils::{checksum, file};
use log::debug;

use crate::data::TRANSFERS;
use crate::engine::{self, TransferError};
use crate::types::{Direction, Transfer, TransferKind, TransferStatus};

/// `/sendfile <uid> <path>`: checksum the file, announce it, then stream
/// exactly `size` bytes through the pause-aware engine. The connection's
/// write half stays locked from the request frame to the last payload byte.
pub async fn send_file(writer: StreamWriter, recipient_id: String, path_input: String) {
    let path = match file::resolve_path(&path_input) {
        Ok(path) => path,
        Err(e) => {
            println!("❌ Error opening file: {e}");
            return;
        }
    };
    if !path.is_file() {
        println!("❌ Error: {} is not a file", path.display());
        return;
    }
    let name = match path.file_name() {
        Some(name) => name.to_string_lossy().to_string(),
        None => {
            println!("❌ Error: invalid file name: {}", path.display());
            return;
        }
    };
    let size = match tokio::fs::metadata(&path).await {
        Ok(meta) => meta.len(),
        Err(e) => {
            println!("❌ Error getting file info: {e}");
            return;
        }
    };
    let checksum = match checksum::file_checksum(&path).await {
        Ok(sum) => sum,
        Err(e) => {
            println!("❌ Error calculating checksum: {e}");
            return;
        }
    };

    let transfer_id = TRANSFERS.generate_id();
    println!("📤 Sending file '{name}' to user {recipient_id} (Transfer ID: {transfer_id})...");

    let transfer = Arc::new(Transfer::new(
        transfer_id.clone(),
        TransferKind::File,
        name.clone(),
        size,
        Direction::Send,
        recipient_id.clone(),
        path.clone(),
        checksum.clone(),
    ));
    TRANSFERS.register(transfer.clone());

    let request = Command::FileRequest(TransferRequest {
        recipient_id,
        name: name.clone(),
        size,
        checksum: checksum.clone(),
        transfer_id: transfer_id.clone(),
    });

    let result = stream_payload(&writer, &request.encode(), &path, size, &transfer).await;
    match result {
        Ok(()) => {
            transfer.set_status(TransferStatus::Completed);
            println!("✅ File '{name}' sent successfully!");
            println!("  MD5 Checksum: {checksum}");
        }
        Err(e) => {
            transfer.set_status(TransferStatus::Failed);
            println!("❌ Error sending file: {e}");
        }
    }
    TRANSFERS.remove(&transfer_id);
}

/// Write the request frame and the file payload as one uninterruptible
/// sequence on the shared write half.
pub(crate) async fn stream_payload(
    writer: &StreamWriter,
    request_frame: &str,
    path: &Path,
    size: u64,
    transfer: &Transfer,
) -> Result<(), TransferError> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut guard = writer.lock().await;
    net::write_frame_to(&mut *guard, request_frame).await?;
    engine::copy_pausable(&mut file, &mut *guard, size, transfer).await
}

/// Receive leg triggered by a `/FILE_RESPONSE`. Consumes exactly
/// `offer.size` payload bytes from the connection before control parsing
/// resumes, then verifies the announced checksum.
pub async fn receive_file(reader: &mut FrameReader, offer: TransferOffer) {
    println!("📥 File transfer starting...");
    let name = offer.meta.name.clone();
    let expected_checksum = offer.meta.checksum.clone();
    let transfer_id = if offer.meta.transfer_id.is_empty() {
        TRANSFERS.generate_id()
    } else {
        offer.meta.transfer_id.clone()
    };
    println!(
        "📥 Receiving file: {name} (Size: {} bytes, Transfer ID: {transfer_id})",
        offer.size
    );

    let target = PathBuf::from(&offer.store_path).join(&name);
    let mut file = match tokio::fs::File::create(&target).await {
        Ok(file) => file,
        Err(e) => {
            println!("❌ Error creating file: {e}");
            // The payload is already on the wire; eat it to keep the
            // control channel parseable.
            let _ = reader.drain_payload(offer.size).await;
            return;
        }
    };

    let transfer = Arc::new(Transfer::new(
        transfer_id.clone(),
        TransferKind::File,
        name.clone(),
        offer.size,
        Direction::Receive,
        offer.recipient_id.clone(),
        target.clone(),
        expected_checksum.clone(),
    ));
    TRANSFERS.register(transfer.clone());

    let result =
        engine::copy_pausable(reader.inner_mut(), &mut file, offer.size, &transfer).await;
    drop(file);

    match result {
        Ok(()) => {
            if !expected_checksum.is_empty() {
                verify_checksum(&target, &expected_checksum).await;
            }
            transfer.set_status(TransferStatus::Completed);
            println!("✅ File '{name}' received successfully!");
            println!("📂 Saved to: {}", target.display());
        }
        Err(e) => {
            transfer.set_status(TransferStatus::Failed);
            println!("❌ Error receiving file: {e}");
        }
    }
    TRANSFERS.remove(&transfer_id);
}

/// Recompute and report. The file is kept either way; what to do with a
/// corrupt copy is the user's call.
pub(crate) async fn verify_checksum(path: &Path, expected: &str) {
    match checksum::file_checksum(path).await {
        Ok(actual) => {
            println!("📋 Calculated checksum: {actual}");
            if checksum::verify(expected, &actual) {
                println!("✅ Checksum verification successful! Integrity confirmed.");
            } else {
                println!("❌ Checksum verification failed! Data may be corrupted.");
            }
        }
        Err(e) => println!("❌ Error calculating checksum: {e}"),
    }
}

/// `/download <uid> <path>`: ask the relay to have `uid` send us `path`.
pub async fn send_download_request(writer: &StreamWriter, target_id: &str, path: &str) {
    let frame = Command::Download {
        target_id: target_id.to_string(),
        path: path.to_string(),
    };
    if let Err(e) = net::write_frame(writer, &frame.encode()).await {
        println!("❌ Error sending download request: {e}");
        return;
    }
    println!("📥 Download request sent successfully");
}

/// Inbound `/DOWNLOAD_REQUEST <requester> <path>`: serve the requested path
/// back to the requester as a file or folder send.
pub async fn handle_download_request(writer: StreamWriter, requester_id: String, path: String) {
    let resolved = match file::resolve_path(&path) {
        Ok(resolved) => resolved,
        Err(e) => {
            println!("❌ Cannot serve download request for {path}: {e}");
            return;
        }
    };
    debug!("download request from {requester_id} for {}", resolved.display());
    if resolved.is_dir() {
        super::folder::send_folder(writer, requester_id, path).await;
    } else {
        send_file(writer, requester_id, path).await;
    }
}

/// `/lookup <uid>` prompt command.
pub async fn send_lookup_request(writer: &StreamWriter, target_id: &str) {
    let frame = Command::Look { target_id: target_id.to_string() };
    if let Err(e) = net::write_frame(writer, &frame.encode()).await {
        println!("❌ Error sending lookup request: {e}");
    }
}
