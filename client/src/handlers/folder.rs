//! Folder transfer legs and directory lookups. A folder travels as a ZIP
//! archive; the checksum covers the archive bytes.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use common::net::{self, FrameReader, StreamWriter};
use common::proto::{self, Command, TransferOffer, TransferRequest};
use common::utils::{archive, checksum, file};
use walkdir::WalkDir;

use crate::data::TRANSFERS;
use crate::engine;
use crate::types::{Direction, Transfer, TransferKind, TransferStatus};

/// `/sendfolder <uid> <path>`: zip the folder, checksum the archive, stream
/// it like a file. The temporary archive is removed on every exit path.
pub async fn send_folder(writer: StreamWriter, recipient_id: String, path_input: String) {
    let folder = match file::resolve_path(&path_input) {
        Ok(path) => path,
        Err(e) => {
            println!("❌ Error opening folder: {e}");
            return;
        }
    };
    if !folder.is_dir() {
        println!("❌ Error: {} is not a directory", folder.display());
        return;
    }
    let folder_name = match folder.file_name() {
        Some(name) => name.to_string_lossy().to_string(),
        None => {
            println!("❌ Error: invalid folder name: {}", folder.display());
            return;
        }
    };

    println!("📦 Preparing folder for transfer...");
    let mut zip_os_name = folder.as_os_str().to_owned();
    zip_os_name.push(".zip");
    let zip_path = PathBuf::from(zip_os_name);
    if let Err(e) = archive::zip_folder(&folder, &zip_path) {
        println!("❌ Error creating zip file: {e}");
        let _ = std::fs::remove_file(&zip_path);
        return;
    }

    let outcome = send_archive(&writer, &recipient_id, &folder_name, &folder, &zip_path).await;
    let _ = std::fs::remove_file(&zip_path);
    if let Some((name, checksum)) = outcome {
        println!("✅ Folder '{name}' sent successfully!");
        println!("  MD5 Checksum: {checksum}");
    }
}

async fn send_archive(
    writer: &StreamWriter,
    recipient_id: &str,
    folder_name: &str,
    folder: &Path,
    zip_path: &Path,
) -> Option<(String, String)> {
    let size = match tokio::fs::metadata(zip_path).await {
        Ok(meta) => meta.len(),
        Err(e) => {
            println!("❌ Error getting zip file info: {e}");
            return None;
        }
    };
    let checksum = match checksum::file_checksum(zip_path).await {
        Ok(sum) => sum,
        Err(e) => {
            println!("❌ Error calculating checksum: {e}");
            return None;
        }
    };

    let transfer_id = TRANSFERS.generate_id();
    println!(
        "📤 Sending folder '{folder_name}' to user {recipient_id} (Transfer ID: {transfer_id})..."
    );

    let transfer = Arc::new(Transfer::new(
        transfer_id.clone(),
        TransferKind::Folder,
        folder_name.to_string(),
        size,
        Direction::Send,
        recipient_id.to_string(),
        folder.to_path_buf(),
        checksum.clone(),
    ));
    TRANSFERS.register(transfer.clone());

    let request = Command::FolderRequest(TransferRequest {
        recipient_id: recipient_id.to_string(),
        name: folder_name.to_string(),
        size,
        checksum: checksum.clone(),
        transfer_id: transfer_id.clone(),
    });

    let result =
        super::file::stream_payload(writer, &request.encode(), zip_path, size, &transfer).await;
    let outcome = match result {
        Ok(()) => {
            transfer.set_status(TransferStatus::Completed);
            Some((folder_name.to_string(), checksum))
        }
        Err(e) => {
            transfer.set_status(TransferStatus::Failed);
            println!("❌ Error sending folder: {e}");
            None
        }
    };
    TRANSFERS.remove(&transfer_id);
    outcome
}

/// Receive leg triggered by a `/FOLDER_RESPONSE`: store the archive, verify
/// it, extract it into `<store>/<name>/`, then delete the archive.
pub async fn receive_folder(reader: &mut FrameReader, offer: TransferOffer) {
    println!("📥 Folder transfer starting...");
    let name = offer.meta.name.clone();
    let expected_checksum = offer.meta.checksum.clone();
    let transfer_id = if offer.meta.transfer_id.is_empty() {
        TRANSFERS.generate_id()
    } else {
        offer.meta.transfer_id.clone()
    };
    println!(
        "📥 Receiving folder: {name} (Size: {} bytes, Transfer ID: {transfer_id})",
        offer.size
    );

    let store = PathBuf::from(&offer.store_path);
    let zip_path = store.join(format!("{name}.zip"));
    let mut zip_file = match tokio::fs::File::create(&zip_path).await {
        Ok(file) => file,
        Err(e) => {
            println!("❌ Error creating temporary zip file: {e}");
            let _ = reader.drain_payload(offer.size).await;
            return;
        }
    };

    let transfer = Arc::new(Transfer::new(
        transfer_id.clone(),
        TransferKind::Folder,
        name.clone(),
        offer.size,
        Direction::Receive,
        offer.recipient_id.clone(),
        zip_path.clone(),
        expected_checksum.clone(),
    ));
    TRANSFERS.register(transfer.clone());

    let result =
        engine::copy_pausable(reader.inner_mut(), &mut zip_file, offer.size, &transfer).await;
    drop(zip_file);

    if let Err(e) = result {
        transfer.set_status(TransferStatus::Failed);
        println!("❌ Error receiving folder data: {e}");
        let _ = std::fs::remove_file(&zip_path);
        TRANSFERS.remove(&transfer_id);
        return;
    }

    if !expected_checksum.is_empty() {
        super::file::verify_checksum(&zip_path, &expected_checksum).await;
    }

    println!("📦 Extracting folder...");
    let dest = store.join(&name);
    match archive::extract_zip(&zip_path, &dest) {
        Ok(()) => {
            transfer.set_status(TransferStatus::Completed);
            println!("✅ Folder '{name}' received and extracted successfully!");
            println!("📂 Saved to: {}", dest.display());
        }
        Err(e) => {
            transfer.set_status(TransferStatus::Failed);
            println!("❌ Error extracting folder: {e}");
        }
    }
    let _ = std::fs::remove_file(&zip_path);
    TRANSFERS.remove(&transfer_id);
}

/// Inbound `/LOOK_REQUEST`: walk the store directory and answer with a
/// sectioned listing, paths relative to the store root.
pub async fn answer_lookup(writer: &StreamWriter, requester_id: &str, store_path: &str) {
    println!("🔍 Processing directory lookup request from {requester_id}");
    let listing = match build_listing(Path::new(store_path.trim())) {
        Ok(listing) => listing,
        Err(e) => {
            println!("❌ Error walking store directory: {e}");
            return;
        }
    };
    let frame = Command::LookReply {
        requester_id: requester_id.to_string(),
        listing: proto::escape_listing(&listing),
    };
    if let Err(e) = net::write_frame(writer, &frame.encode()).await {
        println!("❌ Error sending lookup response: {e}");
    }
}

/// Assemble the `=== FOLDERS === / === FILES ===` listing for a store root.
pub fn build_listing(root: &Path) -> std::io::Result<String> {
    if !root.is_dir() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("store directory does not exist: {}", root.display()),
        ));
    }

    let mut folders = Vec::new();
    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        if entry.path() == root {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?
            .to_string_lossy()
            .replace('\\', "/");
        let size = entry.metadata().map_err(std::io::Error::from)?.len();
        if entry.file_type().is_dir() {
            folders.push(format!("[FOLDER] {rel} (Size: {size} bytes)"));
        } else {
            files.push(format!("[FILE] {rel} (Size: {size} bytes)"));
        }
    }

    let mut sections: Vec<String> = Vec::new();
    if !folders.is_empty() {
        sections.push("=== FOLDERS ===".to_string());
        sections.extend(folders);
    }
    if !files.is_empty() {
        if !sections.is_empty() {
            sections.push(String::new());
        }
        sections.push("=== FILES ===".to_string());
        sections.extend(files);
    }
    if sections.is_empty() {
        sections.push("Directory is empty".to_string());
    }
    Ok(sections.join("\n"))
}

/// Render a `/LOOK_RESPONSE` listing.
pub fn render_listing(peer_id: &str, escaped_listing: &str) {
    println!("\n📂 Directory Listing for User: {peer_id}");
    println!("-------------------------------------------");
    for line in proto::unescape_listing(escaped_listing).lines() {
        if line.starts_with("[FOLDER]") {
            println!("📁 {line}");
        } else if line.starts_with("[FILE]") {
            println!("📄 {line}");
        } else {
            println!("{line}");
        }
    }
    println!("-------------------------------------------\n");
}
