//! Payload relay: `_REQUEST` handling with the byte-exact splice, plus
//! lookup and download forwarding.

use common::net::{self, FrameReader, StreamWriter};
use common::proto::{ServerFrame, TransferMeta, TransferOffer, TransferRequest};
use log::{info, warn};

use crate::data::Server;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    File,
    Folder,
}

impl PayloadKind {
    fn noun(self) -> &'static str {
        match self {
            PayloadKind::File => "file",
            PayloadKind::Folder => "folder",
        }
    }

    fn offer(self, offer: TransferOffer) -> ServerFrame {
        match self {
            PayloadKind::File => ServerFrame::FileOffer(offer),
            PayloadKind::Folder => ServerFrame::FolderOffer(offer),
        }
    }
}

/// Relay one transfer: deliver the `_RESPONSE` to the recipient, then splice
/// exactly `size` payload bytes from the sender's stream to the recipient's.
///
/// The sender starts streaming immediately after its request frame, so every
/// refusal path must still drain `size` bytes or the control channel would
/// read payload as commands.
pub async fn handle_transfer_request(
    server: &Server,
    reader: &mut FrameReader,
    sender_id: &str,
    sender_writer: &StreamWriter,
    req: TransferRequest,
    kind: PayloadKind,
) {
    let resolved = {
        let state = server.state.lock().await;
        let Some(sender) = state.users.get(sender_id) else {
            return;
        };
        match state.users.get(&req.recipient_id) {
            Some(recipient) if recipient.online => {
                // Room gating: a sender with an active room may only
                // transfer to users sharing that room.
                if !sender.current_room.is_empty() {
                    if let Some(room) = state.rooms.get(&sender.current_room) {
                        if !room.is_participant(sender_id)
                            || !room.is_participant(&req.recipient_id)
                        {
                            Err(format!(
                                "❌ Both users must be in the same room for {} transfer",
                                kind.noun()
                            ))
                        } else {
                            Ok((recipient.writer.clone(), recipient.store_path.clone()))
                        }
                    } else {
                        Ok((recipient.writer.clone(), recipient.store_path.clone()))
                    }
                } else {
                    Ok((recipient.writer.clone(), recipient.store_path.clone()))
                }
            }
            _ => Err(format!("❌ User {} not found or offline", req.recipient_id)),
        }
    };

    let (recipient_writer, store_path) = match resolved {
        Ok(target) => target,
        Err(refusal) => {
            warn!(
                "refusing {} transfer from {sender_id} to {}: recipient/room check failed",
                kind.noun(),
                req.recipient_id
            );
            if let Err(e) = net::write_frame(sender_writer, &refusal).await {
                warn!("error sending refusal to {sender_id}: {e}");
            }
            if let Err(e) = reader.drain_payload(req.size).await {
                warn!("error draining refused payload from {sender_id}: {e}");
            }
            return;
        }
    };

    let offer = TransferOffer {
        recipient_id: req.recipient_id.clone(),
        meta: TransferMeta {
            name: req.name.clone(),
            checksum: req.checksum.clone(),
            transfer_id: req.transfer_id.clone(),
        },
        size: req.size,
        store_path,
    };

    // The recipient's write half stays locked from the response frame to the
    // last payload byte; heartbeats and broadcasts queue behind it instead
    // of corrupting the stream.
    let mut guard = recipient_writer.lock().await;
    if let Err(e) = net::write_frame_to(&mut *guard, &kind.offer(offer).encode()).await {
        warn!("error sending {} response to {}: {e}", kind.noun(), req.recipient_id);
        if let Err(e) = reader.drain_payload(req.size).await {
            warn!("error draining undeliverable payload from {sender_id}: {e}");
        }
        return;
    }
    match reader.copy_payload(&mut *guard, req.size).await {
        Ok(n) if n == req.size => {
            info!("transferred {n} bytes from {sender_id} to {}", req.recipient_id);
        }
        Ok(n) => {
            warn!(
                "short {} transfer from {sender_id}: {n} of {} bytes",
                kind.noun(),
                req.size
            );
        }
        Err(e) => {
            warn!("error relaying {} data from {sender_id}: {e}", kind.noun());
        }
    }
}

/// `/LOOK <target>`: ask the target peer to list its store directory on
/// behalf of the requester.
pub async fn handle_look(
    server: &Server,
    requester_id: &str,
    writer: &StreamWriter,
    target_id: &str,
) {
    let forward = {
        let state = server.state.lock().await;
        let Some(requester) = state.users.get(requester_id) else {
            return;
        };
        match state.users.get(target_id) {
            None => Err(format!("User {target_id} not found")),
            Some(target) if !target.online => Err(format!("User {target_id} is not online")),
            Some(target) => {
                if !requester.current_room.is_empty() {
                    match state.rooms.get(&requester.current_room) {
                        Some(room)
                            if !room.is_participant(requester_id)
                                || !room.is_participant(target_id) =>
                        {
                            Err("❌ Both users must be in the same room for file lookup".into())
                        }
                        _ => Ok((target.writer.clone(), target.store_path.clone())),
                    }
                } else {
                    Ok((target.writer.clone(), target.store_path.clone()))
                }
            }
        }
    };

    match forward {
        Ok((target_writer, store_path)) => {
            let frame = ServerFrame::LookRequest {
                requester_id: requester_id.to_string(),
                store_path,
            };
            if let Err(e) = net::write_frame(&target_writer, &frame.encode()).await {
                warn!("error sending lookup request to {target_id}: {e}");
                let msg = format!("Error looking up user {target_id}'s directory");
                let _ = net::write_frame(writer, &msg).await;
            } else {
                info!("lookup request from {requester_id} sent to {target_id}");
            }
        }
        Err(msg) => {
            if let Err(e) = net::write_frame(writer, &msg).await {
                warn!("error sending lookup error to {requester_id}: {e}");
            }
        }
    }
}

/// Route a queried peer's `LOOK_RESPONSE` back to the requester, stamping it
/// with the responder's id so the requester knows whose listing it is.
pub async fn handle_look_reply(
    server: &Server,
    responder_id: &str,
    requester_id: &str,
    listing: &str,
) {
    let requester_writer = {
        let state = server.state.lock().await;
        state
            .users
            .get(requester_id)
            .filter(|u| u.online)
            .map(|u| u.writer.clone())
    };
    let Some(requester_writer) = requester_writer else {
        warn!("dropping lookup reply from {responder_id}: requester {requester_id} is gone");
        return;
    };
    let frame = ServerFrame::LookReply {
        peer_id: responder_id.to_string(),
        listing: listing.to_string(),
    };
    if let Err(e) = net::write_frame(&requester_writer, &frame.encode()).await {
        warn!("error sending lookup response to {requester_id}: {e}");
    }
}

/// `/DOWNLOAD_REQUEST <target> <path>`: forward to the target with the
/// requester's id so the target can send the file back.
pub async fn handle_download(
    server: &Server,
    requester_id: &str,
    writer: &StreamWriter,
    target_id: &str,
    path: &str,
) {
    let forward = {
        let state = server.state.lock().await;
        match state.users.get(target_id) {
            None => Err(format!("User {target_id} not found")),
            Some(target) if !target.online => Err(format!("User {target_id} is not online")),
            Some(target) => Ok(target.writer.clone()),
        }
    };

    match forward {
        Ok(target_writer) => {
            let frame = ServerFrame::Download {
                requester_id: requester_id.to_string(),
                path: path.to_string(),
            };
            if let Err(e) = net::write_frame(&target_writer, &frame.encode()).await {
                warn!("error sending download request to {target_id}: {e}");
            } else {
                info!("download request from {requester_id} forwarded to {target_id}");
            }
        }
        Err(msg) => {
            if let Err(e) = net::write_frame(writer, &msg).await {
                warn!("error sending download error to {requester_id}: {e}");
            }
        }
    }
}
