//! The line-oriented wire grammar spoken between peers and the relay.
//!
//! Every control frame is one newline-terminated UTF-8 line. Bulk payloads
//! are not framed here: a `/FILE_REQUEST` or `/FOLDER_REQUEST` announces that
//! exactly `size` raw bytes follow on the same stream, and the reader must
//! consume them before going back to line parsing.

use std::fmt;

/// Sender/recipient metadata that rides inside the name field of a
/// `_RESPONSE` frame as `name|checksum|transfer_id`. The relay treats the
/// packed form as opaque; only the receiving peer unpacks it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferMeta {
    pub name: String,
    pub checksum: String,
    pub transfer_id: String,
}

impl TransferMeta {
    pub fn pack(&self) -> String {
        format!("{}|{}|{}", self.name, self.checksum, self.transfer_id)
    }

    /// Unpack `name[|checksum[|transfer_id]]`. Missing parts come back empty.
    pub fn unpack(packed: &str) -> Self {
        let mut parts = packed.splitn(3, '|');
        TransferMeta {
            name: parts.next().unwrap_or_default().to_string(),
            checksum: parts.next().unwrap_or_default().to_string(),
            transfer_id: parts.next().unwrap_or_default().to_string(),
        }
    }
}

/// A transfer announcement as the relay sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub recipient_id: String,
    pub name: String,
    pub size: u64,
    pub checksum: String,
    pub transfer_id: String,
}

/// A transfer announcement as the receiving peer sees it, after the relay
/// has attached the recipient's store path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOffer {
    pub recipient_id: String,
    pub meta: TransferMeta,
    pub size: u64,
    pub store_path: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Wrong arity or an unparsable numeric field. The message is the usage
    /// line echoed back to the sender.
    #[error("{0}")]
    Usage(String),
}

fn usage(msg: &str) -> ProtocolError {
    ProtocolError::Usage(format!("❌ Invalid arguments. Use: {msg}"))
}

/// One frame travelling peer → relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Exit,
    CreateRoom { name: String, participant_ids: Vec<String> },
    JoinRoom { room_id: String },
    LeaveRoom { room_id: String },
    SelectRoom { room_id: String },
    ListRooms,
    RoomInfo { room_id: String },
    Status,
    Look { target_id: String },
    Download { target_id: String, path: String },
    FileRequest(TransferRequest),
    FolderRequest(TransferRequest),
    /// `LOOK_RESPONSE` coming back from the peer that was queried. The
    /// listing is still in its escaped single-line form.
    LookReply { requester_id: String, listing: String },
    Pong,
    /// Anything that is not a recognized command is chat.
    Chat(String),
}

/// Parse one relay-bound line (without its trailing newline).
pub fn parse_command(line: &str) -> Result<Command, ProtocolError> {
    if line == "/exit" {
        return Ok(Command::Exit);
    }
    if line == "PONG" {
        return Ok(Command::Pong);
    }
    if line.starts_with("/createroom") {
        let args: Vec<&str> = line.split_whitespace().collect();
        if args.len() < 3 {
            return Err(usage("/createroom <roomName> <userId1> [userId2] ..."));
        }
        return Ok(Command::CreateRoom {
            name: args[1].to_string(),
            participant_ids: args[2..].iter().map(|s| s.to_string()).collect(),
        });
    }
    if line.starts_with("/joinroom") {
        return one_arg(line, "/joinroom <roomId>").map(|room_id| Command::JoinRoom { room_id });
    }
    if line.starts_with("/leaveroom") {
        return one_arg(line, "/leaveroom <roomId>").map(|room_id| Command::LeaveRoom { room_id });
    }
    if line.starts_with("/selectroom") {
        return one_arg(line, "/selectroom <roomId>").map(|room_id| Command::SelectRoom { room_id });
    }
    if line.starts_with("/listrooms") {
        return Ok(Command::ListRooms);
    }
    if line.starts_with("/roominfo") {
        return one_arg(line, "/roominfo <roomId>").map(|room_id| Command::RoomInfo { room_id });
    }
    if line.starts_with("/status") {
        return Ok(Command::Status);
    }
    if line == "/LOOK" || line.starts_with("/LOOK ") {
        return one_arg(line, "/LOOK <userId>").map(|target_id| Command::Look { target_id });
    }
    if line.starts_with("/DOWNLOAD_REQUEST") {
        let args: Vec<&str> = line.splitn(3, ' ').collect();
        if args.len() != 3 {
            return Err(usage("/DOWNLOAD_REQUEST <userId> <path>"));
        }
        return Ok(Command::Download {
            target_id: args[1].trim().to_string(),
            path: args[2].trim().to_string(),
        });
    }
    if line.starts_with("/FILE_REQUEST") {
        return parse_transfer_request(line, "/FILE_REQUEST").map(Command::FileRequest);
    }
    if line.starts_with("/FOLDER_REQUEST") {
        return parse_transfer_request(line, "/FOLDER_REQUEST").map(Command::FolderRequest);
    }
    if line.starts_with("LOOK_RESPONSE") {
        let args: Vec<&str> = line.splitn(3, ' ').collect();
        if args.len() != 3 {
            return Err(usage("LOOK_RESPONSE <userId> <listing>"));
        }
        return Ok(Command::LookReply {
            requester_id: args[1].to_string(),
            listing: args[2].to_string(),
        });
    }
    Ok(Command::Chat(line.to_string()))
}

fn one_arg(line: &str, usage_msg: &str) -> Result<String, ProtocolError> {
    let args: Vec<&str> = line.split_whitespace().collect();
    if args.len() != 2 {
        return Err(usage(usage_msg));
    }
    Ok(args[1].to_string())
}

fn parse_transfer_request(line: &str, cmd: &str) -> Result<TransferRequest, ProtocolError> {
    let usage_msg = format!("{cmd} <userId> <name> <size> [checksum] [transferId]");
    let args: Vec<&str> = line.split_whitespace().collect();
    if args.len() < 4 {
        return Err(usage(&usage_msg));
    }
    let size: u64 = args[3].parse().map_err(|_| usage(&usage_msg))?;
    Ok(TransferRequest {
        recipient_id: args[1].to_string(),
        name: args[2].to_string(),
        size,
        checksum: args.get(4).unwrap_or(&"").to_string(),
        transfer_id: args.get(5).unwrap_or(&"").to_string(),
    })
}

impl Command {
    /// Render the frame exactly as it goes on the wire (no trailing newline).
    pub fn encode(&self) -> String {
        match self {
            Command::Exit => "/exit".into(),
            Command::Pong => "PONG".into(),
            Command::CreateRoom { name, participant_ids } => {
                format!("/createroom {} {}", name, participant_ids.join(" "))
            }
            Command::JoinRoom { room_id } => format!("/joinroom {room_id}"),
            Command::LeaveRoom { room_id } => format!("/leaveroom {room_id}"),
            Command::SelectRoom { room_id } => format!("/selectroom {room_id}"),
            Command::ListRooms => "/listrooms".into(),
            Command::RoomInfo { room_id } => format!("/roominfo {room_id}"),
            Command::Status => "/status".into(),
            Command::Look { target_id } => format!("/LOOK {target_id}"),
            Command::Download { target_id, path } => {
                format!("/DOWNLOAD_REQUEST {target_id} {path}")
            }
            Command::FileRequest(req) => encode_transfer_request("/FILE_REQUEST", req),
            Command::FolderRequest(req) => encode_transfer_request("/FOLDER_REQUEST", req),
            Command::LookReply { requester_id, listing } => {
                format!("LOOK_RESPONSE {requester_id} {listing}")
            }
            Command::Chat(text) => text.clone(),
        }
    }
}

fn encode_transfer_request(cmd: &str, req: &TransferRequest) -> String {
    format!(
        "{} {} {} {} {} {}",
        cmd, req.recipient_id, req.name, req.size, req.checksum, req.transfer_id
    )
}

/// One frame travelling relay → peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerFrame {
    Reconnect { username: String, store_path: String },
    Ping,
    UsersHeader,
    FileOffer(TransferOffer),
    FolderOffer(TransferOffer),
    LookRequest { requester_id: String, store_path: String },
    LookReply { peer_id: String, listing: String },
    Download { requester_id: String, path: String },
    Chat(String),
}

/// Parse one peer-bound line. Unlike [`parse_command`] this never fails: a
/// malformed structured frame degrades to chat, which the peer just prints.
pub fn parse_server_frame(line: &str) -> ServerFrame {
    if let Some(rest) = line.strip_prefix("/RECONNECT ") {
        let mut parts = rest.splitn(2, ' ');
        if let (Some(username), Some(store_path)) = (parts.next(), parts.next()) {
            return ServerFrame::Reconnect {
                username: username.to_string(),
                store_path: store_path.to_string(),
            };
        }
    }
    if line == "PING" {
        return ServerFrame::Ping;
    }
    if line == "USERS:" {
        return ServerFrame::UsersHeader;
    }
    if line.starts_with("/FILE_RESPONSE") {
        if let Some(offer) = parse_transfer_offer(line) {
            return ServerFrame::FileOffer(offer);
        }
    }
    if line.starts_with("/FOLDER_RESPONSE") {
        if let Some(offer) = parse_transfer_offer(line) {
            return ServerFrame::FolderOffer(offer);
        }
    }
    if line.starts_with("/LOOK_REQUEST") {
        let args: Vec<&str> = line.splitn(3, ' ').collect();
        if args.len() == 3 {
            return ServerFrame::LookRequest {
                requester_id: args[1].to_string(),
                store_path: args[2].to_string(),
            };
        }
    }
    if line.starts_with("/LOOK_RESPONSE") {
        let args: Vec<&str> = line.splitn(3, ' ').collect();
        if args.len() == 3 {
            return ServerFrame::LookReply {
                peer_id: args[1].to_string(),
                listing: args[2].to_string(),
            };
        }
    }
    if line.starts_with("/DOWNLOAD_REQUEST") {
        let args: Vec<&str> = line.splitn(3, ' ').collect();
        if args.len() == 3 {
            return ServerFrame::Download {
                requester_id: args[1].trim().to_string(),
                path: args[2].trim().to_string(),
            };
        }
    }
    ServerFrame::Chat(line.to_string())
}

fn parse_transfer_offer(line: &str) -> Option<TransferOffer> {
    let args: Vec<&str> = line.splitn(5, ' ').collect();
    if args.len() != 5 {
        return None;
    }
    let size: u64 = args[3].trim().parse().ok()?;
    Some(TransferOffer {
        recipient_id: args[1].to_string(),
        meta: TransferMeta::unpack(args[2]),
        size,
        store_path: args[4].to_string(),
    })
}

impl ServerFrame {
    pub fn encode(&self) -> String {
        match self {
            ServerFrame::Reconnect { username, store_path } => {
                format!("/RECONNECT {username} {store_path}")
            }
            ServerFrame::Ping => "PING".into(),
            ServerFrame::UsersHeader => "USERS:".into(),
            ServerFrame::FileOffer(offer) => encode_transfer_offer("/FILE_RESPONSE", offer),
            ServerFrame::FolderOffer(offer) => encode_transfer_offer("/FOLDER_RESPONSE", offer),
            ServerFrame::LookRequest { requester_id, store_path } => {
                format!("/LOOK_REQUEST {requester_id} {store_path}")
            }
            ServerFrame::LookReply { peer_id, listing } => {
                format!("/LOOK_RESPONSE {peer_id} {listing}")
            }
            ServerFrame::Download { requester_id, path } => {
                format!("/DOWNLOAD_REQUEST {requester_id} {path}")
            }
            ServerFrame::Chat(text) => text.clone(),
        }
    }
}

impl fmt::Display for ServerFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

fn encode_transfer_offer(cmd: &str, offer: &TransferOffer) -> String {
    format!(
        "{} {} {} {} {}",
        cmd,
        offer.recipient_id,
        offer.meta.pack(),
        offer.size,
        offer.store_path
    )
}

/// Escape a multi-line lookup listing so it fits one wire frame.
pub fn escape_listing(listing: &str) -> String {
    listing.replace('\\', "\\\\").replace('\n', "\\n")
}

/// Inverse of [`escape_listing`].
pub fn unescape_listing(escaped: &str) -> String {
    let mut out = String::with_capacity(escaped.len());
    let mut chars = escaped.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}
