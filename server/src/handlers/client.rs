//! Accept loop, handshake and the per-connection read loop.

use std::net::SocketAddr;
use std::sync::Arc;

use common::net::{self, FrameReader, StreamWriter};
use common::proto::{self, Command, ProtocolError, ServerFrame};
use log::{error, info, warn};
use tokio::net::{TcpListener, TcpStream};

use crate::data::Server;
use crate::handlers::{room, transfer};
use crate::types::User;

/// Accept connections forever, one task per peer.
pub async fn serve(listener: TcpListener, server: Arc<Server>) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let server = server.clone();
                tokio::spawn(async move { handle_connection(server, stream, addr).await });
            }
            Err(e) => {
                error!("failed to accept connection: {e}");
                continue;
            }
        }
    }
}

pub async fn handle_connection(server: Arc<Server>, stream: TcpStream, addr: SocketAddr) {
    let ip = addr.ip().to_string();
    info!("new connection from {ip}");

    let (rd, wt) = stream.into_split();
    let mut reader = FrameReader::new(rd);
    let writer = net::share_writer(wt);

    // Reconnect lookup and rebind happen in one critical section so a second
    // accept from the same address cannot race the swap.
    let existing = {
        let mut state = server.state.lock().await;
        let uid = state.ip_index.get(&ip).cloned();
        uid.and_then(|uid| {
            state.users.get_mut(&uid).map(|user| {
                user.writer = writer.clone();
                user.online = true;
                (uid, user.username.clone(), user.store_path.clone())
            })
        })
    };

    let user_id = match existing {
        Some((user_id, username, store_path)) => {
            info!("connection already exists for {ip}, rebinding {username}");
            let frame = ServerFrame::Reconnect { username: username.clone(), store_path };
            if let Err(e) = net::write_frame(&writer, &frame.encode()).await {
                warn!("error sending reconnect signal to {ip}: {e}");
                return;
            }
            server
                .broadcast_global(&user_id, &format!("User {username} has rejoined the chat"))
                .await;
            user_id
        }
        None => {
            // Fresh peer: the first frame is the username, the second the
            // store path.
            let username = match reader.read_frame().await {
                Ok(Some(line)) if !line.is_empty() => line,
                _ => {
                    warn!("error reading username from {ip}");
                    return;
                }
            };
            let store_path = match reader.read_frame().await {
                Ok(Some(line)) if !line.is_empty() => line,
                _ => {
                    warn!("error reading store path from {ip}");
                    return;
                }
            };

            let user_id = {
                let mut state = server.state.lock().await;
                let user_id = state.generate_user_id();
                let user = User {
                    user_id: user_id.clone(),
                    username: username.clone(),
                    store_path,
                    ip_address: ip.clone(),
                    writer: writer.clone(),
                    online: true,
                    current_room: String::new(),
                };
                state.users.insert(user_id.clone(), user);
                state.ip_index.insert(ip.clone(), user_id.clone());
                user_id
            };

            info!("new user connected: {username} (ID: {user_id})");
            server
                .broadcast_global(&user_id, &format!("User {username} has joined the chat"))
                .await;
            user_id
        }
    };

    read_loop(&server, &mut reader, &writer, &user_id).await;
}

/// Dispatch frames from one peer until the transport drops or it exits.
async fn read_loop(
    server: &Arc<Server>,
    reader: &mut FrameReader,
    writer: &StreamWriter,
    user_id: &str,
) {
    loop {
        let line = match reader.read_frame().await {
            Ok(Some(line)) => line,
            Ok(None) | Err(_) => {
                go_offline(server, user_id).await;
                return;
            }
        };
        if line.is_empty() {
            continue;
        }

        let cmd = match proto::parse_command(&line) {
            Ok(cmd) => cmd,
            Err(ProtocolError::Usage(msg)) => {
                let _ = net::write_frame(writer, &msg).await;
                continue;
            }
        };

        match cmd {
            Command::Exit => {
                go_offline(server, user_id).await;
                return;
            }
            Command::CreateRoom { name, participant_ids } => {
                room::create_room(server, user_id, writer, &name, &participant_ids).await;
            }
            Command::JoinRoom { room_id } => {
                room::join_room(server, user_id, writer, &room_id).await;
            }
            Command::LeaveRoom { room_id } => {
                room::leave_room(server, user_id, writer, &room_id).await;
            }
            Command::SelectRoom { room_id } => {
                room::select_room(server, user_id, writer, &room_id).await;
            }
            Command::ListRooms => room::list_rooms(server, user_id, writer).await,
            Command::RoomInfo { room_id } => {
                room::room_info(server, user_id, writer, &room_id).await;
            }
            Command::Status => handle_status(server, writer).await,
            Command::Look { target_id } => {
                transfer::handle_look(server, user_id, writer, &target_id).await;
            }
            Command::Download { target_id, path } => {
                transfer::handle_download(server, user_id, writer, &target_id, &path).await;
            }
            Command::FileRequest(req) => {
                transfer::handle_transfer_request(
                    server,
                    reader,
                    user_id,
                    writer,
                    req,
                    transfer::PayloadKind::File,
                )
                .await;
            }
            Command::FolderRequest(req) => {
                transfer::handle_transfer_request(
                    server,
                    reader,
                    user_id,
                    writer,
                    req,
                    transfer::PayloadKind::Folder,
                )
                .await;
            }
            Command::LookReply { requester_id, listing } => {
                transfer::handle_look_reply(server, user_id, &requester_id, &listing).await;
            }
            Command::Pong => {
                // Heartbeat liveness reply, nothing to do.
            }
            Command::Chat(text) => {
                let current_room = {
                    let state = server.state.lock().await;
                    state
                        .users
                        .get(user_id)
                        .map(|u| u.current_room.clone())
                        .unwrap_or_default()
                };
                if current_room.is_empty() {
                    server.broadcast_global(user_id, &text).await;
                } else {
                    server.broadcast_room(user_id, &current_room, &text).await;
                }
            }
        }
    }
}

/// Flip the user offline and tell everyone, exactly once. The user record
/// and its IP binding stay so the peer can reconnect.
async fn go_offline(server: &Server, user_id: &str) {
    if let Some(username) = server.set_offline(user_id).await {
        info!("user disconnected: {username}");
        server
            .broadcast_global(user_id, &format!("User {username} is now offline"))
            .await;
    }
}

/// `/status`: header plus one line per online user, written to the caller.
async fn handle_status(server: &Server, writer: &StreamWriter) {
    let mut lines = vec![ServerFrame::UsersHeader.encode()];
    {
        let state = server.state.lock().await;
        for user in state.users.values().filter(|u| u.online) {
            let room_status = state
                .rooms
                .get(&user.current_room)
                .map(|room| format!("In room: {}", room.room_name))
                .unwrap_or_else(|| "No room".to_string());
            lines.push(format!("{} [ID: {}] - {}", user.username, user.user_id, room_status));
        }
    }
    for line in lines {
        if let Err(e) = net::write_frame(writer, &line).await {
            warn!("error sending user list: {e}");
            return;
        }
    }
}
