//! Connection bootstrap and the peer's two tasks: the read loop that
//! demultiplexes relay traffic, and the prompt loop that turns typed
//! commands into frames or local actions.

use std::io::Write as _;
use std::time::Duration;

use common::net::{self, FrameReader, StreamWriter};
use common::proto::{self, Command, ServerFrame};
use common::utils::file;
use log::debug;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::net::TcpStream;

use crate::handlers::{file as file_handler, folder, transfer};

/// Line-buffered interactive input.
pub type Prompt = Lines<BufReader<Stdin>>;

pub fn stdin_prompt() -> Prompt {
    BufReader::new(tokio::io::stdin()).lines()
}

pub async fn connect(address: &str) -> std::io::Result<TcpStream> {
    TcpStream::connect(address).await
}

#[derive(Debug, PartialEq, Eq)]
pub enum LoginOutcome {
    /// The relay recognized our address and restored the old identity.
    Reconnected,
    /// Fresh identity; username and store path were sent.
    Fresh,
}

/// Perform the handshake. The relay answers a known address with an
/// immediate `/RECONNECT`; give it two seconds before prompting.
pub async fn login(
    reader: &mut FrameReader,
    writer: &StreamWriter,
    input: &mut Prompt,
) -> std::io::Result<LoginOutcome> {
    let probe = tokio::time::timeout(Duration::from_secs(2), reader.read_frame()).await;
    if let Ok(frame) = probe {
        if let Some(line) = frame? {
            if let ServerFrame::Reconnect { username, .. } = proto::parse_server_frame(&line) {
                println!("Welcome back {username}!");
                return Ok(LoginOutcome::Reconnected);
            }
        }
    }

    println!("Please login to continue:");
    let username = loop {
        let entry = read_input("Enter your Username: ", input).await?;
        if !entry.is_empty() {
            break entry;
        }
    };
    net::write_frame(writer, &username).await?;

    let store_path = loop {
        let entry = read_input("Enter your Store File Path: ", input).await?;
        match file::resolve_store_dir(&entry) {
            Ok(path) => break path.to_string_lossy().to_string(),
            Err(e) => println!("❌ Error: {e}"),
        }
    };
    net::write_frame(writer, &store_path).await?;

    Ok(LoginOutcome::Fresh)
}

async fn read_input(prompt: &str, input: &mut Prompt) -> std::io::Result<String> {
    print!("{prompt}");
    std::io::stdout().flush()?;
    let line = input.next_line().await?.unwrap_or_default();
    Ok(line.trim().to_string())
}

/// Demultiplex relay traffic until the transport drops.
pub async fn read_loop(mut reader: FrameReader, writer: StreamWriter) {
    loop {
        let line = match reader.read_frame().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                println!("❌ Connection lost: server closed the connection");
                return;
            }
            Err(e) => {
                println!("❌ Connection lost: {e}");
                return;
            }
        };
        if line.is_empty() {
            continue;
        }

        match proto::parse_server_frame(&line) {
            ServerFrame::Ping => {
                if let Err(e) = net::write_frame(&writer, "PONG").await {
                    println!("❌ Error responding to heartbeat: {e}");
                }
            }
            ServerFrame::Reconnect { username, .. } => {
                // Late reconnect notice, e.g. when the probe window expired.
                println!("Welcome back {username}!");
            }
            ServerFrame::UsersHeader => aggregate_users(&mut reader, &writer).await,
            ServerFrame::FileOffer(offer) => {
                file_handler::receive_file(&mut reader, offer).await;
            }
            ServerFrame::FolderOffer(offer) => {
                folder::receive_folder(&mut reader, offer).await;
            }
            ServerFrame::LookRequest { requester_id, store_path } => {
                folder::answer_lookup(&writer, &requester_id, &store_path).await;
            }
            ServerFrame::LookReply { peer_id, listing } => {
                folder::render_listing(&peer_id, &listing);
            }
            ServerFrame::Download { requester_id, path } => {
                println!("📤 Download request from {requester_id} for {path}");
                // Serve it off the read loop so inbound traffic keeps flowing
                // while the payload streams.
                tokio::spawn(file_handler::handle_download_request(
                    writer.clone(),
                    requester_id,
                    path,
                ));
            }
            ServerFrame::Chat(text) => render_chat(&text),
        }
    }
}

/// Collect the `/status` user list. The relay does not terminate the list,
/// so lines are read until a two-second quiet window.
async fn aggregate_users(reader: &mut FrameReader, writer: &StreamWriter) {
    println!("\n👥 Online Users:");
    println!("-------------------");
    let mut count = 0;
    loop {
        match tokio::time::timeout(Duration::from_secs(2), reader.read_frame()).await {
            Ok(Ok(Some(line))) => {
                if line == "PING" {
                    // Heartbeats may land inside the window; answer and keep
                    // collecting.
                    let _ = net::write_frame(writer, "PONG").await;
                    continue;
                }
                if !line.trim().is_empty() {
                    count += 1;
                    println!(" • {line}");
                }
            }
            _ => break,
        }
    }
    if count == 0 {
        println!(" No users currently online");
    }
    println!("-------------------");
}

fn render_chat(message: &str) {
    if message.contains("has joined the chat") || message.contains("is now offline") {
        println!("👋 {message}");
    } else if message.contains("has rejoined the chat") {
        println!("🔄 {message}");
    } else {
        println!("{message}");
    }
}

/// The prompt loop. Local commands never touch the wire, transfer commands
/// spawn so the prompt stays responsive, everything else goes to the relay
/// verbatim.
pub async fn write_loop(writer: StreamWriter, input: &mut Prompt) {
    let mut current_room = String::new();
    loop {
        let prompt = if current_room.is_empty() {
            ">>> ".to_string()
        } else {
            format!("[Room: {current_room}] >>> ")
        };
        let message = match read_input(&prompt, input).await {
            Ok(message) => message,
            Err(_) => return,
        };
        if message.is_empty() {
            continue;
        }

        match message.as_str() {
            "exit" => {
                println!("👋 Goodbye!");
                let _ = net::write_frame(&writer, &Command::Exit.encode()).await;
                return;
            }
            "/help" => {
                print_help();
                continue;
            }
            "/transfers" => {
                transfer::list_transfers();
                continue;
            }
            "/listrooms" | "/status" => {
                send_raw(&writer, &message).await;
                continue;
            }
            _ => {}
        }

        let args: Vec<&str> = message.split_whitespace().collect();
        match args[0] {
            "/createroom" => {
                if args.len() < 3 {
                    println!("❌ Invalid arguments. Use: /createroom <roomName> <userId1> [userId2] ...");
                    continue;
                }
                println!("🏠 Creating room...");
                send_raw(&writer, &message).await;
            }
            "/joinroom" | "/leaveroom" | "/roominfo" => {
                if args.len() != 2 {
                    println!("❌ Invalid arguments. Use: {} <roomId>", args[0]);
                    continue;
                }
                send_raw(&writer, &message).await;
            }
            "/selectroom" => {
                if args.len() != 2 {
                    println!("❌ Invalid arguments. Use: /selectroom <roomId>");
                    continue;
                }
                send_raw(&writer, &message).await;
                // Track locally so the prompt shows the active room.
                current_room = args[1].to_string();
            }
            "/sendfile" => {
                let Some((recipient_id, path)) = two_args(&message) else {
                    println!("❌ Invalid arguments. Use: /sendfile <userId> <filePath>");
                    continue;
                };
                println!("📤 Sending file to {recipient_id}");
                tokio::spawn(file_handler::send_file(writer.clone(), recipient_id, path));
            }
            "/sendfolder" => {
                let Some((recipient_id, path)) = two_args(&message) else {
                    println!("❌ Invalid arguments. Use: /sendfolder <userId> <folderPath>");
                    continue;
                };
                println!("📤 Sending folder to {recipient_id}");
                tokio::spawn(folder::send_folder(writer.clone(), recipient_id, path));
            }
            "/lookup" => {
                if args.len() != 2 {
                    println!("❌ Invalid arguments. Use: /lookup <userId>");
                    continue;
                }
                println!("🔍 Looking up files for user {}", args[1]);
                file_handler::send_lookup_request(&writer, args[1]).await;
            }
            "/download" => {
                let Some((target_id, path)) = two_args(&message) else {
                    println!("❌ Invalid arguments. Use: /download <userId> <filePath>");
                    continue;
                };
                file_handler::send_download_request(&writer, &target_id, &path).await;
            }
            "/pause" => {
                if args.len() != 2 {
                    println!("❌ Invalid arguments. Use: /pause <transferId>");
                    continue;
                }
                transfer::pause_transfer(args[1]);
            }
            "/resume" => {
                if args.len() != 2 {
                    println!("❌ Invalid arguments. Use: /resume <transferId>");
                    continue;
                }
                transfer::resume_transfer(args[1]);
            }
            _ => send_raw(&writer, &message).await,
        }
    }
}

/// `<cmd> <arg1> <rest...>`, where the rest may contain spaces (paths).
fn two_args(message: &str) -> Option<(String, String)> {
    let mut parts = message.splitn(3, ' ');
    let _cmd = parts.next()?;
    let first = parts.next()?.trim();
    let second = parts.next()?.trim();
    if first.is_empty() || second.is_empty() {
        return None;
    }
    Some((first.to_string(), second.to_string()))
}

async fn send_raw(writer: &StreamWriter, message: &str) {
    debug!("sending frame: {message}");
    if let Err(e) = net::write_frame(writer, message).await {
        println!("❌ Error sending message: {e}");
    }
}

fn print_help() {
    println!("Available commands:");
    println!("  /status                          List online users");
    println!("  /createroom <name> <userId>...   Create a room with the given users");
    println!("  /joinroom <roomId>               Join an existing room");
    println!("  /leaveroom <roomId>              Leave a room");
    println!("  /selectroom <roomId>             Make a room your active chat scope");
    println!("  /listrooms                       List all rooms");
    println!("  /roominfo <roomId>               Show a room's details");
    println!("  /sendfile <userId> <path>        Send a file to a user");
    println!("  /sendfolder <userId> <path>      Send a folder to a user");
    println!("  /lookup <userId>                 List a user's shared files");
    println!("  /download <userId> <path>        Request a file or folder from a user");
    println!("  /transfers                       Show active transfers");
    println!("  /pause <transferId>              Pause a transfer");
    println!("  /resume <transferId>             Resume a paused transfer");
    println!("  /help                            Show this help");
    println!("  exit                             Leave the chat");
    println!("Anything else is sent as a chat message.");
}
