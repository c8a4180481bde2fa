//! Integration tests driving a live relay over loopback TCP with scripted
//! raw-socket peers.
//!
//! Presence is keyed by source IP, so each simulated peer binds its own
//! loopback address (127.0.0.1, 127.0.0.2, ...) before connecting.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use drizlink_server::handlers::{heartbeat, serve};
use drizlink_server::{discovery, Server};
use md5::{Digest, Md5};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpSocket};

const RECV_TIMEOUT: Duration = Duration::from_secs(2);

async fn start_relay() -> (SocketAddr, Arc<Server>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = Server::new();
    tokio::spawn(serve(listener, server.clone()));
    (addr, server)
}

struct TestPeer {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl TestPeer {
    /// Dial the relay from a dedicated loopback source address and run the
    /// username/store-path handshake.
    async fn connect(relay: SocketAddr, source_ip: &str, username: &str, store: &str) -> Self {
        let mut peer = Self::dial(relay, source_ip).await;
        peer.send(username).await;
        peer.send(store).await;
        peer
    }

    async fn dial(relay: SocketAddr, source_ip: &str) -> Self {
        let socket = TcpSocket::new_v4().unwrap();
        socket
            .bind(format!("{source_ip}:0").parse().unwrap())
            .unwrap();
        let stream = socket.connect(relay).await.unwrap();
        let (rd, wt) = stream.into_split();
        TestPeer { reader: BufReader::new(rd), writer: wt }
    }

    async fn send(&mut self, line: &str) {
        self.writer
            .write_all(format!("{line}\n").as_bytes())
            .await
            .unwrap();
        self.writer.flush().await.unwrap();
    }

    async fn send_bytes(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.unwrap();
        self.writer.flush().await.unwrap();
    }

    async fn recv(&mut self) -> String {
        let mut line = String::new();
        tokio::time::timeout(RECV_TIMEOUT, self.reader.read_line(&mut line))
            .await
            .expect("timed out waiting for a frame")
            .unwrap();
        line.trim_end().to_string()
    }

    /// Read frames until one matches, discarding broadcast noise.
    async fn recv_until(&mut self, needle: &str) -> String {
        for _ in 0..32 {
            let line = self.recv().await;
            if line.contains(needle) {
                return line;
            }
        }
        panic!("never received a frame containing {needle:?}");
    }

    /// Assert that nothing arrives within a short quiet window.
    async fn expect_silence(&mut self, window: Duration) {
        let mut line = String::new();
        let read = tokio::time::timeout(window, self.reader.read_line(&mut line)).await;
        assert!(
            read.is_err(),
            "expected silence but received: {line:?}"
        );
    }

    async fn read_payload(&mut self, size: usize) -> Vec<u8> {
        let mut buf = vec![0u8; size];
        tokio::time::timeout(RECV_TIMEOUT, self.reader.read_exact(&mut buf))
            .await
            .expect("timed out waiting for payload")
            .unwrap();
        buf
    }
}

/// Poll the relay state until a username appears, returning its user id.
async fn user_id_of(server: &Server, username: &str) -> String {
    for _ in 0..100 {
        {
            let state = server.state.lock().await;
            if let Some(user) = state.users.values().find(|u| u.username == username) {
                return user.user_id.clone();
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("user {username} never registered");
}

fn md5_hex(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

#[tokio::test]
async fn handshake_registers_user_and_status_lists_them() {
    let (relay, server) = start_relay().await;
    let mut alice = TestPeer::connect(relay, "127.0.0.1", "alice", "/tmp/alice").await;
    let alice_id = user_id_of(&server, "alice").await;

    alice.send("/status").await;
    assert_eq!(alice.recv().await, "USERS:");
    let line = alice.recv().await;
    assert_eq!(line, format!("alice [ID: {alice_id}] - No room"));

    let state = server.state.lock().await;
    let user = state.users.get(&alice_id).unwrap();
    assert!(user.online);
    assert_eq!(user.ip_address, "127.0.0.1");
    assert_eq!(user.store_path, "/tmp/alice");
    assert_eq!(state.ip_index.get("127.0.0.1"), Some(&alice_id));
}

#[tokio::test]
async fn reconnect_preserves_identity_and_skips_handshake() {
    let (relay, server) = start_relay().await;
    let alice = TestPeer::connect(relay, "127.0.0.1", "alice", "/tmp/alice").await;
    let alice_id = user_id_of(&server, "alice").await;

    drop(alice);
    // Wait for the relay to notice the drop and flip the user offline.
    for _ in 0..100 {
        {
            let state = server.state.lock().await;
            if !state.users.get(&alice_id).unwrap().online {
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    // Same source address: no prompts, an immediate /RECONNECT instead.
    let mut again = TestPeer::dial(relay, "127.0.0.1").await;
    assert_eq!(again.recv().await, "/RECONNECT alice /tmp/alice");

    let state = server.state.lock().await;
    assert_eq!(state.users.len(), 1, "reconnect must not mint a second user");
    let user = state.users.get(&alice_id).unwrap();
    assert!(user.online);
    assert_eq!(user.user_id, alice_id);
}

#[tokio::test]
async fn room_lifecycle_create_select_leave_delete() {
    let (relay, server) = start_relay().await;
    let mut alice = TestPeer::connect(relay, "127.0.0.1", "alice", "/tmp/a").await;
    let mut bob = TestPeer::connect(relay, "127.0.0.2", "bob", "/tmp/b").await;
    let bob_id = user_id_of(&server, "bob").await;

    alice.send(&format!("/createroom chat {bob_id}")).await;
    let created = alice.recv_until("Room 'chat'").await;
    assert!(created.contains("(ID: 1)"), "{created}");
    bob.recv_until("You have been added to the room").await;

    // The creator's roster already includes every listed participant.
    bob.send("/joinroom 1").await;
    bob.recv_until("You are already in this room").await;

    alice.send("/selectroom 1").await;
    alice.recv_until("Selected room 'chat'").await;
    {
        let state = server.state.lock().await;
        let room = state.rooms.get("1").unwrap();
        assert_eq!(room.participants.len(), 2);
        assert!(room.is_participant(&bob_id));
    }

    alice.send("room-scoped hello").await;
    let chat = bob.recv_until("room-scoped hello").await;
    assert_eq!(chat, "[chat] alice: room-scoped hello");

    bob.send("/leaveroom 1").await;
    bob.recv_until("Successfully left room 'chat'").await;
    alice.recv_until("bob left room 'chat'").await;

    alice.send("/leaveroom 1").await;
    alice.recv_until("Successfully left room 'chat'").await;
    let state = server.state.lock().await;
    assert!(state.rooms.is_empty(), "empty room must be deleted");
    assert!(state.users.values().all(|u| u.current_room.is_empty()));
}

#[tokio::test]
async fn file_relay_is_byte_exact_with_checksum() {
    let (relay, server) = start_relay().await;
    let mut alice = TestPeer::connect(relay, "127.0.0.1", "alice", "/tmp/a").await;
    let mut bob = TestPeer::connect(relay, "127.0.0.2", "bob", "/store/bob").await;
    let bob_id = user_id_of(&server, "bob").await;

    let payload = b"hello world";
    let checksum = md5_hex(payload);
    alice
        .send(&format!(
            "/FILE_REQUEST {bob_id} small.txt {} {checksum} 1",
            payload.len()
        ))
        .await;
    alice.send_bytes(payload).await;

    let response = bob.recv_until("/FILE_RESPONSE").await;
    assert_eq!(
        response,
        format!(
            "/FILE_RESPONSE {bob_id} small.txt|{checksum}|1 {} /store/bob",
            payload.len()
        )
    );
    let received = bob.read_payload(payload.len()).await;
    assert_eq!(received, payload);
    assert_eq!(md5_hex(&received), checksum);
}

#[tokio::test]
async fn zero_byte_transfer_completes_and_channel_stays_usable() {
    let (relay, server) = start_relay().await;
    let mut alice = TestPeer::connect(relay, "127.0.0.1", "alice", "/tmp/a").await;
    let mut bob = TestPeer::connect(relay, "127.0.0.2", "bob", "/store/bob").await;
    let bob_id = user_id_of(&server, "bob").await;

    let checksum = "d41d8cd98f00b204e9800998ecf8427e";
    alice
        .send(&format!("/FILE_REQUEST {bob_id} empty.bin 0 {checksum} 1"))
        .await;

    let response = bob.recv_until("/FILE_RESPONSE").await;
    assert!(response.contains(&format!("empty.bin|{checksum}|1 0")), "{response}");

    // No payload follows; the very next frames must parse as control again.
    alice.send("still alive?").await;
    assert_eq!(bob.recv().await, "alice: still alive?");
}

#[tokio::test]
async fn room_gated_transfer_between_participants_goes_through() {
    let (relay, server) = start_relay().await;
    let mut alice = TestPeer::connect(relay, "127.0.0.1", "alice", "/tmp/a").await;
    let mut bob = TestPeer::connect(relay, "127.0.0.2", "bob", "/store/bob").await;
    let bob_id = user_id_of(&server, "bob").await;

    alice.send(&format!("/createroom chat {bob_id}")).await;
    alice.recv_until("Room 'chat'").await;
    bob.recv_until("You have been added").await;
    alice.send("/selectroom 1").await;
    alice.recv_until("Selected room 'chat'").await;
    bob.send("/selectroom 1").await;
    bob.recv_until("Selected room 'chat'").await;

    let payload = b"hello world";
    let checksum = md5_hex(payload);
    alice
        .send(&format!(
            "/FILE_REQUEST {bob_id} small.txt {} {checksum} 1",
            payload.len()
        ))
        .await;
    alice.send_bytes(payload).await;

    bob.recv_until("/FILE_RESPONSE").await;
    let received = bob.read_payload(payload.len()).await;
    assert_eq!(received, payload);
    assert_eq!(md5_hex(&received), checksum);
}

#[tokio::test]
async fn room_gated_transfer_is_refused_and_stream_stays_in_sync() {
    let (relay, server) = start_relay().await;
    let mut alice = TestPeer::connect(relay, "127.0.0.1", "alice", "/tmp/a").await;
    let mut bob = TestPeer::connect(relay, "127.0.0.2", "bob", "/store/bob").await;
    let mut carol = TestPeer::connect(relay, "127.0.0.3", "carol", "/tmp/c").await;
    let bob_id = user_id_of(&server, "bob").await;
    let carol_id = user_id_of(&server, "carol").await;

    // Bob saw Carol join; drain that broadcast so later silence checks are
    // about the transfer and nothing else.
    bob.recv_until("carol has joined the chat").await;

    // Alice and Carol share room 1; Bob is outside it.
    alice.send(&format!("/createroom private {carol_id}")).await;
    alice.recv_until("Room 'private'").await;
    carol.recv_until("You have been added").await;
    alice.send("/selectroom 1").await;
    alice.recv_until("Selected room 'private'").await;

    let payload = b"hello world";
    alice
        .send(&format!(
            "/FILE_REQUEST {bob_id} small.txt {} {} 1",
            payload.len(),
            md5_hex(payload)
        ))
        .await;
    alice.send_bytes(payload).await;

    alice
        .recv_until("Both users must be in the same room for file transfer")
        .await;
    bob.expect_silence(Duration::from_millis(300)).await;

    // The refused payload was drained: the next command must still parse.
    alice.send("/status").await;
    alice.recv_until("USERS:").await;
}

#[tokio::test]
async fn lookup_and_download_are_forwarded_with_requester_ids() {
    let (relay, server) = start_relay().await;
    let mut alice = TestPeer::connect(relay, "127.0.0.1", "alice", "/tmp/a").await;
    let mut bob = TestPeer::connect(relay, "127.0.0.2", "bob", "/store/bob").await;
    let alice_id = user_id_of(&server, "alice").await;
    let bob_id = user_id_of(&server, "bob").await;

    alice.send(&format!("/LOOK {bob_id}")).await;
    let request = bob.recv_until("/LOOK_REQUEST").await;
    assert_eq!(request, format!("/LOOK_REQUEST {alice_id} /store/bob"));

    let listing = "=== FILES ===\\n[FILE] a.txt (Size: 7 bytes)";
    bob.send(&format!("LOOK_RESPONSE {alice_id} {listing}")).await;
    let reply = alice.recv_until("/LOOK_RESPONSE").await;
    assert_eq!(reply, format!("/LOOK_RESPONSE {bob_id} {listing}"));

    alice
        .send(&format!("/DOWNLOAD_REQUEST {bob_id} /store/bob/a.txt"))
        .await;
    let forwarded = bob.recv_until("/DOWNLOAD_REQUEST").await;
    assert_eq!(
        forwarded,
        format!("/DOWNLOAD_REQUEST {alice_id} /store/bob/a.txt")
    );
}

#[tokio::test]
async fn transfer_to_unknown_recipient_reports_and_drains() {
    let (relay, server) = start_relay().await;
    let mut alice = TestPeer::connect(relay, "127.0.0.1", "alice", "/tmp/a").await;
    user_id_of(&server, "alice").await;

    alice.send("/FILE_REQUEST 0000000 ghost.txt 4 abcd 1").await;
    alice.send_bytes(b"data").await;
    alice.recv_until("not found or offline").await;

    alice.send("/status").await;
    alice.recv_until("USERS:").await;
}

#[tokio::test]
async fn disconnect_broadcasts_offline_and_keeps_record() {
    let (relay, server) = start_relay().await;
    let mut alice = TestPeer::connect(relay, "127.0.0.1", "alice", "/tmp/a").await;
    let bob = TestPeer::connect(relay, "127.0.0.2", "bob", "/tmp/b").await;
    let bob_id = user_id_of(&server, "bob").await;
    alice.recv_until("bob has joined the chat").await;

    drop(bob);
    alice.recv_until("User bob is now offline").await;

    let state = server.state.lock().await;
    let user = state.users.get(&bob_id).expect("record must survive");
    assert!(!user.online);
    assert!(state.ip_index.contains_key("127.0.0.2"));
}

#[tokio::test]
async fn exit_command_flips_offline() {
    let (relay, server) = start_relay().await;
    let mut alice = TestPeer::connect(relay, "127.0.0.1", "alice", "/tmp/a").await;
    let mut bob = TestPeer::connect(relay, "127.0.0.2", "bob", "/tmp/b").await;
    user_id_of(&server, "alice").await;
    let bob_id = user_id_of(&server, "bob").await;

    bob.send("/exit").await;
    alice.recv_until("User bob is now offline").await;
    let state = server.state.lock().await;
    assert!(!state.users.get(&bob_id).unwrap().online);
}

#[tokio::test]
async fn heartbeat_pings_online_users() {
    let (relay, server) = start_relay().await;
    let mut alice = TestPeer::connect(relay, "127.0.0.1", "alice", "/tmp/a").await;
    user_id_of(&server, "alice").await;

    heartbeat::sweep(&server).await;
    assert_eq!(alice.recv().await, "PING");
    alice.send("PONG").await;

    // The PONG is consumed silently; the session keeps working.
    alice.send("/status").await;
    alice.recv_until("USERS:").await;
}

#[tokio::test]
async fn malformed_commands_get_usage_errors_without_dropping_session() {
    let (relay, server) = start_relay().await;
    let mut alice = TestPeer::connect(relay, "127.0.0.1", "alice", "/tmp/a").await;
    user_id_of(&server, "alice").await;

    alice.send("/createroom onlyname").await;
    alice.recv_until("Use: /createroom").await;

    alice.send("/FILE_REQUEST 1 a.txt notanumber").await;
    alice.recv_until("Use: /FILE_REQUEST").await;

    alice.send("/joinroom 999").await;
    alice.recv_until("Room not found").await;

    alice.send("/status").await;
    alice.recv_until("USERS:").await;
}

#[tokio::test]
async fn discovery_responder_answers_probe_datagram() {
    let socket = discovery::bind_responder(0).await.unwrap();
    let port = socket.local_addr().unwrap().port();
    tokio::spawn(discovery::run_responder(socket, 8080));

    let probe = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
    probe
        .send_to(b"DRIZLINK_DISCOVER", ("127.0.0.1", port))
        .await
        .unwrap();

    let mut buf = [0u8; 64];
    let (n, _) = tokio::time::timeout(RECV_TIMEOUT, probe.recv_from(&mut buf))
        .await
        .expect("no discovery reply")
        .unwrap();
    assert_eq!(&buf[..n], b"DRIZLINK_SERVER:8080");

    // Unrelated datagrams are ignored.
    probe
        .send_to(b"something else", ("127.0.0.1", port))
        .await
        .unwrap();
    let quiet = tokio::time::timeout(Duration::from_millis(300), probe.recv_from(&mut buf)).await;
    assert!(quiet.is_err());
}
