//! UDP discovery probe: broadcast one request, collect every relay that
//! answers within the listen window.

use std::time::Duration;

use common::discovery;
use log::debug;
use tokio::net::UdpSocket;
use tokio::time::Instant;

const LISTEN_WINDOW: Duration = Duration::from_secs(2);

/// Broadcast `DRIZLINK_DISCOVER` and gather distinct `host:port` answers.
pub async fn discover_servers(udp_port: u16) -> Vec<String> {
    println!("🔍 Searching for available servers via UDP broadcast...");

    let socket = match UdpSocket::bind(("0.0.0.0", 0)).await {
        Ok(socket) => socket,
        Err(e) => {
            println!("❌ Error opening discovery socket: {e}");
            return Vec::new();
        }
    };
    if let Err(e) = socket.set_broadcast(true) {
        println!("❌ Error enabling broadcast: {e}");
        return Vec::new();
    }
    if let Err(e) = socket
        .send_to(
            discovery::DISCOVER_PAYLOAD.as_bytes(),
            ("255.255.255.255", udp_port),
        )
        .await
    {
        println!("❌ Error sending UDP broadcast: {e}");
        return Vec::new();
    }

    let mut found = Vec::new();
    let mut buf = [0u8; 1024];
    let deadline = Instant::now() + LISTEN_WINDOW;
    loop {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        match tokio::time::timeout(deadline - now, socket.recv_from(&mut buf)).await {
            Ok(Ok((n, from))) => {
                let msg = String::from_utf8_lossy(&buf[..n]);
                let Some(port) = discovery::parse_server_reply(&msg) else {
                    debug!("ignoring unexpected discovery datagram from {from}");
                    continue;
                };
                let address = format!("{}:{}", from.ip(), port);
                if !found.contains(&address) {
                    println!("  ✅ Found server at {address}");
                    found.push(address);
                }
            }
            Ok(Err(e)) => {
                debug!("discovery receive error: {e}");
                break;
            }
            Err(_) => break,
        }
    }
    found
}
