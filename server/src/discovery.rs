//! UDP discovery responder: answer every `DRIZLINK_DISCOVER` datagram with
//! the TCP port this relay serves on.

use std::io;

use common::discovery;
use log::{debug, info, warn};
use tokio::net::UdpSocket;

pub async fn bind_responder(udp_port: u16) -> io::Result<UdpSocket> {
    let socket = UdpSocket::bind(("0.0.0.0", udp_port)).await?;
    info!(
        "discovery responder listening on udp/{}",
        socket.local_addr()?.port()
    );
    Ok(socket)
}

pub async fn run_responder(socket: UdpSocket, tcp_port: u16) {
    let reply = discovery::server_reply(tcp_port);
    let mut buf = vec![0u8; 1024];
    loop {
        let (n, from) = match socket.recv_from(&mut buf).await {
            Ok(recv) => recv,
            Err(e) => {
                warn!("discovery receive error: {e}");
                continue;
            }
        };
        let msg = String::from_utf8_lossy(&buf[..n]);
        if msg.trim() == discovery::DISCOVER_PAYLOAD {
            debug!("discovery probe from {from}");
            if let Err(e) = socket.send_to(reply.as_bytes(), from).await {
                warn!("error answering discovery probe from {from}: {e}");
            }
        }
    }
}
