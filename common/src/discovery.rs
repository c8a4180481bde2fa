//! LAN discovery datagrams: a probe broadcasts a fixed request and every
//! relay answers with the TCP port it serves on.

pub const DISCOVERY_PORT: u16 = 9999;
pub const DISCOVER_PAYLOAD: &str = "DRIZLINK_DISCOVER";
pub const SERVER_REPLY_PREFIX: &str = "DRIZLINK_SERVER:";

/// Build the responder's reply datagram.
pub fn server_reply(tcp_port: u16) -> String {
    format!("{SERVER_REPLY_PREFIX}{tcp_port}")
}

/// Parse a reply datagram into the advertised TCP port.
pub fn parse_server_reply(msg: &str) -> Option<u16> {
    msg.strip_prefix(SERVER_REPLY_PREFIX)?.trim().parse().ok()
}
