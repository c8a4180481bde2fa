use std::collections::HashSet;

use common::net::StreamWriter;

/// One connected (or temporarily offline) peer. The record survives
/// transport loss so a reconnect from the same IP can rebind it.
#[derive(Debug, Clone)]
pub struct User {
    pub user_id: String,
    pub username: String,
    pub store_path: String,
    pub ip_address: String,
    /// Write half of the current connection; replaced on reconnect.
    pub writer: StreamWriter,
    pub online: bool,
    /// Active room id, empty when chatting globally.
    pub current_room: String,
}

/// A named group whose chat and transfers are scoped to its members.
#[derive(Debug, Clone)]
pub struct Room {
    pub room_id: String,
    pub room_name: String,
    pub creator_id: String,
    pub participants: HashSet<String>,
    pub created_at: String,
}

impl Room {
    pub fn is_participant(&self, user_id: &str) -> bool {
        self.participants.contains(user_id)
    }
}
