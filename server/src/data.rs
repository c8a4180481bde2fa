//! Shared relay state: presence tables and rooms behind one lock.

use std::collections::HashMap;
use std::sync::Arc;

use common::net::{self, StreamWriter};
use log::warn;
use rand::Rng;
use tokio::sync::Mutex;

use crate::types::{Room, User};

/// Presence tables and the room registry. Guarded as one unit so the two
/// user indexes and room membership can never disagree.
#[derive(Default)]
pub struct ServerState {
    /// user_id -> user
    pub users: HashMap<String, User>,
    /// source ip -> user_id, the reconnect index
    pub ip_index: HashMap<String, String>,
    /// room_id -> room
    pub rooms: HashMap<String, Room>,
    next_room_id: u64,
}

impl ServerState {
    /// Allocate the next room id (decimal, starting at 1).
    pub fn generate_room_id(&mut self) -> String {
        self.next_room_id += 1;
        self.next_room_id.to_string()
    }

    /// Pseudo-random decimal user id, re-rolled on the unlikely collision.
    pub fn generate_user_id(&self) -> String {
        let mut rng = rand::thread_rng();
        loop {
            let id = rng.gen_range(0..10_000_000u32).to_string();
            if !self.users.contains_key(&id) {
                return id;
            }
        }
    }

}

/// Handle passed to every relay task.
pub struct Server {
    pub state: Mutex<ServerState>,
}

impl Server {
    pub fn new() -> Arc<Self> {
        Arc::new(Server { state: Mutex::new(ServerState::default()) })
    }

    /// Send `content` to every online user except the sender, prefixed with
    /// the sender's name. Best effort: failures are logged, not fatal.
    pub async fn broadcast_global(&self, sender_id: &str, content: &str) {
        let targets = {
            let state = self.state.lock().await;
            let Some(sender) = state.users.get(sender_id) else {
                return;
            };
            let message = format!("{}: {}", sender.username, content);
            state
                .users
                .values()
                .filter(|u| u.online && u.user_id != sender_id)
                .map(|u| (u.username.clone(), u.writer.clone(), message.clone()))
                .collect::<Vec<_>>()
        };
        deliver(targets).await;
    }

    /// Send `content` to every online participant of `room_id` except the
    /// sender, as `[room] username: content`. An unknown room is reported
    /// back to the sender instead.
    pub async fn broadcast_room(&self, sender_id: &str, room_id: &str, content: &str) {
        let targets = {
            let state = self.state.lock().await;
            let Some(sender) = state.users.get(sender_id) else {
                return;
            };
            let Some(room) = state.rooms.get(room_id) else {
                let _ = net::write_frame(&sender.writer, "❌ Room not found").await;
                return;
            };
            let message = format!("[{}] {}: {}", room.room_name, sender.username, content);
            room.participants
                .iter()
                .filter(|id| *id != sender_id)
                .filter_map(|id| state.users.get(id))
                .filter(|u| u.online)
                .map(|u| (u.username.clone(), u.writer.clone(), message.clone()))
                .collect::<Vec<_>>()
        };
        deliver(targets).await;
    }

    /// Flip a user offline. Returns the username when the flag actually
    /// changed, so the caller can broadcast the notice exactly once.
    pub async fn set_offline(&self, user_id: &str) -> Option<String> {
        let mut state = self.state.lock().await;
        let user = state.users.get_mut(user_id)?;
        if !user.online {
            return None;
        }
        user.online = false;
        Some(user.username.clone())
    }
}

async fn deliver(targets: Vec<(String, StreamWriter, String)>) {
    for (username, writer, message) in targets {
        if let Err(e) = net::write_frame(&writer, &message).await {
            warn!("failed to deliver broadcast to {username}: {e}");
        }
    }
}
