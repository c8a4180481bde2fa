//! Room lifecycle: create, join, leave, select, list, info.

use std::collections::HashSet;

use common::net::{self, StreamWriter};
use log::{info, warn};

use crate::data::Server;
use crate::types::Room;

/// Create a room with the caller plus every listed participant. Fails
/// atomically: one unknown or offline participant aborts the whole command.
pub async fn create_room(
    server: &Server,
    creator_id: &str,
    writer: &StreamWriter,
    room_name: &str,
    participant_ids: &[String],
) {
    let notifications = {
        let mut state = server.state.lock().await;
        let Some(creator) = state.users.get(creator_id) else {
            return;
        };
        let creator_name = creator.username.clone();

        let mut participants: HashSet<String> = HashSet::new();
        participants.insert(creator_id.to_string());
        for participant_id in participant_ids {
            let reachable = state
                .users
                .get(participant_id)
                .map(|user| user.online)
                .unwrap_or(false);
            if !reachable {
                drop(state);
                let msg = format!("❌ User {participant_id} not found or offline");
                if let Err(e) = net::write_frame(writer, &msg).await {
                    warn!("error sending create room error: {e}");
                }
                return;
            }
            participants.insert(participant_id.clone());
        }

        let room_id = state.generate_room_id();
        let room = Room {
            room_id: room_id.clone(),
            room_name: room_name.to_string(),
            creator_id: creator_id.to_string(),
            participants: participants.clone(),
            created_at: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        };
        state.rooms.insert(room_id.clone(), room);

        info!(
            "room '{room_name}' (ID: {room_id}) created by {creator_name} with {} participants",
            participants.len()
        );

        let message = format!(
            "🏠 Room '{room_name}' (ID: {room_id}) created by {creator_name}. You have been added to the room."
        );
        participants
            .iter()
            .filter_map(|id| state.users.get(id))
            .map(|u| (u.username.clone(), u.writer.clone(), message.clone()))
            .collect::<Vec<_>>()
    };

    for (username, target, message) in notifications {
        if let Err(e) = net::write_frame(&target, &message).await {
            warn!("error notifying participant {username}: {e}");
        }
    }
}

pub async fn join_room(server: &Server, user_id: &str, writer: &StreamWriter, room_id: &str) {
    let notifications = {
        let mut state = server.state.lock().await;
        let Some(username) = state.users.get(user_id).map(|u| u.username.clone()) else {
            return;
        };
        let Some(room) = state.rooms.get_mut(room_id) else {
            drop(state);
            send_or_log(writer, "❌ Room not found").await;
            return;
        };
        if room.is_participant(user_id) {
            drop(state);
            send_or_log(writer, "⚠️ You are already in this room").await;
            return;
        }
        room.participants.insert(user_id.to_string());
        let room_name = room.room_name.clone();
        let others: Vec<String> = room
            .participants
            .iter()
            .filter(|id| *id != user_id)
            .cloned()
            .collect();

        info!("user {username} joined room '{room_name}' (ID: {room_id})");

        let mut notifications = vec![(
            username.clone(),
            writer.clone(),
            format!("✅ Successfully joined room '{room_name}' (ID: {room_id})"),
        )];
        let notice = format!("👋 {username} joined room '{room_name}'");
        notifications.extend(
            others
                .iter()
                .filter_map(|id| state.users.get(id))
                .filter(|u| u.online)
                .map(|u| (u.username.clone(), u.writer.clone(), notice.clone())),
        );
        notifications
    };

    for (username, target, message) in notifications {
        if let Err(e) = net::write_frame(&target, &message).await {
            warn!("error notifying participant {username}: {e}");
        }
    }
}

pub async fn leave_room(server: &Server, user_id: &str, writer: &StreamWriter, room_id: &str) {
    let notifications = {
        let mut state = server.state.lock().await;
        let Some(username) = state.users.get(user_id).map(|u| u.username.clone()) else {
            return;
        };
        let Some(room) = state.rooms.get_mut(room_id) else {
            drop(state);
            send_or_log(writer, "❌ Room not found").await;
            return;
        };
        if !room.is_participant(user_id) {
            drop(state);
            send_or_log(writer, "⚠️ You are not in this room").await;
            return;
        }

        room.participants.remove(user_id);
        let room_name = room.room_name.clone();
        let remaining: Vec<String> = room.participants.iter().cloned().collect();
        let empty = room.participants.is_empty();

        if let Some(user) = state.users.get_mut(user_id) {
            if user.current_room == room_id {
                user.current_room.clear();
            }
        }
        if empty {
            state.rooms.remove(room_id);
            info!("room '{room_name}' (ID: {room_id}) deleted - no participants remaining");
        }
        info!("user {username} left room '{room_name}' (ID: {room_id})");

        let mut notifications = vec![(
            username.clone(),
            writer.clone(),
            format!("✅ Successfully left room '{room_name}' (ID: {room_id})"),
        )];
        let notice = format!("👋 {username} left room '{room_name}'");
        notifications.extend(
            remaining
                .iter()
                .filter_map(|id| state.users.get(id))
                .filter(|u| u.online)
                .map(|u| (u.username.clone(), u.writer.clone(), notice.clone())),
        );
        notifications
    };

    for (username, target, message) in notifications {
        if let Err(e) = net::write_frame(&target, &message).await {
            warn!("error notifying participant {username}: {e}");
        }
    }
}

pub async fn select_room(server: &Server, user_id: &str, writer: &StreamWriter, room_id: &str) {
    let confirmation = {
        let mut state = server.state.lock().await;
        let Some(room) = state.rooms.get(room_id) else {
            drop(state);
            send_or_log(writer, "❌ Room not found").await;
            return;
        };
        if !room.is_participant(user_id) {
            drop(state);
            send_or_log(writer, "❌ You are not a participant in this room").await;
            return;
        }
        let room_name = room.room_name.clone();
        if let Some(user) = state.users.get_mut(user_id) {
            user.current_room = room_id.to_string();
            info!("user {} selected room '{room_name}' (ID: {room_id}) as active", user.username);
        }
        format!("✅ Selected room '{room_name}' (ID: {room_id}) as active room")
    };
    send_or_log(writer, &confirmation).await;
}

pub async fn list_rooms(server: &Server, user_id: &str, writer: &StreamWriter) {
    let mut lines = vec!["🏠 Available Rooms:".to_string()];
    {
        let state = server.state.lock().await;
        if state.rooms.is_empty() {
            lines.push("No rooms available".to_string());
        }
        let current_room = state
            .users
            .get(user_id)
            .map(|u| u.current_room.clone())
            .unwrap_or_default();
        for room in state.rooms.values() {
            let membership = if room.is_participant(user_id) {
                " (You are in this room)"
            } else {
                ""
            };
            let active = if current_room == room.room_id { " [ACTIVE]" } else { "" };
            lines.push(format!(
                "  🏠 {} (ID: {}) - {} participants{}{}",
                room.room_name,
                room.room_id,
                room.participants.len(),
                membership,
                active
            ));
        }
    }
    for line in lines {
        if let Err(e) = net::write_frame(writer, &line).await {
            warn!("error sending room list: {e}");
            return;
        }
    }
}

pub async fn room_info(server: &Server, _user_id: &str, writer: &StreamWriter, room_id: &str) {
    let lines = {
        let state = server.state.lock().await;
        let Some(room) = state.rooms.get(room_id) else {
            drop(state);
            send_or_log(writer, "❌ Room not found").await;
            return;
        };
        let creator_name = state
            .users
            .get(&room.creator_id)
            .map(|u| u.username.clone())
            .unwrap_or_else(|| "Unknown".to_string());

        let mut lines = vec![
            "🏠 Room Information:".to_string(),
            format!("  Name: {}", room.room_name),
            format!("  ID: {}", room.room_id),
            format!("  Creator: {creator_name}"),
            format!("  Created: {}", room.created_at),
            format!("  Participants ({}):", room.participants.len()),
        ];
        for participant_id in &room.participants {
            if let Some(user) = state.users.get(participant_id) {
                let status = if user.online { "Online" } else { "Offline" };
                lines.push(format!(
                    "    👤 {} (ID: {}) - {status}",
                    user.username, user.user_id
                ));
            }
        }
        lines
    };
    for line in lines {
        if let Err(e) = net::write_frame(writer, &line).await {
            warn!("error sending room info: {e}");
            return;
        }
    }
}

async fn send_or_log(writer: &StreamWriter, message: &str) {
    if let Err(e) = net::write_frame(writer, message).await {
        warn!("error replying to peer: {e}");
    }
}
