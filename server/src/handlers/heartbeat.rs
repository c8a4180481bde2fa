//! Liveness sweep: periodic `PING` to every online user; a failed write
//! flips the user offline.

use std::sync::Arc;
use std::time::Duration;

use common::net;
use log::{info, warn};

use crate::data::Server;

pub async fn run(server: Arc<Server>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    // The first tick completes immediately; skip it so a sweep never races
    // the listener coming up.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        sweep(&server).await;
    }
}

/// One heartbeat round. Public so tests can drive it without the timer.
pub async fn sweep(server: &Server) {
    let targets = {
        let state = server.state.lock().await;
        state
            .users
            .values()
            .filter(|u| u.online)
            .map(|u| (u.user_id.clone(), u.username.clone(), u.writer.clone()))
            .collect::<Vec<_>>()
    };

    let mut dead = Vec::new();
    for (user_id, username, writer) in targets {
        // A write half locked by an in-progress payload splice belongs to a
        // demonstrably live connection; skip it rather than queue behind a
        // possibly paused transfer.
        let Ok(mut guard) = writer.try_lock() else {
            continue;
        };
        if let Err(e) = net::write_frame_to(&mut *guard, "PING").await {
            warn!("heartbeat to {username} failed: {e}");
            dead.push((user_id, username));
        }
    }

    for (user_id, username) in dead {
        if server.set_offline(&user_id).await.is_some() {
            info!("user disconnected: {username}");
            server
                .broadcast_global(&user_id, &format!("User {username} is now offline"))
                .await;
        }
    }
}
