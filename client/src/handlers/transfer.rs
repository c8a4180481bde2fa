//! Local transfer management: `/transfers`, `/pause`, `/resume`.

use std::time::Duration;

use crate::data::TRANSFERS;
use crate::types::{Direction, TransferStatus};

pub fn pause_transfer(transfer_id: &str) {
    let Some(transfer) = TRANSFERS.get(transfer_id) else {
        println!("❌ Transfer not found: {transfer_id}");
        return;
    };
    match transfer.pause() {
        Ok(()) => {
            println!("⏸ Transfer {transfer_id} paused");
            print_progress_line(&transfer);
        }
        Err(_) => {
            println!(
                "⚠ Transfer {transfer_id} is already {}",
                transfer.status()
            );
        }
    }
}

pub fn resume_transfer(transfer_id: &str) {
    let Some(transfer) = TRANSFERS.get(transfer_id) else {
        println!("❌ Transfer not found: {transfer_id}");
        return;
    };
    match transfer.resume() {
        Ok(()) => {
            println!("▶ Transfer {transfer_id} resumed");
            print_progress_line(&transfer);
        }
        Err(_) => {
            println!(
                "⚠ Transfer {transfer_id} is not paused (current status: {})",
                transfer.status()
            );
        }
    }
}

pub fn list_transfers() {
    let transfers = TRANSFERS.list();
    if transfers.is_empty() {
        println!("📡 No active transfers");
        return;
    }

    println!("📡 Active Transfers:");
    println!("-----------------------------------");
    for transfer in transfers {
        let status = transfer.status();
        let status_icon = match status {
            TransferStatus::Active => "▶",
            TransferStatus::Paused => "⏸",
            TransferStatus::Completed => "✅",
            TransferStatus::Failed => "❌",
        };
        let direction_icon = match transfer.direction {
            Direction::Send => "📤",
            Direction::Receive => "📥",
        };
        println!(
            "{status_icon} {direction_icon} ID: {} {} ({status})",
            transfer.id, transfer.name
        );
        println!(
            "   Type: {} | Size: {} | Progress: {:.1}% ({}/{})",
            transfer.kind,
            format_size(transfer.size),
            percent(transfer.bytes_complete(), transfer.size),
            format_size(transfer.bytes_complete()),
            format_size(transfer.size)
        );
        let relation = match transfer.direction {
            Direction::Send => "To",
            Direction::Receive => "From",
        };
        println!(
            "   {relation}: {} | Started: {} ago",
            transfer.peer_id,
            format_duration(transfer.started_at.elapsed())
        );
        println!("   ---");
    }
    println!("Commands:");
    println!("  /pause <transferId> - Pause a transfer");
    println!("  /resume <transferId> - Resume a paused transfer");
    println!("-----------------------------------");
}

fn print_progress_line(transfer: &crate::types::Transfer) {
    println!("  Name: {} ({})", transfer.name, transfer.kind);
    println!(
        "  Progress: {} / {} ({:.1}%)",
        format_size(transfer.bytes_complete()),
        format_size(transfer.size),
        percent(transfer.bytes_complete(), transfer.size)
    );
}

fn percent(done: u64, total: u64) -> f64 {
    if total == 0 {
        100.0
    } else {
        done as f64 / total as f64 * 100.0
    }
}

/// Bytes as a short human-readable figure.
pub fn format_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;
    const TB: f64 = GB * 1024.0;

    let bytes_f = bytes as f64;
    let (size, unit) = if bytes_f >= TB {
        (bytes_f / TB, "TB")
    } else if bytes_f >= GB {
        (bytes_f / GB, "GB")
    } else if bytes_f >= MB {
        (bytes_f / MB, "MB")
    } else if bytes_f >= KB {
        (bytes_f / KB, "KB")
    } else {
        (bytes_f, "bytes")
    };

    if size >= 100.0 || unit == "bytes" {
        format!("{size:.0} {unit}")
    } else {
        format!("{size:.1} {unit}")
    }
}

/// Elapsed time as the largest two sensible units.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs >= 86_400 {
        format!("{}d {}h", secs / 86_400, (secs % 86_400) / 3600)
    } else if secs >= 3600 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{secs}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_render_with_expected_units() {
        assert_eq!(format_size(0), "0 bytes");
        assert_eq!(format_size(512), "512 bytes");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
        assert_eq!(format_size(150 * 1024 * 1024), "150 MB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024), "3.0 GB");
    }

    #[test]
    fn durations_use_two_units() {
        assert_eq!(format_duration(Duration::from_secs(42)), "42s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
        assert_eq!(format_duration(Duration::from_secs(3700)), "1h 1m");
        assert_eq!(format_duration(Duration::from_secs(90_000)), "1d 1h");
    }
}
