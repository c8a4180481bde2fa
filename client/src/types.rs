use std::fmt;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    File,
    Folder,
}

impl fmt::Display for TransferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferKind::File => write!(f, "File"),
            TransferKind::Folder => write!(f, "Folder"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    Active,
    Paused,
    Completed,
    Failed,
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferStatus::Active => write!(f, "Active"),
            TransferStatus::Paused => write!(f, "Paused"),
            TransferStatus::Completed => write!(f, "Completed"),
            TransferStatus::Failed => write!(f, "Failed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Send,
    Receive,
}

#[derive(Debug)]
struct Progress {
    bytes_complete: u64,
    status: TransferStatus,
    paused: bool,
}

/// One in-flight transfer leg on this peer. Progress and the pause flag sit
/// behind the transfer's own lock; the copy loop reads them at every chunk
/// boundary.
#[derive(Debug)]
pub struct Transfer {
    pub id: String,
    pub kind: TransferKind,
    pub name: String,
    pub size: u64,
    pub direction: Direction,
    /// The remote user id on the other end of this leg.
    pub peer_id: String,
    pub path: PathBuf,
    pub checksum: String,
    pub started_at: Instant,
    progress: Mutex<Progress>,
}

impl Transfer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: String,
        kind: TransferKind,
        name: String,
        size: u64,
        direction: Direction,
        peer_id: String,
        path: PathBuf,
        checksum: String,
    ) -> Self {
        Transfer {
            id,
            kind,
            name,
            size,
            direction,
            peer_id,
            path,
            checksum,
            started_at: Instant::now(),
            progress: Mutex::new(Progress {
                bytes_complete: 0,
                status: TransferStatus::Active,
                paused: false,
            }),
        }
    }

    pub fn is_paused(&self) -> bool {
        self.progress.lock().unwrap().paused
    }

    pub fn bytes_complete(&self) -> u64 {
        self.progress.lock().unwrap().bytes_complete
    }

    pub fn status(&self) -> TransferStatus {
        self.progress.lock().unwrap().status
    }

    pub fn add_progress(&self, bytes: u64) {
        self.progress.lock().unwrap().bytes_complete += bytes;
    }

    pub fn set_status(&self, status: TransferStatus) {
        self.progress.lock().unwrap().status = status;
    }

    /// Active → Paused. Any other starting state is rejected.
    pub fn pause(&self) -> Result<(), String> {
        let mut progress = self.progress.lock().unwrap();
        if progress.status != TransferStatus::Active {
            return Err(format!(
                "cannot pause transfer with status: {}",
                progress.status
            ));
        }
        progress.status = TransferStatus::Paused;
        progress.paused = true;
        Ok(())
    }

    /// Paused → Active. Any other starting state is rejected.
    pub fn resume(&self) -> Result<(), String> {
        let mut progress = self.progress.lock().unwrap();
        if progress.status != TransferStatus::Paused {
            return Err(format!(
                "cannot resume transfer with status: {}",
                progress.status
            ));
        }
        progress.status = TransferStatus::Active;
        progress.paused = false;
        Ok(())
    }
}
