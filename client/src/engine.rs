//! The pause-aware copy at the heart of every transfer leg.
//!
//! Exactly `size` bytes move through a 32 KiB chunk buffer. The transfer's
//! pause flag is consulted at every chunk boundary: while it is set the loop
//! sleeps and moves nothing, so `bytes_complete` freezes within one chunk of
//! the pause taking effect. Pause is peer-local: it stops bytes through this
//! buffer, it does not negotiate anything with the relay or the other side.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::types::Transfer;

pub const CHUNK_SIZE: usize = 32 * 1024;
pub const PAUSE_POLL: Duration = Duration::from_millis(500);

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("moved {moved} bytes, expected {expected}")]
    Shortfall { moved: u64, expected: u64 },
}

/// Copy exactly `size` bytes from `reader` to `writer`, honoring the
/// transfer's pause flag. Hitting EOF early is a [`TransferError::Shortfall`].
pub async fn copy_pausable<R, W>(
    reader: &mut R,
    writer: &mut W,
    size: u64,
    transfer: &Transfer,
) -> Result<(), TransferError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut remaining = size;
    while remaining > 0 {
        if transfer.is_paused() {
            tokio::time::sleep(PAUSE_POLL).await;
            continue;
        }
        let want = remaining.min(CHUNK_SIZE as u64) as usize;
        let n = reader.read(&mut buf[..want]).await?;
        if n == 0 {
            return Err(TransferError::Shortfall {
                moved: size - remaining,
                expected: size,
            });
        }
        writer.write_all(&buf[..n]).await?;
        remaining -= n as u64;
        transfer.add_progress(n as u64);
    }
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Direction, Transfer, TransferKind, TransferStatus};
    use std::path::PathBuf;
    use std::sync::Arc;

    fn transfer(size: u64) -> Arc<Transfer> {
        Arc::new(Transfer::new(
            "1".into(),
            TransferKind::File,
            "t.bin".into(),
            size,
            Direction::Send,
            "9".into(),
            PathBuf::from("/tmp/t.bin"),
            String::new(),
        ))
    }

    #[tokio::test]
    async fn copies_exactly_the_requested_bytes() {
        let data: Vec<u8> = (0..100_000u32).map(|i| (i % 256) as u8).collect();
        let transfer = transfer(data.len() as u64);
        let mut src = std::io::Cursor::new(data.clone());
        let mut dest = Vec::new();
        copy_pausable(&mut src, &mut dest, data.len() as u64, &transfer)
            .await
            .unwrap();
        assert_eq!(dest, data);
        assert_eq!(transfer.bytes_complete(), data.len() as u64);
    }

    #[tokio::test]
    async fn zero_byte_copy_completes() {
        let transfer = transfer(0);
        let mut src = std::io::Cursor::new(Vec::new());
        let mut dest = Vec::new();
        copy_pausable(&mut src, &mut dest, 0, &transfer).await.unwrap();
        assert!(dest.is_empty());
        assert_eq!(transfer.bytes_complete(), 0);
    }

    #[tokio::test]
    async fn early_eof_is_a_shortfall() {
        let transfer = transfer(10);
        let mut src = std::io::Cursor::new(vec![0u8; 4]);
        let mut dest = Vec::new();
        let err = copy_pausable(&mut src, &mut dest, 10, &transfer)
            .await
            .unwrap_err();
        match err {
            TransferError::Shortfall { moved, expected } => {
                assert_eq!(moved, 4);
                assert_eq!(expected, 10);
            }
            other => panic!("expected shortfall, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn pause_freezes_progress_and_resume_finishes() {
        let size = 256 * 1024u64;
        let data = vec![7u8; size as usize];
        let transfer = transfer(size);

        // Paused from the start: nothing may move while we let virtual time
        // run through several poll intervals.
        transfer.pause().unwrap();
        let t = transfer.clone();
        let data_clone = data.clone();
        let handle = tokio::spawn(async move {
            let mut src = std::io::Cursor::new(data_clone);
            let mut dest = Vec::new();
            copy_pausable(&mut src, &mut dest, size, &t).await.map(|_| dest)
        });

        tokio::time::sleep(PAUSE_POLL * 4).await;
        assert_eq!(transfer.bytes_complete(), 0);
        assert_eq!(transfer.status(), TransferStatus::Paused);

        transfer.resume().unwrap();
        let dest = handle.await.unwrap().unwrap();
        assert_eq!(dest.len(), size as usize);
        assert_eq!(transfer.bytes_complete(), size);
    }
}
