//! Stream plumbing shared by relay and peer: newline-framed control reads,
//! serialized writes, and byte-exact payload copies.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

/// Shared handle to a connection's write half. Whoever holds the lock owns
/// the wire: a transfer leg keeps it across request + payload so heartbeats
/// and chat cannot interleave bytes into the stream.
pub type StreamWriter = Arc<Mutex<OwnedWriteHalf>>;

pub fn share_writer(wt: OwnedWriteHalf) -> StreamWriter {
    Arc::new(Mutex::new(wt))
}

/// Buffered reader owning a connection's read half. Control traffic is read
/// line by line; payload bytes are pulled from the same buffer so nothing is
/// lost between the announcing frame and the bytes that follow it.
pub struct FrameReader {
    inner: BufReader<OwnedReadHalf>,
}

impl FrameReader {
    pub fn new(rd: OwnedReadHalf) -> Self {
        FrameReader { inner: BufReader::new(rd) }
    }

    /// Read one control frame. Returns `None` on clean EOF. Trailing `\n`
    /// (and `\r` from line-mode clients) is stripped.
    pub async fn read_frame(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        let n = self.inner.read_line(&mut line).await?;
        if n == 0 {
            return Ok(None);
        }
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Ok(Some(line))
    }

    /// Copy exactly `size` payload bytes into `dest`. Returns the number of
    /// bytes actually moved; the caller decides whether a shortfall is fatal.
    pub async fn copy_payload<W>(&mut self, dest: &mut W, size: u64) -> io::Result<u64>
    where
        W: AsyncWrite + Unpin,
    {
        let mut limited = (&mut self.inner).take(size);
        let n = tokio::io::copy(&mut limited, dest).await?;
        dest.flush().await?;
        Ok(n)
    }

    /// Consume and discard exactly `size` payload bytes. Used by the relay to
    /// stay in sync with a sender whose transfer was refused.
    pub async fn drain_payload(&mut self, size: u64) -> io::Result<u64> {
        let mut limited = (&mut self.inner).take(size);
        tokio::io::copy(&mut limited, &mut tokio::io::sink()).await
    }

    /// Direct access to the underlying buffered stream, for payload reads
    /// that need to go through a pause-aware copy loop.
    pub fn inner_mut(&mut self) -> &mut (impl AsyncRead + Unpin) {
        &mut self.inner
    }
}

/// Write one control frame (appends the newline) through a shared writer.
pub async fn write_frame(wt: &StreamWriter, frame: &str) -> io::Result<()> {
    let mut guard = wt.lock().await;
    write_frame_to(&mut *guard, frame).await
}

/// Write one control frame to a write half the caller already holds.
pub async fn write_frame_to<W>(wt: &mut W, frame: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    wt.write_all(frame.as_bytes()).await?;
    wt.write_all(b"\n").await?;
    wt.flush().await
}

/// Probe whether something is listening at `address`, with a short connect
/// timeout. Returns a human-readable reason on failure.
pub async fn check_server_availability(address: &str) -> Result<(), String> {
    match tokio::time::timeout(Duration::from_secs(3), TcpStream::connect(address)).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) if e.kind() == io::ErrorKind::ConnectionRefused => {
            Err("Connection refused - no server running at this address".into())
        }
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err("Connection timed out - server might be behind a firewall".into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        (client, server)
    }

    #[tokio::test]
    async fn frames_and_payload_share_the_buffer() {
        let (client, server) = pair().await;
        let (_c_rd, c_wt) = client.into_split();
        let (s_rd, _s_wt) = server.into_split();

        let writer = share_writer(c_wt);
        let mut reader = FrameReader::new(s_rd);

        // A frame and its payload arrive back to back; the payload must not
        // be swallowed by the line buffer.
        write_frame(&writer, "/FILE_REQUEST 1 a.bin 5").await.unwrap();
        {
            let mut guard = writer.lock().await;
            guard.write_all(b"hello").await.unwrap();
            guard.flush().await.unwrap();
        }
        write_frame(&writer, "after").await.unwrap();

        assert_eq!(
            reader.read_frame().await.unwrap().unwrap(),
            "/FILE_REQUEST 1 a.bin 5"
        );
        let mut payload = Vec::new();
        let n = reader.copy_payload(&mut payload, 5).await.unwrap();
        assert_eq!(n, 5);
        assert_eq!(payload, b"hello");
        assert_eq!(reader.read_frame().await.unwrap().unwrap(), "after");
    }

    #[tokio::test]
    async fn drain_discards_exactly_the_announced_bytes() {
        let (client, server) = pair().await;
        let (_c_rd, mut c_wt) = client.into_split();
        let (s_rd, _s_wt) = server.into_split();
        let mut reader = FrameReader::new(s_rd);

        c_wt.write_all(b"0123456789next\n").await.unwrap();
        assert_eq!(reader.drain_payload(10).await.unwrap(), 10);
        assert_eq!(reader.read_frame().await.unwrap().unwrap(), "next");
    }

    #[tokio::test]
    async fn eof_reads_as_none() {
        let (client, server) = pair().await;
        drop(client);
        let (s_rd, _s_wt) = server.into_split();
        let mut reader = FrameReader::new(s_rd);
        assert!(reader.read_frame().await.unwrap().is_none());
    }
}
