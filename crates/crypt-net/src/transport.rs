//! Raw stream helpers shared by the handshake and the session

use std::future::Future;
use std::io::{self, ErrorKind};
use std::time::Duration;

use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Read chunk size for unframed handshake messages
const READ_CHUNK_SIZE: usize = 8192;

/// Byte-oriented duplex stream a session runs over
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Transport for T {}

/// Run `fut`, bounded by `timeout` when one is given
pub(crate) async fn with_timeout<T, F>(timeout: Option<Duration>, fut: F) -> io::Result<T>
where
    F: Future<Output = io::Result<T>>,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| {
            io::Error::new(ErrorKind::TimedOut, format!("timed out after {:?}", limit))
        })?,
        None => fut.await,
    }
}

/// Read one unframed message of at most `cap` bytes
///
/// Keeps reading until `is_complete` accepts the buffer. Hitting the cap or
/// EOF first is an error.
pub(crate) async fn read_unframed<S, F>(
    stream: &mut S,
    cap: usize,
    timeout: Option<Duration>,
    mut is_complete: F,
) -> io::Result<BytesMut>
where
    S: AsyncRead + Unpin,
    F: FnMut(&[u8]) -> bool,
{
    let mut buf = BytesMut::with_capacity(cap.min(READ_CHUNK_SIZE));

    loop {
        let remaining = cap - buf.len();
        if remaining == 0 {
            return Err(io::Error::new(
                ErrorKind::InvalidData,
                format!("message exceeds the {}-byte read cap", cap),
            ));
        }

        let mut limited = (&mut buf).limit(remaining.min(READ_CHUNK_SIZE));
        let n = with_timeout(timeout, stream.read_buf(&mut limited)).await?;
        if n == 0 {
            return Err(io::Error::new(
                ErrorKind::UnexpectedEof,
                format!("stream closed after {} bytes", buf.len()),
            ));
        }

        if is_complete(&buf) {
            return Ok(buf);
        }
    }
}

/// Read exactly `len` bytes, bounded by `cap`
pub(crate) async fn read_exact_capped<S>(
    stream: &mut S,
    len: usize,
    cap: usize,
    timeout: Option<Duration>,
) -> io::Result<Vec<u8>>
where
    S: AsyncRead + Unpin,
{
    if len > cap {
        return Err(io::Error::new(
            ErrorKind::InvalidData,
            format!("{}-byte message exceeds the {}-byte read cap", len, cap),
        ));
    }

    let mut buf = vec![0u8; len];
    with_timeout(timeout, stream.read_exact(&mut buf)).await?;
    Ok(buf)
}

/// Read `len` bytes that may or may not follow the last message
///
/// Returns `None` if nothing arrives within `grace`. Once the first byte is
/// in, the rest is read under `timeout`.
pub(crate) async fn read_trailing<S>(
    stream: &mut S,
    len: usize,
    grace: Duration,
    timeout: Option<Duration>,
) -> io::Result<Option<Vec<u8>>>
where
    S: AsyncRead + Unpin,
{
    if len == 0 {
        return Ok(Some(Vec::new()));
    }

    let mut buf = vec![0u8; len];
    match tokio::time::timeout(grace, stream.read(&mut buf[..1])).await {
        Err(_) => return Ok(None),
        Ok(Ok(0)) => return Ok(None),
        Ok(Ok(_)) => {}
        Ok(Err(e)) => return Err(e),
    }

    with_timeout(timeout, stream.read_exact(&mut buf[1..])).await?;
    Ok(Some(buf))
}

/// Write a whole message and flush it
pub(crate) async fn write_all<S>(
    stream: &mut S,
    data: &[u8],
    timeout: Option<Duration>,
) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    with_timeout(timeout, async {
        stream.write_all(data).await?;
        stream.flush().await
    })
    .await
}

/// Shut the stream down, ignoring errors from an already-dead peer
pub(crate) async fn shutdown<S>(stream: &mut S)
where
    S: AsyncWrite + Unpin,
{
    if let Err(e) = stream.shutdown().await {
        debug!("Shutdown error ignored: {}", e);
    }
}
