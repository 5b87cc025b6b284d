//! Declared-length transfer framing
//!
//! Text messages are single newline-terminated lines. A payload transfer
//! announces its exact byte count as a decimal line, waits for the fixed
//! acknowledgment token, then streams raw bytes. The declared length is
//! the contract on both sides: the receiver keeps a running byte counter
//! and stops exactly there - a short read is never treated as
//! end-of-stream.
//!
//! Everything here is generic over the stream halves so the same code
//! runs over a TcpStream in production and `tokio::io::duplex` in tests.

use anyhow::{bail, Context, Result};
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt,
};

use crate::protocol::{
    ACK, CHUNK_SIZE, ERROR_PREFIX, FILE_NOT_FOUND, MAX_LINE, NO_FILE_FOUND, REDIRECT_PREFIX,
};

/// One server response line, classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Absolute path of a located file
    Path(String),
    /// Either not-found sentinel
    NotFound,
    /// `Error: <text>`
    Error(String),
    /// Declared payload length; an ACK and that many raw bytes follow
    Payload(u64),
    /// `REDIRECT <host> <port>`
    Redirect { host: String, port: u16 },
    /// Anything unrecognized - passed through opaquely, never fatal
    Other(String),
}

impl Response {
    pub fn parse(line: &str) -> Response {
        if let Some(rest) = line.strip_prefix(REDIRECT_PREFIX) {
            let mut it = rest.split_whitespace();
            if let (Some(host), Some(port)) = (it.next(), it.next()) {
                if let (Ok(port), None) = (port.parse::<u16>(), it.next()) {
                    return Response::Redirect { host: host.to_string(), port };
                }
            }
            return Response::Other(line.to_string());
        }
        if line == FILE_NOT_FOUND || line == NO_FILE_FOUND {
            return Response::NotFound;
        }
        if let Some(msg) = line.strip_prefix(ERROR_PREFIX) {
            return Response::Error(msg.to_string());
        }
        if !line.is_empty() && line.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(n) = line.parse::<u64>() {
                if n > 0 {
                    return Response::Payload(n);
                }
            }
        }
        if line.starts_with('/') {
            return Response::Path(line.to_string());
        }
        Response::Other(line.to_string())
    }
}

/// Write one newline-terminated text message.
pub async fn send_line<W>(writer: &mut W, line: &str) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

/// Read one newline-terminated message, stripped of its terminator.
/// Returns `None` on a clean EOF before any bytes arrive. A peer that
/// closes mid-line yields what it sent; a line past [`MAX_LINE`] is a
/// framing error.
pub async fn read_message<R>(reader: &mut R) -> Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let mut limited = (&mut *reader).take((MAX_LINE + 1) as u64);
    let n = limited.read_until(b'\n', &mut buf).await?;
    if n == 0 {
        return Ok(None);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
    } else if buf.len() > MAX_LINE {
        bail!("message exceeds {} bytes", MAX_LINE);
    }
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }
    let line = String::from_utf8(buf).context("message is not valid UTF-8")?;
    Ok(Some(line))
}

/// Sender half: announce `len`, wait for the acknowledgment token, then
/// stream exactly `len` bytes from `source` in fixed-size chunks.
/// Returns the byte count actually sent.
pub async fn send_file<R, W, S>(reader: &mut R, writer: &mut W, source: &mut S, len: u64) -> Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    S: AsyncRead + Unpin,
{
    send_line(writer, &len.to_string()).await?;

    let mut ack = [0u8; ACK.len()];
    reader
        .read_exact(&mut ack)
        .await
        .context("waiting for transfer acknowledgment")?;
    if &ack != ACK {
        bail!("unexpected acknowledgment {:?}", ack);
    }

    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut sent: u64 = 0;
    while sent < len {
        let want = CHUNK_SIZE.min((len - sent) as usize);
        let n = source.read(&mut buf[..want]).await.context("read payload chunk")?;
        if n == 0 {
            bail!("payload source ended at {} of {} bytes", sent, len);
        }
        writer
            .write_all(&buf[..n])
            .await
            .context("send payload chunk")?;
        sent += n as u64;
    }
    writer.flush().await?;
    Ok(sent)
}

/// Receiver half: acknowledge a declared length, then read exactly that
/// many bytes into `dest`, counting as they arrive. `progress` is called
/// with the running total after each chunk.
pub async fn recv_payload<R, W, D, F>(
    reader: &mut R,
    writer: &mut W,
    declared: u64,
    dest: &mut D,
    mut progress: F,
) -> Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    D: AsyncWrite + Unpin,
    F: FnMut(u64),
{
    writer.write_all(ACK).await?;
    writer.flush().await?;

    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut received: u64 = 0;
    while received < declared {
        let want = CHUNK_SIZE.min((declared - received) as usize);
        let n = reader.read(&mut buf[..want]).await.context("read payload chunk")?;
        if n == 0 {
            bail!("peer closed after {} of {} declared bytes", received, declared);
        }
        dest.write_all(&buf[..n]).await.context("write payload chunk")?;
        received += n as u64;
        progress(received);
    }
    dest.flush().await?;
    Ok(received)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::CHUNK_SIZE;
    use std::io::Cursor;
    use tokio::io::BufReader;

    #[test]
    fn classifies_responses() {
        assert_eq!(Response::parse("/home/u/a.txt"), Response::Path("/home/u/a.txt".into()));
        assert_eq!(Response::parse("File not found"), Response::NotFound);
        assert_eq!(Response::parse("No file found"), Response::NotFound);
        assert_eq!(Response::parse("Error: tar failed"), Response::Error("tar failed".into()));
        assert_eq!(Response::parse("4096"), Response::Payload(4096));
        assert_eq!(
            Response::parse("REDIRECT 127.0.0.1 8081"),
            Response::Redirect { host: "127.0.0.1".into(), port: 8081 }
        );
        // zero or malformed lengths and unknown shapes fall through
        assert_eq!(Response::parse("0"), Response::Other("0".into()));
        assert_eq!(Response::parse("12ab"), Response::Other("12ab".into()));
        assert_eq!(
            Response::parse("REDIRECT nowhere"),
            Response::Other("REDIRECT nowhere".into())
        );
    }

    #[tokio::test]
    async fn line_round_trip() {
        let (mut client, server) = tokio::io::duplex(64 * 1024);
        let mut reader = BufReader::new(server);

        send_line(&mut client, "findfile a.txt").await.unwrap();
        let got = read_message(&mut reader).await.unwrap();
        assert_eq!(got.as_deref(), Some("findfile a.txt"));

        // dropping the peer is a clean EOF
        drop(client);
        assert!(read_message(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rejects_oversized_lines() {
        let (mut client, server) = tokio::io::duplex(64 * 1024);
        let mut reader = BufReader::new(server);

        let long = "x".repeat(MAX_LINE + 10);
        send_line(&mut client, &long).await.unwrap();
        assert!(read_message(&mut reader).await.is_err());
    }

    #[tokio::test]
    async fn payload_round_trip_at_exact_chunk_multiple() {
        // an exact multiple of the chunk size is the case a short-read
        // heuristic would truncate; the byte counter must not
        let payload: Vec<u8> = (0..2 * CHUNK_SIZE).map(|i| (i % 251) as u8).collect();
        let declared = payload.len() as u64;

        let (client, server) = tokio::io::duplex(8 * 1024);
        let (cr, mut cw) = tokio::io::split(client);
        let (sr, mut sw) = tokio::io::split(server);
        let mut client_reader = BufReader::new(cr);
        let mut server_reader = BufReader::new(sr);

        let payload_clone = payload.clone();
        let sender = tokio::spawn(async move {
            let mut source = Cursor::new(payload_clone);
            send_file(&mut server_reader, &mut sw, &mut source, declared).await
        });

        let announced = read_message(&mut client_reader).await.unwrap().unwrap();
        assert_eq!(Response::parse(&announced), Response::Payload(declared));

        let mut dest = Cursor::new(Vec::new());
        let mut last_seen = 0;
        let received = recv_payload(&mut client_reader, &mut cw, declared, &mut dest, |n| {
            last_seen = n;
        })
        .await
        .unwrap();

        assert_eq!(received, declared);
        assert_eq!(last_seen, declared);
        assert_eq!(dest.into_inner(), payload);
        assert_eq!(sender.await.unwrap().unwrap(), declared);
    }

    #[tokio::test]
    async fn receiver_errors_when_peer_stops_short() {
        let (client, mut server) = tokio::io::duplex(8 * 1024);
        let (cr, mut cw) = tokio::io::split(client);
        let mut client_reader = BufReader::new(cr);

        tokio::spawn(async move {
            // declare 100 bytes but deliver only 40, then vanish
            send_line(&mut server, "100").await.unwrap();
            server.write_all(&[7u8; 40]).await.unwrap();
            server.flush().await.unwrap();
        });

        let announced = read_message(&mut client_reader).await.unwrap().unwrap();
        assert_eq!(Response::parse(&announced), Response::Payload(100));

        let mut dest = Cursor::new(Vec::new());
        let err = recv_payload(&mut client_reader, &mut cw, 100, &mut dest, |_| {}).await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn sender_requires_the_ack_token() {
        let (mut client, server) = tokio::io::duplex(8 * 1024);
        let (sr, mut sw) = tokio::io::split(server);
        let mut server_reader = BufReader::new(sr);

        tokio::spawn(async move {
            client.write_all(b"NAK").await.unwrap();
            client.flush().await.unwrap();
        });

        let mut source = Cursor::new(vec![1u8; 16]);
        let err = send_file(&mut server_reader, &mut sw, &mut source, 16).await;
        assert!(err.is_err());
    }
}
