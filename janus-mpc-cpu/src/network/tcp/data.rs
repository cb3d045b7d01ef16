use crate::error::Error;
use eyre::{bail, Result};
use socket2::{SockRef, TcpKeepalive};
use std::time::Duration;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt, BufReader, BufWriter},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpStream,
    },
    sync::{mpsc, oneshot},
};

/// Largest frame accepted from the peer.
pub const MAX_FRAME_LEN: usize = 1 << 30;

pub enum Outbound {
    Frame(Vec<u8>),
    /// Answered once every frame queued before it has been written.
    Flush(oneshot::Sender<()>),
}

pub type OutStream = mpsc::UnboundedSender<Outbound>;
pub type InStream = mpsc::UnboundedReceiver<Vec<u8>>;

/// set no_delay and keepalive
pub fn configure_tcp_stream(stream: &TcpStream) -> Result<()> {
    let params = TcpKeepalive::new()
        // idle time before keepalives get sent
        .with_time(Duration::from_secs(30))
        // how often to send keepalives
        .with_interval(Duration::from_secs(30))
        // how many unanswered probes before the connection is closed
        .with_retries(4);
    let socket_ref = SockRef::from(&stream);
    socket_ref.set_tcp_nodelay(true)?;
    socket_ref.set_tcp_keepalive(&params)?;
    Ok(())
}

/// Length prefix of an outgoing frame.
pub fn frame_len(len: usize) -> Result<u32> {
    if len > MAX_FRAME_LEN {
        return Err(Error::Transport(format!("frame of {len} bytes exceeds the limit")).into());
    }
    u32::try_from(len).map_err(|_| {
        Error::Transport(format!("frame of {len} bytes overflows its length prefix")).into()
    })
}

/// Writes queued frames, each prefixed by its length as a little-endian u32.
pub async fn handle_outbound_traffic(
    writer: OwnedWriteHalf,
    mut outbound_rx: mpsc::UnboundedReceiver<Outbound>,
) -> Result<()> {
    let mut writer = BufWriter::new(writer);
    while let Some(msg) = outbound_rx.recv().await {
        match msg {
            Outbound::Frame(frame) => {
                writer.write_u32_le(frame_len(frame.len())?).await?;
                writer.write_all(&frame).await?;
                // only flush once the queue has drained
                if outbound_rx.is_empty() {
                    writer.flush().await?;
                }
            }
            Outbound::Flush(ack) => {
                writer.flush().await?;
                let _ = ack.send(());
            }
        }
    }
    writer.flush().await?;
    writer.shutdown().await?;
    Ok(())
}

/// Forwards incoming frames until the peer closes the connection.
pub async fn handle_inbound_traffic(
    reader: OwnedReadHalf,
    inbound_tx: mpsc::UnboundedSender<Vec<u8>>,
) -> Result<()> {
    let mut reader = BufReader::new(reader);
    loop {
        let len = match reader.read_u32_le().await {
            Ok(len) => len as usize,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        if len > MAX_FRAME_LEN {
            bail!("frame of {len} bytes exceeds the limit");
        }
        let mut frame = vec![0u8; len];
        reader.read_exact(&mut frame).await?;
        if inbound_tx.send(frame).is_err() {
            // the session is gone
            return Ok(());
        }
    }
}
