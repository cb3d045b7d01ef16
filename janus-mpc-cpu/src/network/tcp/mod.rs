//! Two-party TCP transport. The registration station listens, the biometric
//! provider dials. A writer task and a reader task own the socket halves, so
//! both parties can send before either of them receives.

mod data;
mod handshake;

use crate::{
    error::Error,
    execution::player::{Identity, Role},
    network::Networking,
};
use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use data::{configure_tcp_stream, frame_len, InStream, OutStream, Outbound};
use eyre::{eyre, Result};
use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    time::Duration,
};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::{mpsc, oneshot},
    task::JoinHandle,
    time::timeout,
};

#[derive(Clone, Debug)]
pub struct TcpConfig {
    pub port: u16,
    /// Host the biometric provider dials.
    pub peer_host: String,
    /// Deadline for accepting or establishing the connection.
    pub connect_timeout: Duration,
}

impl TcpConfig {
    pub fn new(port: u16, peer_host: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            port,
            peer_host: peer_host.into(),
            connect_timeout,
        }
    }
}

pub struct TcpNetworking {
    peer_id: Identity,
    outbound_tx: OutStream,
    inbound_rx: InStream,
    writer: Option<JoinHandle<Result<()>>>,
    reader: JoinHandle<Result<()>>,
}

/// Bound listening socket of the registration station.
pub struct TcpAcceptor {
    listener: TcpListener,
}

impl TcpAcceptor {
    pub async fn bind(port: u16) -> Result<Self> {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port);
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Transport(format!("failed to listen on {addr}: {e}")))?;
        Ok(Self { listener })
    }

    pub fn local_port(&self) -> Result<u16> {
        Ok(self.listener.local_addr()?.port())
    }

    /// Accepts the first connection that completes the handshake as `peer_id`.
    pub async fn accept(
        self,
        own_id: Identity,
        peer_id: Identity,
        deadline: Duration,
    ) -> Result<TcpNetworking> {
        let stream = timeout(deadline, accept_peer(&self.listener, &own_id, &peer_id))
            .await
            .map_err(|_| Error::Transport(format!("no peer connected within {deadline:?}")))??;
        Ok(TcpNetworking::spawn(stream, peer_id))
    }
}

async fn accept_peer(
    listener: &TcpListener,
    own_id: &Identity,
    peer_id: &Identity,
) -> Result<TcpStream> {
    loop {
        let (mut stream, peer_addr) = listener.accept().await?;
        configure_tcp_stream(&stream)?;
        match handshake::inbound(&mut stream, own_id, peer_id).await {
            Ok(()) => {
                tracing::debug!(%peer_addr, "accepted connection from {:?}", peer_id);
                return Ok(stream);
            }
            Err(e) => {
                tracing::debug!(%peer_addr, "application level handshake failed: {e:?}");
            }
        }
    }
}

async fn dial_peer(addr: &str, own_id: &Identity, peer_id: &Identity) -> Result<TcpStream> {
    let mut stream = TcpStream::connect(addr).await?;
    configure_tcp_stream(&stream)?;
    handshake::outbound(&mut stream, own_id, peer_id).await?;
    Ok(stream)
}

impl TcpNetworking {
    /// Dials `addr` with exponential backoff until `deadline` expires.
    pub async fn connect(
        own_id: Identity,
        peer_id: Identity,
        addr: String,
        deadline: Duration,
    ) -> Result<Self> {
        let backoff = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(50))
            .with_max_delay(Duration::from_secs(1))
            .with_max_times(usize::MAX);
        let (own, peer, target) = (&own_id, &peer_id, addr.as_str());
        let dial = || dial_peer(target, own, peer);
        let stream = timeout(
            deadline,
            dial.retry(backoff)
                .sleep(tokio::time::sleep)
                .notify(|e, dur| tracing::debug!("connecting to {addr} failed, retry in {dur:?}: {e}")),
        )
        .await
        .map_err(|_| Error::Transport(format!("could not connect to {addr} within {deadline:?}")))??;
        tracing::debug!("connected to {:?} at {addr}", peer_id);
        Ok(Self::spawn(stream, peer_id))
    }

    /// Listens or dials depending on `role`.
    pub async fn establish(role: Role, config: &TcpConfig) -> Result<Self> {
        let own_id = role.identity();
        let peer_id = role.peer().identity();
        match role {
            Role::RegistrationStation => {
                TcpAcceptor::bind(config.port)
                    .await?
                    .accept(own_id, peer_id, config.connect_timeout)
                    .await
            }
            Role::BiometricProvider => {
                let addr = format!("{}:{}", config.peer_host, config.port);
                Self::connect(own_id, peer_id, addr, config.connect_timeout).await
            }
        }
    }

    fn spawn(stream: TcpStream, peer_id: Identity) -> Self {
        let (reader, writer) = stream.into_split();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let writer = tokio::spawn(data::handle_outbound_traffic(writer, outbound_rx));
        let reader = tokio::spawn(data::handle_inbound_traffic(reader, inbound_tx));
        Self {
            peer_id,
            outbound_tx,
            inbound_rx,
            writer: Some(writer),
            reader,
        }
    }

    fn check_peer(&self, other: &Identity) -> Result<()> {
        if *other != self.peer_id {
            return Err(eyre!(
                "no connection to {:?}, connected to {:?}",
                other,
                self.peer_id
            ));
        }
        Ok(())
    }

    /// Waits until every queued frame has been written to the socket.
    pub async fn flush_pending(&mut self) -> Result<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.outbound_tx
            .send(Outbound::Flush(ack_tx))
            .map_err(|_| Error::Transport("writer task is gone".to_string()))?;
        ack_rx
            .await
            .map_err(|_| Error::Transport("writer task failed before flushing".to_string()))?;
        Ok(())
    }

    /// Flushes pending frames and closes the write half.
    pub async fn shutdown(mut self) -> Result<()> {
        let writer = self.writer.take();
        // closing the queue lets the writer drain and exit
        let (closed_tx, _) = mpsc::unbounded_channel();
        drop(std::mem::replace(&mut self.outbound_tx, closed_tx));
        if let Some(writer) = writer {
            writer
                .await
                .map_err(|e| Error::Transport(format!("writer task panicked: {e}")))??;
        }
        Ok(())
    }
}

impl Drop for TcpNetworking {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

#[async_trait]
impl Networking for TcpNetworking {
    async fn send(&mut self, value: Vec<u8>, receiver: &Identity) -> Result<()> {
        self.check_peer(receiver)?;
        frame_len(value.len())?;
        self.outbound_tx
            .send(Outbound::Frame(value))
            .map_err(|_| Error::Transport("connection closed while sending".to_string()))?;
        Ok(())
    }

    async fn receive(&mut self, sender: &Identity) -> Result<Vec<u8>> {
        self.check_peer(sender)?;
        self.inbound_rx
            .recv()
            .await
            .ok_or_else(|| Error::Transport("connection closed by peer".to_string()).into())
    }

    async fn flush(&mut self) -> Result<()> {
        self.flush_pending().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::value::NetworkValue;

    #[tokio::test]
    async fn test_tcp_exchange() -> Result<()> {
        let acceptor = TcpAcceptor::bind(0).await?;
        let port = acceptor.local_port()?;
        let deadline = Duration::from_secs(10);

        let rs = tokio::spawn(async move {
            let mut net = acceptor
                .accept("rs".into(), "bp".into(), deadline)
                .await?;
            net.send(NetworkValue::Bit(true).to_network()?, &"bp".into())
                .await?;
            let got = NetworkValue::from_network(net.receive(&"bp".into()).await)?;
            net.shutdown().await?;
            Ok::<_, eyre::Report>(got)
        });
        let bp = tokio::spawn(async move {
            let mut net = TcpNetworking::connect(
                "bp".into(),
                "rs".into(),
                format!("127.0.0.1:{port}"),
                deadline,
            )
            .await?;
            net.send(NetworkValue::VecBit64(vec![5, 6]).to_network()?, &"rs".into())
                .await?;
            let got = NetworkValue::from_network(net.receive(&"rs".into()).await)?;
            net.shutdown().await?;
            Ok::<_, eyre::Report>(got)
        });

        assert_eq!(rs.await??, NetworkValue::VecBit64(vec![5, 6]));
        assert_eq!(bp.await??, NetworkValue::Bit(true));
        Ok(())
    }

    #[tokio::test]
    async fn test_connect_deadline() {
        // nothing listens on this port
        let port = TcpAcceptor::bind(0).await.unwrap().local_port().unwrap();
        let res = TcpNetworking::connect(
            "bp".into(),
            "rs".into(),
            format!("127.0.0.1:{port}"),
            Duration::from_millis(300),
        )
        .await;
        let err = res.err().unwrap();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::Transport(_))
        ));
    }
}
