use crate::execution::player::Identity;
use eyre::{eyre, Result};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};

const HANDSHAKE_OK: &[u8] = b"2ok";
const MAX_IDENTITY_LEN: u32 = 1024;

async fn write_identity(stream: &mut TcpStream, own_id: &Identity) -> Result<()> {
    let own_id_bytes = own_id.0.as_bytes();
    stream
        .write_u32(own_id_bytes.len() as u32)
        .await
        .map_err(|e| eyre!("Failed to write own_id length during handshake: {:?}", e))?;
    stream
        .write_all(own_id_bytes)
        .await
        .map_err(|e| eyre!("Failed to write own_id bytes during handshake: {:?}", e))?;
    Ok(())
}

async fn read_identity(stream: &mut TcpStream) -> Result<Identity> {
    let peer_id_length = stream
        .read_u32()
        .await
        .map_err(|e| eyre!("Failed to read peer_id length: {:?}", e))?;
    if peer_id_length > MAX_IDENTITY_LEN {
        return Err(eyre!("peer_id length {peer_id_length} is too large"));
    }
    let mut peer_id_bytes = vec![0u8; peer_id_length as usize];
    stream
        .read_exact(&mut peer_id_bytes)
        .await
        .map_err(|e| eyre!("Failed to read peer_id bytes: {:?}", e))?;
    String::from_utf8(peer_id_bytes)
        .map(Identity)
        .map_err(|e| eyre!("Failed to parse peer_id bytes as UTF-8: {:?}", e))
}

fn check_peer(expected: &Identity, got: &Identity) -> Result<()> {
    if expected != got {
        return Err(eyre!(
            "Handshake failed: expected peer {:?}, got {:?}",
            expected,
            got
        ));
    }
    Ok(())
}

/// Dialing side: announce ourselves, learn the peer and wait for its ok.
pub async fn outbound(
    stream: &mut TcpStream,
    own_id: &Identity,
    peer_id: &Identity,
) -> Result<()> {
    write_identity(stream, own_id).await?;
    let got = read_identity(stream).await?;
    check_peer(peer_id, &got)?;

    let mut rsp = [0; 3];
    stream.read_exact(&mut rsp).await?;
    if rsp != HANDSHAKE_OK {
        return Err(eyre!("handshake not accepted: rsp={:?}", rsp));
    }
    Ok(())
}

/// Listening side: learn the peer, announce ourselves and accept.
pub async fn inbound(stream: &mut TcpStream, own_id: &Identity, peer_id: &Identity) -> Result<()> {
    let got = read_identity(stream).await?;
    check_peer(peer_id, &got)?;
    write_identity(stream, own_id).await?;
    stream.write_all(HANDSHAKE_OK).await?;
    Ok(())
}
