use crate::{execution::player::Identity, network::Networking};
use async_trait::async_trait;
use dashmap::DashMap;
use eyre::eyre;
use std::sync::Arc;

type P2PChannels = Arc<
    DashMap<
        (Identity, Identity),
        (
            Arc<async_channel::Sender<Vec<u8>>>,
            Arc<async_channel::Receiver<Vec<u8>>>,
        ),
    >,
>;

/// In-process channels between every ordered pair of parties.
#[derive(Debug, Clone)]
pub struct LocalNetworkingStore {
    p2p_channels: P2PChannels,
}

impl LocalNetworkingStore {
    pub fn from_host_ids(identities: &[Identity]) -> Self {
        let p2p = DashMap::new();
        for v1 in identities.iter() {
            for v2 in identities.iter() {
                if v1 != v2 {
                    let (tx, rx) = async_channel::unbounded::<Vec<u8>>();
                    p2p.insert((v1.clone(), v2.clone()), (Arc::new(tx), Arc::new(rx)));
                }
            }
        }
        LocalNetworkingStore {
            p2p_channels: Arc::new(p2p),
        }
    }

    pub fn get_local_network(&self, owner: Identity) -> LocalNetworking {
        LocalNetworking {
            p2p_channels: Arc::clone(&self.p2p_channels),
            owner,
        }
    }
}

#[derive(Debug)]
pub struct LocalNetworking {
    p2p_channels: P2PChannels,
    pub owner: Identity,
}

#[async_trait]
impl Networking for LocalNetworking {
    async fn send(&mut self, val: Vec<u8>, receiver: &Identity) -> eyre::Result<()> {
        let (tx, _) = self
            .p2p_channels
            .get(&(self.owner.clone(), receiver.clone()))
            .ok_or_else(|| {
                eyre!(
                    "p2p channel retrieve error when sending: owner: {:?}, receiver: {:?}",
                    self.owner,
                    receiver
                )
            })?
            .value()
            .clone();

        tx.send(val).await.map_err(|e| e.into())
    }

    async fn receive(&mut self, sender: &Identity) -> eyre::Result<Vec<u8>> {
        let (_, rx) = self
            .p2p_channels
            .get(&(sender.clone(), self.owner.clone()))
            .ok_or_else(|| {
                eyre!(
                    "p2p channel retrieve error when receiving: owner: {:?}, sender: {:?}",
                    self.owner,
                    sender
                )
            })?
            .value()
            .clone();

        Ok(rx.recv().await?)
    }
}
