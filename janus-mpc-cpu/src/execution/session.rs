use crate::{
    execution::player::{Identity, Role},
    network::{value::NetworkValue, Networking},
    protocol::{
        perf_stats::ProtocolStats,
        prf::Prf,
        triples::{SeededDealer, TripleSource},
    },
};
use eyre::Result;
use serde::{Deserialize, Serialize};
use tracing::instrument;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u32);

impl From<u32> for SessionId {
    fn from(id: u32) -> Self {
        SessionId(id)
    }
}

pub type NetworkingImpl = Box<dyn Networking + Send + Sync>;

/// Point-to-point link to the other party, counting the serialized traffic.
pub struct NetworkSession {
    pub session_id: SessionId,
    pub own_role: Role,
    pub own_identity: Identity,
    pub peer_identity: Identity,
    pub networking: NetworkingImpl,
    pub stats: ProtocolStats,
}

impl NetworkSession {
    pub fn new(
        session_id: SessionId,
        own_role: Role,
        own_identity: Identity,
        peer_identity: Identity,
        networking: NetworkingImpl,
    ) -> Self {
        Self {
            session_id,
            own_role,
            own_identity,
            peer_identity,
            networking,
            stats: ProtocolStats::default(),
        }
    }

    pub async fn send(&mut self, value: &NetworkValue) -> Result<()> {
        let bytes = value.to_network()?;
        self.stats.record_sent(bytes.len());
        self.networking.send(bytes, &self.peer_identity).await
    }

    pub async fn receive(&mut self) -> Result<NetworkValue> {
        let bytes = self.networking.receive(&self.peer_identity).await?;
        self.stats.record_received(bytes.len());
        NetworkValue::from_network(Ok(bytes))
    }

    pub async fn flush(&mut self) -> Result<()> {
        self.networking.flush().await
    }
}

/// Everything one party needs to evaluate the protocol: the link to its peer,
/// randomness shared with the peer and a source of AND triples.
pub struct Session {
    pub network_session: NetworkSession,
    pub prf: Prf,
    pub triples: Box<dyn TripleSource>,
}

impl Session {
    /// Exchanges PRF seeds with the peer and sets up the seeded dealer.
    #[instrument(level = "debug", target = "janus::network", skip_all, fields(role = %network_session.own_role))]
    pub async fn setup(mut network_session: NetworkSession, dealer_seed: u64) -> Result<Self> {
        let my_seed = Prf::gen_seed();
        network_session
            .send(&NetworkValue::PrfKey(my_seed))
            .await?;
        let peer_seed = network_session.receive().await?.into_prf_key()?;
        let role = network_session.own_role;
        Ok(Self {
            network_session,
            prf: Prf::new(my_seed, peer_seed),
            triples: Box::new(SeededDealer::new(dealer_seed, role)),
        })
    }

    pub fn own_role(&self) -> Role {
        self.network_session.own_role
    }

    pub fn stats(&self) -> ProtocolStats {
        self.network_session.stats
    }

    pub fn stats_mut(&mut self) -> &mut ProtocolStats {
        &mut self.network_session.stats
    }
}
