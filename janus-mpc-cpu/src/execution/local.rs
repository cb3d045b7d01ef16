use crate::{
    execution::{
        player::{Identity, Role},
        session::{NetworkSession, Session, SessionId},
    },
    network::local::LocalNetworkingStore,
};
use eyre::{eyre, Result};
use std::future::Future;
use tokio::task::JoinSet;

pub fn generate_local_identities() -> Vec<Identity> {
    Role::ALL.iter().map(Role::identity).collect()
}

/// Both parties in one process, connected by in-memory channels.
pub struct LocalRuntime {
    /// Sessions indexed by [`Role::index`].
    pub sessions: Vec<Session>,
}

impl LocalRuntime {
    pub async fn mock_setup() -> Result<Self> {
        Self::new(0).await
    }

    pub async fn new(dealer_seed: u64) -> Result<Self> {
        let identities = generate_local_identities();
        let network = LocalNetworkingStore::from_host_ids(&identities);

        let mut jobs = JoinSet::new();
        for role in Role::ALL {
            let networking = network.get_local_network(role.identity());
            let network_session = NetworkSession::new(
                SessionId::from(0),
                role,
                role.identity(),
                role.peer().identity(),
                Box::new(networking),
            );
            jobs.spawn(async move { Session::setup(network_session, dealer_seed).await });
        }
        let mut sessions = Vec::with_capacity(2);
        while let Some(t) = jobs.join_next().await {
            sessions.push(t??);
        }
        sessions.sort_by_key(|s| s.own_role().index());
        Ok(LocalRuntime { sessions })
    }

    /// Runs `f` for both parties concurrently and returns their results in
    /// role order.
    pub async fn run<F, Fut, T>(self, f: F) -> Result<Vec<T>>
    where
        F: Fn(Session) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let mut jobs = JoinSet::new();
        for session in self.sessions {
            let role = session.own_role();
            let fut = f(session);
            jobs.spawn(async move { (role, fut.await) });
        }
        let mut results: Vec<Option<T>> = (0..2).map(|_| None).collect();
        while let Some(t) = jobs.join_next().await {
            let (role, res) = t?;
            results[role.index()] = Some(res.map_err(|e| e.wrap_err(format!("party {role}")))?);
        }
        results
            .into_iter()
            .map(|r| r.ok_or_else(|| eyre!("party did not finish")))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::value::NetworkValue;

    #[tokio::test]
    async fn test_run_returns_role_order() -> Result<()> {
        let runtime = LocalRuntime::mock_setup().await?;
        let res = runtime
            .run(|mut session| async move {
                let role = session.own_role();
                session
                    .network_session
                    .send(&NetworkValue::Bit(role.is_querier()))
                    .await?;
                let got = session.network_session.receive().await?.into_bit()?;
                Ok::<_, eyre::Report>((role, got))
            })
            .await?;
        assert_eq!(res[0], (Role::RegistrationStation, false));
        assert_eq!(res[1], (Role::BiometricProvider, true));
        Ok(())
    }
}
