use crate::execution::player::Identity;
use async_trait::async_trait;
use eyre::Result;

/// Requirements for networking.
///
/// Messages between a pair of parties arrive in the order they were sent.
#[async_trait]
pub trait Networking {
    async fn send(&mut self, value: Vec<u8>, receiver: &Identity) -> Result<()>;

    async fn receive(&mut self, sender: &Identity) -> Result<Vec<u8>>;

    /// Resolves once everything sent so far has left the process.
    async fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

pub mod local;
pub mod tcp;
pub mod value;
