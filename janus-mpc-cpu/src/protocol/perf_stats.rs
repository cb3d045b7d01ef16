use serde::{Deserialize, Serialize};

/// Per-session operation and traffic counters.
///
/// The same quantities are exported as the `janus.*` counters of the global
/// `metrics` recorder, if one is installed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolStats {
    pub and_gates: u64,
    pub rounds: u64,
    pub messages: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

impl ProtocolStats {
    /// One batch of `gates` AND gates evaluated in a single round.
    pub fn record_and_batch(&mut self, gates: usize) {
        self.and_gates += gates as u64;
        metrics::counter!("janus.and_gates").increment(gates as u64);
        self.record_round();
    }

    pub fn record_round(&mut self) {
        self.rounds += 1;
        metrics::counter!("janus.rounds").increment(1);
    }

    pub fn record_sent(&mut self, bytes: usize) {
        self.messages += 1;
        self.bytes_sent += bytes as u64;
        metrics::counter!("janus.bytes_sent").increment(bytes as u64);
    }

    pub fn record_received(&mut self, bytes: usize) {
        self.bytes_received += bytes as u64;
    }

    /// Counters accumulated since `earlier` was taken.
    pub fn since(&self, earlier: &Self) -> Self {
        Self {
            and_gates: self.and_gates - earlier.and_gates,
            rounds: self.rounds - earlier.rounds,
            messages: self.messages - earlier.messages,
            bytes_sent: self.bytes_sent - earlier.bytes_sent,
            bytes_received: self.bytes_received - earlier.bytes_received,
        }
    }
}
