use crate::{execution::player::Role, protocol::prf::PrfRng};
use eyre::Result;
use rand::{Rng, SeedableRng};

/// One party's shares of Beaver triples `c = a & b` for a batch of AND gates.
/// Gate `i` uses bit `i % 64` of word `i / 64`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BitTriples {
    pub a: Vec<u64>,
    pub b: Vec<u64>,
    pub c: Vec<u64>,
}

/// Source of correlated randomness for AND gates.
///
/// Both parties must request triples for the same batch sizes in the same
/// order.
pub trait TripleSource: Send + Sync {
    fn next_triples(&mut self, gates: usize) -> Result<BitTriples>;
}

/// Simulated trusted dealer: both parties expand the same dealer seed and
/// keep their own side of every triple.
///
/// Anyone holding the seed can derive the peer's triples, so this is only
/// usable for tests and benchmarks, never for a deployment.
pub struct SeededDealer {
    rng: PrfRng,
    role: Role,
}

impl SeededDealer {
    pub fn new(seed: u64, role: Role) -> Self {
        Self {
            rng: PrfRng::seed_from_u64(seed),
            role,
        }
    }
}

impl TripleSource for SeededDealer {
    fn next_triples(&mut self, gates: usize) -> Result<BitTriples> {
        let words = gates.div_ceil(64);
        let mut triples = BitTriples {
            a: Vec::with_capacity(words),
            b: Vec::with_capacity(words),
            c: Vec::with_capacity(words),
        };
        for _ in 0..words {
            let (a0, b0, c0, a1, b1): (u64, u64, u64, u64, u64) = self.rng.gen();
            let c1 = ((a0 ^ a1) & (b0 ^ b1)) ^ c0;
            let (a, b, c) = match self.role {
                Role::RegistrationStation => (a0, b0, c0),
                Role::BiometricProvider => (a1, b1, c1),
            };
            triples.a.push(a);
            triples.b.push(b);
            triples.c.push(c);
        }
        Ok(triples)
    }
}
