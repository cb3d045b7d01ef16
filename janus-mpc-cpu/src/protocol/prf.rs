use rand::{rngs::OsRng, Rng, RngCore, SeedableRng};

pub use rand_chacha::ChaCha20Rng as PrfRng;

pub type PrfSeed = <PrfRng as SeedableRng>::Seed;

/// Randomness common to both parties, used to mask inputs without
/// communication. Each party contributes a seed, the stream is keyed by
/// their XOR.
#[derive(Clone, Debug)]
pub struct Prf {
    shared_prf: PrfRng,
}

impl Default for Prf {
    fn default() -> Self {
        Self::new(Self::gen_seed(), Self::gen_seed())
    }
}

impl Prf {
    pub fn new(my_seed: PrfSeed, peer_seed: PrfSeed) -> Self {
        let mut seed = my_seed;
        seed.iter_mut()
            .zip(peer_seed.iter())
            .for_each(|(s, p)| *s ^= p);
        Self {
            shared_prf: PrfRng::from_seed(seed),
        }
    }

    pub fn gen_seed() -> PrfSeed {
        let mut s = PrfSeed::default();
        OsRng.fill_bytes(&mut s);
        s
    }

    pub fn gen_bits(&mut self, n: usize) -> Vec<bool> {
        (0..n).map(|_| self.shared_prf.gen::<bool>()).collect()
    }
}
