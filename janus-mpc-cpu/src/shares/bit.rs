use crate::execution::player::Role;
use serde::{Deserialize, Serialize};
use std::ops::{BitXor, BitXorAssign};

/// One party's XOR share of an oblivious bit.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct BitShare(bool);

impl BitShare {
    pub fn new(share: bool) -> Self {
        Self(share)
    }

    /// The local share, meaningless on its own.
    pub fn get(self) -> bool {
        self.0
    }

    /// Sharing of a public constant: the querying party holds the value, its
    /// peer holds zero.
    pub fn from_const(value: bool, role: Role) -> Self {
        Self(value && role.is_querier())
    }

    pub fn xor_const(self, value: bool, role: Role) -> Self {
        self ^ Self::from_const(value, role)
    }

    pub fn not(self, role: Role) -> Self {
        self.xor_const(true, role)
    }
}

impl BitXor for BitShare {
    type Output = Self;

    fn bitxor(self, rhs: Self) -> Self::Output {
        Self(self.0 ^ rhs.0)
    }
}

impl BitXorAssign for BitShare {
    fn bitxor_assign(&mut self, rhs: Self) {
        self.0 ^= rhs.0;
    }
}

/// Packs bits into little-endian words, bit `i` lands in word `i / 64` at
/// position `i % 64`. Unused high bits of the last word are zero.
pub fn pack_bits<I: IntoIterator<Item = bool>>(bits: I) -> Vec<u64> {
    let mut words = Vec::new();
    for (i, bit) in bits.into_iter().enumerate() {
        if i % 64 == 0 {
            words.push(0u64);
        }
        if bit {
            if let Some(w) = words.last_mut() {
                *w |= 1 << (i % 64);
            }
        }
    }
    words
}

pub fn unpack_bits(words: &[u64], len: usize) -> Vec<bool> {
    (0..len)
        .map(|i| words.get(i / 64).is_some_and(|w| (w >> (i % 64)) & 1 == 1))
        .collect()
}

pub fn pack_shares(shares: &[BitShare]) -> Vec<u64> {
    pack_bits(shares.iter().map(|s| s.get()))
}

pub fn unpack_shares(words: &[u64], len: usize) -> Vec<BitShare> {
    unpack_bits(words, len)
        .into_iter()
        .map(BitShare::new)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_layout() {
        let mut bits = vec![false; 130];
        bits[0] = true;
        bits[63] = true;
        bits[64] = true;
        bits[129] = true;
        let words = pack_bits(bits.clone());
        assert_eq!(words, vec![1 | (1 << 63), 1, 2]);
        assert_eq!(unpack_bits(&words, 130), bits);
        assert!(pack_bits(Vec::new()).is_empty());
    }

    #[test]
    fn test_constants() {
        let rs = BitShare::from_const(true, Role::RegistrationStation);
        let bp = BitShare::from_const(true, Role::BiometricProvider);
        assert!((rs ^ bp).get());
        let rs = rs.not(Role::RegistrationStation);
        let bp = bp.not(Role::BiometricProvider);
        assert!(!(rs ^ bp).get());
    }
}
