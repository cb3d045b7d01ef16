use super::bit::BitShare;
use crate::execution::player::Role;
use serde::{Deserialize, Serialize};

/// One party's share of an oblivious unsigned integer, stored as XOR-shared
/// bits, least significant first. The width is the number of bits.
///
/// Width changes and shifts are local, arithmetic lives in
/// [`crate::protocol::ops`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IntShare {
    bits: Vec<BitShare>,
}

impl IntShare {
    pub fn from_bits(bits: Vec<BitShare>) -> Self {
        Self { bits }
    }

    pub fn zero(width: usize) -> Self {
        Self {
            bits: vec![BitShare::default(); width],
        }
    }

    /// Sharing of the public constant `value` truncated to `width` bits.
    pub fn from_const(value: u64, width: usize, role: Role) -> Self {
        Self {
            bits: (0..width)
                .map(|i| BitShare::from_const(i < 64 && (value >> i) & 1 == 1, role))
                .collect(),
        }
    }

    pub fn width(&self) -> usize {
        self.bits.len()
    }

    pub fn bits(&self) -> &[BitShare] {
        &self.bits
    }

    pub fn into_bits(self) -> Vec<BitShare> {
        self.bits
    }

    pub fn bit(&self, i: usize) -> BitShare {
        self.bits.get(i).copied().unwrap_or_default()
    }

    /// Most significant bit, the sign bit of a two's complement value.
    pub fn msb(&self) -> BitShare {
        self.bits.last().copied().unwrap_or_default()
    }

    /// Zero-extends or truncates to `width` bits.
    pub fn resize(mut self, width: usize) -> Self {
        self.bits.resize(width, BitShare::default());
        self
    }

    /// Sign-extends or truncates to `width` bits.
    pub fn sign_extend(mut self, width: usize) -> Self {
        let msb = self.msb();
        self.bits.resize(width, msb);
        self
    }

    /// Logical right shift dropping the `n` low bits, the width shrinks by `n`.
    pub fn shr(mut self, n: usize) -> Self {
        let n = n.min(self.bits.len());
        self.bits.drain(..n);
        self
    }

    /// Left shift by `n` within the current width.
    pub fn shl(self, n: usize) -> Self {
        let width = self.width();
        let mut bits = vec![BitShare::default(); n.min(width)];
        bits.extend(self.bits.into_iter().take(width.saturating_sub(n)));
        Self { bits }
    }

    /// Bitwise XOR, the shorter operand is zero-extended.
    pub fn xor(&self, other: &Self) -> Self {
        let width = self.width().max(other.width());
        Self {
            bits: (0..width).map(|i| self.bit(i) ^ other.bit(i)).collect(),
        }
    }

    pub fn not(&self, role: Role) -> Self {
        Self {
            bits: self.bits.iter().map(|b| b.not(role)).collect(),
        }
    }
}

impl From<BitShare> for IntShare {
    fn from(bit: BitShare) -> Self {
        Self { bits: vec![bit] }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(rs: &IntShare, bp: &IntShare) -> u64 {
        rs.xor(bp)
            .bits()
            .iter()
            .enumerate()
            .map(|(i, b)| (b.get() as u64) << i)
            .sum()
    }

    fn shared(value: u64, width: usize) -> (IntShare, IntShare) {
        (
            IntShare::from_const(value, width, Role::RegistrationStation),
            IntShare::from_const(value, width, Role::BiometricProvider),
        )
    }

    #[test]
    fn test_local_width_changes() {
        let (rs, bp) = shared(0b1011, 4);
        assert_eq!(plain(&rs, &bp), 11);
        assert_eq!(plain(&rs.clone().resize(8), &bp.clone().resize(8)), 11);
        assert_eq!(plain(&rs.clone().resize(2), &bp.clone().resize(2)), 3);
        assert_eq!(
            plain(&rs.clone().sign_extend(6), &bp.clone().sign_extend(6)),
            0b111011
        );
        assert_eq!(plain(&rs.clone().shr(1), &bp.clone().shr(1)), 0b101);
        assert_eq!(rs.clone().shr(1).width(), 3);
        assert_eq!(plain(&rs.clone().shl(2), &bp.clone().shl(2)), 0b1100);
        assert_eq!(rs.clone().shl(2).width(), 4);
    }

    #[test]
    fn test_not() {
        let (rs, bp) = shared(5, 4);
        let rs = rs.not(Role::RegistrationStation);
        let bp = bp.not(Role::BiometricProvider);
        assert_eq!(plain(&rs, &bp), 10);
    }
}
