//! Two-way secret sharing of enrolled templates and similarity scores.
//!
//! Multi-bit slots are shared additively: `S1` is uniform in `[0, 2^k)` and
//! `S2 = (T - S1) mod 2^k`. For 1-bit slots this coincides with XOR sharing.
//! Masks are always XOR shared.

use crate::{error::Error, template::BiometricTemplate, MAX_BITS_PER_SLOT};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// One party's share of a [`BiometricTemplate`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateShare {
    slots: Vec<u8>,
    bits_per_slot: u8,
    mask: Option<Vec<bool>>,
}

impl TemplateShare {
    pub fn slots(&self) -> &[u8] {
        &self.slots
    }

    pub fn bits_per_slot(&self) -> u8 {
        self.bits_per_slot
    }

    pub fn mask(&self) -> Option<&[bool]> {
        self.mask.as_deref()
    }

    pub fn template_size(&self) -> usize {
        self.slots.len()
    }
}

fn slot_modulus(bits_per_slot: u8) -> u16 {
    1u16 << bits_per_slot
}

pub fn secret_share<R: Rng>(
    template: &BiometricTemplate,
    rng: &mut R,
) -> (TemplateShare, TemplateShare) {
    let k = template.bits_per_slot();
    let modulus = slot_modulus(k);
    let (s1, s2): (Vec<u8>, Vec<u8>) = template
        .slots()
        .iter()
        .map(|t| {
            let s1 = rng.gen_range(0..modulus);
            let s2 = (u16::from(*t) + modulus - s1) % modulus;
            (s1 as u8, s2 as u8)
        })
        .unzip();
    let (m1, m2) = match template.mask() {
        Some(mask) => {
            let (m1, m2): (Vec<bool>, Vec<bool>) = mask
                .iter()
                .map(|m| {
                    let r: bool = rng.gen();
                    (r, r ^ m)
                })
                .unzip();
            (Some(m1), Some(m2))
        }
        None => (None, None),
    };
    (
        TemplateShare {
            slots: s1,
            bits_per_slot: k,
            mask: m1,
        },
        TemplateShare {
            slots: s2,
            bits_per_slot: k,
            mask: m2,
        },
    )
}

/// Reconstructs a template from both shares.
pub fn combine(a: &TemplateShare, b: &TemplateShare) -> Result<BiometricTemplate, Error> {
    if a.bits_per_slot != b.bits_per_slot {
        return Err(Error::InvalidSetting(format!(
            "shares disagree on slot width: {} vs {}",
            a.bits_per_slot, b.bits_per_slot
        )));
    }
    let k = a.bits_per_slot;
    if k == 0 || k > MAX_BITS_PER_SLOT {
        return Err(Error::UnsupportedSlotWidth(k));
    }
    if a.slots.len() != b.slots.len() {
        return Err("shares disagree on template size".into());
    }
    let modulus = slot_modulus(k);
    let slots = a
        .slots
        .iter()
        .zip(b.slots.iter())
        .map(|(x, y)| ((u16::from(*x) + u16::from(*y)) % modulus) as u8)
        .collect();
    let mask = match (&a.mask, &b.mask) {
        (Some(x), Some(y)) => Some(x.iter().zip(y.iter()).map(|(x, y)| x ^ y).collect()),
        (None, None) => None,
        _ => return Err("only one share carries a mask".into()),
    };
    BiometricTemplate::new(slots, k, mask)
}

/// Shares every template of a database, returning the `Rs` and `Bp` sides.
pub fn share_database<R: Rng>(
    database: &[BiometricTemplate],
    rng: &mut R,
) -> (Vec<TemplateShare>, Vec<TemplateShare>) {
    database.iter().map(|t| secret_share(t, rng)).unzip()
}

/// Additive sharing of a score modulo the public prime `prime_mod`.
pub fn share_score<R: Rng>(score: u64, prime_mod: u64, rng: &mut R) -> (u64, u64) {
    let s1 = rng.gen_range(0..prime_mod);
    let s2 = (score % prime_mod + prime_mod - s1) % prime_mod;
    (s1, s2)
}

pub fn combine_score(s1: u64, s2: u64, prime_mod: u64) -> u64 {
    (s1 + s2) % prime_mod
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_combine_rejects_mismatch() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let a = BiometricTemplate::random(&mut rng, 8, 4);
        let b = BiometricTemplate::random(&mut rng, 8, 3);
        let (a1, _) = secret_share(&a, &mut rng);
        let (_, b2) = secret_share(&b, &mut rng);
        assert!(combine(&a1, &b2).is_err());

        let bad = TemplateShare {
            slots: vec![0; 8],
            bits_per_slot: 9,
            mask: None,
        };
        assert!(matches!(
            combine(&bad, &bad.clone()),
            Err(Error::UnsupportedSlotWidth(9))
        ));
    }

    #[test]
    fn test_single_share_is_not_template() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let template = BiometricTemplate::random(&mut rng, 256, 8);
        let (s1, s2) = secret_share(&template, &mut rng);
        assert_ne!(s1.slots(), template.slots());
        assert_ne!(s2.slots(), template.slots());
    }

    #[test]
    fn test_score_sharing_wraps() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let p = crate::PRIME_MOD;
        for score in [0, 1, 9_999, p - 1] {
            let (s1, s2) = share_score(score, p, &mut rng);
            assert!(s1 < p && s2 < p);
            assert_eq!(combine_score(s1, s2, p), score);
        }
    }
}
