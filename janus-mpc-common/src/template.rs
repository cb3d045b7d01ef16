use crate::{
    config::{BioSetting, DistanceMetric},
    error::Error,
    FIXED_POINT_FRAC_BITS, MAX_BITS_PER_SLOT,
};
use rand::{seq::index::sample, Rng};
use serde::{Deserialize, Serialize};

/// Probability that a random iris mask marks a slot as valid.
pub const MASK_FILL_RATE: f64 = 0.9;

/// A plaintext biometric template: `template_size` slots of `bits_per_slot`
/// bits each, plus an optional validity mask for iris codes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BiometricTemplate {
    slots: Vec<u8>,
    bits_per_slot: u8,
    mask: Option<Vec<bool>>,
}

impl BiometricTemplate {
    pub fn new(slots: Vec<u8>, bits_per_slot: u8, mask: Option<Vec<bool>>) -> Result<Self, Error> {
        if bits_per_slot == 0 || bits_per_slot > MAX_BITS_PER_SLOT {
            return Err(Error::UnsupportedSlotWidth(bits_per_slot));
        }
        let limit = 1u16 << bits_per_slot;
        if let Some(slot) = slots.iter().find(|s| u16::from(**s) >= limit) {
            return Err(Error::InvalidSetting(format!(
                "slot value {slot} does not fit {bits_per_slot} bits"
            )));
        }
        if let Some(mask) = &mask {
            if mask.len() != slots.len() {
                return Err(Error::InvalidSetting(format!(
                    "mask length {} differs from template size {}",
                    mask.len(),
                    slots.len()
                )));
            }
        }
        Ok(Self {
            slots,
            bits_per_slot,
            mask,
        })
    }

    /// Uniformly random slots without a mask.
    pub fn random<R: Rng>(rng: &mut R, template_size: usize, bits_per_slot: u8) -> Self {
        let max = (1u16 << bits_per_slot.clamp(1, MAX_BITS_PER_SLOT)) - 1;
        Self {
            slots: (0..template_size)
                .map(|_| rng.gen_range(0..=max) as u8)
                .collect(),
            bits_per_slot: bits_per_slot.clamp(1, MAX_BITS_PER_SLOT),
            mask: None,
        }
    }

    /// Random 1-bit code with a mask covering roughly 90% of the slots.
    pub fn random_masked<R: Rng>(rng: &mut R, template_size: usize) -> Self {
        let mut template = Self::random(rng, template_size, 1);
        template.mask = Some(
            (0..template_size)
                .map(|_| rng.gen_bool(MASK_FILL_RATE))
                .collect(),
        );
        template
    }

    /// Random template in the shape `setting` expects.
    pub fn random_for<R: Rng>(rng: &mut R, setting: &BioSetting) -> Self {
        if setting.metric().uses_mask() {
            Self::random_masked(rng, setting.template_size())
        } else {
            Self::random(rng, setting.template_size(), setting.bits_per_slot())
        }
    }

    /// Copy of `self` where `count` distinct slots hold a different value.
    /// The mask is kept as is.
    pub fn perturbed<R: Rng>(&self, rng: &mut R, count: usize) -> Self {
        let mut result = self.clone();
        let count = count.min(self.slots.len());
        let max = (1u16 << self.bits_per_slot) - 1;
        for i in sample(rng, self.slots.len(), count) {
            // a non-zero offset always lands on another value
            let offset = rng.gen_range(1..=max);
            result.slots[i] = ((u16::from(result.slots[i]) + offset) & max) as u8;
        }
        result
    }

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

    fn mask_bit(&self, i: usize) -> bool {
        self.mask.as_ref().map_or(true, |m| m[i])
    }

    /// Number of differing bits over all slots.
    pub fn hamming_distance(&self, other: &Self) -> u64 {
        self.slots
            .iter()
            .zip(other.slots.iter())
            .map(|(a, b)| u64::from((a ^ b).count_ones()))
            .sum()
    }

    /// Differing bits over the slots both masks mark as valid, together with
    /// the number of such slots. A missing mask counts as all valid.
    pub fn masked_hamming_distance(&self, other: &Self) -> (u64, u64) {
        let mut distance = 0;
        let mut mask_count = 0;
        for i in 0..self.slots.len().min(other.slots.len()) {
            if self.mask_bit(i) && other.mask_bit(i) {
                mask_count += 1;
                distance += u64::from((self.slots[i] ^ other.slots[i]).count_ones());
            }
        }
        (distance, mask_count)
    }

    /// Sum of squared slot differences.
    pub fn euclidean_distance(&self, other: &Self) -> u64 {
        self.slots
            .iter()
            .zip(other.slots.iter())
            .map(|(a, b)| {
                let d = i64::from(*a) - i64::from(*b);
                (d * d) as u64
            })
            .sum()
    }

    /// Plaintext decision of the metric configured in `setting`.
    pub fn is_match(&self, other: &Self, setting: &BioSetting) -> bool {
        match setting.metric() {
            DistanceMetric::Hamming => self.hamming_distance(other) < setting.threshold(),
            DistanceMetric::Euclidean => self.euclidean_distance(other) < setting.threshold(),
            DistanceMetric::MaskedHamming => {
                let (distance, mask_count) = self.masked_hamming_distance(other);
                mask_count > 0
                    && (distance << FIXED_POINT_FRAC_BITS)
                        < mask_count * setting.fraction_numerator()
            }
        }
    }
}

/// Plaintext membership: some identity has every one of its `fuse`
/// templates matching the query.
pub fn plain_membership(
    setting: &BioSetting,
    query: &BiometricTemplate,
    database: &[BiometricTemplate],
) -> bool {
    database
        .chunks(setting.fuse())
        .any(|identity| identity.iter().all(|t| query.is_match(t, setting)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BioKind;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_rejects_wide_slot() {
        assert!(BiometricTemplate::new(vec![0, 16], 4, None).is_err());
        assert!(BiometricTemplate::new(vec![0, 15], 4, None).is_ok());
        assert!(BiometricTemplate::new(vec![0, 1], 1, Some(vec![true])).is_err());
    }

    #[test]
    fn test_perturbed_changes_exact_count() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        for bits in [1, 3, 8] {
            let template = BiometricTemplate::random(&mut rng, 64, bits);
            let other = template.perturbed(&mut rng, 11);
            let changed = template
                .slots()
                .iter()
                .zip(other.slots())
                .filter(|(a, b)| a != b)
                .count();
            assert_eq!(changed, 11);
        }
    }

    #[test]
    fn test_distances() {
        let a = BiometricTemplate::new(vec![1, 0, 1, 1], 1, Some(vec![true, true, false, true]))
            .unwrap();
        let b = BiometricTemplate::new(vec![0, 0, 0, 1], 1, Some(vec![true, false, true, true]))
            .unwrap();
        assert_eq!(a.hamming_distance(&b), 2);
        assert_eq!(a.masked_hamming_distance(&b), (1, 2));

        let x = BiometricTemplate::new(vec![200, 3], 8, None).unwrap();
        let y = BiometricTemplate::new(vec![190, 7], 8, None).unwrap();
        assert_eq!(x.euclidean_distance(&y), 116);
    }

    #[test]
    fn test_masked_decision_is_exact() {
        let setting = BioSetting::with_defaults(BioKind::Iris, 1, 1, 128).unwrap();
        // 52 / 128 of 64 valid slots is 26 differing bits
        let slots = vec![0u8; 128];
        let mask: Vec<bool> = (0..128).map(|i| i < 64).collect();
        let a = BiometricTemplate::new(slots.clone(), 1, Some(mask.clone())).unwrap();
        let mut near = slots.clone();
        near[..25].iter_mut().for_each(|s| *s = 1);
        let mut far = slots;
        far[..26].iter_mut().for_each(|s| *s = 1);
        let near = BiometricTemplate::new(near, 1, Some(mask.clone())).unwrap();
        let far = BiometricTemplate::new(far, 1, Some(mask)).unwrap();
        assert!(a.is_match(&near, &setting));
        assert!(!a.is_match(&far, &setting));

        let empty = BiometricTemplate::new(vec![0; 128], 1, Some(vec![false; 128])).unwrap();
        assert!(!a.is_match(&empty, &setting));
    }

    #[test]
    fn test_plain_membership_needs_all_fused() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let setting = BioSetting::with_defaults(BioKind::Iris, 2, 2, 128)
            .unwrap()
            .with_metric(DistanceMetric::Hamming)
            .unwrap()
            .with_threshold(10)
            .unwrap();
        let query = BiometricTemplate::random(&mut rng, 128, 1);
        let mut db = vec![
            query.perturbed(&mut rng, 2),
            query.perturbed(&mut rng, 40),
            query.perturbed(&mut rng, 40),
            query.perturbed(&mut rng, 3),
        ];
        assert!(!plain_membership(&setting, &query, &db));
        db[1] = query.perturbed(&mut rng, 9);
        assert!(plain_membership(&setting, &query, &db));
    }
}
